//! Timeout-bounded execution of external programs.
//!
//! Programs are always spawned with an explicit argument vector; nothing is
//! routed through a shell.

use crate::error::{LaiaError, LaiaResult};
use log::{debug, warn};
use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Captured result of a finished program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code, or -1 when the process was terminated by a signal.
    pub status: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// stdout followed by stderr, trimmed.
    pub fn combined(&self) -> String {
        let stdout = self.stdout.trim_end();
        let stderr = self.stderr.trim_end();
        match (stdout.is_empty(), stderr.is_empty()) {
            (true, true) => String::new(),
            (false, true) => stdout.to_string(),
            (true, false) => stderr.to_string(),
            (false, false) => format!("{stdout}\n{stderr}"),
        }
    }

    /// stderr when present, otherwise stdout.
    pub fn diagnostic(&self) -> &str {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim()
        } else {
            stderr
        }
    }
}

/// Run `program` with `args`, killing it once `timeout` elapses.
///
/// A missing program surfaces as [`LaiaError::Io`] with `NotFound`; an
/// expired timeout as [`LaiaError::Timeout`]. A non-zero exit is not an
/// error: callers inspect [`CommandOutput::status`].
pub fn run_with_timeout<S: AsRef<str>>(
    program: &str,
    args: &[S],
    timeout: Duration,
) -> LaiaResult<CommandOutput> {
    let mut command = Command::new(program);
    for arg in args {
        let arg: &str = arg.as_ref();
        command.arg(arg);
    }
    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    debug!("running {program} with {} argument(s)", args.len());
    let mut child = command.spawn()?;
    let stdout = capture(child.stdout.take());
    let stderr = capture(child.stderr.take());

    let status = match wait_until(&mut child, Instant::now() + timeout)? {
        Some(status) => status,
        None => {
            // Killing the child closes its pipes, which ends both readers;
            // whatever they collected is dropped with them.
            let _ = child.kill();
            let _ = child.wait();
            warn!("{program} exceeded {timeout:?} and was killed");
            return Err(LaiaError::Timeout {
                what: program.to_string(),
                timeout,
            });
        }
    };

    Ok(CommandOutput {
        stdout: collect(program, stdout)?,
        stderr: collect(program, stderr)?,
        status: status.code().unwrap_or(-1),
    })
}

/// Poll `child` until it exits or `deadline` passes (`None`).
fn wait_until(child: &mut Child, deadline: Instant) -> LaiaResult<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}

type Capture = Option<thread::JoinHandle<io::Result<Vec<u8>>>>;

/// Drain `pipe` on its own thread so a chatty child never blocks on a full pipe.
fn capture<R: Read + Send + 'static>(pipe: Option<R>) -> Capture {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            pipe.read_to_end(&mut buf).map(|_| buf)
        })
    })
}

fn collect(program: &str, capture: Capture) -> LaiaResult<String> {
    let Some(handle) = capture else {
        return Ok(String::new());
    };
    let bytes = handle
        .join()
        .map_err(|_| LaiaError::Command(format!("output reader for {program} panicked")))??;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::ErrorKind;

    #[test]
    fn captures_output_and_status() {
        let out = run_with_timeout(
            "sh",
            &["-c", "echo out; echo err >&2; exit 3"],
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(out.stdout, "out\n");
        assert_eq!(out.stderr, "err\n");
        assert_eq!(out.status, 3);
        assert!(!out.success());
        assert_eq!(out.combined(), "out\nerr");
        assert_eq!(out.diagnostic(), "err");
    }

    #[test]
    fn arguments_are_not_shell_expanded() {
        let out = run_with_timeout("echo", &["$HOME; rm -rf /"], Duration::from_secs(5)).unwrap();
        assert_eq!(out.stdout, "$HOME; rm -rf /\n");
    }

    #[test]
    fn missing_program_is_not_found() {
        let err = run_with_timeout::<&str>("laia-no-such-binary", &[], Duration::from_secs(1))
            .unwrap_err();
        match err {
            LaiaError::Io(io) => assert_eq!(io.kind(), ErrorKind::NotFound),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn output_larger_than_a_pipe_buffer_is_drained() {
        let out = run_with_timeout(
            "sh",
            &["-c", "head -c 200000 /dev/zero | tr '\\0' x"],
            Duration::from_secs(10),
        )
        .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.len(), 200_000);
    }

    #[test]
    fn slow_program_is_killed() {
        let started = Instant::now();
        let err = run_with_timeout("sleep", &["5"], Duration::from_millis(100)).unwrap_err();
        assert!(matches!(err, LaiaError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
