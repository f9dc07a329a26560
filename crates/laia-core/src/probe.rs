//! Concurrent, timeout-bounded probes of host security state.
//!
//! Each check runs on its own blocking task under its own timeout. Results
//! are always reported in request order, never completion order.

use crate::command::run_with_timeout;
use crate::error::{LaiaError, LaiaResult};
use log::{debug, warn};
use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_SYSCTL_ROOT: &str = "/proc/sys";
const DEFAULT_FSTAB: &str = "/etc/fstab";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceState {
    Active,
    Inactive,
    Unknown,
    Error,
    Timeout,
}

impl ServiceState {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceState::Active => "active",
            ServiceState::Inactive => "inactive",
            ServiceState::Unknown => "unknown",
            ServiceState::Error => "error",
            ServiceState::Timeout => "timeout",
        }
    }

    fn marker(self) -> &'static str {
        match self {
            ServiceState::Active => "[ok]",
            ServiceState::Inactive => "[!!]",
            ServiceState::Unknown | ServiceState::Error | ServiceState::Timeout => "[??]",
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one probe, independent of every other probe in the same call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceCheckResult {
    pub name: String,
    pub label: String,
    pub state: ServiceState,
    pub detail: String,
}

/// Expected value of a kernel parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysctlExpectation {
    /// Exactly this value is hardened; 0 is off; anything else unknown.
    Equals(i64),
    /// Any value at or above this is hardened; 0 is off.
    AtLeast(i64),
}

impl SysctlExpectation {
    pub fn classify(self, value: i64) -> ServiceState {
        let hardened = match self {
            SysctlExpectation::Equals(expected) => value == expected,
            SysctlExpectation::AtLeast(minimum) => value >= minimum,
        };
        if hardened {
            ServiceState::Active
        } else if value == 0 {
            ServiceState::Inactive
        } else {
            ServiceState::Unknown
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeKind {
    /// `systemctl is-active <unit>`.
    SystemdUnit(String),
    /// `ufw status`.
    Firewall,
    /// `openclaw status`.
    AssistantStatus,
    /// `hidepid` on the `/proc` mount in fstab.
    ProcHidepid,
    /// Direct read of `/proc/sys/<key>`.
    Sysctl {
        key: String,
        expect: SysctlExpectation,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeCheck {
    pub id: String,
    pub label: String,
    pub kind: ProbeKind,
}

impl ProbeCheck {
    pub fn new(id: impl Into<String>, label: impl Into<String>, kind: ProbeKind) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind,
        }
    }

    fn unit(id: &str, label: &str, unit: &str) -> Self {
        Self::new(id, label, ProbeKind::SystemdUnit(unit.to_string()))
    }
}

/// The dashboard battery, in display order.
pub fn battery() -> Vec<ProbeCheck> {
    vec![
        ProbeCheck::new("firewall", "Firewall (UFW)", ProbeKind::Firewall),
        ProbeCheck::unit("apparmor", "AppArmor", "apparmor"),
        ProbeCheck::unit("fail2ban", "fail2ban", "fail2ban"),
        ProbeCheck::unit("auto-updates", "Auto-updates", "unattended-upgrades"),
        ProbeCheck::new("openclaw", "OpenClaw", ProbeKind::AssistantStatus),
        ProbeCheck::new("hidepid", "/proc hidepid", ProbeKind::ProcHidepid),
        ProbeCheck::new(
            "aslr",
            "ASLR",
            ProbeKind::Sysctl {
                key: "kernel.randomize_va_space".into(),
                expect: SysctlExpectation::Equals(2),
            },
        ),
        ProbeCheck::new(
            "kptr-restrict",
            "Kernel pointer restriction",
            ProbeKind::Sysctl {
                key: "kernel.kptr_restrict".into(),
                expect: SysctlExpectation::AtLeast(1),
            },
        ),
    ]
}

/// Map a requested name to a battery check, or treat it as a systemd unit.
pub fn resolve(name: &str) -> ProbeCheck {
    battery()
        .into_iter()
        .find(|check| check.id == name)
        .unwrap_or_else(|| ProbeCheck::unit(name, name, name))
}

/// What a single check observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub state: ServiceState,
    pub detail: String,
}

impl Observation {
    pub fn new(state: ServiceState, detail: impl Into<String>) -> Self {
        Self {
            state,
            detail: detail.into(),
        }
    }
}

/// Executes one check against the host. Blocking is allowed.
pub trait CheckRunner: Send + Sync + 'static {
    fn run(&self, check: &ProbeCheck, timeout: Duration) -> LaiaResult<Observation>;
}

/// Runner that talks to the real system.
#[derive(Debug, Clone)]
pub struct SystemCheckRunner {
    sysctl_root: PathBuf,
    fstab: PathBuf,
}

impl Default for SystemCheckRunner {
    fn default() -> Self {
        Self {
            sysctl_root: PathBuf::from(DEFAULT_SYSCTL_ROOT),
            fstab: PathBuf::from(DEFAULT_FSTAB),
        }
    }
}

impl SystemCheckRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read sysctls and fstab from alternate locations.
    pub fn with_roots(sysctl_root: impl Into<PathBuf>, fstab: impl Into<PathBuf>) -> Self {
        Self {
            sysctl_root: sysctl_root.into(),
            fstab: fstab.into(),
        }
    }

    fn systemd_unit(&self, unit: &str, timeout: Duration) -> LaiaResult<Observation> {
        let out = run_with_timeout("systemctl", &["is-active", unit], timeout)?;
        let reported = out.stdout.trim();
        Ok(Observation::new(classify_is_active(reported), reported))
    }

    fn firewall(&self, timeout: Duration) -> LaiaResult<Observation> {
        let out = run_with_timeout("ufw", &["status"], timeout)?;
        let text = out.combined();
        let first = text.lines().next().unwrap_or_default().trim().to_string();
        Ok(Observation::new(classify_ufw(&text), first))
    }

    fn assistant(&self, timeout: Duration) -> LaiaResult<Observation> {
        let out = run_with_timeout("openclaw", &["status"], timeout)?;
        let state = if out.success() {
            ServiceState::Active
        } else {
            ServiceState::Inactive
        };
        let detail: Vec<&str> = out.stdout.lines().take(3).collect();
        Ok(Observation::new(state, detail.join("\n")))
    }

    fn hidepid(&self) -> LaiaResult<Observation> {
        let fstab = fs::read_to_string(&self.fstab)?;
        Ok(if fstab_has_hidepid(&fstab) {
            Observation::new(ServiceState::Active, "hidepid set on /proc")
        } else {
            Observation::new(ServiceState::Inactive, "hidepid not set")
        })
    }

    fn sysctl(&self, key: &str, expect: SysctlExpectation) -> LaiaResult<Observation> {
        let path = self.sysctl_root.join(key.replace('.', "/"));
        let raw = fs::read_to_string(&path)?;
        let raw = raw.trim();
        let state = match raw.parse::<i64>() {
            Ok(value) => expect.classify(value),
            Err(_) => ServiceState::Unknown,
        };
        Ok(Observation::new(state, format!("{key} = {raw}")))
    }
}

impl CheckRunner for SystemCheckRunner {
    fn run(&self, check: &ProbeCheck, timeout: Duration) -> LaiaResult<Observation> {
        match &check.kind {
            ProbeKind::SystemdUnit(unit) => self.systemd_unit(unit, timeout),
            ProbeKind::Firewall => self.firewall(timeout),
            ProbeKind::AssistantStatus => self.assistant(timeout),
            ProbeKind::ProcHidepid => self.hidepid(),
            ProbeKind::Sysctl { key, expect } => self.sysctl(key, *expect),
        }
    }
}

pub fn classify_is_active(reported: &str) -> ServiceState {
    match reported.trim() {
        "active" => ServiceState::Active,
        "inactive" | "failed" => ServiceState::Inactive,
        _ => ServiceState::Unknown,
    }
}

pub fn classify_ufw(output: &str) -> ServiceState {
    if output.contains("Status: active") {
        ServiceState::Active
    } else if output.contains("Status: inactive") {
        ServiceState::Inactive
    } else {
        ServiceState::Unknown
    }
}

fn fstab_has_hidepid(fstab: &str) -> bool {
    fstab
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#'))
        .any(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let is_proc = fields.first() == Some(&"proc") || fields.get(2) == Some(&"proc");
            is_proc && line.contains("hidepid")
        })
}

/// Fans checks out over the blocking pool and joins them in order.
#[derive(Debug, Clone)]
pub struct ServiceProbe<R: CheckRunner> {
    runner: Arc<R>,
}

impl ServiceProbe<SystemCheckRunner> {
    pub fn system() -> Self {
        Self::new(SystemCheckRunner::new())
    }
}

impl<R: CheckRunner> ServiceProbe<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner: Arc::new(runner),
        }
    }

    /// Probe every name independently; one result per name, in input order.
    pub async fn check_all<S: AsRef<str>>(
        &self,
        names: &[S],
        timeout: Duration,
    ) -> Vec<ServiceCheckResult> {
        let checks = names.iter().map(|name| resolve(name.as_ref())).collect();
        self.run_checks(checks, timeout).await
    }

    /// Run the fixed battery and collect it into a report.
    pub async fn dashboard(&self, timeout: Duration) -> DashboardReport {
        DashboardReport {
            results: self.run_checks(battery(), timeout).await,
        }
    }

    async fn run_checks(
        &self,
        checks: Vec<ProbeCheck>,
        timeout: Duration,
    ) -> Vec<ServiceCheckResult> {
        let handles: Vec<JoinHandle<ServiceCheckResult>> = checks
            .into_iter()
            .map(|check| tokio::spawn(run_one(Arc::clone(&self.runner), check, timeout)))
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(err) => warn!("probe task failed to join: {err}"),
            }
        }
        results
    }
}

async fn run_one<R: CheckRunner>(
    runner: Arc<R>,
    check: ProbeCheck,
    timeout: Duration,
) -> ServiceCheckResult {
    let name = check.id.clone();
    let label = check.label.clone();
    let task = tokio::task::spawn_blocking(move || runner.run(&check, timeout));

    let (state, detail) = match tokio::time::timeout(timeout, task).await {
        Err(_) => {
            warn!("probe {name} timed out after {timeout:?}");
            (ServiceState::Timeout, format!("no answer within {timeout:?}"))
        }
        Ok(Err(join)) => (ServiceState::Error, format!("probe panicked: {join}")),
        Ok(Ok(Ok(observation))) => (observation.state, observation.detail),
        Ok(Ok(Err(LaiaError::Timeout { timeout, .. }))) => {
            (ServiceState::Timeout, format!("no answer within {timeout:?}"))
        }
        Ok(Ok(Err(LaiaError::Io(err)))) if err.kind() == io::ErrorKind::NotFound => {
            (ServiceState::Error, "not installed".to_string())
        }
        Ok(Ok(Err(err))) => (ServiceState::Error, err.to_string()),
    };

    debug!("probe {name}: {state}");
    ServiceCheckResult {
        name,
        label,
        state,
        detail,
    }
}

/// Ordered results of the dashboard battery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardReport {
    pub results: Vec<ServiceCheckResult>,
}

impl DashboardReport {
    pub fn count(&self, state: ServiceState) -> usize {
        self.results.iter().filter(|r| r.state == state).count()
    }

    /// Plain-text dashboard, one block per check.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for result in &self.results {
            out.push_str(&format!(
                "{} {:<28} {}\n",
                result.state.marker(),
                result.label,
                result.state
            ));
            for line in result.detail.lines().filter(|l| !l.trim().is_empty()) {
                out.push_str(&format!("     {}\n", line.trim()));
            }
        }
        out.push_str(&format!(
            "\n{} of {} checks active\n",
            self.count(ServiceState::Active),
            self.results.len()
        ));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::thread;
    use std::time::Instant;
    use tempfile::tempdir;

    /// Canned observations per check id, with optional artificial delay.
    #[derive(Default)]
    struct MockRunner {
        answers: HashMap<String, (Duration, LaiaResult<Observation>)>,
        calls: Mutex<Vec<String>>,
    }

    impl MockRunner {
        fn answer(mut self, id: &str, delay: Duration, state: ServiceState) -> Self {
            self.answers
                .insert(id.into(), (delay, Ok(Observation::new(state, state.as_str()))));
            self
        }

        fn fail(mut self, id: &str, err: LaiaError) -> Self {
            self.answers.insert(id.into(), (Duration::ZERO, Err(err)));
            self
        }
    }

    impl CheckRunner for MockRunner {
        fn run(&self, check: &ProbeCheck, _timeout: Duration) -> LaiaResult<Observation> {
            self.calls.lock().unwrap().push(check.id.clone());
            match self.answers.get(&check.id) {
                Some((delay, answer)) => {
                    thread::sleep(*delay);
                    match answer {
                        Ok(obs) => Ok(obs.clone()),
                        Err(err) => Err(LaiaError::Command(err.to_string())),
                    }
                }
                None => Ok(Observation::new(ServiceState::Unknown, "")),
            }
        }
    }

    #[tokio::test]
    async fn slow_check_times_out_without_affecting_others() {
        let runner = MockRunner::default()
            .answer("svcA", Duration::from_millis(1000), ServiceState::Active)
            .answer("svcB", Duration::ZERO, ServiceState::Inactive);
        let probe = ServiceProbe::new(runner);

        let started = Instant::now();
        let results = probe
            .check_all(&["svcA", "svcB"], Duration::from_millis(100))
            .await;
        assert!(started.elapsed() < Duration::from_millis(900));

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].name, "svcA");
        assert_eq!(results[0].state, ServiceState::Timeout);
        assert_eq!(results[1].name, "svcB");
        assert_eq!(results[1].state, ServiceState::Inactive);
    }

    #[tokio::test]
    async fn errors_stay_local_to_their_check() {
        let runner = MockRunner::default()
            .fail("apparmor", LaiaError::Command("boom".into()))
            .answer("fail2ban", Duration::ZERO, ServiceState::Active);
        let probe = ServiceProbe::new(runner);

        let results = probe
            .check_all(&["apparmor", "fail2ban"], Duration::from_secs(1))
            .await;
        assert_eq!(results[0].state, ServiceState::Error);
        assert!(results[0].detail.contains("boom"));
        assert_eq!(results[1].state, ServiceState::Active);
    }

    #[tokio::test]
    async fn dashboard_keeps_declaration_order() {
        // Earlier checks finish last; order must still follow the battery.
        let mut runner = MockRunner::default();
        for (i, check) in battery().iter().enumerate() {
            let delay = Duration::from_millis(10 * (8 - i as u64));
            runner = runner.answer(&check.id, delay, ServiceState::Active);
        }
        let probe = ServiceProbe::new(runner);

        let report = probe.dashboard(Duration::from_secs(2)).await;
        let ids: Vec<&str> = report.results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "firewall",
                "apparmor",
                "fail2ban",
                "auto-updates",
                "openclaw",
                "hidepid",
                "aslr",
                "kptr-restrict"
            ]
        );
        assert_eq!(report.count(ServiceState::Active), 8);
        assert!(report.render().contains("8 of 8 checks active"));
    }

    #[tokio::test]
    async fn repeated_calls_probe_again() {
        let probe = ServiceProbe::new(MockRunner::default());
        probe.check_all(&["sshd"], Duration::from_secs(1)).await;
        probe.check_all(&["sshd"], Duration::from_secs(1)).await;
        assert_eq!(*probe.runner.calls.lock().unwrap(), vec!["sshd", "sshd"]);
    }

    #[test]
    fn unknown_names_become_systemd_units() {
        let check = resolve("nginx");
        assert_eq!(check.kind, ProbeKind::SystemdUnit("nginx".into()));
        assert_eq!(
            resolve("auto-updates").kind,
            ProbeKind::SystemdUnit("unattended-upgrades".into())
        );
    }

    #[test]
    fn state_mappings() {
        assert_eq!(classify_is_active("active\n"), ServiceState::Active);
        assert_eq!(classify_is_active("failed"), ServiceState::Inactive);
        assert_eq!(classify_is_active("activating"), ServiceState::Unknown);

        assert_eq!(classify_ufw("Status: active\n\nTo Action From"), ServiceState::Active);
        assert_eq!(classify_ufw("Status: inactive"), ServiceState::Inactive);
        assert_eq!(classify_ufw("ERROR: need root"), ServiceState::Unknown);

        assert_eq!(SysctlExpectation::Equals(2).classify(2), ServiceState::Active);
        assert_eq!(SysctlExpectation::Equals(2).classify(1), ServiceState::Unknown);
        assert_eq!(SysctlExpectation::Equals(2).classify(0), ServiceState::Inactive);
        assert_eq!(SysctlExpectation::AtLeast(1).classify(2), ServiceState::Active);
        assert_eq!(SysctlExpectation::AtLeast(1).classify(0), ServiceState::Inactive);
    }

    #[test]
    fn system_runner_reads_sysctl_and_fstab_files() {
        let dir = tempdir().unwrap();
        let kernel = dir.path().join("sys").join("kernel");
        fs::create_dir_all(&kernel).unwrap();
        fs::write(kernel.join("randomize_va_space"), "2\n").unwrap();
        fs::write(kernel.join("kptr_restrict"), "0\n").unwrap();
        let fstab = dir.path().join("fstab");
        fs::write(
            &fstab,
            "# proc hidepid=2 commented\nproc /proc proc defaults,hidepid=2 0 0\n",
        )
        .unwrap();

        let runner = SystemCheckRunner::with_roots(dir.path().join("sys"), &fstab);
        let timeout = Duration::from_secs(1);
        let aslr = runner.run(&resolve("aslr"), timeout).unwrap();
        assert_eq!(aslr.state, ServiceState::Active);
        assert_eq!(aslr.detail, "kernel.randomize_va_space = 2");
        let kptr = runner.run(&resolve("kptr-restrict"), timeout).unwrap();
        assert_eq!(kptr.state, ServiceState::Inactive);
        let hidepid = runner.run(&resolve("hidepid"), timeout).unwrap();
        assert_eq!(hidepid.state, ServiceState::Active);

        fs::write(&fstab, "# proc /proc proc hidepid=2\nUUID=x / ext4 defaults 0 1\n").unwrap();
        let hidepid = runner.run(&resolve("hidepid"), timeout).unwrap();
        assert_eq!(hidepid.state, ServiceState::Inactive);
    }
}
