//! Sequential execution of a provisioning plan.

use super::actions::ActionRegistry;
use super::{event, WorkflowEvent, WorkflowLevel, WorkflowReport};
use crate::command::{run_with_timeout, CommandOutput};
use crate::error::{LaiaError, LaiaResult};
use log::{info, warn};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// One named external action of a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningStep {
    pub description: String,
    /// Id resolved through the [`ActionRegistry`].
    pub action: String,
    pub args: Vec<String>,
    /// A failure of a fatal step halts the rest of the plan.
    pub fatal: bool,
}

impl ProvisioningStep {
    pub fn new(
        description: impl Into<String>,
        action: impl Into<String>,
        args: Vec<String>,
        fatal: bool,
    ) -> Self {
        Self {
            description: description.into(),
            action: action.into(),
            args,
            fatal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    Succeeded,
    Failed { exit_code: i32 },
    TimedOut,
    /// The action could not be started (unknown id, missing program).
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub index: usize,
    pub status: StepStatus,
    /// Combined stdout and stderr.
    pub output: String,
    pub duration: Duration,
}

impl StepOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == StepStatus::Succeeded
    }
}

/// Seam between the runner and process execution.
pub trait ActionExecutor: Send + Sync {
    fn execute(&self, program: &str, args: &[String], timeout: Duration)
        -> LaiaResult<CommandOutput>;
}

/// Executes actions as real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExecutor;

impl ActionExecutor for SystemExecutor {
    fn execute(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> LaiaResult<CommandOutput> {
        run_with_timeout(program, args, timeout)
    }
}

#[derive(Debug)]
pub struct ProvisioningRunner<E: ActionExecutor> {
    registry: ActionRegistry,
    executor: E,
}

impl ProvisioningRunner<SystemExecutor> {
    pub fn system() -> Self {
        Self::new(ActionRegistry::system(), SystemExecutor)
    }
}

impl<E: ActionExecutor> ProvisioningRunner<E> {
    pub fn new(registry: ActionRegistry, executor: E) -> Self {
        Self { registry, executor }
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Start a run. Nothing executes until the returned iterator is advanced.
    pub fn run(&self, plan: Vec<ProvisioningStep>) -> ProvisioningRun<'_, E> {
        ProvisioningRun {
            runner: self,
            plan,
            next: 0,
            halted_at: None,
            events: Vec::new(),
        }
    }

    fn execute_step(&self, index: usize, step: &ProvisioningStep) -> StepOutcome {
        let started = Instant::now();
        let (status, output) = match self.registry.resolve(step) {
            Err(err) => (StepStatus::Unavailable(err.to_string()), String::new()),
            Ok(action) => match self
                .executor
                .execute(&action.program, &action.args, action.timeout)
            {
                Ok(out) if out.success() => (StepStatus::Succeeded, out.combined()),
                Ok(out) => (
                    StepStatus::Failed {
                        exit_code: out.status,
                    },
                    out.combined(),
                ),
                Err(LaiaError::Timeout { .. }) => (StepStatus::TimedOut, String::new()),
                Err(LaiaError::Io(err)) if err.kind() == io::ErrorKind::NotFound => (
                    StepStatus::Unavailable(format!("{} is not installed", action.program)),
                    String::new(),
                ),
                Err(err) => (StepStatus::Unavailable(err.to_string()), String::new()),
            },
        };
        StepOutcome {
            index,
            status,
            output,
            duration: started.elapsed(),
        }
    }
}

/// Lazy, single-pass execution of one plan.
///
/// Yields `(step, outcome)` in plan order and ends early after a fatal failure.
pub struct ProvisioningRun<'a, E: ActionExecutor> {
    runner: &'a ProvisioningRunner<E>,
    plan: Vec<ProvisioningStep>,
    next: usize,
    halted_at: Option<usize>,
    events: Vec<WorkflowEvent>,
}

impl<E: ActionExecutor> ProvisioningRun<'_, E> {
    pub fn len(&self) -> usize {
        self.plan.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plan.is_empty()
    }

    /// Fraction of the plan processed so far (index / len).
    pub fn progress(&self) -> f64 {
        if self.plan.is_empty() {
            1.0
        } else {
            self.next as f64 / self.plan.len() as f64
        }
    }

    /// Index of the fatal step that stopped the run, if any.
    pub fn halted_at(&self) -> Option<usize> {
        self.halted_at
    }

    pub fn is_finished(&self) -> bool {
        self.halted_at.is_some() || self.next >= self.plan.len()
    }

    /// Summarise the steps executed so far.
    pub fn into_report(mut self, title: impl Into<String>) -> WorkflowReport {
        let total = self.plan.len();
        match self.halted_at {
            Some(index) => self.events.push(event(
                WorkflowLevel::Error,
                format!(
                    "Plan incomplete: stopped at step {} of {total}; {} step(s) not run",
                    index + 1,
                    total - index - 1
                ),
            )),
            None if self.next >= total => self.events.push(event(
                WorkflowLevel::Success,
                format!("Plan finished ({total} step(s))"),
            )),
            None => self.events.push(event(
                WorkflowLevel::Warn,
                format!("Plan interrupted after {} of {total} step(s)", self.next),
            )),
        }
        WorkflowReport {
            title: title.into(),
            events: self.events,
        }
    }
}

impl<E: ActionExecutor> Iterator for ProvisioningRun<'_, E> {
    type Item = (ProvisioningStep, StepOutcome);

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_finished() {
            return None;
        }
        let index = self.next;
        let step = self.plan[index].clone();
        let total = self.plan.len();

        info!("step {}/{total}: {} ({})", index + 1, step.description, step.action);
        let outcome = self.runner.execute_step(index, &step);
        self.next += 1;

        let position = format!("[{}/{total}] {}", index + 1, step.description);
        match failure_reason(&outcome.status) {
            None => {
                self.events
                    .push(event(WorkflowLevel::Success, format!("{position}: done")));
            }
            Some(reason) => {
                warn!("step {} ({}) failed: {reason}", index + 1, step.action);
                let level = if step.fatal {
                    WorkflowLevel::Error
                } else {
                    WorkflowLevel::Warn
                };
                self.events
                    .push(event(level, format!("{position}: failed ({reason})")));
                if step.fatal {
                    self.halted_at = Some(index);
                }
            }
        }

        Some((step, outcome))
    }
}

fn failure_reason(status: &StepStatus) -> Option<String> {
    match status {
        StepStatus::Succeeded => None,
        StepStatus::Failed { exit_code } => Some(format!("exit code {exit_code}")),
        StepStatus::TimedOut => Some("timed out".to_string()),
        StepStatus::Unavailable(why) => Some(why.clone()),
    }
}

/// Incremental progress sent by [`spawn_plan`].
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub step: ProvisioningStep,
    pub outcome: StepOutcome,
    pub total: usize,
    /// Fraction complete after this step.
    pub fraction: f64,
}

/// Final state of a background run.
#[derive(Debug, Clone)]
pub struct PlanSummary {
    pub executed: usize,
    pub halted_at: Option<usize>,
    pub report: WorkflowReport,
}

/// Run `plan` on the blocking pool, streaming one update per finished step.
pub fn spawn_plan<E>(
    runner: Arc<ProvisioningRunner<E>>,
    plan: Vec<ProvisioningStep>,
    title: String,
) -> (mpsc::UnboundedReceiver<ProgressUpdate>, JoinHandle<PlanSummary>)
where
    E: ActionExecutor + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::task::spawn_blocking(move || {
        let mut run = runner.run(plan);
        let total = run.len();
        let mut executed = 0;
        while let Some((step, outcome)) = run.next() {
            executed += 1;
            // A dropped receiver only means nobody is watching.
            let _ = tx.send(ProgressUpdate {
                step,
                outcome,
                total,
                fraction: run.progress(),
            });
        }
        let halted_at = run.halted_at();
        PlanSummary {
            executed,
            halted_at,
            report: run.into_report(title),
        }
    });
    (rx, handle)
}
