//! Workflow orchestration: applying a compiled setup and running provisioning plans.

mod actions;
mod runner;

use crate::credentials::{write_credentials, LAN_HOST_KEY, PROVIDER_KEY};
use crate::error::LaiaResult;
use crate::wizard::{CompiledSetup, SetupFragment};
use std::path::Path;

pub use actions::{
    scripts_dir, ActionCategory, ActionRegistry, ActionSpec, ResolvedAction, APPLY_FIREWALL,
    HARDEN_SYSTEM, SCRIPTS_DIR_ENV, SECURITY_AUDIT,
};
pub use runner::{
    spawn_plan, ActionExecutor, PlanSummary, ProgressUpdate, ProvisioningRun, ProvisioningRunner,
    ProvisioningStep, StepOutcome, StepStatus, SystemExecutor,
};

/// Severity levels used when reporting workflow events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowLevel {
    Info,
    Success,
    Warn,
    Error,
    Security,
}

/// Single line of output produced by a workflow step.
#[derive(Debug, Clone)]
pub struct WorkflowEvent {
    pub level: WorkflowLevel,
    pub message: String,
}

/// Aggregated report returned by any workflow entry point.
#[derive(Debug, Clone)]
pub struct WorkflowReport {
    pub title: String,
    pub events: Vec<WorkflowEvent>,
}

impl WorkflowReport {
    pub fn has_errors(&self) -> bool {
        self.events.iter().any(|e| e.level == WorkflowLevel::Error)
    }
}

/// Convenience constructor that wraps the repeated boilerplate.
pub(crate) fn event(level: WorkflowLevel, message: impl Into<String>) -> WorkflowEvent {
    WorkflowEvent {
        level,
        message: message.into(),
    }
}

/// Persist the credentials of a finished wizard run.
///
/// Runs before any plan step; a write failure is returned as an error so
/// nothing is provisioned against a half-configured host.
pub fn apply_setup(compiled: &CompiledSetup, credentials_path: &Path) -> LaiaResult<WorkflowReport> {
    let mut events = Vec::new();

    let mode = compiled.fragment.mode();
    let detail = match &compiled.fragment {
        SetupFragment::Online { provider, .. } => format!("online via {provider}"),
        SetupFragment::Local => "local runtime".to_string(),
        SetupFragment::Lan { host, port } => format!("LAN server {host}:{port}"),
    };
    events.push(event(
        WorkflowLevel::Info,
        format!("Mode: {} ({detail})", mode.as_str()),
    ));

    write_credentials(credentials_path, &compiled.credentials)?;
    events.push(event(
        WorkflowLevel::Security,
        format!(
            "Wrote {} (owner read/write only)",
            credentials_path.display()
        ),
    ));
    if compiled.credentials.get(PROVIDER_KEY).is_some() {
        events.push(event(
            WorkflowLevel::Security,
            "API key stored; it is never shown again",
        ));
    }
    if compiled.credentials.get(LAN_HOST_KEY).is_some() {
        events.push(event(
            WorkflowLevel::Warn,
            "Traffic to the LAN server is not encrypted; use a trusted network",
        ));
    }

    let queued = compiled.plan.len();
    events.push(event(
        WorkflowLevel::Info,
        if queued == 0 {
            "No provisioning steps required".to_string()
        } else {
            format!("{queued} provisioning step(s) queued")
        },
    ));
    events.push(event(WorkflowLevel::Success, "Configuration saved"));

    Ok(WorkflowReport {
        title: "Apply guided setup".into(),
        events,
    })
}
