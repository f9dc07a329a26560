//! Registry mapping provisioning action ids to concrete programs.

use super::ProvisioningStep;
use crate::error::{LaiaError, LaiaResult};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SCRIPTS_DIR_ENV: &str = "LAIA_SCRIPTS_DIR";
const DEFAULT_SCRIPTS_DIR: &str = "/opt/laia/scripts";

pub const APPLY_FIREWALL: &str = "apply-firewall";
pub const SECURITY_AUDIT: &str = "security-audit";
pub const HARDEN_SYSTEM: &str = "harden-system";

/// Directory holding the provisioning scripts (`$LAIA_SCRIPTS_DIR` or `/opt/laia/scripts`).
pub fn scripts_dir() -> PathBuf {
    env::var_os(SCRIPTS_DIR_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SCRIPTS_DIR))
}

/// Timeout class of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionCategory {
    /// Package installs and downloads.
    Install,
    Configure,
    /// Quick status or connectivity checks.
    Check,
}

impl ActionCategory {
    pub fn timeout(self) -> Duration {
        match self {
            ActionCategory::Install => Duration::from_secs(30 * 60),
            ActionCategory::Configure => Duration::from_secs(5 * 60),
            ActionCategory::Check => Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSpec {
    pub program: String,
    pub leading_args: Vec<String>,
    pub category: ActionCategory,
}

impl ActionSpec {
    pub fn new(program: impl Into<String>, leading_args: &[&str], category: ActionCategory) -> Self {
        Self {
            program: program.into(),
            leading_args: leading_args.iter().map(|a| a.to_string()).collect(),
            category,
        }
    }

    fn script(dir: &Path, name: &str, category: ActionCategory) -> Self {
        let script = dir.join(name).to_string_lossy().into_owned();
        Self {
            program: "bash".into(),
            leading_args: vec![script],
            category,
        }
    }
}

/// A step bound to its program, full argv and timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAction {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct ActionRegistry {
    actions: BTreeMap<String, ActionSpec>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Standard actions backed by the scripts in [`scripts_dir`].
    pub fn system() -> Self {
        Self::with_scripts_dir(&scripts_dir())
    }

    pub fn with_scripts_dir(dir: &Path) -> Self {
        use crate::wizard::{CONFIGURE_ASSISTANT, INSTALL_RUNTIME, PULL_MODELS, TEST_CONNECTION};
        use ActionCategory::*;

        let mut registry = Self::new();
        registry
            .register(
                INSTALL_RUNTIME,
                ActionSpec::script(dir, "install-ollama.sh", Install),
            )
            .register(PULL_MODELS, ActionSpec::script(dir, "pull-models.sh", Install))
            .register(
                CONFIGURE_ASSISTANT,
                ActionSpec::script(dir, "configure-openclaw.sh", Configure),
            )
            .register(
                TEST_CONNECTION,
                ActionSpec::script(dir, "test-connection.sh", Check),
            )
            .register(APPLY_FIREWALL, ActionSpec::script(dir, "ufw-rules.sh", Configure))
            .register(
                SECURITY_AUDIT,
                ActionSpec::new("lynis", &["audit", "system", "--quick"], Configure),
            )
            .register(HARDEN_SYSTEM, ActionSpec::script(dir, "harden.sh", Configure));
        registry
    }

    pub fn register(&mut self, id: impl Into<String>, spec: ActionSpec) -> &mut Self {
        self.actions.insert(id.into(), spec);
        self
    }

    pub fn get(&self, id: &str) -> Option<&ActionSpec> {
        self.actions.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }

    /// Bind `step` to a program. Step arguments follow the action's own.
    pub fn resolve(&self, step: &ProvisioningStep) -> LaiaResult<ResolvedAction> {
        let spec = self
            .get(&step.action)
            .ok_or_else(|| LaiaError::UnknownAction(step.action.clone()))?;
        let mut args = spec.leading_args.clone();
        args.extend(step.args.iter().cloned());
        Ok(ResolvedAction {
            program: spec.program.clone(),
            args,
            timeout: spec.category.timeout(),
        })
    }
}
