//! Core building blocks shared by LAIA operator surfaces.
//!
//! The guarded configuration engine, the guided setup state machine, host
//! probes and the provisioning runner live here so front-ends only deal with
//! presentation.

pub mod command;
pub mod config;
pub mod credentials;
pub mod error;
pub mod guard;
pub mod host;
pub mod logging;
pub mod probe;
pub mod risk;
pub mod wizard;
pub mod workflow;

pub use config::{
    BindAddress, ConfigStore, ExecAsk, LoadSource, LoadedSettings, SettingField, SettingValue,
    SettingsDocument,
};
pub use credentials::{read_credentials, write_credentials, CredentialFile};
pub use error::{LaiaError, LaiaResult};
pub use guard::{GuardedMutator, Proposal};
pub use host::HostFacts;
pub use probe::{DashboardReport, ServiceCheckResult, ServiceProbe, ServiceState};
pub use risk::{classify, RiskEntry, RiskTier};
pub use wizard::{CompiledSetup, DraftAnswers, SetupFragment, SetupMode, WizardEngine, WizardStep};
pub use workflow::{
    apply_setup, ProvisioningRunner, ProvisioningStep, StepOutcome, StepStatus, WorkflowEvent,
    WorkflowLevel, WorkflowReport,
};
