//! Derivation of the final setup from collected answers.

use super::catalog;
use super::{DraftAnswers, SetupMode};
use crate::credentials::{
    api_key_var, CredentialFile, API_BASE_KEY, LAN_HOST_KEY, LAN_PORT_KEY, MODE_KEY, PROVIDER_KEY,
};
use crate::error::{LaiaError, LaiaResult};
use crate::workflow::ProvisioningStep;
use serde::Serialize;

pub const INSTALL_RUNTIME: &str = "install-runtime";
pub const CONFIGURE_ASSISTANT: &str = "configure-assistant";
pub const PULL_MODELS: &str = "pull-models";
pub const TEST_CONNECTION: &str = "test-connection";

/// The mode-specific part of the assistant configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum SetupFragment {
    Online { provider: String, api_base: String },
    Local,
    Lan { host: String, port: u16 },
}

impl SetupFragment {
    pub fn mode(&self) -> SetupMode {
        match self {
            SetupFragment::Online { .. } => SetupMode::Online,
            SetupFragment::Local => SetupMode::Local,
            SetupFragment::Lan { .. } => SetupMode::Lan,
        }
    }
}

/// Everything a finished wizard run produces.
#[derive(Debug, Clone)]
pub struct CompiledSetup {
    pub fragment: SetupFragment,
    pub credentials: CredentialFile,
    pub plan: Vec<ProvisioningStep>,
}

/// Compile `draft` into a fragment, credential file and provisioning plan.
///
/// Only the fields belonging to the chosen mode are read.
pub fn compile(draft: &DraftAnswers) -> LaiaResult<CompiledSetup> {
    let mode = draft.mode.ok_or_else(|| LaiaError::IncompleteStep {
        step: "mode-choice".into(),
        reason: "no setup mode chosen".into(),
    })?;

    match mode {
        SetupMode::Online => compile_online(draft),
        SetupMode::Local => Ok(compile_local(draft)),
        SetupMode::Lan => compile_lan(draft),
    }
}

fn compile_online(draft: &DraftAnswers) -> LaiaResult<CompiledSetup> {
    let provider = catalog::provider(&draft.provider).ok_or_else(|| LaiaError::InvalidValue {
        field: "provider".into(),
        value: draft.provider.clone(),
        reason: "not a supported provider".into(),
    })?;
    let key = draft.api_key.trim();
    if key.is_empty() {
        return Err(LaiaError::IncompleteStep {
            step: "online-provider".into(),
            reason: "an API key is required".into(),
        });
    }

    let mut credentials = CredentialFile::new();
    credentials.set(MODE_KEY, SetupMode::Online.as_str());
    credentials.set(PROVIDER_KEY, provider.id);
    credentials.set(API_BASE_KEY, provider.api_base);
    credentials.set(api_key_var(provider.id), key);

    Ok(CompiledSetup {
        fragment: SetupFragment::Online {
            provider: provider.id.to_string(),
            api_base: provider.api_base.to_string(),
        },
        credentials,
        plan: vec![ProvisioningStep::new(
            format!("Test connection to {}", provider.label),
            TEST_CONNECTION,
            Vec::new(),
            false,
        )],
    })
}

fn compile_local(draft: &DraftAnswers) -> CompiledSetup {
    let mut credentials = CredentialFile::new();
    credentials.set(MODE_KEY, SetupMode::Local.as_str());

    let models = if draft.skip_models {
        Vec::new()
    } else {
        draft.selected_models.clone()
    };
    let pull_description = if models.is_empty() {
        "Download models (none selected)".to_string()
    } else {
        format!("Download {} model(s)", models.len())
    };

    CompiledSetup {
        fragment: SetupFragment::Local,
        credentials,
        plan: vec![
            ProvisioningStep::new(
                "Install local inference runtime",
                INSTALL_RUNTIME,
                Vec::new(),
                true,
            ),
            ProvisioningStep::new(
                "Configure assistant for local mode",
                CONFIGURE_ASSISTANT,
                vec!["--mode".into(), SetupMode::Local.as_str().into()],
                true,
            ),
            ProvisioningStep::new(pull_description, PULL_MODELS, models, false),
        ],
    }
}

fn compile_lan(draft: &DraftAnswers) -> LaiaResult<CompiledSetup> {
    let host = draft.lan_host.trim();
    if host.is_empty() {
        return Err(LaiaError::IncompleteStep {
            step: "lan-remote".into(),
            reason: "a server address is required".into(),
        });
    }

    let mut credentials = CredentialFile::new();
    credentials.set(MODE_KEY, SetupMode::Lan.as_str());
    credentials.set(LAN_HOST_KEY, host);
    credentials.set(LAN_PORT_KEY, draft.lan_port.to_string());

    Ok(CompiledSetup {
        fragment: SetupFragment::Lan {
            host: host.to_string(),
            port: draft.lan_port,
        },
        credentials,
        plan: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn online_plan_has_no_downloads() {
        let mut draft = DraftAnswers {
            mode: Some(SetupMode::Online),
            provider: "mistral".into(),
            ..DraftAnswers::default()
        };
        draft.api_key = "sk-test".to_string().into();
        draft.selected_models = vec!["gemma3:4b".into()];

        let setup = compile(&draft).unwrap();
        assert!(setup.plan.iter().all(|step| step.action != PULL_MODELS));
        assert_eq!(setup.plan.len(), 1);
        assert!(!setup.plan[0].fatal);
        assert_eq!(setup.credentials.get("MISTRAL_API_KEY"), Some("sk-test"));
        assert_eq!(
            setup.credentials.get(API_BASE_KEY),
            Some("https://api.mistral.ai/v1")
        );
        assert_eq!(
            serde_json::to_value(&setup.fragment).unwrap(),
            json!({"mode": "online", "provider": "mistral", "api_base": "https://api.mistral.ai/v1"})
        );
    }

    #[test]
    fn online_without_key_is_incomplete() {
        let draft = DraftAnswers {
            mode: Some(SetupMode::Online),
            ..DraftAnswers::default()
        };
        assert!(matches!(
            compile(&draft),
            Err(LaiaError::IncompleteStep { .. })
        ));
    }

    #[test]
    fn local_plan_orders_install_before_download() {
        let draft = DraftAnswers {
            mode: Some(SetupMode::Local),
            selected_models: vec!["gemma3:4b".into(), "phi4-mini".into()],
            lan_host: "ignored".into(),
            ..DraftAnswers::default()
        };

        let setup = compile(&draft).unwrap();
        let actions: Vec<&str> = setup.plan.iter().map(|s| s.action.as_str()).collect();
        assert_eq!(actions, vec![INSTALL_RUNTIME, CONFIGURE_ASSISTANT, PULL_MODELS]);
        assert_eq!(setup.plan[2].args, vec!["gemma3:4b", "phi4-mini"]);
        assert!(setup.plan[0].fatal && setup.plan[1].fatal && !setup.plan[2].fatal);
        assert_eq!(setup.fragment, SetupFragment::Local);
        assert_eq!(setup.credentials.keys().collect::<Vec<_>>(), vec![MODE_KEY]);
    }

    #[test]
    fn skipped_models_give_an_empty_download_step() {
        let draft = DraftAnswers {
            mode: Some(SetupMode::Local),
            selected_models: vec!["gemma3:4b".into()],
            skip_models: true,
            ..DraftAnswers::default()
        };
        let setup = compile(&draft).unwrap();
        let pull = setup.plan.iter().find(|s| s.action == PULL_MODELS).unwrap();
        assert!(pull.args.is_empty());
    }

    #[test]
    fn missing_mode_is_incomplete() {
        assert!(matches!(
            compile(&DraftAnswers::default()),
            Err(LaiaError::IncompleteStep { .. })
        ));
    }
}
