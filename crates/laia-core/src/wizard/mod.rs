//! Guided setup state machine.
//!
//! `Welcome -> ModeChoice -> {OnlineProvider | LocalHardware | LanRemote} -> Summary -> Progress`.
//! Answers are only accepted on the step that asks for them, and the engine
//! refuses to advance past a step that is not complete.

pub mod catalog;
mod compile;

pub use catalog::{
    provider, ModelCatalog, ModelEntry, ProviderInfo, RamTier, DEFAULT_PROVIDER, PROVIDERS,
};
pub use compile::{
    compile, CompiledSetup, SetupFragment, CONFIGURE_ASSISTANT, INSTALL_RUNTIME, PULL_MODELS,
    TEST_CONNECTION,
};

use crate::error::{LaiaError, LaiaResult};
use crate::host::HostFacts;
use log::{info, warn};
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroizing;

pub const DEFAULT_LAN_PORT: u16 = 11434;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WizardStep {
    Welcome,
    ModeChoice,
    OnlineProvider,
    LocalHardware,
    LanRemote,
    Summary,
    /// Terminal.
    Progress,
}

impl WizardStep {
    pub fn as_str(self) -> &'static str {
        match self {
            WizardStep::Welcome => "welcome",
            WizardStep::ModeChoice => "mode-choice",
            WizardStep::OnlineProvider => "online-provider",
            WizardStep::LocalHardware => "local-hardware",
            WizardStep::LanRemote => "lan-remote",
            WizardStep::Summary => "summary",
            WizardStep::Progress => "progress",
        }
    }
}

impl fmt::Display for WizardStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetupMode {
    Online,
    Local,
    Lan,
}

impl SetupMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SetupMode::Online => "online",
            SetupMode::Local => "local",
            SetupMode::Lan => "lan",
        }
    }

    /// The branch step this mode leads to.
    pub fn step(self) -> WizardStep {
        match self {
            SetupMode::Online => WizardStep::OnlineProvider,
            SetupMode::Local => WizardStep::LocalHardware,
            SetupMode::Lan => WizardStep::LanRemote,
        }
    }
}

impl FromStr for SetupMode {
    type Err = LaiaError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "online" => Ok(SetupMode::Online),
            "local" => Ok(SetupMode::Local),
            "lan" => Ok(SetupMode::Lan),
            other => Err(LaiaError::InvalidValue {
                field: "mode".into(),
                value: other.to_string(),
                reason: "expected online, local or lan".into(),
            }),
        }
    }
}

/// Answers collected during one wizard run.
#[derive(Clone)]
pub struct DraftAnswers {
    pub mode: Option<SetupMode>,
    pub provider: String,
    pub api_key: Zeroizing<String>,
    pub selected_models: Vec<String>,
    pub skip_models: bool,
    pub lan_host: String,
    pub lan_port: u16,
    pub ram_gb: u64,
    pub free_disk_gb: Option<u64>,
}

impl Default for DraftAnswers {
    fn default() -> Self {
        Self {
            mode: None,
            provider: DEFAULT_PROVIDER.to_string(),
            api_key: Zeroizing::new(String::new()),
            selected_models: Vec::new(),
            skip_models: false,
            lan_host: String::new(),
            lan_port: DEFAULT_LAN_PORT,
            ram_gb: 0,
            free_disk_gb: None,
        }
    }
}

impl fmt::Debug for DraftAnswers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DraftAnswers")
            .field("mode", &self.mode)
            .field("provider", &self.provider)
            .field("api_key", &redact(&self.api_key))
            .field("selected_models", &self.selected_models)
            .field("skip_models", &self.skip_models)
            .field("lan_host", &self.lan_host)
            .field("lan_port", &self.lan_port)
            .field("ram_gb", &self.ram_gb)
            .field("free_disk_gb", &self.free_disk_gb)
            .finish()
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<empty>"
    } else {
        "<redacted>"
    }
}

/// Drives one guided setup run over a private [`DraftAnswers`].
#[derive(Debug)]
pub struct WizardEngine {
    step: WizardStep,
    history: Vec<WizardStep>,
    draft: DraftAnswers,
    facts: HostFacts,
    catalog: ModelCatalog,
}

impl WizardEngine {
    /// Start at `Welcome`, with models pre-selected for the detected RAM.
    pub fn new(facts: HostFacts, catalog: ModelCatalog) -> Self {
        let draft = DraftAnswers {
            selected_models: catalog.tier_for(facts.ram_gb).default_models(),
            ram_gb: facts.ram_gb,
            free_disk_gb: facts.free_disk_gb,
            ..DraftAnswers::default()
        };
        Self {
            step: WizardStep::Welcome,
            history: Vec::new(),
            draft,
            facts,
            catalog,
        }
    }

    pub fn current(&self) -> WizardStep {
        self.step
    }

    pub fn draft(&self) -> &DraftAnswers {
        &self.draft
    }

    pub fn facts(&self) -> HostFacts {
        self.facts
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Catalog tier matching the detected RAM.
    pub fn recommended_tier(&self) -> &RamTier {
        self.catalog.tier_for(self.facts.ram_gb)
    }

    /// Why the current step cannot be left yet, if it cannot.
    pub fn incomplete_reason(&self) -> Option<&'static str> {
        match self.step {
            WizardStep::ModeChoice if self.draft.mode.is_none() => Some("no setup mode chosen"),
            WizardStep::OnlineProvider if self.draft.api_key.trim().is_empty() => {
                Some("an API key is required")
            }
            WizardStep::LanRemote if self.draft.lan_host.trim().is_empty() => {
                Some("a server address is required")
            }
            _ => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.incomplete_reason().is_none()
    }

    /// Move to the next step. `Summary` is left through [`Self::finish`].
    pub fn advance(&mut self) -> LaiaResult<WizardStep> {
        if let Some(reason) = self.incomplete_reason() {
            return Err(LaiaError::IncompleteStep {
                step: self.step.to_string(),
                reason: reason.to_string(),
            });
        }

        let next = match self.step {
            WizardStep::Welcome => WizardStep::ModeChoice,
            WizardStep::ModeChoice => match self.draft.mode {
                Some(mode) => mode.step(),
                None => return Err(self.transition_error("advance")),
            },
            WizardStep::OnlineProvider | WizardStep::LocalHardware | WizardStep::LanRemote => {
                WizardStep::Summary
            }
            WizardStep::Summary | WizardStep::Progress => {
                return Err(self.transition_error("advance"))
            }
        };
        self.enter(next);
        Ok(next)
    }

    /// Return to the previously visited step.
    pub fn back(&mut self) -> LaiaResult<WizardStep> {
        if self.step == WizardStep::Progress {
            return Err(self.transition_error("go back"));
        }
        let previous = self
            .history
            .pop()
            .ok_or_else(|| self.transition_error("go back"))?;
        info!("wizard: {} -> {previous} (back)", self.step);
        self.step = previous;
        Ok(previous)
    }

    pub fn choose_mode(&mut self, mode: SetupMode) -> LaiaResult<()> {
        self.expect_step(WizardStep::ModeChoice, "choose a mode")?;
        self.draft.mode = Some(mode);
        Ok(())
    }

    pub fn set_provider(&mut self, id: &str) -> LaiaResult<()> {
        self.expect_step(WizardStep::OnlineProvider, "choose a provider")?;
        let info = provider(id).ok_or_else(|| LaiaError::InvalidValue {
            field: "provider".into(),
            value: id.to_string(),
            reason: format!(
                "expected one of {}",
                PROVIDERS.iter().map(|p| p.id).collect::<Vec<_>>().join(", ")
            ),
        })?;
        self.draft.provider = info.id.to_string();
        Ok(())
    }

    pub fn set_api_key(&mut self, key: impl Into<String>) -> LaiaResult<()> {
        self.expect_step(WizardStep::OnlineProvider, "enter an API key")?;
        let key = Zeroizing::new(key.into());
        self.draft.api_key = Zeroizing::new(key.trim().to_string());
        Ok(())
    }

    /// Replace the model selection; duplicates are dropped, order is kept.
    pub fn set_models<I, S>(&mut self, models: I) -> LaiaResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expect_step(WizardStep::LocalHardware, "select models")?;
        let mut selected: Vec<String> = Vec::new();
        for model in models {
            let model = model.into().trim().to_string();
            if !model.is_empty() && !selected.contains(&model) {
                selected.push(model);
            }
        }
        self.draft.selected_models = selected;
        Ok(())
    }

    /// Flip one model in or out of the selection. Returns whether it is now selected.
    pub fn toggle_model(&mut self, id: &str) -> LaiaResult<bool> {
        self.expect_step(WizardStep::LocalHardware, "select models")?;
        let models = &mut self.draft.selected_models;
        if let Some(pos) = models.iter().position(|m| m == id) {
            models.remove(pos);
            Ok(false)
        } else {
            models.push(id.to_string());
            Ok(true)
        }
    }

    pub fn set_skip_models(&mut self, skip: bool) -> LaiaResult<()> {
        self.expect_step(WizardStep::LocalHardware, "skip model downloads")?;
        self.draft.skip_models = skip;
        Ok(())
    }

    pub fn set_lan_host(&mut self, host: &str) -> LaiaResult<()> {
        self.expect_step(WizardStep::LanRemote, "enter a server address")?;
        self.draft.lan_host = host.trim().to_string();
        Ok(())
    }

    /// Accept `raw` as the LAN port if it is a positive integer.
    ///
    /// Anything else keeps the previous valid port; the return value tells
    /// the caller whether the input was taken.
    pub fn set_lan_port(&mut self, raw: &str) -> LaiaResult<bool> {
        self.expect_step(WizardStep::LanRemote, "enter a server port")?;
        match raw.trim().parse::<u16>() {
            Ok(port) if port > 0 => {
                self.draft.lan_port = port;
                Ok(true)
            }
            _ => {
                warn!(
                    "ignoring invalid LAN port `{raw}`; keeping {}",
                    self.draft.lan_port
                );
                Ok(false)
            }
        }
    }

    /// RAM line and tier guidance shown on the hardware step.
    pub fn hardware_summary(&self) -> String {
        let tier = self.recommended_tier();
        format!("RAM: {} GB\n{}", self.facts.ram_gb, tier.note)
    }

    /// Approximate download size of the current selection.
    pub fn selected_download_gb(&self) -> f64 {
        self.draft
            .selected_models
            .iter()
            .filter_map(|id| self.catalog.find_model(id))
            .map(|m| m.size_gb)
            .sum()
    }

    /// Warning when the selected models likely do not fit on disk.
    pub fn disk_warning(&self) -> Option<String> {
        if self.draft.skip_models {
            return None;
        }
        let free = self.draft.free_disk_gb?;
        let needed = self.selected_download_gb();
        (needed > free as f64).then(|| {
            format!("Selected models need about {needed:.1} GB but only {free} GB is free.")
        })
    }

    /// Human-readable summary of the answers for the active mode.
    pub fn summary(&self) -> String {
        match self.draft.mode {
            None => "Mode: not chosen".to_string(),
            Some(SetupMode::Online) => {
                let label = provider(&self.draft.provider)
                    .map(|p| p.label)
                    .unwrap_or(self.draft.provider.as_str());
                let key = if self.draft.api_key.is_empty() {
                    "missing"
                } else {
                    "set (hidden)"
                };
                format!("Mode: Online (free tier)\nProvider: {label}\nAPI key: {key}")
            }
            Some(SetupMode::Local) => {
                let models = if self.draft.skip_models {
                    "skipped".to_string()
                } else if self.draft.selected_models.is_empty() {
                    "None".to_string()
                } else {
                    self.draft.selected_models.join(", ")
                };
                let mut text = format!("Mode: Local Ollama\nModels: {models}");
                if let Some(warning) = self.disk_warning() {
                    text.push_str("\nWarning: ");
                    text.push_str(&warning);
                }
                text
            }
            Some(SetupMode::Lan) => format!(
                "Mode: LAN remote\nServer: {}:{}",
                self.draft.lan_host, self.draft.lan_port
            ),
        }
    }

    /// Compile the answers and enter the terminal `Progress` step.
    pub fn finish(&mut self) -> LaiaResult<CompiledSetup> {
        self.expect_step(WizardStep::Summary, "finish")?;
        let compiled = compile(&self.draft)?;
        self.enter(WizardStep::Progress);
        Ok(compiled)
    }

    fn enter(&mut self, next: WizardStep) {
        info!("wizard: {} -> {next}", self.step);
        self.history.push(self.step);
        self.step = next;
    }

    fn expect_step(&self, expected: WizardStep, action: &str) -> LaiaResult<()> {
        if self.step == expected {
            Ok(())
        } else {
            Err(self.transition_error(action))
        }
    }

    fn transition_error(&self, action: &str) -> LaiaError {
        LaiaError::InvalidTransition {
            step: self.step.to_string(),
            action: action.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(ram_gb: u64, free_disk_gb: Option<u64>) -> WizardEngine {
        WizardEngine::new(
            HostFacts::new(ram_gb, free_disk_gb),
            ModelCatalog::builtin().unwrap(),
        )
    }

    fn at_branch(mode: SetupMode) -> WizardEngine {
        let mut wizard = engine(16, Some(100));
        wizard.advance().unwrap();
        wizard.choose_mode(mode).unwrap();
        assert_eq!(wizard.advance().unwrap(), mode.step());
        wizard
    }

    #[test]
    fn mode_choice_selects_exactly_one_branch() {
        for mode in [SetupMode::Online, SetupMode::Local, SetupMode::Lan] {
            let wizard = at_branch(mode);
            assert_eq!(wizard.current(), mode.step());
        }
    }

    #[test]
    fn cannot_advance_without_mode() {
        let mut wizard = engine(8, None);
        wizard.advance().unwrap();
        let err = wizard.advance().unwrap_err();
        assert!(matches!(err, LaiaError::IncompleteStep { .. }));
        assert_eq!(wizard.current(), WizardStep::ModeChoice);
    }

    #[test]
    fn online_requires_a_key() {
        let mut wizard = at_branch(SetupMode::Online);
        assert!(!wizard.is_complete());
        assert!(wizard.advance().is_err());

        wizard.set_api_key("   ").unwrap();
        assert!(wizard.advance().is_err());

        wizard.set_provider("openrouter").unwrap();
        wizard.set_api_key("sk-or-123").unwrap();
        assert_eq!(wizard.advance().unwrap(), WizardStep::Summary);
        let summary = wizard.summary();
        assert!(summary.contains("OpenRouter"));
        assert!(!summary.contains("sk-or-123"));
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let mut wizard = at_branch(SetupMode::Online);
        assert!(matches!(
            wizard.set_provider("acme"),
            Err(LaiaError::InvalidValue { .. })
        ));
        assert_eq!(wizard.draft().provider, DEFAULT_PROVIDER);
    }

    #[test]
    fn local_step_is_always_complete() {
        let mut wizard = at_branch(SetupMode::Local);
        wizard.set_models(Vec::<String>::new()).unwrap();
        assert!(wizard.is_complete());
        assert_eq!(wizard.advance().unwrap(), WizardStep::Summary);
        assert!(wizard.summary().contains("Models: None"));
    }

    #[test]
    fn defaults_follow_detected_ram() {
        assert_eq!(
            engine(4, None).draft().selected_models,
            vec!["gemma3:1b", "gemma3:4b"]
        );
        assert_eq!(
            engine(12, None).draft().selected_models,
            vec!["gemma3:4b", "phi4-mini"]
        );
        assert_eq!(
            engine(24, None).draft().selected_models,
            vec!["gemma3:4b", "phi4-mini", "deepseek-r1:7b"]
        );
        assert_eq!(
            engine(64, None).draft().selected_models,
            vec!["gemma3:12b", "phi4-mini", "deepseek-r1:14b"]
        );
    }

    #[test]
    fn lan_requires_host_and_keeps_last_valid_port() {
        let mut wizard = at_branch(SetupMode::Lan);
        assert!(wizard.advance().is_err());

        wizard.set_lan_host("  ").unwrap();
        assert!(!wizard.is_complete());
        wizard.set_lan_host("192.168.1.50").unwrap();

        assert!(wizard.set_lan_port("8080").unwrap());
        assert!(!wizard.set_lan_port("eighty").unwrap());
        assert!(!wizard.set_lan_port("0").unwrap());
        assert!(!wizard.set_lan_port("70000").unwrap());
        assert_eq!(wizard.draft().lan_port, 8080);

        wizard.advance().unwrap();
        assert!(wizard.summary().contains("192.168.1.50:8080"));
    }

    #[test]
    fn answers_only_accepted_on_their_step() {
        let mut wizard = at_branch(SetupMode::Lan);
        assert!(matches!(
            wizard.set_api_key("x"),
            Err(LaiaError::InvalidTransition { .. })
        ));
        assert!(wizard.choose_mode(SetupMode::Online).is_err());
        assert!(wizard.finish().is_err());
    }

    #[test]
    fn back_walks_history_and_mode_can_change() {
        let mut wizard = at_branch(SetupMode::Lan);
        wizard.set_lan_host("10.0.0.2").unwrap();
        assert_eq!(wizard.back().unwrap(), WizardStep::ModeChoice);
        wizard.choose_mode(SetupMode::Local).unwrap();
        assert_eq!(wizard.advance().unwrap(), WizardStep::LocalHardware);
        wizard.advance().unwrap();

        let compiled = wizard.finish().unwrap();
        assert_eq!(compiled.fragment, SetupFragment::Local);
        assert_eq!(wizard.current(), WizardStep::Progress);
        assert!(wizard.back().is_err());
        assert!(wizard.advance().is_err());
    }

    #[test]
    fn back_from_welcome_is_refused() {
        let mut wizard = engine(8, None);
        assert!(matches!(
            wizard.back(),
            Err(LaiaError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn toggling_and_dedup() {
        let mut wizard = at_branch(SetupMode::Local);
        wizard
            .set_models(["phi4-mini", "gemma3:4b", "phi4-mini"])
            .unwrap();
        assert_eq!(wizard.draft().selected_models, vec!["phi4-mini", "gemma3:4b"]);
        assert!(!wizard.toggle_model("phi4-mini").unwrap());
        assert!(wizard.toggle_model("qwen2.5-coder:7b").unwrap());
        assert_eq!(
            wizard.draft().selected_models,
            vec!["gemma3:4b", "qwen2.5-coder:7b"]
        );
    }

    #[test]
    fn disk_warning_when_selection_exceeds_free_space() {
        let mut wizard = engine(64, Some(5));
        wizard.advance().unwrap();
        wizard.choose_mode(SetupMode::Local).unwrap();
        wizard.advance().unwrap();
        assert!(wizard.disk_warning().is_some());

        wizard.set_skip_models(true).unwrap();
        assert!(wizard.disk_warning().is_none());
        wizard.advance().unwrap();
        assert!(wizard.summary().contains("Models: skipped"));
    }

    #[test]
    fn debug_output_redacts_key() {
        let mut wizard = at_branch(SetupMode::Online);
        wizard.set_api_key("gsk_live_secret").unwrap();
        assert!(!format!("{:?}", wizard.draft()).contains("gsk_live_secret"));
        assert!(!format!("{wizard:?}").contains("gsk_live_secret"));
    }
}
