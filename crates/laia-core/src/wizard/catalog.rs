//! Reference data for the guided setup: online providers and the local model catalog.

use crate::error::{LaiaError, LaiaResult};
use serde::Deserialize;
use std::fs;
use std::path::Path;

const BUILTIN_CATALOG: &str = include_str!("../../data/model_catalog.toml");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderInfo {
    pub id: &'static str,
    pub label: &'static str,
    pub api_base: &'static str,
}

pub const DEFAULT_PROVIDER: &str = "groq";

pub const PROVIDERS: [ProviderInfo; 5] = [
    ProviderInfo {
        id: "groq",
        label: "Groq",
        api_base: "https://api.groq.com/openai/v1",
    },
    ProviderInfo {
        id: "openrouter",
        label: "OpenRouter",
        api_base: "https://openrouter.ai/api/v1",
    },
    ProviderInfo {
        id: "huggingface",
        label: "HuggingFace",
        api_base: "https://router.huggingface.co/v1",
    },
    ProviderInfo {
        id: "mistral",
        label: "Mistral AI",
        api_base: "https://api.mistral.ai/v1",
    },
    ProviderInfo {
        id: "google",
        label: "Google AI Studio",
        api_base: "https://generativelanguage.googleapis.com/v1beta/openai",
    },
];

pub fn provider(id: &str) -> Option<&'static ProviderInfo> {
    PROVIDERS.iter().find(|p| p.id == id)
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelEntry {
    pub id: String,
    pub label: String,
    /// Approximate download size.
    #[serde(default)]
    pub size_gb: f64,
    #[serde(default, rename = "default")]
    pub default_selected: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RamTier {
    pub id: String,
    /// Smallest amount of RAM (GiB) this tier applies to.
    pub min_ram_gb: u64,
    #[serde(default)]
    pub note: String,
    pub models: Vec<ModelEntry>,
}

impl RamTier {
    pub fn default_models(&self) -> Vec<String> {
        self.models
            .iter()
            .filter(|m| m.default_selected)
            .map(|m| m.id.clone())
            .collect()
    }
}

/// Versioned model recommendations, ordered by ascending RAM threshold.
///
/// Only built through [`ModelCatalog::from_toml`], so a catalog always has at
/// least one tier starting at 0 GB.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelCatalog {
    pub version: u32,
    tiers: Vec<RamTier>,
}

/// On-disk shape, checked before it becomes a [`ModelCatalog`].
#[derive(Deserialize)]
struct CatalogFile {
    version: u32,
    tiers: Vec<RamTier>,
}

impl ModelCatalog {
    pub fn tiers(&self) -> &[RamTier] {
        &self.tiers
    }

    /// Catalog compiled into the binary.
    pub fn builtin() -> LaiaResult<Self> {
        Self::from_toml(BUILTIN_CATALOG)
    }

    pub fn load(path: &Path) -> LaiaResult<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> LaiaResult<Self> {
        let file: CatalogFile = toml::from_str(raw)?;
        let catalog = ModelCatalog {
            version: file.version,
            tiers: file.tiers,
        };
        catalog.validate()?;
        Ok(catalog)
    }

    fn validate(&self) -> LaiaResult<()> {
        let first = self
            .tiers
            .first()
            .ok_or_else(|| LaiaError::InvalidConfig("model catalog has no tiers".into()))?;
        if first.min_ram_gb != 0 {
            return Err(LaiaError::InvalidConfig(format!(
                "first model tier `{}` must start at 0 GB",
                first.id
            )));
        }
        for pair in self.tiers.windows(2) {
            if pair[1].min_ram_gb <= pair[0].min_ram_gb {
                return Err(LaiaError::InvalidConfig(format!(
                    "model tier `{}` must start above `{}`",
                    pair[1].id, pair[0].id
                )));
            }
        }
        if let Some(empty) = self.tiers.iter().find(|t| t.models.is_empty()) {
            return Err(LaiaError::InvalidConfig(format!(
                "model tier `{}` lists no models",
                empty.id
            )));
        }
        Ok(())
    }

    /// Highest tier whose threshold `ram_gb` reaches.
    pub fn tier_for(&self, ram_gb: u64) -> &RamTier {
        let fitting = self.tiers.iter().filter(|t| t.min_ram_gb <= ram_gb).count();
        &self.tiers[fitting.saturating_sub(1)]
    }

    pub fn find_model(&self, id: &str) -> Option<&ModelEntry> {
        self.tiers
            .iter()
            .flat_map(|t| t.models.iter())
            .find(|m| m.id == id)
    }
}
