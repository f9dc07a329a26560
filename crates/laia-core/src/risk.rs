//! Risk classification for candidate setting values.

use crate::config::{BindAddress, ExecAsk, SettingField, SettingValue};
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RiskTier {
    Safe,
    Caution,
    Danger,
}

impl RiskTier {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskTier::Safe => "safe",
            RiskTier::Caution => "caution",
            RiskTier::Danger => "danger",
        }
    }

    /// Whether a change to this tier needs explicit confirmation.
    pub fn requires_confirmation(self) -> bool {
        self == RiskTier::Danger
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Guidance attached to a (field, value) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskEntry {
    pub tier: RiskTier,
    pub headline: &'static str,
    pub rationale: &'static str,
}

const DEFAULT_ENTRY: RiskEntry = RiskEntry {
    tier: RiskTier::Caution,
    headline: "REVIEW BEFORE APPLYING",
    rationale: "This value is not in the risk catalog. \
        Check what it exposes before relying on it.",
};

/// Look up the risk of setting `field` to `value`.
///
/// Never fails: combinations outside the catalog get the default caution entry.
pub fn classify(field: SettingField, value: &SettingValue) -> RiskEntry {
    catalog()
        .get(&(field, value.clone()))
        .copied()
        .unwrap_or(DEFAULT_ENTRY)
}

fn catalog() -> &'static HashMap<(SettingField, SettingValue), RiskEntry> {
    static CATALOG: OnceLock<HashMap<(SettingField, SettingValue), RiskEntry>> = OnceLock::new();
    CATALOG.get_or_init(build_catalog)
}

fn build_catalog() -> HashMap<(SettingField, SettingValue), RiskEntry> {
    let mut table = HashMap::new();

    table.insert(
        (SettingField::ExecAsk, SettingValue::Ask(ExecAsk::Always)),
        RiskEntry {
            tier: RiskTier::Safe,
            headline: "MOST SECURE",
            rationale: "OpenClaw will ask your permission before running any command. \
                You will see a prompt for every shell command the AI wants to execute. \
                Best for daily use and privacy-sensitive work.",
        },
    );
    table.insert(
        (SettingField::ExecAsk, SettingValue::Ask(ExecAsk::OnMiss)),
        RiskEntry {
            tier: RiskTier::Caution,
            headline: "MEDIUM SECURITY",
            rationale: "OpenClaw asks only for commands it hasn't run before. \
                Known commands run automatically after first approval. \
                Best for power users who want less interruption.",
        },
    );
    table.insert(
        (SettingField::ExecAsk, SettingValue::Ask(ExecAsk::Off)),
        RiskEntry {
            tier: RiskTier::Danger,
            headline: "INSECURE",
            rationale: "OpenClaw will run ANY shell command without asking. \
                The AI could delete files, install software or change the system \
                without your knowledge. Only use in isolated or sandboxed environments.",
        },
    );

    table.insert(
        (SettingField::ExecElevated, SettingValue::Flag(true)),
        RiskEntry {
            tier: RiskTier::Danger,
            headline: "DANGEROUS: ROOT ACCESS",
            rationale: "OpenClaw may execute commands as root. Root commands can modify \
                or delete any system file, install software system-wide, change other \
                users' data and disable security controls. Enable only for a specific \
                task and disable it again immediately after.",
        },
    );
    table.insert(
        (SettingField::ExecElevated, SettingValue::Flag(false)),
        RiskEntry {
            tier: RiskTier::Safe,
            headline: "SAFE",
            rationale: "OpenClaw cannot execute commands as root. \
                All commands run with your normal user permissions.",
        },
    );

    table.insert(
        (SettingField::Bind, SettingValue::Bind(BindAddress::Localhost)),
        RiskEntry {
            tier: RiskTier::Safe,
            headline: "SECURE: LOCALHOST ONLY",
            rationale: "OpenClaw is only reachable from this computer. \
                No one on your network can connect to it.",
        },
    );
    table.insert(
        (SettingField::Bind, SettingValue::Bind(BindAddress::AllInterfaces)),
        RiskEntry {
            tier: RiskTier::Danger,
            headline: "INSECURE: NETWORK EXPOSED",
            rationale: "OpenClaw becomes reachable from your entire network. Anyone on \
                the same WiFi or LAN can use your assistant and session tokens may be \
                exposed. Only use on trusted private networks.",
        },
    );

    for field in [
        SettingField::Nodes,
        SettingField::Camera,
        SettingField::Location,
    ] {
        table.insert(
            (field, SettingValue::Flag(false)),
            RiskEntry {
                tier: RiskTier::Safe,
                headline: "DISABLED",
                rationale: "Paired devices cannot use this capability.",
            },
        );
        table.insert(
            (field, SettingValue::Flag(true)),
            RiskEntry {
                tier: RiskTier::Caution,
                headline: "DEVICE ACCESS ENABLED",
                rationale: "Paired devices can use this capability through the assistant. \
                    Only pair devices you control.",
            },
        );
    }

    table
}
