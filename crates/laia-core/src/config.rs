//! Settings document model and the store that persists it.
//!
//! The document mirrors the assistant's `openclaw.json`. Only the security
//! fields below are modelled; everything else found on disk rides along in
//! the `extra` maps so a save never drops keys another tool wrote.

use crate::error::{LaiaError, LaiaResult};
use directories_next::BaseDirs;
use log::{debug, info, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::env;
use std::ffi::OsString;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex, OnceLock};
use tempfile::NamedTempFile;

pub const SETTINGS_PATH_ENV: &str = "LAIA_OPENCLAW_CONFIG";
const SETTINGS_DIR: &str = ".openclaw";
const SETTINGS_FILE: &str = "openclaw.json";
const BACKUP_SUFFIX: &str = ".bak";

pub const LOCALHOST_ADDR: &str = "127.0.0.1";
pub const ALL_INTERFACES_ADDR: &str = "0.0.0.0";

/// Resolve the settings path: `$LAIA_OPENCLAW_CONFIG`, else `~/.openclaw/openclaw.json`.
pub fn default_settings_path() -> LaiaResult<PathBuf> {
    if let Some(path) = env::var_os(SETTINGS_PATH_ENV).filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    home_dir()
        .map(|home| home.join(SETTINGS_DIR).join(SETTINGS_FILE))
        .ok_or_else(|| {
            LaiaError::InvalidConfig(format!(
                "unable to determine the home directory; set {SETTINGS_PATH_ENV}"
            ))
        })
}

pub(crate) fn home_dir() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
}

/// Command-execution permission policy of the assistant.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case")]
pub enum ExecAsk {
    #[default]
    Always,
    OnMiss,
    Off,
}

impl ExecAsk {
    pub const ALL: [ExecAsk; 3] = [ExecAsk::Always, ExecAsk::OnMiss, ExecAsk::Off];

    pub fn as_str(self) -> &'static str {
        match self {
            ExecAsk::Always => "always",
            ExecAsk::OnMiss => "on-miss",
            ExecAsk::Off => "off",
        }
    }
}

impl FromStr for ExecAsk {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "always" => Ok(ExecAsk::Always),
            "on-miss" | "on_miss" | "onmiss" => Ok(ExecAsk::OnMiss),
            "off" | "never" => Ok(ExecAsk::Off),
            other => Err(format!("expected always, on-miss or off (got {other})")),
        }
    }
}

/// Network exposure of the assistant's listener, stored as an address string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BindAddress {
    #[default]
    Localhost,
    AllInterfaces,
    /// Any other address; kept verbatim.
    Custom(String),
}

impl BindAddress {
    pub fn as_str(&self) -> &str {
        match self {
            BindAddress::Localhost => LOCALHOST_ADDR,
            BindAddress::AllInterfaces => ALL_INTERFACES_ADDR,
            BindAddress::Custom(addr) => addr,
        }
    }

    /// Symbolic name used by the risk catalog.
    pub fn label(&self) -> &str {
        match self {
            BindAddress::Localhost => "localhost",
            BindAddress::AllInterfaces => "all-interfaces",
            BindAddress::Custom(addr) => addr,
        }
    }
}

impl From<String> for BindAddress {
    fn from(raw: String) -> Self {
        match raw.trim() {
            LOCALHOST_ADDR | "localhost" => BindAddress::Localhost,
            ALL_INTERFACES_ADDR | "all-interfaces" => BindAddress::AllInterfaces,
            _ => BindAddress::Custom(raw),
        }
    }
}

impl From<BindAddress> for String {
    fn from(bind: BindAddress) -> Self {
        bind.as_str().to_string()
    }
}

/// `security.exec` block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExecCfg {
    #[serde(default)]
    pub ask: ExecAsk,

    #[serde(default)]
    pub elevated: bool,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `security` block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SecurityCfg {
    #[serde(default)]
    pub exec: ExecCfg,

    #[serde(default)]
    #[schemars(with = "String")]
    pub bind: BindAddress,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Paired-device capability toggles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Features {
    #[serde(default)]
    pub nodes: bool,

    #[serde(default)]
    pub camera: bool,

    #[serde(default)]
    pub location: bool,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The persisted security configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SettingsDocument {
    #[serde(default)]
    pub security: SecurityCfg,

    #[serde(default)]
    pub features: Features,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SettingsDocument {
    /// Read the current value of a recognized field.
    pub fn get(&self, field: SettingField) -> SettingValue {
        match field {
            SettingField::ExecAsk => SettingValue::Ask(self.security.exec.ask),
            SettingField::ExecElevated => SettingValue::Flag(self.security.exec.elevated),
            SettingField::Bind => SettingValue::Bind(self.security.bind.clone()),
            SettingField::Nodes => SettingValue::Flag(self.features.nodes),
            SettingField::Camera => SettingValue::Flag(self.features.camera),
            SettingField::Location => SettingValue::Flag(self.features.location),
        }
    }

    /// Write a recognized field; the value kind must match the field.
    pub fn set(&mut self, field: SettingField, value: SettingValue) -> LaiaResult<()> {
        match (field, value) {
            (SettingField::ExecAsk, SettingValue::Ask(ask)) => self.security.exec.ask = ask,
            (SettingField::ExecElevated, SettingValue::Flag(on)) => {
                self.security.exec.elevated = on
            }
            (SettingField::Bind, SettingValue::Bind(bind)) => self.security.bind = bind,
            (SettingField::Nodes, SettingValue::Flag(on)) => self.features.nodes = on,
            (SettingField::Camera, SettingValue::Flag(on)) => self.features.camera = on,
            (SettingField::Location, SettingValue::Flag(on)) => self.features.location = on,
            (field, value) => {
                return Err(LaiaError::InvalidValue {
                    field: field.path().to_string(),
                    value: value.to_string(),
                    reason: "value kind does not match the field".into(),
                })
            }
        }
        Ok(())
    }
}

/// Recognized, mutable fields of the settings document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingField {
    ExecAsk,
    ExecElevated,
    Bind,
    Nodes,
    Camera,
    Location,
}

impl SettingField {
    pub const ALL: [SettingField; 6] = [
        SettingField::ExecAsk,
        SettingField::ExecElevated,
        SettingField::Bind,
        SettingField::Nodes,
        SettingField::Camera,
        SettingField::Location,
    ];

    /// Dotted path of the field inside the document.
    pub fn path(self) -> &'static str {
        match self {
            SettingField::ExecAsk => "security.exec.ask",
            SettingField::ExecElevated => "security.exec.elevated",
            SettingField::Bind => "security.bind",
            SettingField::Nodes => "features.nodes",
            SettingField::Camera => "features.camera",
            SettingField::Location => "features.location",
        }
    }

    /// Whether `value` has the kind this field stores.
    pub fn accepts(self, value: &SettingValue) -> bool {
        matches!(
            (self, value),
            (SettingField::ExecAsk, SettingValue::Ask(_))
                | (SettingField::Bind, SettingValue::Bind(_))
                | (
                    SettingField::ExecElevated
                        | SettingField::Nodes
                        | SettingField::Camera
                        | SettingField::Location,
                    SettingValue::Flag(_)
                )
        )
    }

    /// Parse operator input into a value of this field's kind.
    pub fn parse_value(self, raw: &str) -> LaiaResult<SettingValue> {
        let invalid = |reason: String| LaiaError::InvalidValue {
            field: self.path().to_string(),
            value: raw.to_string(),
            reason,
        };
        match self {
            SettingField::ExecAsk => raw.parse().map(SettingValue::Ask).map_err(invalid),
            SettingField::Bind => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Err(invalid("bind address cannot be empty".into()));
                }
                Ok(SettingValue::Bind(BindAddress::from(trimmed.to_string())))
            }
            SettingField::ExecElevated
            | SettingField::Nodes
            | SettingField::Camera
            | SettingField::Location => parse_flag(raw).map(SettingValue::Flag).map_err(invalid),
        }
    }
}

impl fmt::Display for SettingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

impl FromStr for SettingField {
    type Err = LaiaError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim() {
            "security.exec.ask" | "exec.ask" => Ok(SettingField::ExecAsk),
            "security.exec.elevated" | "exec.elevated" => Ok(SettingField::ExecElevated),
            "security.bind" | "bind" => Ok(SettingField::Bind),
            "features.nodes" | "nodes" => Ok(SettingField::Nodes),
            "features.camera" | "camera" => Ok(SettingField::Camera),
            "features.location" | "location" => Ok(SettingField::Location),
            other => Err(LaiaError::UnknownField(other.to_string())),
        }
    }
}

fn parse_flag(raw: &str) -> Result<bool, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(format!("expected true or false (got {other})")),
    }
}

/// Typed value of a recognized field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SettingValue {
    Ask(ExecAsk),
    Flag(bool),
    Bind(BindAddress),
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Ask(ask) => f.write_str(ask.as_str()),
            SettingValue::Flag(on) => write!(f, "{on}"),
            SettingValue::Bind(bind) => f.write_str(bind.as_str()),
        }
    }
}

/// Where a loaded document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    File,
    /// The file was absent; built-in defaults were used.
    Defaults,
}

#[derive(Debug, Clone)]
pub struct LoadedSettings {
    pub document: SettingsDocument,
    pub source: LoadSource,
}

impl LoadedSettings {
    pub fn used_defaults(&self) -> bool {
        self.source == LoadSource::Defaults
    }
}

/// Loads and persists one settings document path.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store bound to [`default_settings_path`].
    pub fn at_default_path() -> LaiaResult<Self> {
        default_settings_path().map(Self::new)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling that holds the previous version after a save (`<path>.bak`).
    pub fn backup_path(&self) -> PathBuf {
        let mut raw = OsString::from(self.path.as_os_str());
        raw.push(BACKUP_SUFFIX);
        PathBuf::from(raw)
    }

    /// Read the document, falling back to defaults when the file is absent.
    ///
    /// A file that exists but does not decode yields [`LaiaError::Parse`] and
    /// is left untouched on disk.
    pub fn load(&self) -> LaiaResult<LoadedSettings> {
        let contents = match fs::read(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                info!(
                    "settings not found at {}; using defaults",
                    self.path.display()
                );
                return Ok(LoadedSettings {
                    document: SettingsDocument::default(),
                    source: LoadSource::Defaults,
                });
            }
            Err(err) => return Err(LaiaError::read(&self.path, err)),
        };

        let document =
            serde_json::from_slice::<SettingsDocument>(&contents).map_err(|source| {
                warn!("settings at {} failed to parse: {source}", self.path.display());
                LaiaError::Parse {
                    path: self.path.clone(),
                    source,
                }
            })?;

        debug!("settings loaded from {}", self.path.display());
        Ok(LoadedSettings {
            document,
            source: LoadSource::File,
        })
    }

    /// Persist `doc`, keeping the prior version in [`Self::backup_path`].
    ///
    /// The new content is staged in a temp file next to the target and
    /// renamed over it, so the live path always holds a complete document.
    /// Any failure before that rename leaves the live file as it was.
    pub fn save(&self, doc: &SettingsDocument) -> LaiaResult<()> {
        let lock = path_lock(&self.path);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let parent = parent_dir(&self.path);
        fs::create_dir_all(parent).map_err(|err| LaiaError::storage(parent, err))?;

        let mut payload = serde_json::to_string_pretty(doc)?;
        payload.push('\n');

        let mut staged =
            NamedTempFile::new_in(parent).map_err(|err| LaiaError::storage(&self.path, err))?;
        staged
            .as_file_mut()
            .write_all(payload.as_bytes())
            .and_then(|_| staged.as_file_mut().flush())
            .and_then(|_| staged.as_file().sync_all())
            .map_err(|err| LaiaError::storage(&self.path, err))?;

        let existing = match fs::metadata(&self.path) {
            Ok(meta) => Some(meta),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => return Err(LaiaError::storage(&self.path, err)),
        };

        if let Some(meta) = existing {
            let mode = meta.permissions().mode() & 0o777;
            fs::set_permissions(staged.path(), fs::Permissions::from_mode(mode))
                .map_err(|err| LaiaError::storage(&self.path, err))?;
            self.write_backup(parent)?;
        }

        staged
            .persist(&self.path)
            .map_err(|err| LaiaError::storage(&self.path, err.error))?;
        let _ = sync_dir(parent);

        info!("settings saved to {}", self.path.display());
        Ok(())
    }

    /// Atomically replace `<path>.bak` with a copy of the live file.
    fn write_backup(&self, parent: &Path) -> LaiaResult<()> {
        let backup = self.backup_path();
        let mut source = File::open(&self.path).map_err(|err| LaiaError::read(&self.path, err))?;
        let mut staged =
            NamedTempFile::new_in(parent).map_err(|err| LaiaError::storage(&backup, err))?;
        io::copy(&mut source, staged.as_file_mut())
            .and_then(|_| staged.as_file().sync_all())
            .map_err(|err| LaiaError::storage(&backup, err))?;
        staged
            .persist(&backup)
            .map_err(|err| LaiaError::storage(&backup, err.error))?;
        debug!("previous settings kept at {}", backup.display());
        Ok(())
    }
}

fn parent_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir).and_then(|file| file.sync_all())
}

/// One lock per target path, shared across every `ConfigStore` in the process.
fn path_lock(path: &Path) -> Arc<Mutex<()>> {
    static SAVE_LOCKS: OnceLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();

    let key = lock_key(path);
    let mut locks = SAVE_LOCKS
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    locks.entry(key).or_default().clone()
}

fn lock_key(path: &Path) -> PathBuf {
    let parent = parent_dir(path);
    match (fs::canonicalize(parent), path.file_name()) {
        (Ok(dir), Some(name)) => dir.join(name),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread;
    use tempfile::tempdir;

    fn hardened() -> SettingsDocument {
        let mut doc = SettingsDocument::default();
        doc.security.exec.ask = ExecAsk::OnMiss;
        doc.features.camera = true;
        doc
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("openclaw.json"));

        let loaded = store.load().unwrap();
        assert!(loaded.used_defaults());
        assert_eq!(loaded.document.security.exec.ask, ExecAsk::Always);
        assert!(!loaded.document.security.exec.elevated);
        assert_eq!(loaded.document.security.bind, BindAddress::Localhost);
        assert!(!loaded.document.features.nodes);
        assert!(!loaded.document.features.camera);
        assert!(!loaded.document.features.location);
        assert!(!store.path().exists());
    }

    #[test]
    fn invalid_json_is_reported_and_left_alone() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("openclaw.json");
        fs::write(&path, "{ \"security\": ").unwrap();
        let store = ConfigStore::new(&path);

        match store.load() {
            Err(LaiaError::Parse { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected parse error, got {other:?}"),
        }
        assert_eq!(fs::read_to_string(&path).unwrap(), "{ \"security\": ");
        assert!(!store.backup_path().exists());
    }

    #[test]
    fn wrong_type_for_known_field_is_a_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("openclaw.json");
        fs::write(&path, r#"{"security":{"exec":{"elevated":"yes"}}}"#).unwrap();

        let err = ConfigStore::new(&path).load().unwrap_err();
        assert!(matches!(err, LaiaError::Parse { .. }));
    }

    #[test]
    fn non_utf8_contents_are_a_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("openclaw.json");
        fs::write(&path, [0xff, 0xfe, b'{', b'}']).unwrap();

        let err = ConfigStore::new(&path).load().unwrap_err();
        assert!(matches!(err, LaiaError::Parse { .. }), "{err:?}");
        assert_eq!(fs::read(&path).unwrap(), vec![0xff, 0xfe, b'{', b'}']);
    }

    #[test]
    fn unreadable_path_is_a_read_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("openclaw.json");
        fs::create_dir(&path).unwrap();

        let err = ConfigStore::new(&path).load().unwrap_err();
        assert!(matches!(err, LaiaError::Read { .. }), "{err:?}");
        assert!(err.to_string().contains("unable to read"));
    }

    #[test]
    fn failed_save_leaves_live_file_intact() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("openclaw.json"));
        store.save(&SettingsDocument::default()).unwrap();
        let before = fs::read(store.path()).unwrap();

        fs::create_dir(store.backup_path()).unwrap();
        fs::write(store.backup_path().join("occupied"), "x").unwrap();

        let err = store.save(&hardened()).unwrap_err();
        assert!(matches!(err, LaiaError::Storage { .. }), "{err:?}");
        assert_eq!(fs::read(store.path()).unwrap(), before);
        assert_eq!(
            store.load().unwrap().document,
            SettingsDocument::default()
        );
    }

    #[test]
    fn unknown_keys_survive_a_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("openclaw.json");
        let raw = json!({
            "gateway": { "port": 18789 },
            "security": {
                "exec": { "ask": "off", "elevated": true, "allowlist": ["ls"] },
                "bind": "0.0.0.0",
                "tokens": "rotate"
            },
            "features": { "nodes": true, "camera": false, "location": false, "canvas": false }
        });
        fs::write(&path, serde_json::to_string_pretty(&raw).unwrap()).unwrap();
        let store = ConfigStore::new(&path);

        let loaded = store.load().unwrap();
        assert_eq!(loaded.source, LoadSource::File);
        assert_eq!(loaded.document.security.exec.ask, ExecAsk::Off);
        assert_eq!(loaded.document.security.bind, BindAddress::AllInterfaces);

        store.save(&loaded.document).unwrap();
        let reloaded = store.load().unwrap().document;
        assert_eq!(reloaded, loaded.document);

        let on_disk: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk, raw);
    }

    #[test]
    fn second_save_moves_first_document_into_backup() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("openclaw.json"));
        let first = SettingsDocument::default();
        let second = hardened();

        store.save(&first).unwrap();
        assert!(!store.backup_path().exists());
        store.save(&second).unwrap();

        let backup: SettingsDocument =
            serde_json::from_str(&fs::read_to_string(store.backup_path()).unwrap()).unwrap();
        assert_eq!(backup, first);
        assert_eq!(store.load().unwrap().document, second);
    }

    #[test]
    fn save_creates_missing_parents() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("home").join(".openclaw").join("openclaw.json"));
        store.save(&hardened()).unwrap();
        assert!(store.path().exists());
        assert!(fs::read_to_string(store.path()).unwrap().ends_with('\n'));
    }

    #[test]
    fn save_keeps_existing_file_mode() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("openclaw.json");
        fs::write(&path, "{}").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();

        ConfigStore::new(&path).save(&hardened()).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o640);
    }

    #[test]
    fn custom_bind_address_is_preserved() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("openclaw.json");
        fs::write(&path, r#"{"security":{"bind":"192.168.1.20"}}"#).unwrap();
        let store = ConfigStore::new(&path);

        let doc = store.load().unwrap().document;
        assert_eq!(doc.security.bind, BindAddress::Custom("192.168.1.20".into()));
        store.save(&doc).unwrap();
        assert!(fs::read_to_string(&path).unwrap().contains("\"192.168.1.20\""));
    }

    #[test]
    fn concurrent_saves_leave_a_complete_document() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("openclaw.json");
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = ConfigStore::new(&path);
                thread::spawn(move || {
                    let mut doc = SettingsDocument::default();
                    doc.features.nodes = i % 2 == 0;
                    store.save(&doc).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let store = ConfigStore::new(&path);
        assert!(store.load().is_ok());
        let backup = fs::read_to_string(store.backup_path()).unwrap();
        assert!(serde_json::from_str::<SettingsDocument>(&backup).is_ok());
    }

    #[test]
    fn field_paths_and_aliases_parse() {
        assert_eq!("exec.ask".parse::<SettingField>().unwrap(), SettingField::ExecAsk);
        assert_eq!(
            "security.exec.elevated".parse::<SettingField>().unwrap(),
            SettingField::ExecElevated
        );
        assert_eq!("bind".parse::<SettingField>().unwrap(), SettingField::Bind);
        assert!(matches!(
            "security.telemetry".parse::<SettingField>(),
            Err(LaiaError::UnknownField(_))
        ));
    }

    #[test]
    fn values_parse_per_field_kind() {
        assert_eq!(
            SettingField::ExecAsk.parse_value("on-miss").unwrap(),
            SettingValue::Ask(ExecAsk::OnMiss)
        );
        assert_eq!(
            SettingField::Bind.parse_value("all-interfaces").unwrap(),
            SettingValue::Bind(BindAddress::AllInterfaces)
        );
        assert_eq!(
            SettingField::Camera.parse_value("yes").unwrap(),
            SettingValue::Flag(true)
        );
        assert!(SettingField::ExecElevated.parse_value("maybe").is_err());
    }

    #[test]
    fn set_rejects_mismatched_kinds() {
        let mut doc = SettingsDocument::default();
        let err = doc
            .set(SettingField::ExecElevated, SettingValue::Ask(ExecAsk::Off))
            .unwrap_err();
        assert!(matches!(err, LaiaError::InvalidValue { .. }));
        assert!(!doc.security.exec.elevated);
    }
}
