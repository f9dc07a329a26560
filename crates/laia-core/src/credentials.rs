//! Owner-only `KEY=VALUE` credential file consumed by the provisioning scripts.

use crate::config::home_dir;
use crate::error::{LaiaError, LaiaResult};
use log::info;
use std::env;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use zeroize::Zeroizing;

pub const CREDENTIALS_PATH_ENV: &str = "LAIA_CREDENTIALS_PATH";
const CREDENTIALS_DIR: &str = ".laia";
const CREDENTIALS_FILE: &str = "api_keys.env";
const CREDENTIALS_MODE: u32 = 0o600;

pub const MODE_KEY: &str = "LAIA_MODE";
pub const PROVIDER_KEY: &str = "LAIA_PROVIDER";
pub const API_BASE_KEY: &str = "LAIA_API_BASE";
pub const LAN_HOST_KEY: &str = "LAIA_LAN_HOST";
pub const LAN_PORT_KEY: &str = "LAIA_LAN_PORT";
const SECRET_SUFFIX: &str = "_API_KEY";

/// Resolve the credential path: `$LAIA_CREDENTIALS_PATH`, else `~/.laia/api_keys.env`.
pub fn default_credentials_path() -> LaiaResult<PathBuf> {
    if let Some(path) = env::var_os(CREDENTIALS_PATH_ENV).filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    home_dir()
        .map(|home| home.join(CREDENTIALS_DIR).join(CREDENTIALS_FILE))
        .ok_or_else(|| {
            LaiaError::InvalidConfig(format!(
                "unable to determine the home directory; set {CREDENTIALS_PATH_ENV}"
            ))
        })
}

/// Environment variable name holding a provider's API key, e.g. `GROQ_API_KEY`.
pub fn api_key_var(provider: &str) -> String {
    format!("{}{SECRET_SUFFIX}", provider.to_ascii_uppercase().replace('-', "_"))
}

/// Ordered credential entries. Values are wiped from memory on drop.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CredentialFile {
    entries: Vec<(String, Zeroizing<String>)>,
}

impl CredentialFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key`, replacing an earlier value while keeping its position.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = Zeroizing::new(value.into());
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn mode(&self) -> Option<&str> {
        self.get(MODE_KEY)
    }

    pub fn provider(&self) -> Option<&str> {
        self.get(PROVIDER_KEY)
    }

    /// Render newline-terminated `KEY=VALUE` lines.
    pub fn render(&self) -> LaiaResult<Zeroizing<String>> {
        let mut out = Zeroizing::new(String::new());
        for (key, value) in &self.entries {
            validate_entry(key, value)?;
            out.push_str(key);
            out.push('=');
            out.push_str(value);
            out.push('\n');
        }
        Ok(out)
    }

    /// Parse `KEY=VALUE` lines; blank lines and `#` comments are skipped.
    pub fn parse(contents: &str) -> Self {
        let mut file = Self::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                file.set(key.trim(), value.trim());
            }
        }
        file
    }
}

impl fmt::Debug for CredentialFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (key, value) in &self.entries {
            if is_secret(key) {
                map.entry(key, &"<redacted>");
            } else {
                map.entry(key, &value.as_str());
            }
        }
        map.finish()
    }
}

pub fn is_secret(key: &str) -> bool {
    key.ends_with(SECRET_SUFFIX)
}

fn validate_entry(key: &str, value: &str) -> LaiaResult<()> {
    let key_ok = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_');
    if !key_ok {
        return Err(LaiaError::InvalidValue {
            field: "credential key".into(),
            value: key.to_string(),
            reason: "keys must be upper-case letters, digits or underscores".into(),
        });
    }
    if value.contains(['\n', '\r']) {
        let shown = if is_secret(key) { "<redacted>" } else { value };
        return Err(LaiaError::InvalidValue {
            field: key.to_string(),
            value: shown.to_string(),
            reason: "values cannot span lines".into(),
        });
    }
    Ok(())
}

/// Atomically write `file` to `path` with owner-only permissions.
pub fn write_credentials(path: &Path, file: &CredentialFile) -> LaiaResult<()> {
    let rendered = file.render()?;
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|err| LaiaError::storage(parent, err))?;

    let ownership = fs::metadata(path)
        .ok()
        .map(|meta| (meta.uid(), meta.gid()));

    let mut temp = NamedTempFile::new_in(parent).map_err(|err| LaiaError::storage(path, err))?;
    fs::set_permissions(temp.path(), fs::Permissions::from_mode(CREDENTIALS_MODE))
        .map_err(|err| LaiaError::storage(path, err))?;
    temp.as_file_mut()
        .write_all(rendered.as_bytes())
        .and_then(|_| temp.as_file_mut().flush())
        .map_err(|err| LaiaError::storage(path, err))?;

    if let Some((uid, gid)) = ownership {
        let rc = unsafe { libc::fchown(temp.as_file().as_raw_fd(), uid, gid) };
        if rc != 0 {
            return Err(LaiaError::storage(path, io::Error::last_os_error()));
        }
    }

    let _ = temp.as_file().sync_all();
    temp.persist(path)
        .map_err(|err| LaiaError::storage(path, err.error))?;
    let _ = fs::File::open(parent).and_then(|dir| dir.sync_all());

    info!("credentials written to {}", path.display());
    Ok(())
}

pub fn read_credentials(path: &Path) -> LaiaResult<CredentialFile> {
    let contents = fs::read_to_string(path)?;
    Ok(CredentialFile::parse(&contents))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn online() -> CredentialFile {
        let mut file = CredentialFile::new();
        file.set(MODE_KEY, "online");
        file.set(PROVIDER_KEY, "groq");
        file.set(API_BASE_KEY, "https://api.groq.com/openai/v1");
        file.set(api_key_var("groq"), "gsk_secret");
        file
    }

    #[test]
    fn write_is_owner_only_and_reads_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".laia").join("api_keys.env");

        write_credentials(&path, &online()).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents,
            "LAIA_MODE=online\nLAIA_PROVIDER=groq\n\
             LAIA_API_BASE=https://api.groq.com/openai/v1\nGROQ_API_KEY=gsk_secret\n"
        );

        let parsed = read_credentials(&path).unwrap();
        assert_eq!(parsed, online());
        assert_eq!(parsed.mode(), Some("online"));
        assert_eq!(parsed.provider(), Some("groq"));
    }

    #[test]
    fn rewrite_replaces_previous_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("api_keys.env");
        write_credentials(&path, &online()).unwrap();

        let mut lan = CredentialFile::new();
        lan.set(MODE_KEY, "lan");
        lan.set(LAN_HOST_KEY, "192.168.1.100");
        lan.set(LAN_PORT_KEY, "11434");
        write_credentials(&path, &lan).unwrap();

        let parsed = read_credentials(&path).unwrap();
        assert_eq!(parsed.get(LAN_PORT_KEY), Some("11434"));
        assert!(parsed.get("GROQ_API_KEY").is_none());
    }

    #[test]
    fn multi_line_values_are_refused() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("api_keys.env");
        let mut file = online();
        file.set("GROQ_API_KEY", "abc\nLAIA_MODE=local");

        let err = write_credentials(&path, &file).unwrap_err();
        assert!(!err.to_string().contains("abc"));
        assert!(!path.exists());
    }

    #[test]
    fn debug_output_hides_secrets() {
        let shown = format!("{:?}", online());
        assert!(shown.contains("groq"));
        assert!(!shown.contains("gsk_secret"));
    }

    #[test]
    fn api_key_var_normalises_provider_ids() {
        assert_eq!(api_key_var("openrouter"), "OPENROUTER_API_KEY");
        assert_eq!(api_key_var("hugging-face"), "HUGGING_FACE_API_KEY");
    }

    #[test]
    fn parse_skips_comments_and_blank_lines() {
        let parsed = CredentialFile::parse("# generated\n\nLAIA_MODE=local\nnot a pair\n");
        assert_eq!(parsed.keys().collect::<Vec<_>>(), vec!["LAIA_MODE"]);
    }
}
