use crate::error::ConfigError;
use crate::filter::ExtensionSet;
use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::ffi::CString;
use std::fs;
use std::path::Path;

/// Module parameters
///
/// Config file is deserialized to this object. Both fields may be missing
/// here; [`Config::validate`] decides whether they are usable.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Config {
    replacement: Option<String>,
    #[serde(default)]
    extensions: Vec<String>,
}

/// Parameters checked and converted for the interceptor
#[derive(Clone, Debug)]
pub struct Settings {
    pub replacement: CString,
    pub extensions: ExtensionSet,
}

impl Config {
    pub fn new(replacement: Option<String>, extensions: Vec<String>) -> Self {
        Self {
            replacement,
            extensions,
        }
    }

    pub fn from_file_path(p: impl AsRef<Path>) -> Result<Self> {
        let s = fs::read_to_string(p.as_ref())
            .with_context(|| format!("Config file read error: {}", p.as_ref().display()))?;
        let c = toml::from_str(&s).context("Config file format error")?;
        Ok(c)
    }

    /// Replace the values given on the command line
    pub fn merge(mut self, replacement: Option<String>, extensions: Vec<String>) -> Self {
        if replacement.is_some() {
            self.replacement = replacement;
        }
        if !extensions.is_empty() {
            self.extensions = extensions;
        }
        self
    }

    /// Get replacement file path
    pub fn replacement(&self) -> Option<&str> {
        self.replacement.as_deref()
    }
    /// Get configured extensions
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn validate(&self) -> Result<Settings, ConfigError> {
        let replacement = self
            .replacement
            .as_deref()
            .ok_or(ConfigError::MissingReplacement)?;
        if self.extensions.is_empty() {
            return Err(ConfigError::MissingExtensions);
        }
        let extensions = ExtensionSet::new(&self.extensions)?;
        let replacement =
            CString::new(replacement).map_err(|_| ConfigError::InvalidReplacement)?;
        Ok(Settings {
            replacement,
            extensions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn missing_replacement_is_rejected() {
        let c = Config::new(None, vec!["mp3".into()]);
        assert_eq!(c.validate().unwrap_err(), ConfigError::MissingReplacement);
    }

    #[test]
    fn missing_extensions_are_rejected() {
        let c = Config::new(Some("/opt/rick.mp4".into()), vec![]);
        assert_eq!(c.validate().unwrap_err(), ConfigError::MissingExtensions);
    }

    #[test]
    fn replacement_is_checked_before_extensions() {
        assert_eq!(
            Config::default().validate().unwrap_err(),
            ConfigError::MissingReplacement
        );
    }

    #[test]
    fn nul_in_replacement_is_rejected() {
        let c = Config::new(Some("/opt/ri\0ck".into()), vec!["mp3".into()]);
        assert_eq!(c.validate().unwrap_err(), ConfigError::InvalidReplacement);
    }

    #[test]
    fn six_extensions_are_too_many() {
        let exts = ["a", "b", "c", "d", "e", "f"].map(String::from).to_vec();
        let c = Config::new(Some("/x".into()), exts);
        assert_eq!(c.validate().unwrap_err(), ConfigError::TooManyExtensions(6));
    }

    #[test]
    fn valid_config_converts() {
        let c = Config::new(Some("/opt/rick.mp4".into()), vec!["mp3".into()]);
        let s = c.validate().unwrap();
        assert_eq!(s.replacement.as_bytes(), b"/opt/rick.mp4");
        assert!(s.extensions.matches(b"song.mp3"));
        assert!(!s.extensions.matches(b"doc.txt"));
    }

    #[test]
    fn command_line_overrides_file() {
        let file = Config::new(Some("/a".into()), vec!["mp3".into()]);
        let merged = file.clone().merge(None, vec![]);
        assert_eq!(merged, file);
        let merged = file.merge(Some("/b".into()), vec!["wav".into(), "ogg".into()]);
        assert_eq!(merged.replacement(), Some("/b"));
        assert_eq!(merged.extensions(), ["wav", "ogg"]);
    }

    #[test]
    fn reads_toml_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "replacement = \"/opt/rick.mp4\"").unwrap();
        writeln!(f, "extensions = [\"mp3\", \"wav\"]").unwrap();
        let c = Config::from_file_path(f.path()).unwrap();
        assert_eq!(c.replacement(), Some("/opt/rick.mp4"));
        assert_eq!(c.extensions(), ["mp3", "wav"]);
    }

    #[test]
    fn extensions_may_be_omitted_in_file() {
        let c: Config = toml::from_str("replacement = \"/r\"").unwrap();
        assert!(c.extensions().is_empty());
    }

    #[test]
    fn bad_file_reports_context() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "extensions = 3").unwrap();
        let err = Config::from_file_path(f.path()).unwrap_err();
        assert_eq!(err.to_string(), "Config file format error");
        let err = Config::from_file_path("/nonexistent/open-redirect.toml").unwrap_err();
        assert!(err.to_string().starts_with("Config file read error"));
    }
}
