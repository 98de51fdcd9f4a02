//! Interpreter configuration, loaded from TOML.
//!
//! ```toml
//! max_depth = 256
//! memory_limit = 1048576
//! source_name = "index.php"
//!
//! [ini]
//! report_notices = false
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use php_diagnostics::Severity;
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_MAX_DEPTH: usize = 512;
/// `memory_limit = 128M`, as shipped in php.ini
pub const DEFAULT_MEMORY_LIMIT: usize = 128 * 1024 * 1024;
pub const DEFAULT_SOURCE_NAME: &str = "Standard input code";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    /// Name to boolean settings, `php.ini` style
    pub ini: BTreeMap<String, bool>,
    /// Deepest nesting of dispatch steps before the run is aborted
    pub max_depth: usize,
    /// Largest single allocation a script may request, in bytes
    pub memory_limit: usize,
    /// File name reported in diagnostics
    pub source_name: String,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            ini: BTreeMap::new(),
            max_depth: DEFAULT_MAX_DEPTH,
            memory_limit: DEFAULT_MEMORY_LIMIT,
            source_name: DEFAULT_SOURCE_NAME.to_string(),
        }
    }
}

impl InterpreterConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_depth == 0 {
            return Err(ConfigError::Invalid("max_depth must be at least 1".into()));
        }
        Ok(())
    }

    /// Looks up an ini flag, falling back to `default` when unset.
    pub fn ini_flag(&self, name: &str, default: bool) -> bool {
        self.ini.get(name).copied().unwrap_or(default)
    }

    pub fn set_ini(&mut self, name: impl Into<String>, value: bool) {
        self.ini.insert(name.into(), value);
    }

    /// Whether diagnostics of `severity` are logged. Fatal errors always are.
    pub fn reports(&self, severity: Severity) -> bool {
        match severity {
            Severity::Notice => self.ini_flag("report_notices", true),
            Severity::Warning => self.ini_flag("report_warnings", true),
            Severity::Fatal => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = InterpreterConfig::default();
        assert_eq!(config.max_depth, 512);
        assert_eq!(config.memory_limit, 134_217_728);
        assert_eq!(config.source_name, "Standard input code");
        assert!(config.reports(Severity::Notice));
        assert!(config.reports(Severity::Warning));
    }

    #[test]
    fn test_from_toml() {
        let config = InterpreterConfig::from_toml_str(
            r#"
            max_depth = 64

            [ini]
            report_notices = false
            "#,
        )
        .unwrap();

        assert_eq!(config.max_depth, 64);
        assert_eq!(config.source_name, DEFAULT_SOURCE_NAME);
        assert!(!config.reports(Severity::Notice));
        assert!(config.reports(Severity::Warning));
        assert!(config.reports(Severity::Fatal));
    }

    #[test]
    fn test_rejects_zero_depth() {
        let err = InterpreterConfig::from_toml_str("max_depth = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        let err = InterpreterConfig::from_toml_str("max_depth = \"deep\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
