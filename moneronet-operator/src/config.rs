use std::{
    fs,
    path::{Path, PathBuf},
};

use clap::ValueEnum;
use moneronet_reconciler::{BackoffConfig, ReconcilerConfig};
use moneronet_telemetry::TelemetryConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ConfigFormat {
    Auto,
    Toml,
    Yaml,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {format:?} config: {details}")]
    Parse {
        format: ConfigFormat,
        details: String,
    },
    #[error("configuration invalid: {0}")]
    Validation(String),
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct OperatorConfig {
    #[serde(default)]
    pub operator: ReconcilerConfig,
    #[serde(default)]
    pub backoff: BackoffConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl OperatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.operator.workers == 0 {
            return Err(ConfigError::Validation(
                "workers must be greater than zero".into(),
            ));
        }
        if self.operator.field_manager.trim().is_empty() {
            return Err(ConfigError::Validation(
                "field manager must not be empty".into(),
            ));
        }
        if self.operator.pass_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "pass timeout must be greater than zero".into(),
            ));
        }
        if self.backoff.base_delay_ms == 0 {
            return Err(ConfigError::Validation(
                "backoff base delay must be greater than zero".into(),
            ));
        }
        if self.backoff.max_delay_ms < self.backoff.base_delay_ms {
            return Err(ConfigError::Validation(
                "backoff max delay cannot be below the base delay".into(),
            ));
        }
        Ok(())
    }

    pub fn sample() -> Self {
        Self::default()
    }
}

pub fn load_config(path: &Path, format: ConfigFormat) -> Result<OperatorConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_config(&contents, resolve_format(path, format))?;
    config.validate()?;
    Ok(config)
}

fn parse_config(contents: &str, format: ConfigFormat) -> Result<OperatorConfig, ConfigError> {
    match format {
        ConfigFormat::Yaml => serde_yaml::from_str(contents).map_err(|err| ConfigError::Parse {
            format,
            details: err.to_string(),
        }),
        ConfigFormat::Toml | ConfigFormat::Auto => {
            toml::from_str(contents).map_err(|err| ConfigError::Parse {
                format: ConfigFormat::Toml,
                details: err.to_string(),
            })
        }
    }
}

fn resolve_format(path: &Path, format: ConfigFormat) -> ConfigFormat {
    match format {
        ConfigFormat::Auto => match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => ConfigFormat::Toml,
            Some("yaml") | Some("yml") => ConfigFormat::Yaml,
            _ => ConfigFormat::Toml,
        },
        _ => format,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn sample_config_is_valid() {
        OperatorConfig::sample().validate().unwrap();
    }

    #[test]
    fn empty_document_takes_every_default() {
        let config = parse_config("", ConfigFormat::Toml).unwrap();
        assert_eq!(config, OperatorConfig::default());
    }

    #[test]
    fn yaml_sections_override_defaults() {
        let yaml = "operator:\n  workers: 2\n  namespace: monero\nbackoff:\n  max-delay-ms: 1000\n";
        let config = parse_config(yaml, ConfigFormat::Yaml).unwrap();
        assert_eq!(config.operator.workers, 2);
        assert_eq!(config.operator.namespace.as_deref(), Some("monero"));
        assert_eq!(config.backoff.max_delay_ms, 1_000);
        assert_eq!(config.backoff.base_delay_ms, BackoffConfig::default().base_delay_ms);
    }

    #[test]
    fn rejects_inverted_backoff() {
        let mut config = OperatorConfig::sample();
        config.backoff.max_delay_ms = config.backoff.base_delay_ms - 1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation(reason)) if reason.contains("max delay")
        ));
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(
            resolve_format(Path::new("op.yml"), ConfigFormat::Auto),
            ConfigFormat::Yaml
        );
        assert_eq!(
            resolve_format(Path::new("op.conf"), ConfigFormat::Auto),
            ConfigFormat::Toml
        );
        assert_eq!(
            resolve_format(Path::new("op.toml"), ConfigFormat::Yaml),
            ConfigFormat::Yaml
        );
    }
}
