// src/config/mod.rs
mod models;

pub use models::*;

use anyhow::{Context, Result};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json,
}

impl ConfigFormat {
    fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => ConfigFormat::Yaml,
            _ => ConfigFormat::Json,
        }
    }
}

/// Load configuration from a file (YAML or JSON)
pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file {}", path.display()))?;

    parse_config(&contents, ConfigFormat::from_path(path))
}

/// Parse and validate configuration text.
pub fn parse_config(contents: &str, format: ConfigFormat) -> Result<Config> {
    let config: Config = match format {
        ConfigFormat::Yaml => {
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?
        }
        ConfigFormat::Json => {
            serde_json::from_str(contents).context("Failed to parse JSON config")?
        }
    };

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_follows_extension() {
        assert_eq!(ConfigFormat::from_path(Path::new("lb.yaml")), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path(Path::new("lb.yml")), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path(Path::new("lb.json")), ConfigFormat::Json);
        assert_eq!(ConfigFormat::from_path(Path::new("lb")), ConfigFormat::Json);
    }

    #[tokio::test]
    async fn loads_config_files_by_extension() {
        let dir = tempfile::tempdir().unwrap();

        let yaml = dir.path().join("lb.yml");
        std::fs::write(&yaml, "backends:\n  - url: http://127.0.0.1:3031\n").unwrap();
        let config = load_config(&yaml).await.unwrap();
        assert_eq!(config.backends[0].url.port(), Some(3031));

        let json = dir.path().join("lb.json");
        std::fs::write(&json, r#"{"backends": [{"url": "http://127.0.0.1:3032"}]}"#).unwrap();
        let config = load_config(&json).await.unwrap();
        assert_eq!(config.backends[0].url.port(), Some(3032));

        // Anything that is not .yaml/.yml is read as JSON.
        let other = dir.path().join("lb.conf");
        std::fs::write(&other, "backends:\n  - url: http://127.0.0.1:3031\n").unwrap();
        assert!(load_config(&other).await.is_err());
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(dir.path().join("absent.yaml")).await.unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn parses_yaml_with_defaults() {
        let config = parse_config(
            r#"
backends:
  - url: http://127.0.0.1:3031
  - url: http://127.0.0.1:3032
"#,
            ConfigFormat::Yaml,
        )
        .unwrap();

        assert_eq!(config.listen.port(), 8080);
        assert_eq!(config.backends.len(), 2);
        assert_eq!(config.backends[1].url.as_str(), "http://127.0.0.1:3032/");
        assert!(!config.health_check.enabled);
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn parses_json() {
        let config = parse_config(
            r#"{
                "listen": "127.0.0.1:9000",
                "backends": [{ "url": "https://api.internal" }],
                "health_check": { "enabled": true, "kind": "tcp", "interval_secs": 5 }
            }"#,
            ConfigFormat::Json,
        )
        .unwrap();

        assert_eq!(config.listen.port(), 9000);
        assert!(config.health_check.enabled);
        assert_eq!(config.health_check.kind, ProbeKind::Tcp);
        assert_eq!(config.health_check.interval().as_secs(), 5);
        assert_eq!(config.health_check.path, "/health");
    }

    #[test]
    fn rejects_empty_backend_list() {
        let err = parse_config("backends: []", ConfigFormat::Yaml).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::EmptyBackendList)
        );
    }

    #[test]
    fn rejects_malformed_url() {
        assert!(parse_config("backends:\n  - url: 'not a url'", ConfigFormat::Yaml).is_err());
    }

    #[test]
    fn rejects_unsupported_scheme() {
        let err =
            parse_config("backends:\n  - url: ftp://files.local", ConfigFormat::Yaml).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn rejects_duplicate_backends() {
        let err = parse_config(
            "backends:\n  - url: http://a:1\n  - url: http://a:1/",
            ConfigFormat::Yaml,
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::DuplicateBackend(_))
        ));
    }

    #[test]
    fn rejects_zero_interval_only_when_probing() {
        let yaml = "backends:\n  - url: http://a:1\nhealth_check:\n  interval_secs: 0\n";
        assert!(parse_config(yaml, ConfigFormat::Yaml).is_ok());

        let yaml = "backends:\n  - url: http://a:1\nhealth_check:\n  enabled: true\n  interval_secs: 0\n";
        let err = parse_config(yaml, ConfigFormat::Yaml).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::ZeroDuration("interval_secs"))
        );
    }
}
