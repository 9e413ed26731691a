use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;

use crate::adapters::reasoners::AVAILABLE_BACKENDS;
use crate::adapters::sandbox::AVAILABLE_DRIVERS;
use crate::adapters::workflow::AVAILABLE_ENGINES;
use crate::domain::models::config::Config;
use crate::domain::models::SuccessCriteria;

/// Project directory holding config, database and workspaces.
pub const PROJECT_DIR: &str = ".phylum";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid population_size: {0}. Must be between 1 and 64")]
    InvalidPopulationSize(u32),

    #[error("Invalid max_generations: {0}. Must be at least 1")]
    InvalidMaxGenerations(u32),

    #[error("Invalid pass_threshold: {0}. Must be in (0, 1]")]
    InvalidPassThreshold(f64),

    #[error("Invalid analysis_top_k: {0}. Must be at least 1")]
    InvalidTopK(usize),

    #[error("Invalid {0}: must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Unknown {kind} '{name}'. Available: {available}")]
    UnknownBackend {
        kind: &'static str,
        name: String,
        available: String,
    },

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must not exceed max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Invalid success_criteria: {0}. Must be one of: exit-code, output-match")]
    InvalidSuccessCriteria(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for the project in the current directory.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. .phylum/config.yaml (created by init)
    /// 3. .phylum/local.yaml (optional local overrides)
    /// 4. PHYLUM_* environment variables, `__` separating nested keys
    pub fn load() -> Result<Config> {
        Self::load_from_dir(".")
    }

    /// Same as [`ConfigLoader::load`], rooted at `project_root`.
    pub fn load_from_dir(project_root: impl AsRef<Path>) -> Result<Config> {
        let dir = project_root.as_ref().join(PROJECT_DIR);
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(dir.join("config.yaml")))
            .merge(Yaml::file(dir.join("local.yaml")))
            .merge(Env::prefixed("PHYLUM_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let evolution = &config.evolution;
        if evolution.population_size == 0 || evolution.population_size > 64 {
            return Err(ConfigError::InvalidPopulationSize(evolution.population_size));
        }
        if evolution.max_generations == 0 {
            return Err(ConfigError::InvalidMaxGenerations(evolution.max_generations));
        }
        if !(evolution.pass_threshold > 0.0 && evolution.pass_threshold <= 1.0) {
            return Err(ConfigError::InvalidPassThreshold(evolution.pass_threshold));
        }
        if evolution.analysis_top_k == 0 {
            return Err(ConfigError::InvalidTopK(evolution.analysis_top_k));
        }
        if evolution.agent_timeout_secs == 0 {
            return Err(ConfigError::ZeroDuration("agent_timeout_secs"));
        }
        if evolution.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroDuration("poll_interval_ms"));
        }

        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.database.max_connections));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }
        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        check_backend("sandbox driver", &config.sandbox.driver, AVAILABLE_DRIVERS)?;
        check_backend("workflow engine", &config.workflow.engine, AVAILABLE_ENGINES)?;
        check_backend("reasoning backend", &config.reasoning.backend, AVAILABLE_BACKENDS)?;

        if config.reasoning.initial_backoff_ms > config.reasoning.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                config.reasoning.initial_backoff_ms,
                config.reasoning.max_backoff_ms,
            ));
        }
        if config.reasoning.timeout_secs == 0 {
            return Err(ConfigError::ZeroDuration("reasoning.timeout_secs"));
        }

        if SuccessCriteria::from_str(&config.eval.success_criteria).is_none() {
            return Err(ConfigError::InvalidSuccessCriteria(config.eval.success_criteria.clone()));
        }
        if config.eval.timeout_secs == 0 {
            return Err(ConfigError::ZeroDuration("eval.timeout_secs"));
        }

        if config.vendor.name.trim().is_empty() {
            return Err(ConfigError::ValidationFailed("vendor name cannot be empty".to_string()));
        }
        if config.sandbox.workspaces_dir.trim().is_empty() {
            return Err(ConfigError::ValidationFailed("sandbox.workspaces_dir cannot be empty".to_string()));
        }

        Ok(())
    }
}

fn check_backend(kind: &'static str, name: &str, available: &[&str]) -> Result<(), ConfigError> {
    if available.contains(&name) {
        Ok(())
    } else {
        Err(ConfigError::UnknownBackend {
            kind,
            name: name.to_string(),
            available: available.join(", "),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.evolution.population_size, 5);
        assert_eq!(config.evolution.max_generations, 3);
        assert_eq!(config.database.path, ".phylum/phylum.db");
        assert_eq!(config.sandbox.driver, "process");
        assert_eq!(config.workflow.engine, "polling");
        assert_eq!(config.vendor.name, "claude-code");
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
evolution:
  population_size: 8
  max_generations: 4
  pass_threshold: 0.9
sandbox:
  driver: kubernetes
  kubernetes:
    namespace: agents
vendor:
  name: shell
  agent_config:
    command: ./agent.sh
logging:
  level: debug
  format: json
";
        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.evolution.population_size, 8);
        assert_eq!(config.evolution.max_generations, 4);
        assert_eq!(config.sandbox.kubernetes.namespace, "agents");
        assert_eq!(config.sandbox.kubernetes.image, "phylum-sandbox:latest");
        assert_eq!(config.vendor.agent_config["command"], "./agent.sh");
        assert_eq!(config.logging.format, "json");
        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_validate_population_bounds() {
        let mut config = Config::default();
        config.evolution.population_size = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidPopulationSize(0))
        ));
        config.evolution.population_size = 65;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidPopulationSize(65))
        ));
    }

    #[test]
    fn test_validate_threshold_and_generations() {
        let mut config = Config::default();
        config.evolution.max_generations = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidMaxGenerations(0))
        ));

        let mut config = Config::default();
        config.evolution.pass_threshold = 1.5;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidPassThreshold(_))
        ));
        config.evolution.pass_threshold = f64::NAN;
        assert!(ConfigLoader::validate(&config).is_err());
    }

    #[test]
    fn test_validate_unknown_backends() {
        let mut config = Config::default();
        config.sandbox.driver = "firecracker".to_string();
        match ConfigLoader::validate(&config) {
            Err(ConfigError::UnknownBackend { kind, name, available }) => {
                assert_eq!(kind, "sandbox driver");
                assert_eq!(name, "firecracker");
                assert!(available.contains("process"));
            }
            other => panic!("Expected UnknownBackend, got {other:?}"),
        }

        let mut config = Config::default();
        config.workflow.engine = "temporal".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::UnknownBackend { .. })
        ));
    }

    #[test]
    fn test_validate_logging_and_eval() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLogLevel(_))
        ));

        let mut config = Config::default();
        config.logging.rotation = "weekly".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidRotation(_))
        ));

        let mut config = Config::default();
        config.eval.success_criteria = "vibes".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidSuccessCriteria(_))
        ));

        let mut config = Config::default();
        config.reasoning.initial_backoff_ms = 60_000;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidBackoff(60_000, 30_000))
        ));
    }

    #[test]
    fn test_load_from_file_merges_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "evolution:\n  population_size: 2\nlogging:\n  level: warn").unwrap();
        file.flush().unwrap();

        let config = ConfigLoader::load_from_file(file.path()).unwrap();
        assert_eq!(config.evolution.population_size, 2);
        assert_eq!(config.evolution.max_generations, 3);
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_load_from_file_rejects_invalid() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "evolution:\n  population_size: 0").unwrap();
        file.flush().unwrap();
        assert!(ConfigLoader::load_from_file(file.path()).is_err());
    }

    #[test]
    fn test_hierarchical_merging_with_env() {
        let dir = TempDir::new().unwrap();
        let project = dir.path().join(PROJECT_DIR);
        std::fs::create_dir_all(&project).unwrap();
        std::fs::write(
            project.join("config.yaml"),
            "evolution:\n  population_size: 4\n  max_generations: 5\nlogging:\n  format: json\n",
        )
        .unwrap();
        std::fs::write(project.join("local.yaml"), "evolution:\n  population_size: 6\n").unwrap();

        let config = temp_env::with_vars(
            [
                ("PHYLUM_EVOLUTION__MAX_GENERATIONS", Some("7")),
                ("PHYLUM_VENDOR__NAME", Some("shell")),
            ],
            || ConfigLoader::load_from_dir(dir.path()).unwrap(),
        );

        assert_eq!(config.evolution.population_size, 6, "local.yaml overrides config.yaml");
        assert_eq!(config.evolution.max_generations, 7, "env overrides files");
        assert_eq!(config.vendor.name, "shell");
        assert_eq!(config.logging.format, "json", "untouched values persist");
    }

    #[test]
    fn test_missing_project_dir_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = temp_env::with_vars_unset(["PHYLUM_EVOLUTION__POPULATION_SIZE"], || {
            ConfigLoader::load_from_dir(dir.path()).unwrap()
        });
        assert_eq!(config.evolution.population_size, 5);
    }
}
