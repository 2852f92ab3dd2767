//! Configuration Loader (Figment-based)
//!
//! Merges configuration from defaults, the project config file, and
//! CODELOOM_* environment variables, then validates the result.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::Config;
use crate::types::{LoomError, Result};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with the full resolution chain:
    /// defaults, project file, environment.
    pub fn load() -> Result<Config> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        let project_path = Self::project_config_path();
        if project_path.exists() {
            debug!("loading project config from {}", project_path.display());
            figment = figment.merge(Toml::file(&project_path));
        }

        // Double underscore separates sections from keys so that keys
        // with underscores of their own stay reachable:
        // CODELOOM_PARTITION__MIN_UNIT_FRACTION -> partition.min_unit_fraction
        figment = figment.merge(Env::prefixed("CODELOOM_").split("__").lowercase(true));

        Self::extract(figment)
    }

    /// Load from a specific file over the defaults, ignoring the
    /// project file and environment.
    pub fn load_from_file(path: &Path) -> Result<Config> {
        Self::extract(
            Figment::new()
                .merge(Serialized::defaults(Config::default()))
                .merge(Toml::file(path)),
        )
    }

    pub fn project_config_path() -> PathBuf {
        PathBuf::from(".codeloom/config.toml")
    }

    fn extract(figment: Figment) -> Result<Config> {
        let config: Config = figment
            .extract()
            .map_err(|e| LoomError::Config(format!("configuration error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[partition]\nbudget = 1234\n\n[agent]\nmax_retries = 9\n",
        )
        .unwrap();

        let config = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(config.partition.budget, 1234);
        assert_eq!(config.agent.max_retries, 9);
        // Untouched sections keep defaults.
        assert_eq!(
            config.pipeline.max_concurrent_requests,
            crate::constants::pipeline::DEFAULT_MAX_CONCURRENT_REQUESTS
        );
    }

    #[test]
    fn test_env_reaches_multi_underscore_keys() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("CODELOOM_PARTITION__MIN_UNIT_FRACTION", "0.25");
            jail.set_env("CODELOOM_PIPELINE__MAX_CONCURRENT_REQUESTS", "9");
            let config = ConfigLoader::load().expect("env config should load");
            assert_eq!(config.partition.min_unit_fraction, 0.25);
            assert_eq!(config.pipeline.max_concurrent_requests, 9);
            Ok(())
        });
    }

    #[test]
    fn test_invalid_file_values_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[partition]\nbudget = 0\n").unwrap();
        assert!(ConfigLoader::load_from_file(&path).is_err());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = ConfigLoader::load_from_file(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(
            config.partition.budget,
            crate::constants::partition::DEFAULT_BUDGET
        );
    }
}
