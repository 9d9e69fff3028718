//! Sweeper configuration.
//!
//! Sources, lowest precedence first: built-in defaults, `integrity.toml`
//! in the working directory, then `INTEGRITY_*` environment variables.
//! A double underscore separates nested keys, so `INTEGRITY_DB__URL`
//! maps to `db.url`.

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use integrity_db::DbConfig;
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "integrity.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweeperConfig {
    pub db: DbConfig,
    /// Default filter directive when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            db: DbConfig::default(),
            log_level: "info".into(),
        }
    }
}

impl SweeperConfig {
    pub fn load() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }

    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed("INTEGRITY_").split("__"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_extract_without_sources() {
        let config: SweeperConfig = Figment::from(Serialized::defaults(SweeperConfig::default()))
            .extract()
            .unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.db.database, "integrity");
    }

    #[test]
    fn env_overrides_nested_keys() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(CONFIG_FILE, "log_level = \"debug\"\n[db]\nnamespace = \"staging\"\n")?;
            jail.set_env("INTEGRITY_DB__URL", "db.internal:8000");

            let config = SweeperConfig::load()?;
            assert_eq!(config.log_level, "debug");
            assert_eq!(config.db.namespace, "staging");
            assert_eq!(config.db.url, "db.internal:8000");
            assert_eq!(config.db.database, "integrity");
            Ok(())
        });
    }
}
