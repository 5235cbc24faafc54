use crate::config::AppConfig;
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads configuration by merging defaults, `config/Config.toml` and
    /// `MATCHCAST_`-prefixed environment variables (nested keys use `__`).
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be parsed or fails validation.
    pub fn load() -> Result<AppConfig> {
        Self::load_from("config/Config.toml")
    }

    /// Loads configuration from a specific TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be parsed or fails validation.
    pub fn load_from(path: &str) -> Result<AppConfig> {
        let config: AppConfig = Self::base(path)
            .merge(Env::prefixed("MATCHCAST_").split("__"))
            .extract()
            .with_context(|| format!("Failed to load configuration from {path}"))?;

        config.validate()?;
        Ok(config)
    }

    /// Loads configuration with a profile overlay (`config/Config.<profile>.toml`).
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be parsed or fails validation.
    pub fn load_with_profile(profile: &str) -> Result<AppConfig> {
        let config: AppConfig = Self::base("config/Config.toml")
            .merge(Toml::file(format!("config/Config.{profile}.toml")))
            .merge(Env::prefixed("MATCHCAST_").split("__"))
            .extract()
            .with_context(|| format!("Failed to load configuration profile {profile}"))?;

        config.validate()?;
        Ok(config)
    }

    fn base(path: &str) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default())).merge(Toml::file(path))
    }
}
