//! Facade tuning knobs, loaded the way `control/src/config.rs` loads its
//! `Settings` (layered `config::Config` sources, cached in a `OnceCell`).
//! Unlike an HTTP service's settings, a library core must still behave with
//! zero configuration present, so [`PersistenceSettings::default`] is a
//! complete, sane configuration on its own.

use once_cell::sync::OnceCell;
use serde::Deserialize;

pub mod app_env;

pub use app_env::app_env;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersistenceSettings {
    /// When `true` (the default), `UNEXPECTED_FIELD` issues are raised for
    /// data keys absent from the schema (spec §4.1 step 2). Embedders that
    /// want to tolerate extra keys (e.g. while migrating) can disable this.
    pub strict_unknown_fields: bool,
    /// When `true` (the default), a freshly constructed `FunctionMap` is
    /// seeded with the built-in `min`/`max`/`minLength`/`maxLength`/`pattern`
    /// predicates (SPEC_FULL §4.1).
    pub default_predicates: bool,
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self {
            strict_unknown_fields: true,
            default_predicates: true,
        }
    }
}

pub fn settings() -> &'static PersistenceSettings {
    static SETTINGS: OnceCell<PersistenceSettings> = OnceCell::new();

    SETTINGS.get_or_init(|| load_settings().unwrap_or_default())
}

/// Layers an optional `config/base.{toml,yaml,...}` + `config/<app_env>.*`
/// + `PERSISTENCE_*` environment overlay on top of [`PersistenceSettings::default`],
/// mirroring `control/src/config.rs`'s source layering. Missing config files
/// are not an error here — the library default already stands on its own.
fn load_settings() -> Result<PersistenceSettings, config::ConfigError> {
    let mut builder = config::Config::default();

    if let Ok(current_dir) = std::env::current_dir() {
        let config_dir = current_dir.join("config");
        builder.merge(config::File::from(config_dir.join("base")).required(false))?;
        builder.merge(
            config::File::from(config_dir.join(app_env().as_str())).required(false),
        )?;
    }
    builder.merge(config::Environment::with_prefix("PERSISTENCE"))?;

    match builder.try_into::<PersistenceSettings>() {
        Ok(settings) => Ok(settings),
        Err(config::ConfigError::NotFound(_)) => Ok(PersistenceSettings::default()),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable_with_zero_configuration() {
        let settings = PersistenceSettings::default();
        assert!(settings.strict_unknown_fields);
        assert!(settings.default_predicates);
    }
}
