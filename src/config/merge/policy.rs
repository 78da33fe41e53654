//! Base layer of every merge: the built-in defaults.

use crate::config::NotecaskConfig;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError};

/// Builder seeded with [`NotecaskConfig::default`].
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let defaults = Config::try_from(&NotecaskConfig::default())?;
    Ok(Config::builder().add_source(defaults))
}
