//! Environment variable source: NOTECASK__* prefix with __ separator

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::Environment;

/// Add environment variable overlay to builder.
///
/// `NOTECASK__ARCHIVE__SORT_ENTRIES=false` sets `archive.sort_entries`.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Ok(builder.add_source(
        Environment::with_prefix("NOTECASK")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    ))
}
