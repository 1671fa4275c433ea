//! Logger setup shared by the demo binaries.

use std::env;

/// Initialises `env_logger` with `filter`, unless `RUST_LOG` is set.
///
/// The first call wins: later calls keep the installed logger and its filter,
/// and say so at debug level.
pub fn init(filter: &str) {
    let mut builder = env_logger::Builder::new();
    match env::var("RUST_LOG") {
        Ok(from_env) => builder.parse_filters(&from_env),
        Err(_) => builder.parse_filters(filter),
    };
    builder.format_timestamp(None);
    if let Err(err) = builder.try_init() {
        log::debug!("logger already initialised, ignoring filter {filter:?}: {err}");
    }
}
