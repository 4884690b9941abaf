//! Log output for the CLI.

use std::str::FromStr;

use tracing_subscriber::filter::Targets;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::SubscriberInitExt;

/// Environment variable holding the target filter, e.g. `vit_core=debug`.
const LOG_ENV: &str = "VIT_LOG";

/// Install a stderr subscriber filtered by `VIT_LOG`. Nothing is logged when
/// the variable is unset; an unparsable filter falls back to `warn`.
pub fn init() {
    let targets = match std::env::var(LOG_ENV) {
        Ok(spec) => Targets::from_str(&spec).unwrap_or_else(|err| {
            eprintln!("ignoring invalid {LOG_ENV} '{spec}': {err}");
            Targets::new().with_default(tracing::Level::WARN)
        }),
        Err(_) => Targets::new(),
    };

    tracing_subscriber::registry()
        .with(targets)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
