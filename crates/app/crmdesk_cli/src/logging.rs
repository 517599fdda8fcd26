use tracing_subscriber::EnvFilter;

use crate::{Error, Result};

const QUIET_FILTER: &str = "warn";
const VERBOSE_FILTER: &str = "info,crmdesk_session=debug";

/// Log to stderr; stdout is reserved for command output.
pub fn init(verbose: bool) -> Result<()> {
    let fallback = if verbose { VERBOSE_FILTER } else { QUIET_FILTER };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| Error::Custom(format!("logging init: {e}")))
}
