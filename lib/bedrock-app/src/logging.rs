//! Logging.

use bedrock_error::{generic_error, GenericError};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _, EnvFilter};

const LOG_LEVEL_ENV_VAR: &str = "BEDROCK_LOG_LEVEL";
const LOG_FORMAT_JSON_ENV_VAR: &str = "BEDROCK_LOG_FORMAT_JSON";

/// Logs a message to standard error and exits the process with a non-zero exit code.
pub fn fatal_and_exit(message: String) -> ! {
    eprintln!("FATAL: {}", message);
    std::process::exit(1);
}

fn is_json_format(value: Option<&str>) -> bool {
    value
        .map(|s| s.trim().to_lowercase())
        .map(|s| s == "true" || s == "1")
        .unwrap_or(false)
}

/// Initializes the logging subsystem for `tracing`.
///
/// This function reads the `BEDROCK_LOG_LEVEL` environment variable to determine the log filtering directives to use.
/// If the environment variable is not set, `default_level` is used, or `INFO` if that isn't given either.
/// Additionally, it reads the `BEDROCK_LOG_FORMAT_JSON` environment variable to determine which output format to use.
/// If it is set to `true` or `1`, the logs will be formatted as JSON. If it is set to any other value, or not set at
/// all, the logs will default to a human-readable format.
///
/// # Errors
///
/// If the logging subsystem was already initialized, an error will be returned.
pub fn initialize_logging(default_level: Option<LevelFilter>) -> Result<(), GenericError> {
    let is_json = is_json_format(std::env::var(LOG_FORMAT_JSON_ENV_VAR).ok().as_deref());

    let level_filter = EnvFilter::builder()
        .with_default_directive(default_level.unwrap_or(LevelFilter::INFO).into())
        .with_env_var(LOG_LEVEL_ENV_VAR)
        .from_env_lossy();

    let json_layer = is_json.then(|| fmt::layer().json().with_current_span(true).with_target(true));
    let text_layer = (!is_json).then(|| fmt::layer().with_target(true));

    tracing_subscriber::registry()
        .with(level_filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .map_err(|e| generic_error!("failed to initialize logging: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_format_detection() {
        assert!(is_json_format(Some("true")));
        assert!(is_json_format(Some(" TRUE ")));
        assert!(is_json_format(Some("1")));
        assert!(!is_json_format(Some("json")));
        assert!(!is_json_format(Some("0")));
        assert!(!is_json_format(None));
    }

    #[test]
    fn initializing_twice_fails() {
        // Only one global subscriber can be installed per process.
        let _ = initialize_logging(None);
        assert!(initialize_logging(None).is_err());
    }
}
