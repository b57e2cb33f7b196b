//! Subscriber setup for binaries and test harnesses embedding this crate.

use tracing_subscriber::EnvFilter;

/// Output format for [`init_tracing`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Install a global `fmt` subscriber.
///
/// `filter` follows `EnvFilter` syntax (`"info"`, `"axis=debug"`); when absent
/// `RUST_LOG` is consulted, falling back to `info`. Returns `false` when a
/// global subscriber was already installed.
pub fn init_tracing(filter: Option<&str>, format: LogFormat) -> bool {
    let filter = match filter {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    match format {
        LogFormat::Pretty => builder.try_init().is_ok(),
        LogFormat::Json => builder.json().try_init().is_ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_reports_false() {
        let _ = init_tracing(Some("warn"), LogFormat::Json);
        assert!(!init_tracing(Some("debug"), LogFormat::Pretty));
    }
}
