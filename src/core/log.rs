//! Diagnostic output on stderr, kept apart from the tables on stdout.
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Directive used when `RUST_LOG` is not set.
///
/// Quiet by default: a failed rate fetch already shows up as a footnote in
/// the output, so warnings are only printed on request.
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "casho=debug,reqwest=info"
    } else {
        "off"
    }
}

fn env_filter(verbose: bool, rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(default_directive(verbose)))
}

/// Installs the global subscriber. `RUST_LOG` overrides `--verbose`.
///
/// Only the first call has an effect.
pub fn init_logging(verbose: bool) {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let layer = fmt::layer()
        .pretty()
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(verbose);

    let installed = tracing_subscriber::registry()
        .with(layer)
        .with(env_filter(verbose, rust_log.as_deref()))
        .try_init();
    if installed.is_ok() {
        tracing::debug!(verbose, "Logging initialised");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive(false), "off");
        assert!(default_directive(true).starts_with("casho=debug"));
    }

    #[test]
    fn test_env_filter_prefers_rust_log() {
        let filter = env_filter(false, Some("casho::core::cache=trace"));
        assert!(filter.to_string().contains("casho::core::cache=trace"));

        let filter = env_filter(true, None).to_string();
        assert!(filter.contains("casho=debug"));
        assert!(filter.contains("reqwest=info"));

        assert!(env_filter(false, None).to_string().contains("off"));
    }

    #[test]
    fn test_init_logging_twice_is_harmless() {
        init_logging(false);
        init_logging(true);
    }
}
