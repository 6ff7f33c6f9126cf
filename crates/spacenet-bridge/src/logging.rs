use tracing_subscriber::EnvFilter;

use crate::config::{BridgeConfig, BuildProfile, DEFAULT_LOG_FILTER, DEFAULT_PROD_LOG_FILTER};

/// Effective filter directive plus an optional notice explaining a downgrade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilterDecision {
    pub directive: String,
    pub notice: Option<&'static str>,
}

/// Production builds are quiet unless asked otherwise and never emit trace
/// output; development builds take the requested filter as is.
#[must_use]
pub fn resolve_log_filter(profile: BuildProfile, requested: Option<&str>) -> LogFilterDecision {
    let requested = requested.map(str::trim).filter(|value| !value.is_empty());
    match (profile, requested) {
        (BuildProfile::Production, None) => LogFilterDecision {
            directive: DEFAULT_PROD_LOG_FILTER.to_string(),
            notice: None,
        },
        (BuildProfile::Production, Some(value)) if value.eq_ignore_ascii_case("trace") => {
            LogFilterDecision {
                directive: "debug".to_string(),
                notice: Some(
                    "Trace log-level is not supported in prod build. Resetting level to 'debug'.",
                ),
            }
        }
        (_, Some(value)) => LogFilterDecision {
            directive: value.to_string(),
            notice: None,
        },
        (BuildProfile::Development, None) => LogFilterDecision {
            directive: DEFAULT_LOG_FILTER.to_string(),
            notice: None,
        },
    }
}

/// Installs the global fmt subscriber on stderr, leaving stdout to the host.
/// Safe to call more than once; only the first call installs anything.
/// Returns whether this call installed it.
pub fn init(config: &BridgeConfig) -> bool {
    let decision = resolve_log_filter(config.profile, config.log_filter.as_deref());
    let filter = EnvFilter::try_new(&decision.directive)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok();
    if let Some(notice) = decision.notice {
        tracing::warn!("{notice}");
    }
    if installed {
        tracing::debug!(
            profile = config.profile.as_str(),
            filter = %decision.directive,
            "Logging initialized"
        );
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::resolve_log_filter;
    use crate::config::BuildProfile;

    #[test]
    fn development_defaults_to_info_and_honours_request() {
        let default = resolve_log_filter(BuildProfile::Development, None);
        assert_eq!(default.directive, "info");
        assert_eq!(default.notice, None);

        let trace = resolve_log_filter(BuildProfile::Development, Some("trace"));
        assert_eq!(trace.directive, "trace");
    }

    #[test]
    fn production_is_quiet_by_default() {
        let decision = resolve_log_filter(BuildProfile::Production, Some("  "));
        assert_eq!(decision.directive, "error");
    }

    #[test]
    fn production_downgrades_trace() {
        let decision = resolve_log_filter(BuildProfile::Production, Some("TRACE"));
        assert_eq!(decision.directive, "debug");
        assert!(decision.notice.is_some());

        let warn = resolve_log_filter(BuildProfile::Production, Some("warn"));
        assert_eq!(warn.directive, "warn");
        assert_eq!(warn.notice, None);
    }
}
