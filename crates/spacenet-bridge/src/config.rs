use std::time::Duration;

pub const ENV_LOG: &str = "SPACENET_LOG";
pub const ENV_ALERT_TIMEOUT_MS: &str = "SPACENET_ALERT_TIMEOUT_MS";
pub const ENV_SYSTEM_PASSPHRASE: &str = "SPACENET_SYSTEM_PASSPHRASE";

pub const DEFAULT_ALERT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_LOG_FILTER: &str = "info";
pub const DEFAULT_PROD_LOG_FILTER: &str = "error";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildProfile {
    Development,
    Production,
}

impl BuildProfile {
    #[must_use]
    pub fn current() -> Self {
        if cfg!(feature = "prod") {
            Self::Production
        } else {
            Self::Development
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

/// Process settings resolved once at startup.
#[derive(Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub profile: BuildProfile,
    /// Raw `SPACENET_LOG` value, before the profile policy is applied.
    pub log_filter: Option<String>,
    /// How long notice/alert dialogs stay up before they are dismissed.
    pub alert_timeout: Duration,
    /// Unlock secret used when the host supplies none.
    pub system_passphrase: Option<String>,
}

impl std::fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("profile", &self.profile)
            .field("log_filter", &self.log_filter)
            .field("alert_timeout", &self.alert_timeout)
            .field(
                "system_passphrase",
                &self.system_passphrase.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            profile: BuildProfile::current(),
            log_filter: None,
            alert_timeout: Duration::from_millis(DEFAULT_ALERT_TIMEOUT_MS),
            system_passphrase: None,
        }
    }
}

impl BridgeConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            profile: BuildProfile::current(),
            log_filter: env_non_empty(ENV_LOG),
            alert_timeout: parse_alert_timeout(env_non_empty(ENV_ALERT_TIMEOUT_MS).as_deref()),
            system_passphrase: env_non_empty(ENV_SYSTEM_PASSPHRASE),
        }
    }
}

#[must_use]
pub fn parse_alert_timeout(raw: Option<&str>) -> Duration {
    let millis = raw
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|millis| *millis > 0)
        .unwrap_or(DEFAULT_ALERT_TIMEOUT_MS);
    Duration::from_millis(millis)
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
