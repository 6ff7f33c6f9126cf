//! Configuration and authentication lifecycle.
//!
//! The transition rules are pure functions over what the collaborators
//! reported; [`SessionStatusMachine`] runs the collaborators, feeds their
//! results through those rules and publishes every resulting status.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::adapter::UiSessionAdapter;
use crate::bridge::DialogBridge;
use crate::error::{BridgeError, Result};
use crate::status::SessionStatus;

/// Result of opening the config store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigOpen {
    Unlocked,
    /// The store is encrypted and no passphrase was available.
    NeedsPassphrase,
}

/// Local configuration the lifecycle reads and persists.
pub trait ConfigStore: Send + Sync {
    fn open(&self, passphrase: Option<&str>) -> anyhow::Result<ConfigOpen>;

    /// Loads the configuration data; `true` when it has been initialized.
    fn load(&self) -> anyhow::Result<bool>;

    fn save(&self) -> anyhow::Result<()>;

    fn eula_accepted(&self) -> bool;

    fn set_eula_accepted(&self);

    /// User name recorded as this device's owner.
    fn device_owner(&self) -> Option<String>;
}

/// Account service behind the login flow.
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Checks the stored token. `ui` is present when the host can show
    /// dialogs during the check.
    async fn authenticate(&self, ui: Option<&UiSessionAdapter>) -> anyhow::Result<bool>;

    async fn login(&self, ui: &UiSessionAdapter) -> anyhow::Result<()>;

    async fn logout(&self) -> anyhow::Result<()>;

    fn is_logged_in(&self) -> bool;

    fn logged_in_user(&self) -> Option<String>;

    /// Drops any in-memory credentials.
    fn reset(&self);
}

/// What happened while bringing the config store up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadEvaluation {
    OpenFailed,
    SecretUnavailable,
    LoadFailed,
    Uninitialized,
    /// Token missing, expired or not checkable.
    TokenInvalid,
    TokenValid,
}

impl LoadEvaluation {
    /// Whether `initialize` reports success to the host.
    #[must_use]
    pub fn is_ok(self) -> bool {
        !matches!(self, Self::OpenFailed | Self::LoadFailed)
    }
}

#[must_use]
pub fn status_after_load(evaluation: LoadEvaluation) -> SessionStatus {
    match evaluation {
        LoadEvaluation::OpenFailed => SessionStatus::Error,
        LoadEvaluation::SecretUnavailable | LoadEvaluation::LoadFailed => SessionStatus::Locked,
        LoadEvaluation::Uninitialized => SessionStatus::NeedsInit,
        LoadEvaluation::TokenInvalid => SessionStatus::NeedsLogin,
        LoadEvaluation::TokenValid => SessionStatus::LoggedIn,
    }
}

/// `persisted` is whether the save after the attempt succeeded; a failed save
/// always means logged out.
#[must_use]
pub fn status_after_login(login_ok: bool, authenticated: bool, persisted: bool) -> SessionStatus {
    if login_ok && authenticated && persisted {
        SessionStatus::LoggedIn
    } else {
        SessionStatus::LoggedOut
    }
}

/// Login and logout need a store that has been opened and loaded.
#[must_use]
pub fn accepts_account_operations(last: Option<SessionStatus>) -> bool {
    !matches!(
        last,
        None | Some(SessionStatus::Error) | Some(SessionStatus::Locked)
    )
}

/// Drives the lifecycle and publishes each resulting status through the
/// bridge's broadcaster. Lifecycle operations are serialized.
pub struct SessionStatusMachine {
    bridge: Arc<DialogBridge>,
    config: Arc<dyn ConfigStore>,
    auth: Arc<dyn AuthService>,
    system_passphrase: Option<String>,
    last: Mutex<Option<SessionStatus>>,
    op_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for SessionStatusMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStatusMachine")
            .field("last", &self.last_status())
            .field("system_passphrase", &self.system_passphrase.is_some())
            .finish_non_exhaustive()
    }
}

impl SessionStatusMachine {
    #[must_use]
    pub fn new(
        bridge: Arc<DialogBridge>,
        config: Arc<dyn ConfigStore>,
        auth: Arc<dyn AuthService>,
    ) -> Self {
        Self {
            bridge,
            config,
            auth,
            system_passphrase: None,
            last: Mutex::new(None),
            op_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Passphrase used when `initialize` is called without one.
    #[must_use]
    pub fn with_system_passphrase(mut self, passphrase: Option<String>) -> Self {
        self.system_passphrase = passphrase;
        self
    }

    /// Last published status; `None` before the first evaluation.
    #[must_use]
    pub fn last_status(&self) -> Option<SessionStatus> {
        *self.lock_last()
    }

    /// Opens, loads and validates the configuration, then publishes the
    /// resulting status. Returns `false` when the store could not be opened
    /// or loaded.
    pub async fn initialize(
        &self,
        passphrase: Option<&str>,
        ui: Option<&UiSessionAdapter>,
    ) -> bool {
        let _guard = self.op_lock.lock().await;
        let evaluation = self.evaluate_load(passphrase, ui).await;
        tracing::debug!(?evaluation, "Configuration evaluated");
        self.transition(status_after_load(evaluation));
        evaluation.is_ok()
    }

    async fn evaluate_load(
        &self,
        passphrase: Option<&str>,
        ui: Option<&UiSessionAdapter>,
    ) -> LoadEvaluation {
        let passphrase = passphrase.or(self.system_passphrase.as_deref());
        match self.config.open(passphrase) {
            Ok(ConfigOpen::Unlocked) => {}
            Ok(ConfigOpen::NeedsPassphrase) => {
                tracing::debug!("Device unlock passphrase required but not provided");
                return LoadEvaluation::SecretUnavailable;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to open the config store");
                return LoadEvaluation::OpenFailed;
            }
        }

        let initialized = match self.config.load() {
            Ok(initialized) => initialized,
            Err(err) => {
                tracing::error!(error = %err, "Failed to load the configuration data");
                return LoadEvaluation::LoadFailed;
            }
        };
        if !initialized {
            return LoadEvaluation::Uninitialized;
        }

        match self.auth.authenticate(ui).await {
            Ok(true) => LoadEvaluation::TokenValid,
            Ok(false) => LoadEvaluation::TokenInvalid,
            Err(err) => {
                tracing::error!(error = %err, "Failed to validate the stored token");
                LoadEvaluation::TokenInvalid
            }
        }
    }

    /// Runs the login flow with `ui` for any dialogs it needs, persists the
    /// result and publishes LOGGED_IN or LOGGED_OUT.
    ///
    /// A failed save resets the in-memory credentials, so the published
    /// status is LOGGED_OUT even when the login itself succeeded.
    pub async fn login(&self, ui: &UiSessionAdapter) -> Result<()> {
        let _guard = self.op_lock.lock().await;
        self.ensure_ready()?;

        let login = self.auth.login(ui).await;
        if let Err(err) = &login {
            tracing::error!(error = %err, "Failed to login");
        }
        let authenticated = login.is_ok() && self.auth.is_logged_in();

        let saved = self.config.save();
        if let Err(err) = &saved {
            tracing::error!(error = %err, "Failed to save configuration after login");
            self.auth.reset();
        }

        self.transition(status_after_login(
            login.is_ok(),
            authenticated,
            saved.is_ok(),
        ));
        login.map_err(BridgeError::Auth)?;
        saved.map_err(BridgeError::Persist)
    }

    /// Logs out and persists. Nothing is published when the logout call
    /// itself fails.
    pub async fn logout(&self) -> Result<()> {
        let _guard = self.op_lock.lock().await;
        self.ensure_ready()?;

        if let Err(err) = self.auth.logout().await {
            tracing::error!(error = %err, "Failed to logout");
            return Err(BridgeError::Auth(err));
        }
        let saved = self.config.save();
        if let Err(err) = &saved {
            tracing::error!(error = %err, "Failed to save configuration after logout");
        }
        self.transition(SessionStatus::LoggedOut);
        saved.map_err(BridgeError::Persist)
    }

    #[must_use]
    pub fn logged_in_user(&self) -> Option<String> {
        if self.last_status().is_none() {
            return None;
        }
        self.auth.logged_in_user()
    }

    #[must_use]
    pub fn is_logged_in_user_owner(&self) -> bool {
        let Some(user) = self.logged_in_user() else {
            return false;
        };
        self.config
            .device_owner()
            .is_some_and(|owner| owner == user)
    }

    #[must_use]
    pub fn eula_accepted(&self) -> bool {
        self.last_status().is_some() && self.config.eula_accepted()
    }

    pub fn accept_eula(&self) -> Result<()> {
        if self.last_status().is_none() {
            return Err(BridgeError::ContextNotReady { last_status: None });
        }
        self.config.set_eula_accepted();
        self.config.save().map_err(|err| {
            tracing::error!(error = %err, "Failed to save EULA acceptance");
            BridgeError::Persist(err)
        })
    }

    fn ensure_ready(&self) -> Result<()> {
        let last_status = self.last_status();
        if accepts_account_operations(last_status) {
            Ok(())
        } else {
            Err(BridgeError::ContextNotReady { last_status })
        }
    }

    fn transition(&self, status: SessionStatus) {
        let previous = self.lock_last().replace(status);
        tracing::info!(
            from = previous.map_or("none", SessionStatus::as_str),
            to = status.as_str(),
            "Session status transition"
        );
        self.bridge.publish_status(status);
    }

    fn lock_last(&self) -> MutexGuard<'_, Option<SessionStatus>> {
        self.last
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
