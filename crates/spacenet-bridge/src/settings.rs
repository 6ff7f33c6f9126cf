//! Device settings flows.
//!
//! Setup, device owner reset, owner key loading and saving all run against a
//! background presenter, so the host shows their dialogs over its settings
//! window instead of the main UI. [`DeviceSettingsFlow::init`] must succeed
//! before any other flow; it captures the values the settings screen edits.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;

use crate::adapter::UiSessionAdapter;
use crate::bridge::DialogBridge;
use crate::config::{BridgeConfig, DEFAULT_ALERT_TIMEOUT_MS};
use crate::error::{BridgeError, Result};
use crate::registry::PresentationContextId;

/// Values shown on the settings screen.
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceSettings {
    pub initialized: bool,
    pub device_user: String,
    pub device_name: String,
    pub device_passphrase: String,
    /// How long the device stays unlocked, as stored by the settings service.
    pub unlocked_timeout: i32,
}

impl fmt::Debug for DeviceSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceSettings")
            .field("initialized", &self.initialized)
            .field("device_user", &self.device_user)
            .field("device_name", &self.device_name)
            .field("device_passphrase", &"<redacted>")
            .field("unlocked_timeout", &self.unlocked_timeout)
            .finish()
    }
}

/// Account that took ownership of the device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceOwner {
    pub user_name: String,
    pub device_name: String,
    /// The owner has no key on this device yet and must load or create one.
    pub needs_key: bool,
}

/// Edited values the host submits from the settings screen.
#[derive(Clone, PartialEq, Eq)]
pub struct SettingsUpdate {
    pub device_name: String,
    pub device_passphrase: String,
    pub unlocked_timeout: i32,
}

impl fmt::Debug for SettingsUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingsUpdate")
            .field("device_name", &self.device_name)
            .field("unlocked_timeout", &self.unlocked_timeout)
            .finish_non_exhaustive()
    }
}

/// Service that owns the device settings. Every call gets the background
/// adapter for any dialogs it needs.
#[async_trait]
pub trait SettingsService: Send + Sync {
    async fn load(&self, ui: &UiSessionAdapter) -> anyhow::Result<DeviceSettings>;

    /// Signs in the account that becomes the new device owner.
    async fn reset_device_owner(&self, ui: &UiSessionAdapter) -> anyhow::Result<DeviceOwner>;

    /// Loads the owner's key from `key_file`, or creates it there when
    /// `create` is set. Returns the file actually used.
    async fn load_owner_key(
        &self,
        ui: &UiSessionAdapter,
        key_file: &Path,
        create: bool,
    ) -> anyhow::Result<PathBuf>;

    async fn save(&self, ui: &UiSessionAdapter, update: &SettingsUpdate) -> anyhow::Result<()>;
}

/// Runs the settings flows one at a time.
pub struct DeviceSettingsFlow {
    bridge: Arc<DialogBridge>,
    service: Arc<dyn SettingsService>,
    alert_timeout: Duration,
    loaded: Mutex<Option<DeviceSettings>>,
    op_lock: tokio::sync::Mutex<()>,
}

impl fmt::Debug for DeviceSettingsFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceSettingsFlow")
            .field("loaded", &self.settings())
            .finish_non_exhaustive()
    }
}

impl DeviceSettingsFlow {
    #[must_use]
    pub fn new(bridge: Arc<DialogBridge>, service: Arc<dyn SettingsService>) -> Self {
        Self {
            bridge,
            service,
            alert_timeout: Duration::from_millis(DEFAULT_ALERT_TIMEOUT_MS),
            loaded: Mutex::new(None),
            op_lock: tokio::sync::Mutex::new(()),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: &BridgeConfig) -> Self {
        self.alert_timeout = config.alert_timeout;
        self
    }

    /// Settings captured by the last successful `init` or `save`.
    #[must_use]
    pub fn settings(&self) -> Option<DeviceSettings> {
        self.lock_loaded().clone()
    }

    pub async fn init(&self, context: &PresentationContextId) -> Result<DeviceSettings> {
        let _guard = self.op_lock.lock().await;
        let ui = self.adapter(context);
        let settings = self.service.load(&ui).await.map_err(|err| {
            tracing::error!(error = %err, "Failed to initialize device settings");
            BridgeError::Config(err)
        })?;
        tracing::debug!(?settings, "Device settings loaded");
        *self.lock_loaded() = Some(settings.clone());
        Ok(settings)
    }

    pub async fn reset_device_owner(&self, context: &PresentationContextId) -> Result<DeviceOwner> {
        let _guard = self.op_lock.lock().await;
        self.ensure_loaded()?;
        let ui = self.adapter(context);
        let owner = self.service.reset_device_owner(&ui).await.map_err(|err| {
            tracing::error!(error = %err, "Device owner authentication failed");
            BridgeError::Auth(err)
        })?;
        tracing::info!(
            user = %owner.user_name,
            device = %owner.device_name,
            needs_key = owner.needs_key,
            "Device owner reset"
        );
        if let Some(settings) = self.lock_loaded().as_mut() {
            settings.device_user.clone_from(&owner.user_name);
        }
        Ok(owner)
    }

    pub async fn load_owner_key(
        &self,
        context: &PresentationContextId,
        key_file: &Path,
        create: bool,
    ) -> Result<PathBuf> {
        let _guard = self.op_lock.lock().await;
        self.ensure_loaded()?;
        let ui = self.adapter(context);
        self.service
            .load_owner_key(&ui, key_file, create)
            .await
            .map_err(|err| {
                tracing::error!(
                    error = %err,
                    key_file = %key_file.display(),
                    "Failed to load key file"
                );
                BridgeError::Config(err)
            })
    }

    pub async fn save(
        &self,
        context: &PresentationContextId,
        update: SettingsUpdate,
    ) -> Result<()> {
        let _guard = self.op_lock.lock().await;
        self.ensure_loaded()?;
        let ui = self.adapter(context);
        if let Err(err) = self.service.save(&ui, &update).await {
            tracing::error!(error = %err, "Failed to save device settings");
            return Err(BridgeError::Persist(err));
        }
        if let Some(settings) = self.lock_loaded().as_mut() {
            settings.initialized = true;
            settings.device_name = update.device_name;
            settings.device_passphrase = update.device_passphrase;
            settings.unlocked_timeout = update.unlocked_timeout;
        }
        Ok(())
    }

    fn adapter(&self, context: &PresentationContextId) -> UiSessionAdapter {
        UiSessionAdapter::background(Arc::clone(&self.bridge), context.clone())
            .with_alert_timeout(self.alert_timeout)
    }

    fn ensure_loaded(&self) -> Result<()> {
        if self.lock_loaded().is_some() {
            Ok(())
        } else {
            Err(BridgeError::Config(anyhow!(
                "device settings have not been initialized"
            )))
        }
    }

    fn lock_loaded(&self) -> MutexGuard<'_, Option<DeviceSettings>> {
        self.loaded
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::{DeviceSettings, SettingsUpdate};

    #[test]
    fn passphrases_stay_out_of_debug_output() {
        let settings = DeviceSettings {
            initialized: true,
            device_user: "owner".to_string(),
            device_name: "laptop".to_string(),
            device_passphrase: "hunter2".to_string(),
            unlocked_timeout: 15,
        };
        let rendered = format!("{settings:?}");
        assert!(rendered.contains("laptop"));
        assert!(!rendered.contains("hunter2"));

        let update = SettingsUpdate {
            device_name: "desk".to_string(),
            device_passphrase: "hunter2".to_string(),
            unlocked_timeout: 5,
        };
        assert!(!format!("{update:?}").contains("hunter2"));
    }
}
