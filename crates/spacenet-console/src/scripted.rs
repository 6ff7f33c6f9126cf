//! In-memory collaborators for driving the session lifecycle and the
//! device settings from the terminal without a real config file or account
//! service.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, anyhow, bail, ensure};
use async_trait::async_trait;
use spacenet_bridge::{
    AuthService, ConfigOpen, ConfigStore, DeviceOwner, DeviceSettings, SettingsService,
    SettingsUpdate, UiSessionAdapter,
};

#[derive(Debug, Default)]
struct ConfigState {
    unlocked_with: Option<String>,
    loaded: bool,
    eula_accepted: bool,
    device_name: Option<String>,
}

/// Config store kept in memory. Optionally protected by a passphrase.
#[derive(Debug, Default)]
pub struct MemoryConfig {
    passphrase: Option<String>,
    initialized: AtomicBool,
    owner: Option<String>,
    fail_saves: bool,
    state: Mutex<ConfigState>,
}

impl MemoryConfig {
    #[must_use]
    pub fn new(passphrase: Option<String>, initialized: bool, owner: Option<String>) -> Self {
        Self {
            passphrase,
            initialized: AtomicBool::new(initialized),
            owner,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn device_name(&self) -> Option<String> {
        self.state().device_name.clone()
    }

    /// Records the device setup and persists it.
    pub fn set_up_device(&self, device_name: &str) -> anyhow::Result<()> {
        self.state().device_name = Some(device_name.to_string());
        self.initialized.store(true, Ordering::SeqCst);
        self.save()
    }

    #[must_use]
    pub fn failing_saves(mut self, fail_saves: bool) -> Self {
        self.fail_saves = fail_saves;
        self
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ConfigState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ConfigStore for MemoryConfig {
    fn open(&self, passphrase: Option<&str>) -> anyhow::Result<ConfigOpen> {
        if self.passphrase.is_some() && passphrase.is_none() {
            return Ok(ConfigOpen::NeedsPassphrase);
        }
        self.state().unlocked_with = passphrase.map(str::to_string);
        Ok(ConfigOpen::Unlocked)
    }

    fn load(&self) -> anyhow::Result<bool> {
        let mut state = self.state();
        if self.passphrase.is_some() && state.unlocked_with != self.passphrase {
            bail!("configuration could not be decrypted with the given passphrase");
        }
        state.loaded = true;
        Ok(self.is_initialized())
    }

    fn save(&self) -> anyhow::Result<()> {
        if !self.state().loaded {
            bail!("configuration has not been loaded");
        }
        if self.fail_saves {
            bail!("configuration storage is read-only");
        }
        tracing::debug!("Configuration saved");
        Ok(())
    }

    fn eula_accepted(&self) -> bool {
        self.state().eula_accepted
    }

    fn set_eula_accepted(&self) {
        self.state().eula_accepted = true;
    }

    fn device_owner(&self) -> Option<String> {
        self.owner.clone()
    }
}

/// Account service checking credentials against a fixed pair. The login
/// flow asks for them through the dialog bridge.
#[derive(Debug)]
pub struct ConsoleAuth {
    user: String,
    password: String,
    token_valid: AtomicBool,
    logged_in: Mutex<Option<String>>,
}

impl ConsoleAuth {
    #[must_use]
    pub fn new(user: impl Into<String>, password: impl Into<String>, token_valid: bool) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
            token_valid: AtomicBool::new(token_valid),
            logged_in: Mutex::new(None),
        }
    }

    fn logged_in(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.logged_in
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl AuthService for ConsoleAuth {
    async fn authenticate(&self, _ui: Option<&UiSessionAdapter>) -> anyhow::Result<bool> {
        let valid = self.token_valid.load(Ordering::SeqCst);
        if valid {
            *self.logged_in() = Some(self.user.clone());
        }
        Ok(valid)
    }

    async fn login(&self, ui: &UiSessionAdapter) -> anyhow::Result<()> {
        let user = ui
            .prompt_input("Sign in", "User name", &self.user)
            .await
            .context("sign in cancelled")?;
        let user = if user.is_empty() { self.user.clone() } else { user };
        let password = ui
            .prompt_secure_input("Sign in", &format!("Password for {user}"))
            .await
            .context("sign in cancelled")?;
        if user != self.user || password != self.password {
            ui.show_error_message("Sign in failed", "Unknown user name or password.");
            return Err(anyhow!("invalid credentials for {user}"));
        }
        *self.logged_in() = Some(user.clone());
        self.token_valid.store(true, Ordering::SeqCst);
        ui.show_info_message("Signed in", &format!("Welcome, {user}."));
        Ok(())
    }

    async fn logout(&self) -> anyhow::Result<()> {
        if self.logged_in().is_none() {
            bail!("no user is logged in");
        }
        self.reset();
        Ok(())
    }

    fn is_logged_in(&self) -> bool {
        self.logged_in().is_some()
    }

    fn logged_in_user(&self) -> Option<String> {
        self.logged_in().clone()
    }

    fn reset(&self) {
        *self.logged_in() = None;
        self.token_valid.store(false, Ordering::SeqCst);
    }
}

/// Device settings kept in the in-memory config store.
#[derive(Debug)]
pub struct ConsoleSettings {
    config: Arc<MemoryConfig>,
    owner: String,
}

impl ConsoleSettings {
    #[must_use]
    pub fn new(config: Arc<MemoryConfig>, owner: impl Into<String>) -> Self {
        Self {
            config,
            owner: owner.into(),
        }
    }
}

#[async_trait]
impl SettingsService for ConsoleSettings {
    async fn load(&self, _ui: &UiSessionAdapter) -> anyhow::Result<DeviceSettings> {
        Ok(DeviceSettings {
            initialized: self.config.is_initialized(),
            device_user: self.owner.clone(),
            device_name: self
                .config
                .device_name()
                .unwrap_or_else(|| "spacenet-console".to_string()),
            device_passphrase: self.config.passphrase.clone().unwrap_or_default(),
            unlocked_timeout: 0,
        })
    }

    async fn reset_device_owner(&self, ui: &UiSessionAdapter) -> anyhow::Result<DeviceOwner> {
        let user_name = ui
            .prompt_input("Device owner", "Owner account", &self.owner)
            .await
            .context("owner sign in cancelled")?;
        ensure!(user_name == self.owner, "{user_name} does not own this device");
        Ok(DeviceOwner {
            user_name,
            device_name: self.config.device_name().unwrap_or_default(),
            needs_key: false,
        })
    }

    async fn load_owner_key(
        &self,
        ui: &UiSessionAdapter,
        key_file: &Path,
        create: bool,
    ) -> anyhow::Result<PathBuf> {
        if create {
            return Ok(key_file.to_path_buf());
        }
        ui.prompt_file("Owner key", "Key file", &key_file.display().to_string())
            .await
            .context("no key file chosen")
    }

    async fn save(&self, _ui: &UiSessionAdapter, update: &SettingsUpdate) -> anyhow::Result<()> {
        ensure!(!update.device_name.trim().is_empty(), "device name is required");
        self.config.set_up_device(update.device_name.trim())
    }
}
