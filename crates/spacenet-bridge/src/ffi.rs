//! C ABI for the native host.
//!
//! Host contexts and callback contexts are opaque pointers owned by the host;
//! they are only passed back, never dereferenced. Strings handed to host
//! callbacks are valid for the duration of the call. Strings returned to the
//! host must be released with [`sn_free_string`].
//!
//! Functions returning `u8` report 1 for success and 0 for failure. None of
//! them panics or propagates an error to the caller.

use std::ffi::{CStr, CString, c_char, c_int, c_void};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use crate::adapter::UiSessionAdapter;
use crate::bridge::DialogBridge;
use crate::config::BridgeConfig;
use crate::dialog::{DialogHandle, DialogRequest, DispatchHint};
use crate::lifecycle::{AuthService, ConfigStore, SessionStatusMachine};
use crate::logging;
use crate::registry::{DismissDialog, PresentationContextId, ShowDialog};
use crate::reply::DialogOutcome;
use crate::settings::{
    DeviceOwner, DeviceSettings, DeviceSettingsFlow, SettingsService, SettingsUpdate,
};
use crate::status::{SessionStatus, StatusListener};
use crate::token::CorrelationToken;

/// Puts a dialog on screen and returns an opaque handle for it, or null when
/// the dialog could not be shown.
///
/// Arguments: host context, dialog kind, title, message, accessory kind,
/// accessory text, correlation token, background flag.
pub type SnShowDialogFn = extern "C" fn(
    *mut c_void,
    u8,
    *const c_char,
    *const c_char,
    u8,
    *const c_char,
    u64,
    u8,
) -> *mut c_void;

/// Takes the dialog identified by the handle off screen.
pub type SnDismissDialogFn = extern "C" fn(*mut c_void, *mut c_void, u64);

pub type SnStatusChangeFn = extern "C" fn(*mut c_void, u8);

pub type SnDoneFn = extern "C" fn(*mut c_void, u8);

/// Arguments: host context, ok, initialized, device user, device name,
/// device passphrase, unlocked timeout.
pub type SnSettingsInitFn = extern "C" fn(
    *mut c_void,
    u8,
    u8,
    *const c_char,
    *const c_char,
    *const c_char,
    c_int,
);

/// Arguments: host context, user name, device name, needs key. Both names are
/// null when the owner could not be signed in.
pub type SnDeviceOwnerFn = extern "C" fn(*mut c_void, *const c_char, *const c_char, u8);

/// Arguments: host context, ok, key file.
pub type SnOwnerKeyLoadedFn = extern "C" fn(*mut c_void, u8, *const c_char);

/// Host pointer kept as an address so it can travel between threads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct HostPtr(usize);

impl HostPtr {
    fn new(ptr: *mut c_void) -> Self {
        Self(ptr as usize)
    }

    fn as_ptr(self) -> *mut c_void {
        self.0 as *mut c_void
    }
}

struct HostPresenter {
    context: HostPtr,
    show: SnShowDialogFn,
}

impl ShowDialog for HostPresenter {
    fn show(&self, request: &DialogRequest) -> Option<DialogHandle> {
        let title = to_c_string(&request.title);
        let message = to_c_string(&request.message);
        let accessory_text = to_c_string(&request.accessory_text);
        let handle = (self.show)(
            self.context.as_ptr(),
            request.kind.to_u8(),
            title.as_ptr(),
            message.as_ptr(),
            request.accessory.to_u8(),
            accessory_text.as_ptr(),
            request.token.as_u64(),
            u8::from(request.dispatch == DispatchHint::Background),
        );
        DialogHandle::from_raw(handle as usize)
    }
}

struct HostDismisser {
    context: HostPtr,
    dismiss: SnDismissDialogFn,
}

impl DismissDialog for HostDismisser {
    fn dismiss(&self, handle: DialogHandle, token: CorrelationToken) {
        (self.dismiss)(
            self.context.as_ptr(),
            handle.as_raw() as *mut c_void,
            token.as_u64(),
        );
    }
}

struct HostStatusListener {
    context: HostPtr,
    callback: SnStatusChangeFn,
}

impl StatusListener for HostStatusListener {
    fn on_status(&self, status: SessionStatus) {
        (self.callback)(self.context.as_ptr(), status.to_u8());
    }
}

/// Process-wide state behind the C entry points.
struct HostState {
    runtime: tokio::runtime::Runtime,
    bridge: Arc<DialogBridge>,
    config: BridgeConfig,
    machine: Mutex<Option<Arc<SessionStatusMachine>>>,
    settings: Mutex<Option<Arc<DeviceSettingsFlow>>>,
}

impl HostState {
    fn build() -> Option<Self> {
        let config = BridgeConfig::from_env();
        logging::init(&config);
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .thread_name("spacenet-bridge")
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(error) => {
                tracing::error!(%error, "Bridge runtime initialization failed");
                return None;
            }
        };
        let bridge = DialogBridge::new(runtime.handle().clone());
        tracing::debug!(?config, "Bridge host state initialized");
        Some(Self {
            runtime,
            bridge,
            config,
            machine: Mutex::new(None),
            settings: Mutex::new(None),
        })
    }

    fn lock_machine(&self) -> MutexGuard<'_, Option<Arc<SessionStatusMachine>>> {
        self.machine
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn machine(&self) -> Option<Arc<SessionStatusMachine>> {
        let machine = self.lock_machine().clone();
        if machine.is_none() {
            tracing::error!("No configuration collaborators installed");
        }
        machine
    }

    fn lock_settings(&self) -> MutexGuard<'_, Option<Arc<DeviceSettingsFlow>>> {
        self.settings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn settings(&self) -> Option<Arc<DeviceSettingsFlow>> {
        let settings = self.lock_settings().clone();
        if settings.is_none() {
            tracing::error!("No settings service installed");
        }
        settings
    }

    fn adapter(&self, context: PresentationContextId) -> UiSessionAdapter {
        UiSessionAdapter::new(Arc::clone(&self.bridge), context).with_config(&self.config)
    }

    /// Runs `operation` to completion on the bridge runtime. Refused when the
    /// calling thread already runs a tokio runtime (a host callback invoked
    /// from a bridge worker, for instance): blocking there would panic, and a
    /// panic cannot unwind out of the C boundary.
    fn block_on<F: Future>(&self, entry: &'static str, operation: F) -> Option<F::Output> {
        if tokio::runtime::Handle::try_current().is_ok() {
            tracing::error!(entry, "Blocking call made from an async runtime thread, refused");
            return None;
        }
        Some(self.runtime.block_on(operation))
    }
}

static HOST: OnceLock<Option<HostState>> = OnceLock::new();

fn host() -> Option<&'static HostState> {
    HOST.get_or_init(HostState::build).as_ref()
}

/// Installs the configuration store and account service the lifecycle entry
/// points drive. Called by the embedding application before the host calls
/// [`sn_initialize_context`]; a second call replaces the first.
pub fn install_collaborators(config: Arc<dyn ConfigStore>, auth: Arc<dyn AuthService>) -> bool {
    let Some(host) = host() else {
        return false;
    };
    let machine = SessionStatusMachine::new(Arc::clone(&host.bridge), config, auth)
        .with_system_passphrase(host.config.system_passphrase.clone());
    *host.lock_machine() = Some(Arc::new(machine));
    true
}

/// Installs the service behind the `sn_settings_*` entry points; a second
/// call replaces the first.
pub fn install_settings_service(service: Arc<dyn SettingsService>) -> bool {
    let Some(host) = host() else {
        return false;
    };
    let flow = DeviceSettingsFlow::new(Arc::clone(&host.bridge), service).with_config(&host.config);
    *host.lock_settings() = Some(Arc::new(flow));
    true
}

/// Bridge behind the C entry points, for embedding code that opens dialogs
/// itself.
pub fn shared_bridge() -> Option<Arc<DialogBridge>> {
    host().map(|host| Arc::clone(&host.bridge))
}

fn to_c_string(value: &str) -> CString {
    CString::new(value.replace('\0', "")).unwrap_or_default()
}

/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string that stays valid
/// for the duration of the call.
unsafe fn from_c_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: null-checked above; validity is the caller's contract.
    let value = unsafe { CStr::from_ptr(ptr) };
    Some(value.to_string_lossy().into_owned())
}

/// C FFI: registers (or replaces) the show callback for a presentation
/// context. Null arguments are ignored.
#[unsafe(no_mangle)]
pub extern "C" fn sn_register_show_dialog_func(
    dlg_context: *mut c_void,
    show: Option<SnShowDialogFn>,
) {
    let Some(host) = host() else {
        return;
    };
    let Some(context) = PresentationContextId::from_host_ptr(dlg_context as usize) else {
        tracing::warn!("Show callback registered without a dialog context");
        return;
    };
    let presenter = show.map(|show| {
        Arc::new(HostPresenter {
            context: HostPtr::new(dlg_context),
            show,
        }) as Arc<dyn ShowDialog>
    });
    host.bridge.registry().register(&context, presenter);
}

/// C FFI: attaches a dismiss callback to a registered presentation context.
#[unsafe(no_mangle)]
pub extern "C" fn sn_set_dialog_dismiss_handler(
    dlg_context: *mut c_void,
    dismiss: Option<SnDismissDialogFn>,
) {
    let Some(host) = host() else {
        return;
    };
    let Some(context) = PresentationContextId::from_host_ptr(dlg_context as usize) else {
        return;
    };
    let dismisser = dismiss.map(|dismiss| {
        Arc::new(HostDismisser {
            context: HostPtr::new(dlg_context),
            dismiss,
        }) as Arc<dyn DismissDialog>
    });
    host.bridge
        .registry()
        .set_dismiss_capability(&context, dismisser);
}

/// C FFI: removes a presentation context. Dialogs still waiting on it keep
/// waiting for their reply.
#[unsafe(no_mangle)]
pub extern "C" fn sn_unregister_show_dialog_func(dlg_context: *mut c_void) {
    let Some(host) = host() else {
        return;
    };
    if let Some(context) = PresentationContextId::from_host_ptr(dlg_context as usize) {
        host.bridge.registry().unregister(&context);
    }
}

/// C FFI: delivers the user's answer for the dialog shown with `token`.
/// `ok` 0 means cancelled. Unknown or already answered tokens are ignored.
///
/// # Safety
///
/// `result` must be null or a NUL-terminated string valid for the call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sn_handle_dialog_result(token: u64, ok: u8, result: *const c_char) {
    let Some(host) = host() else {
        return;
    };
    let Some(token) = CorrelationToken::from_raw(token) else {
        tracing::debug!("Dialog result without correlation token");
        return;
    };
    // SAFETY: forwarded from this function's contract.
    let text = unsafe { from_c_string(result) };
    host.bridge
        .deliver(token, DialogOutcome::from_host(ok != 0, text));
}

/// C FFI: adds a status listener. Registering the same pair twice notifies it
/// twice.
#[unsafe(no_mangle)]
pub extern "C" fn sn_register_status_change_handler(
    context: *mut c_void,
    handler: Option<SnStatusChangeFn>,
) {
    let Some(host) = host() else {
        return;
    };
    let Some(callback) = handler else {
        return;
    };
    host.bridge.subscribe_status(Arc::new(HostStatusListener {
        context: HostPtr::new(context),
        callback,
    }));
}

/// C FFI: opens and loads the configuration and publishes the resulting
/// status. Blocks the calling thread; called from a thread that runs an async
/// runtime it returns 0 without doing anything.
///
/// # Safety
///
/// `passphrase` must be null or a NUL-terminated string valid for the call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sn_initialize_context(passphrase: *const c_char) -> u8 {
    let Some(host) = host() else {
        return 0;
    };
    let Some(machine) = host.machine() else {
        host.bridge.publish_status(SessionStatus::Error);
        return 0;
    };
    // SAFETY: forwarded from this function's contract.
    let passphrase = unsafe { from_c_string(passphrase) };
    let ok = host.block_on(
        "sn_initialize_context",
        machine.initialize(passphrase.as_deref(), None),
    );
    u8::from(ok == Some(true))
}

/// C FFI: runs the login flow in the background, showing its dialogs on
/// `dlg_context`, then calls `on_done(dlg_context, ok)`.
#[unsafe(no_mangle)]
pub extern "C" fn sn_login(dlg_context: *mut c_void, on_done: Option<SnDoneFn>) {
    let Some(host) = host() else {
        return;
    };
    let done_context = HostPtr::new(dlg_context);
    let notify_done = move |ok: bool| {
        if let Some(on_done) = on_done {
            on_done(done_context.as_ptr(), u8::from(ok));
        }
    };
    let (Some(machine), Some(context)) = (
        host.machine(),
        PresentationContextId::from_host_ptr(dlg_context as usize),
    ) else {
        notify_done(false);
        return;
    };
    let ui = host.adapter(context);
    host.runtime.spawn(async move {
        let result = machine.login(&ui).await;
        if let Err(error) = &result {
            tracing::warn!(%error, "Login did not complete");
        }
        notify_done(result.is_ok());
    });
}

/// C FFI: logs out and publishes LOGGED_OUT. Blocks the calling thread, with
/// the same runtime restriction as [`sn_initialize_context`].
#[unsafe(no_mangle)]
pub extern "C" fn sn_logout() -> u8 {
    let Some(host) = host() else {
        return 0;
    };
    let Some(machine) = host.machine() else {
        return 0;
    };
    match host.block_on("sn_logout", machine.logout()) {
        Some(Ok(())) => 1,
        Some(Err(error)) => {
            tracing::warn!(%error, "Logout did not complete");
            0
        }
        None => 0,
    }
}

/// C FFI: name of the logged in user, or null. Release with
/// [`sn_free_string`].
#[unsafe(no_mangle)]
pub extern "C" fn sn_logged_in_user() -> *mut c_char {
    host()
        .and_then(HostState::machine)
        .and_then(|machine| machine.logged_in_user())
        .map_or(std::ptr::null_mut(), |user| to_c_string(&user).into_raw())
}

/// C FFI: releases a string returned by this library.
///
/// # Safety
///
/// `value` must be null or a pointer returned by this library that has not
/// been released yet.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sn_free_string(value: *mut c_char) {
    if value.is_null() {
        return;
    }
    // SAFETY: non-null values come from `CString::into_raw` and are released
    // once, per this function's contract.
    drop(unsafe { CString::from_raw(value) });
}

#[unsafe(no_mangle)]
pub extern "C" fn sn_is_logged_in_user_owner() -> u8 {
    let owner = host()
        .and_then(HostState::machine)
        .is_some_and(|machine| machine.is_logged_in_user_owner());
    u8::from(owner)
}

#[unsafe(no_mangle)]
pub extern "C" fn sn_eula_accepted() -> u8 {
    let accepted = host()
        .and_then(HostState::machine)
        .is_some_and(|machine| machine.eula_accepted());
    u8::from(accepted)
}

/// C FFI: records EULA acceptance. Returns 0 when it could not be saved.
#[unsafe(no_mangle)]
pub extern "C" fn sn_set_eula_accepted() -> u8 {
    let Some(machine) = host().and_then(HostState::machine) else {
        return 0;
    };
    match machine.accept_eula() {
        Ok(()) => 1,
        Err(error) => {
            tracing::error!(%error, "EULA acceptance not saved");
            0
        }
    }
}

/// C FFI: round-trip check for host integrations. Shows a text input dialog
/// on `dlg_context` and logs what comes back.
#[unsafe(no_mangle)]
pub extern "C" fn sn_test_dialog_input(dlg_context: *mut c_void) -> u8 {
    let Some(host) = host() else {
        return 0;
    };
    let Some(context) = PresentationContextId::from_host_ptr(dlg_context as usize) else {
        return 0;
    };
    let shown = host.adapter(context).show_message_with_input(
        "Test Input",
        "Please enter some test text input.",
        "",
        |input| match input {
            Some(text) => tracing::info!(%text, "Test dialog input received"),
            None => tracing::info!("Test dialog input cancelled"),
        },
    );
    u8::from(shown)
}

/// Settings flow and dialog context for a `sn_settings_*` call, or `None`
/// when either is missing.
fn settings_target(
    dlg_context: *mut c_void,
) -> Option<(&'static HostState, Arc<DeviceSettingsFlow>, PresentationContextId)> {
    let host = host()?;
    let flow = host.settings()?;
    let Some(context) = PresentationContextId::from_host_ptr(dlg_context as usize) else {
        tracing::warn!("Settings flow started without a dialog context");
        return None;
    };
    Some((host, flow, context))
}

/// C FFI: loads the device settings in the background and reports them to
/// `handler`. Dialogs are shown on `dlg_context` as background requests.
#[unsafe(no_mangle)]
pub extern "C" fn sn_settings_init(dlg_context: *mut c_void, handler: Option<SnSettingsInitFn>) {
    let done_context = HostPtr::new(dlg_context);
    let report = move |settings: Option<DeviceSettings>| {
        let Some(handler) = handler else {
            return;
        };
        let settings = settings.as_ref();
        let ok = settings.is_some();
        let initialized = settings.is_some_and(|settings| settings.initialized);
        let user = to_c_string(settings.map_or("", |settings| settings.device_user.as_str()));
        let name = to_c_string(settings.map_or("", |settings| settings.device_name.as_str()));
        let passphrase =
            to_c_string(settings.map_or("", |settings| settings.device_passphrase.as_str()));
        let timeout = settings.map_or(0, |settings| settings.unlocked_timeout);
        handler(
            done_context.as_ptr(),
            u8::from(ok),
            u8::from(initialized),
            user.as_ptr(),
            name.as_ptr(),
            passphrase.as_ptr(),
            timeout,
        );
    };
    let Some((host, flow, context)) = settings_target(dlg_context) else {
        report(None);
        return;
    };
    host.runtime.spawn(async move {
        report(flow.init(&context).await.ok());
    });
}

/// C FFI: signs in a new device owner in the background and reports the
/// account to `handler`.
#[unsafe(no_mangle)]
pub extern "C" fn sn_settings_reset_device_owner(
    dlg_context: *mut c_void,
    handler: Option<SnDeviceOwnerFn>,
) {
    let done_context = HostPtr::new(dlg_context);
    let report = move |owner: Option<DeviceOwner>| {
        let Some(handler) = handler else {
            return;
        };
        match owner {
            Some(owner) => {
                let user = to_c_string(&owner.user_name);
                let device = to_c_string(&owner.device_name);
                handler(
                    done_context.as_ptr(),
                    user.as_ptr(),
                    device.as_ptr(),
                    u8::from(owner.needs_key),
                );
            }
            None => handler(done_context.as_ptr(), std::ptr::null(), std::ptr::null(), 0),
        }
    };
    let Some((host, flow, context)) = settings_target(dlg_context) else {
        report(None);
        return;
    };
    host.runtime.spawn(async move {
        report(flow.reset_device_owner(&context).await.ok());
    });
}

/// C FFI: loads (or with `create_key` 1 creates) the owner's key file in the
/// background and reports the file used to `handler`.
///
/// # Safety
///
/// `key_file` must be null or a NUL-terminated string valid for the call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sn_settings_load_user_key(
    dlg_context: *mut c_void,
    key_file: *const c_char,
    create_key: u8,
    handler: Option<SnOwnerKeyLoadedFn>,
) {
    // SAFETY: forwarded from this function's contract.
    let requested = PathBuf::from(unsafe { from_c_string(key_file) }.unwrap_or_default());
    let done_context = HostPtr::new(dlg_context);
    let report = move |loaded: Option<PathBuf>, requested: &Path| {
        let Some(handler) = handler else {
            return;
        };
        let ok = loaded.is_some();
        let used = loaded.as_deref().unwrap_or(requested);
        let used = to_c_string(&used.to_string_lossy());
        handler(done_context.as_ptr(), u8::from(ok), used.as_ptr());
    };
    let Some((host, flow, context)) = settings_target(dlg_context) else {
        report(None, &requested);
        return;
    };
    host.runtime.spawn(async move {
        let loaded = flow
            .load_owner_key(&context, &requested, create_key == 1)
            .await
            .ok();
        report(loaded, &requested);
    });
}

/// C FFI: saves the edited device settings in the background, then calls
/// `on_done(dlg_context, ok)`.
///
/// # Safety
///
/// `device_name` and `device_passphrase` must be null or NUL-terminated
/// strings valid for the call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sn_settings_save(
    dlg_context: *mut c_void,
    device_name: *const c_char,
    device_passphrase: *const c_char,
    unlocked_timeout: c_int,
    on_done: Option<SnDoneFn>,
) {
    // SAFETY: forwarded from this function's contract.
    let (device_name, device_passphrase) =
        unsafe { (from_c_string(device_name), from_c_string(device_passphrase)) };
    let done_context = HostPtr::new(dlg_context);
    let notify_done = move |ok: bool| {
        if let Some(on_done) = on_done {
            on_done(done_context.as_ptr(), u8::from(ok));
        }
    };
    let Some((host, flow, context)) = settings_target(dlg_context) else {
        notify_done(false);
        return;
    };
    let update = SettingsUpdate {
        device_name: device_name.unwrap_or_default(),
        device_passphrase: device_passphrase.unwrap_or_default(),
        unlocked_timeout,
    };
    host.runtime.spawn(async move {
        notify_done(flow.save(&context, update).await.is_ok());
    });
}
