#![cfg_attr(test, allow(clippy::expect_used))]

//! Dialog and session-status bridge between the SpaceNet core and a native
//! UI host.
//!
//! Logic code asks a [`UiSessionAdapter`] for messages, input or progress.
//! Each request becomes a [`DialogSession`] whose [`CorrelationToken`] travels
//! to the host with the "show" call and comes back with the user's answer,
//! which [`PendingReplies`] hands to exactly one waiter. Independently, the
//! [`SessionStatusMachine`] evaluates the configuration/authentication
//! lifecycle and pushes each status to every subscribed listener.
//!
//! The [`ffi`] module exposes the same operations over a C ABI.

pub mod adapter;
pub mod bridge;
pub mod config;
pub mod dialog;
pub mod error;
pub mod ffi;
pub mod lifecycle;
pub mod logging;
pub mod pending;
pub mod registry;
pub mod reply;
pub mod session;
pub mod settings;
pub mod status;
pub mod token;

pub use adapter::{CancelHandle, MessageLevel, ProgressStyle, UiSessionAdapter};
pub use bridge::{DialogBridge, DialogSpec};
pub use config::{BridgeConfig, BuildProfile};
pub use dialog::{AccessoryKind, DialogHandle, DialogKind, DialogRequest, DispatchHint};
pub use error::{BridgeError, Result};
pub use lifecycle::{AuthService, ConfigOpen, ConfigStore, SessionStatusMachine};
pub use pending::PendingReplies;
pub use registry::{DismissDialog, PresentationContextId, PresentationRegistry, ShowDialog};
pub use reply::{DialogOutcome, ReplyReceiver};
pub use session::DialogSession;
pub use settings::{
    DeviceOwner, DeviceSettings, DeviceSettingsFlow, SettingsService, SettingsUpdate,
};
pub use status::{SessionStatus, StatusBroadcaster, StatusListener};
pub use token::CorrelationToken;
