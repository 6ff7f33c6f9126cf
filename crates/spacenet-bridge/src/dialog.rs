use std::fmt;
use std::num::NonZeroUsize;

use serde::Serialize;

use crate::registry::PresentationContextId;
use crate::token::CorrelationToken;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogKind {
    #[default]
    App = 0,
    Notify = 1,
    Alert = 2,
    Error = 3,
}

impl DialogKind {
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::App => "app",
            Self::Notify => "notify",
            Self::Alert => "alert",
            Self::Error => "error",
        }
    }
}

/// Input affordance attached to a dialog.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessoryKind {
    #[default]
    None = 0,
    YesNo = 1,
    OkCancel = 2,
    TextInput = 3,
    SecureInput = 4,
    SecureInputWithVerify = 5,
    FileInput = 6,
    Spinner = 7,
    ProgressBar = 8,
}

impl AccessoryKind {
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::YesNo => "yes-no",
            Self::OkCancel => "ok-cancel",
            Self::TextInput => "text",
            Self::SecureInput => "secure",
            Self::SecureInputWithVerify => "secure-with-verify",
            Self::FileInput => "file",
            Self::Spinner => "spinner",
            Self::ProgressBar => "progress-bar",
        }
    }

    /// Whether the reply carries user-entered text rather than a button.
    #[must_use]
    pub fn collects_text(self) -> bool {
        matches!(
            self,
            Self::TextInput | Self::SecureInput | Self::SecureInputWithVerify | Self::FileInput
        )
    }
}

/// Where the host should present the dialog. Settings flows run against a
/// background presenter; everything else is foreground.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchHint {
    #[default]
    Foreground,
    Background,
}

/// Host-owned identifier of one on-screen dialog. Never zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DialogHandle(NonZeroUsize);

impl DialogHandle {
    #[must_use]
    pub fn from_raw(raw: usize) -> Option<Self> {
        NonZeroUsize::new(raw).map(Self)
    }

    #[must_use]
    pub fn as_raw(self) -> usize {
        self.0.get()
    }
}

impl fmt::Display for DialogHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0.get())
    }
}

/// Everything a show capability needs to put a dialog on screen.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DialogRequest {
    pub context: PresentationContextId,
    pub token: CorrelationToken,
    pub kind: DialogKind,
    pub title: String,
    pub message: String,
    pub accessory: AccessoryKind,
    pub accessory_text: String,
    pub dispatch: DispatchHint,
}

#[cfg(test)]
mod tests {
    use super::{AccessoryKind, DialogHandle, DialogKind};

    #[test]
    fn dialog_kind_codes_match_host_constants() {
        assert_eq!(DialogKind::App.to_u8(), 0);
        assert_eq!(DialogKind::Notify.to_u8(), 1);
        assert_eq!(DialogKind::Alert.to_u8(), 2);
        assert_eq!(DialogKind::Error.to_u8(), 3);
    }

    #[test]
    fn accessory_codes_match_host_constants() {
        let accessories = [
            AccessoryKind::None,
            AccessoryKind::YesNo,
            AccessoryKind::OkCancel,
            AccessoryKind::TextInput,
            AccessoryKind::SecureInput,
            AccessoryKind::SecureInputWithVerify,
            AccessoryKind::FileInput,
            AccessoryKind::Spinner,
            AccessoryKind::ProgressBar,
        ];
        for (code, accessory) in (0_u8..).zip(accessories) {
            assert_eq!(accessory.to_u8(), code, "{accessory:?}");
        }
        assert_eq!(AccessoryKind::YesNo.as_str(), "yes-no");
    }

    #[test]
    fn wire_enums_serialize_in_snake_case() {
        assert_eq!(
            serde_json::to_string(&AccessoryKind::SecureInputWithVerify).expect("serializable"),
            "\"secure_input_with_verify\""
        );
        assert_eq!(
            serde_json::to_string(&DialogKind::Alert).expect("serializable"),
            "\"alert\""
        );
    }

    #[test]
    fn accessory_classification() {
        assert!(AccessoryKind::SecureInputWithVerify.collects_text());
        assert!(AccessoryKind::FileInput.collects_text());
        assert!(!AccessoryKind::YesNo.collects_text());
        assert!(!AccessoryKind::Spinner.collects_text());
    }

    #[test]
    fn null_handles_are_rejected() {
        assert!(DialogHandle::from_raw(0).is_none());
        let handle = DialogHandle::from_raw(0x10).expect("non-null handle");
        assert_eq!(handle.as_raw(), 0x10);
        assert_eq!(handle.to_string(), "0x10");
    }
}
