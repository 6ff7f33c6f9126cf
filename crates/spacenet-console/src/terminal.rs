//! Presents bridge dialogs on the terminal and answers them from stdin.

use std::io::{BufRead, Write};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Weak};

use serde::Serialize;
use spacenet_bridge::{
    AccessoryKind, CorrelationToken, DialogBridge, DialogHandle, DialogKind, DialogOutcome,
    DialogRequest, DismissDialog, DispatchHint, PresentationContextId, ShowDialog,
};

/// Typing this at any prompt cancels the dialog.
pub const CANCEL_WORD: &str = "!cancel";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Serialize)]
struct DialogView<'a> {
    event: &'static str,
    token: u64,
    kind: DialogKind,
    title: &'a str,
    message: &'a str,
    accessory: AccessoryKind,
    accessory_text: &'a str,
    dispatch: DispatchHint,
}

impl<'a> DialogView<'a> {
    fn new(request: &'a DialogRequest) -> Self {
        Self {
            event: "dialog",
            token: request.token.as_u64(),
            kind: request.kind,
            title: &request.title,
            message: &request.message,
            accessory: request.accessory,
            accessory_text: &request.accessory_text,
            dispatch: request.dispatch,
        }
    }
}

/// Whether the terminal waits for the user to answer this accessory.
#[must_use]
pub fn expects_answer(accessory: AccessoryKind) -> bool {
    accessory.collects_text() || matches!(accessory, AccessoryKind::YesNo | AccessoryKind::OkCancel)
}

/// Maps one typed line to the reply sent back through the bridge. `None`
/// is end of input.
#[must_use]
pub fn reply_for(accessory: AccessoryKind, line: Option<&str>) -> DialogOutcome {
    let Some(line) = line.map(str::trim) else {
        return DialogOutcome::Cancelled;
    };
    if line == CANCEL_WORD {
        return DialogOutcome::Cancelled;
    }
    match accessory {
        AccessoryKind::OkCancel if line.eq_ignore_ascii_case("cancel") => DialogOutcome::Cancelled,
        AccessoryKind::OkCancel => DialogOutcome::Answered(String::new()),
        _ => DialogOutcome::Answered(line.to_string()),
    }
}

fn prompt_for(accessory: AccessoryKind) -> &'static str {
    match accessory {
        AccessoryKind::YesNo => "[Y/n]",
        AccessoryKind::OkCancel => "[ok/cancel]",
        AccessoryKind::SecureInput | AccessoryKind::SecureInputWithVerify => "secret (echoed)>",
        AccessoryKind::FileInput => "path>",
        _ => ">",
    }
}

/// Show and dismiss capabilities backed by stdout. Dialogs that need an
/// answer are queued for the input thread.
pub struct TerminalHost {
    format: OutputFormat,
    answers: Sender<DialogRequest>,
}

impl TerminalHost {
    /// Registers the terminal as `context` on `bridge` and starts the thread
    /// reading answers from stdin.
    pub fn attach(
        bridge: &Arc<DialogBridge>,
        context: &PresentationContextId,
        format: OutputFormat,
    ) -> std::io::Result<std::thread::JoinHandle<()>> {
        let (answers, queued) = channel();
        let host = Arc::new(Self { format, answers });
        bridge
            .registry()
            .register(context, Some(Arc::clone(&host) as Arc<dyn ShowDialog>));
        bridge
            .registry()
            .set_dismiss_capability(context, Some(host as Arc<dyn DismissDialog>));
        let bridge = Arc::downgrade(bridge);
        std::thread::Builder::new()
            .name("spacenet-console-input".to_string())
            .spawn(move || answer_loop(&bridge, &queued, format))
    }

    fn render(&self, request: &DialogRequest) {
        match self.format {
            OutputFormat::Json => print_json(&DialogView::new(request)),
            OutputFormat::Text => {
                println!();
                println!(
                    "== {} [{}] {} ==",
                    request.kind.as_str().to_uppercase(),
                    request.token,
                    request.title
                );
                if !request.message.is_empty() {
                    println!("{}", request.message);
                }
                match request.accessory {
                    AccessoryKind::Spinner => println!("(working...)"),
                    AccessoryKind::ProgressBar if !request.accessory_text.is_empty() => {
                        println!("(progress {}%)", request.accessory_text);
                    }
                    AccessoryKind::None if !request.accessory_text.is_empty() => {
                        println!("  {}", request.accessory_text);
                    }
                    _ => {}
                }
            }
        }
    }
}

impl ShowDialog for TerminalHost {
    fn show(&self, request: &DialogRequest) -> Option<DialogHandle> {
        self.render(request);
        if expects_answer(request.accessory) && self.answers.send(request.clone()).is_err() {
            tracing::warn!(token = %request.token, "Terminal input closed, dialog not shown");
            return None;
        }
        DialogHandle::from_raw(request.token.as_u64() as usize)
    }
}

impl DismissDialog for TerminalHost {
    fn dismiss(&self, _handle: DialogHandle, token: CorrelationToken) {
        match self.format {
            OutputFormat::Json => print_json(&serde_json::json!({
                "event": "dismiss",
                "token": token.as_u64(),
            })),
            OutputFormat::Text => println!("-- {token} closed --"),
        }
    }
}

fn answer_loop(
    bridge: &Weak<DialogBridge>,
    queued: &Receiver<DialogRequest>,
    format: OutputFormat,
) {
    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    for request in queued {
        let Some(bridge) = bridge.upgrade() else {
            return;
        };
        if !bridge.pending().is_pending(request.token) {
            continue;
        }
        let mut read_line = || {
            if format == OutputFormat::Text {
                print!("{} {} ", request.token, prompt_for(request.accessory));
                if let Err(error) = std::io::stdout().flush() {
                    tracing::debug!(%error, "Could not flush the prompt");
                }
            }
            lines.next().and_then(Result::ok)
        };
        let first = read_line();
        let outcome = match (request.accessory, reply_for(request.accessory, first.as_deref())) {
            (AccessoryKind::SecureInputWithVerify, DialogOutcome::Answered(secret)) => {
                match reply_for(request.accessory, read_line().as_deref()) {
                    DialogOutcome::Answered(again) if again == secret => {
                        DialogOutcome::Answered(secret)
                    }
                    _ => {
                        tracing::warn!(token = %request.token, "Entries did not match");
                        DialogOutcome::Cancelled
                    }
                }
            }
            (_, outcome) => outcome,
        };
        bridge.deliver(request.token, outcome);
    }
}

fn print_json(value: &impl Serialize) {
    match serde_json::to_string(value) {
        Ok(line) => println!("{line}"),
        Err(error) => tracing::warn!(%error, "Could not encode terminal event"),
    }
}
