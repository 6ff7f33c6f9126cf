#![allow(clippy::print_stdout, clippy::print_stderr)]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Terminal host for the SpaceNet dialog bridge.
//!
//! Plays the part of the native UI: dialogs are printed to stdout, answers
//! are read from stdin and session status changes are printed as they are
//! published.

mod scripted;
mod terminal;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::json;
use spacenet_bridge::{
    BridgeConfig, ConfigStore, DeviceSettingsFlow, DialogBridge, PresentationContextId,
    SessionStatus, SessionStatusMachine, SettingsUpdate, UiSessionAdapter, logging,
};

use crate::scripted::{ConsoleAuth, ConsoleSettings, MemoryConfig};
use crate::terminal::{OutputFormat, TerminalHost};

const CONSOLE_CONTEXT: &str = "console";

#[derive(Parser)]
#[command(name = "spacenet-console")]
#[command(about = "Terminal presentation host for the SpaceNet dialog and status bridge")]
struct Cli {
    /// Output format for dialogs and status changes.
    #[arg(long, value_enum, default_value_t = Format::Text, global = true)]
    format: Format,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Text,
    Json,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Text => Self::Text,
            Format::Json => Self::Json,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show one text input dialog and print what comes back.
    DialogTest,
    /// Walk through unlock, login and logout against in-memory collaborators.
    Session(SessionArgs),
}

#[derive(Args)]
struct SessionArgs {
    /// Passphrase the in-memory config is encrypted with.
    #[arg(long)]
    config_passphrase: Option<String>,
    /// Passphrase supplied at unlock; falls back to SPACENET_SYSTEM_PASSPHRASE.
    #[arg(long)]
    passphrase: Option<String>,
    /// Start with an initialized configuration.
    #[arg(long)]
    initialized: bool,
    /// Start with a still valid login token.
    #[arg(long)]
    token_valid: bool,
    #[arg(long, default_value = "owner")]
    user: String,
    #[arg(long, default_value = "spacenet")]
    password: String,
    /// Make every configuration save fail.
    #[arg(long)]
    read_only: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = BridgeConfig::from_env();
    logging::init(&config);

    let bridge = DialogBridge::current()?;
    let context = PresentationContextId::new(CONSOLE_CONTEXT).context("console context id")?;
    let format = OutputFormat::from(cli.format);
    TerminalHost::attach(&bridge, &context, format).context("start terminal input")?;
    let ui = UiSessionAdapter::new(Arc::clone(&bridge), context).with_config(&config);

    match cli.command {
        Commands::DialogTest => run_dialog_test(&ui, format).await,
        Commands::Session(args) => run_session(&bridge, &ui, &config, format, args).await,
    }
}

async fn run_dialog_test(ui: &UiSessionAdapter, format: OutputFormat) -> Result<()> {
    let input = ui
        .prompt_input("Test Input", "Please enter some test text input.", "")
        .await;
    match format {
        OutputFormat::Json => println!("{}", json!({ "event": "input", "value": input })),
        OutputFormat::Text => match input {
            Some(text) => println!("Test Input: {text}"),
            None => println!("Input Canceled"),
        },
    }
    Ok(())
}

async fn run_session(
    bridge: &Arc<DialogBridge>,
    ui: &UiSessionAdapter,
    config: &BridgeConfig,
    format: OutputFormat,
    args: SessionArgs,
) -> Result<()> {
    bridge.subscribe_status(Arc::new(move |status: SessionStatus| {
        print_status(format, status);
    }));

    let store = Arc::new(
        MemoryConfig::new(
            args.config_passphrase,
            args.initialized,
            Some(args.user.clone()),
        )
        .failing_saves(args.read_only),
    );
    let settings = DeviceSettingsFlow::new(
        Arc::clone(bridge),
        Arc::new(ConsoleSettings::new(Arc::clone(&store), args.user.clone())),
    )
    .with_config(config);
    let auth = ConsoleAuth::new(args.user, args.password, args.token_valid);
    let machine = SessionStatusMachine::new(
        Arc::clone(bridge),
        Arc::clone(&store) as Arc<dyn ConfigStore>,
        Arc::new(auth),
    )
    .with_system_passphrase(config.system_passphrase.clone());

    if !machine.initialize(args.passphrase.as_deref(), Some(ui)).await {
        anyhow::bail!("configuration could not be loaded");
    }

    let mut passphrase = args.passphrase;
    if machine.last_status() == Some(SessionStatus::Locked) {
        let entered = ui
            .prompt_secure_input("Locked", "Device unlock passphrase")
            .await
            .context("unlock cancelled")?;
        if !machine.initialize(Some(&entered), Some(ui)).await {
            anyhow::bail!("configuration could not be unlocked");
        }
        passphrase = Some(entered);
    }
    if machine.last_status() == Some(SessionStatus::NeedsInit) {
        set_up_device(ui, &settings).await?;
        if !machine.initialize(passphrase.as_deref(), Some(ui)).await {
            anyhow::bail!("configuration could not be reloaded after setup");
        }
    }

    if !machine.eula_accepted()
        && ui
            .prompt_yes_no("License", "Do you accept the end user license agreement?")
            .await
            == Some(true)
    {
        machine.accept_eula()?;
    }

    if matches!(
        machine.last_status(),
        Some(SessionStatus::NeedsLogin | SessionStatus::LoggedOut)
    ) {
        machine.login(ui).await?;
    }
    if let Some(user) = machine.logged_in_user() {
        let owner = if machine.is_logged_in_user_owner() {
            " (device owner)"
        } else {
            ""
        };
        ui.show_note_message("Session", "Logged in", &format!("{user}{owner}"));
    }

    if ui.prompt_yes_no("Session", "Log out now?").await == Some(true) {
        machine.logout().await?;
    }
    Ok(())
}

/// First-time setup through the settings flow: names the device and saves.
async fn set_up_device(ui: &UiSessionAdapter, settings: &DeviceSettingsFlow) -> Result<()> {
    let current = settings.init(ui.context()).await?;
    let device_name = ui
        .prompt_input("Setup required", "Name this device", &current.device_name)
        .await
        .context("device setup cancelled")?;
    let device_name = if device_name.trim().is_empty() {
        current.device_name
    } else {
        device_name
    };
    settings
        .save(
            ui.context(),
            SettingsUpdate {
                device_name,
                device_passphrase: current.device_passphrase,
                unlocked_timeout: current.unlocked_timeout,
            },
        )
        .await?;
    Ok(())
}

fn print_status(format: OutputFormat, status: SessionStatus) {
    match format {
        OutputFormat::Json => println!(
            "{}",
            json!({ "event": "status", "status": status, "code": status.to_u8() })
        ),
        OutputFormat::Text => println!("** status: {status} **"),
    }
}
