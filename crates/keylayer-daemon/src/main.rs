//! KeyLayer daemon entry point.
//!
//! Wires the HID backend, capture sessions, macro engine and profile store
//! together and runs them on the Tokio runtime.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load AppConfig (TOML) and init tracing
//!  └─ run
//!       ├─ DeviceMonitor      (rescan every scan_interval_secs)
//!       ├─ IsolationRegistry  (one CaptureSession per isolated device)
//!       ├─ event pump         (KeyPressed → EventDispatcher)
//!       └─ EventDispatcher    (one worker per device → ProcessKeysUseCase)
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use keylayer_core::{InterfacePath, KeyLayerEvent};
use keylayer_daemon::application::dispatch::EventDispatcher;
use keylayer_daemon::application::enumerate_devices::DeviceEnumerator;
use keylayer_daemon::application::hotplug::DeviceMonitor;
use keylayer_daemon::application::interpreter::MacroInterpreter;
use keylayer_daemon::application::isolation::IsolationRegistry;
use keylayer_daemon::application::process_keys::ProcessKeysUseCase;
use keylayer_daemon::infrastructure::environment::SystemEnvironment;
use keylayer_daemon::infrastructure::executor::SystemExecutor;
use keylayer_daemon::infrastructure::hid::hidapi_backend::HidapiBackend;
use keylayer_daemon::infrastructure::storage::config::{self, AppConfig};
use keylayer_daemon::infrastructure::storage::profiles::JsonProfileStore;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// KeyLayer: dedicated macro keyboards.
///
/// Takes exclusive control of selected HID keyboards and runs the macros
/// mapped to their keys instead of typing.
#[derive(Debug, Parser)]
#[command(name = "keylayer", about = "Turn spare keyboards into macro pads", version)]
struct Cli {
    /// Config file to use instead of the platform default.
    #[arg(long, global = true, env = "KEYLAYER_CONFIG")]
    config: Option<PathBuf>,

    /// Profile file, overriding `daemon.profiles_file`.
    #[arg(long, global = true, env = "KEYLAYER_PROFILES")]
    profiles: Option<PathBuf>,

    /// Log filter used when `RUST_LOG` is unset, overriding `daemon.log_level`.
    #[arg(long, global = true, env = "KEYLAYER_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print candidate keyboards and their sibling interfaces.
    List,
    /// Scan, isolate and run macros until Ctrl+C (the default).
    Run {
        /// Isolate the device owning this interface path at startup.
        #[arg(long = "isolate", value_name = "PATH")]
        isolate: Vec<String>,
    },
}

/// Configuration resolved from the CLI and the config file.
struct Settings {
    config: AppConfig,
    config_dir: PathBuf,
}

impl Cli {
    fn load_settings(&self) -> anyhow::Result<Settings> {
        let (mut config, config_dir) = match &self.config {
            Some(path) => {
                let config = config::load_config_from(path)
                    .with_context(|| format!("loading config from {}", path.display()))?;
                let dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
                (config, dir)
            }
            None => {
                let dir = config::config_dir().context("locating the config directory")?;
                let config = config::load_config().context("loading config")?;
                (config, dir)
            }
        };

        if let Some(profiles) = &self.profiles {
            config.daemon.profiles_file = Some(profiles.clone());
        }
        if let Some(level) = &self.log_level {
            config.daemon.log_level = level.clone();
        }
        Ok(Settings { config, config_dir })
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = cli.load_settings()?;

    // `RUST_LOG` wins; otherwise the configured level applies.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::try_new(&settings.config.daemon.log_level)
                .unwrap_or_else(|_| EnvFilter::new("info"))
        }))
        .init();

    let backend = HidapiBackend::new().context("initialising the HID subsystem")?;
    let enumerator = Arc::new(
        DeviceEnumerator::new(Arc::new(backend)).with_extra_vendors(
            settings
                .config
                .capture
                .extra_keyboard_vendors
                .iter()
                .copied(),
        ),
    );

    match cli.command.unwrap_or(Command::Run {
        isolate: Vec::new(),
    }) {
        Command::List => {
            list_keyboards(&enumerator);
            Ok(())
        }
        Command::Run { isolate } => run(settings, enumerator, isolate).await,
    }
}

fn list_keyboards(enumerator: &DeviceEnumerator) {
    let devices = enumerator.list_candidate_keyboards();
    if devices.is_empty() {
        println!("no keyboards found");
    }
    for device in devices {
        println!("{}", device.id());
        for path in &device.interfaces {
            println!("    {path}");
        }
    }
}

async fn run(
    settings: Settings,
    enumerator: Arc<DeviceEnumerator>,
    isolate: Vec<String>,
) -> anyhow::Result<()> {
    let Settings { config, config_dir } = settings;
    info!(version = env!("CARGO_PKG_VERSION"), "KeyLayer starting");

    // ── Macro engine ──────────────────────────────────────────────────────────
    let profiles_path = config.profiles_path(&config_dir);
    let store = JsonProfileStore::open(&profiles_path)
        .with_context(|| format!("loading profiles from {}", profiles_path.display()))?;
    let interpreter = MacroInterpreter::new(
        Arc::new(SystemExecutor::new()),
        Arc::new(SystemEnvironment::new()),
    );
    let keys = Arc::new(
        ProcessKeysUseCase::new(Arc::new(store), Arc::new(interpreter))
            .with_recording(config.macros.recording_enabled),
    );
    let mut dispatcher = EventDispatcher::new(Arc::clone(&keys));

    // ── Capture ───────────────────────────────────────────────────────────────
    let (isolation, mut events) = IsolationRegistry::new(enumerator, config.capture.settings());
    let isolation = Arc::new(isolation);
    let mut monitor = DeviceMonitor::new(
        Arc::clone(&isolation),
        config.auto_isolate_devices().cloned(),
    );
    monitor.scan().await;

    for path in isolate {
        let path = InterfacePath::new(path);
        if isolation.isolate(&path).await {
            info!(%path, "isolated");
        } else {
            warn!(%path, "could not isolate");
        }
    }

    let mut scan = tokio::time::interval(Duration::from_secs(config.daemon.scan_interval_secs.max(1)));
    scan.set_missed_tick_behavior(MissedTickBehavior::Skip);
    scan.tick().await;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!("KeyLayer ready.  Press Ctrl+C to exit.");

    // ── Main loop ─────────────────────────────────────────────────────────────
    loop {
        tokio::select! {
            result = &mut shutdown => {
                match result {
                    Ok(()) => info!("shutdown signal received"),
                    Err(e) => error!("failed to listen for Ctrl+C: {e}"),
                }
                break;
            }
            _ = scan.tick() => {
                monitor.scan().await;
            }
            Some(event) = events.recv() => handle_event(&mut dispatcher, event),
        }
    }

    // ── Shutdown ──────────────────────────────────────────────────────────────
    keys.stop_running();
    dispatcher.shutdown().await;
    if config.daemon.release_on_exit {
        isolation.release_all().await;
    }
    info!("KeyLayer stopped");
    Ok(())
}

fn handle_event(dispatcher: &mut EventDispatcher, event: KeyLayerEvent) {
    match event {
        KeyLayerEvent::KeyPressed(key) => dispatcher.dispatch(key),
        KeyLayerEvent::DeviceConnected(device) => {
            info!(device = %device.id(), interfaces = device.interfaces.len(), "device connected");
        }
        KeyLayerEvent::DeviceDisconnected(device) => {
            info!(device = %device.id(), "device disconnected");
            dispatcher.remove_device(&device.id());
        }
        KeyLayerEvent::ActiveInterfaceChanged { device_id, interface } => {
            debug!(device = %device_id, %interface, "active interface changed");
        }
        KeyLayerEvent::SessionClosed { device_id, reason } => {
            warn!(device = %device_id, %reason, "capture session closed");
            dispatcher.remove_device(&device_id);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
