//! XTextureExtractor viewer entry point.
//!
//! ```text
//! xtex-viewer                          Discover via BECN and stream
//! xtex-viewer --address 192.168.1.50   Manual address, skip discovery
//! xtex-viewer --config <path>          Use custom config TOML
//! xtex-viewer --gen-config             Dump default config and exit
//! ```
//!
//! This is a console stand-in for a graphical presentation layer: it
//! prints status lines, lists the window names of each handshake, and
//! keeps the settings file in sync with selection/address changes.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use xtex_core::{Command, ConnectionManager, Notification, PngDecoder};
use xtex_viewer::config::{SettingsStore, ViewerConfig};
use xtex_viewer::discovery::BecnDiscovery;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "xtex-viewer", about = "XTextureExtractor texture stream viewer")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "xtex-viewer.toml")]
    config: PathBuf,

    /// Plugin address (overrides config; skips BECN discovery).
    #[arg(short, long)]
    address: Option<String>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        println!("{}", toml::to_string_pretty(&ViewerConfig::default())?);
        return Ok(());
    }

    let mut config = ViewerConfig::load(&cli.config);
    if let Some(address) = cli.address {
        config.network.manual_address = address;
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("xtex-viewer v{}", env!("CARGO_PKG_VERSION"));

    let discovery = BecnDiscovery::new(
        xtex_core::BECN_GROUP,
        xtex_core::BECN_PORT,
        Duration::from_secs(config.network.becn_timeout_secs),
    );
    let (manager, commands, mut notify) = ConnectionManager::new(
        config.manager_config(),
        Arc::new(discovery),
        Arc::new(PngDecoder),
    );
    let mut store = SettingsStore::new(cli.config.clone(), config);

    let runner = tokio::spawn(manager.run());
    commands.send(Command::Start).await?;

    let mut window_names: Vec<String> = Vec::new();
    let mut frames: u64 = 0;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                let _ = commands.send(Command::Shutdown).await;
                break;
            }
            notification = notify.recv() => {
                let Some(notification) = notification else { break };
                match notification {
                    Notification::Status(text) => {
                        println!("{}", text.replace('\n', " | "));
                    }
                    Notification::WindowsChanged(names) => {
                        info!("windows: [{}]", names.join(", "));
                        window_names = names;
                    }
                    Notification::WindowImage { window_id, pixels } => {
                        frames += 1;
                        // One line per second of stream, not per frame.
                        if frames % 60 == 1 {
                            let name = window_names
                                .get(window_id as usize)
                                .map(String::as_str)
                                .unwrap_or("?");
                            info!("window {window_id} [{name}]: {pixels}, {frames} frames total");
                        }
                    }
                    Notification::SelectionChanged(selection) => store.set_selection(selection),
                    Notification::ManualAddressChanged(address) => {
                        store.set_manual_address(address);
                    }
                }
            }
        }
    }

    drop(commands);
    let _ = tokio::time::timeout(Duration::from_secs(5), runner).await;
    Ok(())
}
