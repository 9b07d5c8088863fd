//! MonsGeek M5W bridge daemon
//!
//! Long-running process meant to be supervised by systemd: start at
//! boot, restart on crash. Needs access to /dev/uinput and the
//! keyboard's hidraw node, so it typically runs as root or with a udev
//! rule granting both.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod cli;
use cli::{Cli, Commands};

use monsgeek_bridge::{Bridge, BridgeConfig, HidLocator, VirtualKeyboard};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("monsgeek_bridge=info")),
        )
        .init();

    match cli.command {
        Some(Commands::List) => list_interfaces(),
        Some(Commands::Run) | None => run_bridge(&cli),
    }
}

fn run_bridge(cli: &Cli) -> anyhow::Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    ctrlc::set_handler(move || {
        running_clone.store(false, Ordering::SeqCst);
    })
    .context("install Ctrl-C handler")?;

    // Resource failures here are fatal: a clear diagnostic and a
    // non-zero exit beat retrying something privileges won't allow
    let locator = HidLocator::new().context("initialize HID enumeration")?;
    let keyboard = VirtualKeyboard::create()
        .context("create uinput virtual keyboard (is /dev/uinput accessible?)")?;
    info!(
        "Virtual keyboard \"{}\" ready, looking for {:04X}:{:04X}",
        monsgeek_bridge::virtual_kbd::DEVICE_NAME,
        monsgeek_bridge::VENDOR_ID,
        monsgeek_bridge::PID_M5W_WIRED,
    );

    let config = BridgeConfig {
        poll_interval: Duration::from_millis(cli.poll_interval_ms),
        read_timeout_ms: cli.read_timeout_ms as i32,
        ..BridgeConfig::default()
    };

    let mut bridge = Bridge::new(locator, keyboard, config, running);
    bridge.run().context("bridge loop failed")?;

    info!("Shutdown complete");
    Ok(())
}

fn list_interfaces() -> anyhow::Result<()> {
    let interfaces =
        monsgeek_bridge::discovery::scan_interfaces().context("enumerate HID devices")?;

    if interfaces.is_empty() {
        println!("No MonsGeek keyboard found (is it in wired mode?)");
        return Ok(());
    }

    for iface in interfaces {
        let marker = if iface.selected { "*" } else { " " };
        println!(
            "{} {:04X}:{:04X} if={} usage={:04X}:{:04X} {} {}",
            marker,
            iface.vid,
            iface.pid,
            iface.interface_number,
            iface.usage_page,
            iface.usage,
            iface.path,
            iface.product.as_deref().unwrap_or("-"),
        );
    }
    println!("\n* = boot-keyboard interface the bridge attaches to");
    Ok(())
}
