//! keymouse daemon
//!
//! Grabs keyboards, recognizes combos and drives a virtual mouse according to
//! the configured modes.

mod combo_preparation;
mod combo_watcher;
mod device;
mod engine;
mod error;
mod injector;
mod listeners;
mod mode_controller;
mod state;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use evdev::{EventType, InputEvent, Key};
use keymouse_config::Command;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing_subscriber::EnvFilter;

use crate::combo_preparation::KeyEvent;
use crate::engine::{Disposition, Engine};
use crate::error::ModeError;
use crate::injector::VirtualDevice;
use crate::listeners::{LoggingCursor, LoggingModeListener};
use crate::mode_controller::{ModeController, ModeListener};

#[derive(Parser, Debug)]
#[command(name = "keymoused")]
#[command(about = "Keyboard-driven mouse control daemon")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "~/.config/keymouse/config.kdl")]
    config: String,
}

enum DeviceMessage {
    Event(InputEvent),
    Disconnected(PathBuf),
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Expand tilde in config path
    let config_path: PathBuf = shellexpand::tilde(&args.config).into_owned().into();
    let config = keymouse_config::parse_config(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.global.log_level.as_filter())),
        )
        .init();

    tracing::info!(
        "Loaded configuration from {} with {} mode(s)",
        config_path.display(),
        config.modes.len()
    );

    let listeners: Vec<Box<dyn ModeListener>> = vec![Box::new(LoggingModeListener)];
    let controller = ModeController::new(
        config.modes,
        &config.global.initial_mode,
        Box::new(LoggingCursor::default()),
        listeners,
    )?;
    let mut engine = Engine::new(controller);

    let keyboards = device::open_keyboards()?;
    if keyboards.is_empty() {
        anyhow::bail!("No keyboard found under /dev/input");
    }

    let (tx, mut rx) = mpsc::channel::<DeviceMessage>(256);
    for mut keyboard in keyboards {
        device::grab(&mut keyboard)?;
        tracing::info!("Grabbed {} ({})", keyboard.name, keyboard.path.display());

        let path = keyboard.path;
        let mut stream = keyboard
            .device
            .into_event_stream()
            .with_context(|| format!("Failed to read events from {}", path.display()))?;
        let tx = tx.clone();
        tokio::spawn(async move {
            loop {
                match stream.next_event().await {
                    Ok(event) => {
                        if tx.send(DeviceMessage::Event(event)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Lost {}: {}", path.display(), e);
                        let _ = tx.send(DeviceMessage::Disconnected(path)).await;
                        break;
                    }
                }
            }
        });
    }
    drop(tx);

    let mut virtual_device = VirtualDevice::new("keymouse")?;

    let mut ticker = tokio::time::interval(config.global.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_tick = Instant::now();

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    tracing::info!("keymouse daemon started in {}", engine.current_mode().name);

    loop {
        tokio::select! {
            message = rx.recv() => match message {
                Some(DeviceMessage::Event(event)) => {
                    handle_event(&mut engine, &mut virtual_device, event)?;
                }
                Some(DeviceMessage::Disconnected(path)) => {
                    tracing::debug!("Interrupting combos after losing {}", path.display());
                    engine.interrupt();
                }
                None => {
                    tracing::warn!("All keyboards are gone");
                    break;
                }
            },
            _ = ticker.tick() => {
                let now = Instant::now();
                let delta = now.duration_since(last_tick);
                last_tick = now;
                let outcome = engine.tick(delta);
                log_errors(&outcome.errors);
                run_commands(&mut virtual_device, &outcome.commands)?;
            }
            _ = &mut shutdown => {
                tracing::info!("Shutting down...");
                break;
            }
        }
    }

    Ok(())
}

fn handle_event(
    engine: &mut Engine,
    virtual_device: &mut VirtualDevice,
    event: InputEvent,
) -> Result<()> {
    match event.event_type() {
        // The virtual device terminates every batch itself.
        EventType::SYNCHRONIZATION => Ok(()),
        EventType::KEY => {
            let key = Key::new(event.code());
            let now = Instant::now();
            let key_event = match event.value() {
                0 => KeyEvent::release(key, now),
                // 1 is a press, 2 an autorepeat of a held key
                _ => KeyEvent::press(key, now),
            };
            let outcome = engine.on_key_event(key_event);
            log_errors(&outcome.errors);
            if outcome.disposition == Disposition::Forward {
                virtual_device.emit(&[event])?;
            }
            run_commands(virtual_device, &outcome.commands)
        }
        _ => virtual_device.emit(&[event]),
    }
}

fn log_errors(errors: &[ModeError]) {
    for e in errors {
        tracing::error!("{}", e);
    }
}

/// Emit the mouse buttons pressed or released by commands.
fn run_commands(virtual_device: &mut VirtualDevice, commands: &[Command]) -> Result<()> {
    for command in commands {
        match command {
            Command::PressButton(button) => virtual_device.press_button(*button)?,
            Command::ReleaseButton(button) => virtual_device.release_button(*button)?,
            _ => {}
        }
    }
    Ok(())
}
