//! keymouse CLI
//!
//! Configuration checking and inspection tool for keymouse.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use keymouse_config::{Config, Mode};
use miette::IntoDiagnostic;

#[derive(Parser, Debug)]
#[command(name = "keymouse")]
#[command(about = "Keyboard-driven mouse control")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "~/.config/keymouse/config.kdl")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate the configuration file
    Validate,

    /// List available input devices
    Devices,

    /// Print the combos of a mode and the commands they run
    Combos {
        /// Mode name
        mode: String,
    },
}

fn main() -> miette::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    // Expand tilde in config path
    let config_path: PathBuf = shellexpand::tilde(&cli.config).into_owned().into();

    match cli.command {
        Commands::Validate => cmd_validate(&config_path),
        Commands::Devices => cmd_devices(),
        Commands::Combos { mode } => cmd_combos(&config_path, &mode),
    }
}

fn cmd_validate(config_path: &Path) -> miette::Result<()> {
    println!("Validating configuration: {}", config_path.display());

    let config = keymouse_config::parse_config(config_path)?;
    println!("Configuration is valid!");
    for line in summary(&config) {
        println!("{}", line);
    }
    Ok(())
}

fn cmd_devices() -> miette::Result<()> {
    println!("Available input devices:\n");

    let mut paths = Vec::new();
    for entry in std::fs::read_dir("/dev/input").into_diagnostic()? {
        let path = entry.into_diagnostic()?.path();
        if path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("event"))
        {
            paths.push(path);
        }
    }
    paths.sort();

    for path in paths {
        match evdev::Device::open(&path) {
            Ok(device) => {
                let name = device.name().unwrap_or("Unknown");
                let id = device.input_id();

                // Same test as the daemon uses before grabbing
                let is_keyboard = device.supported_events().contains(evdev::EventType::KEY)
                    && device
                        .supported_keys()
                        .is_some_and(|keys| keys.contains(evdev::Key::KEY_A));
                let device_type = if is_keyboard { "keyboard" } else { "other" };

                println!("  {} [{}]", name, device_type);
                println!("    Path: {}", path.display());
                println!("    ID: {:04x}:{:04x}", id.vendor(), id.product());
                println!();
            }
            Err(e) => {
                tracing::debug!("Could not open {}: {}", path.display(), e);
            }
        }
    }

    Ok(())
}

fn cmd_combos(config_path: &Path, mode_name: &str) -> miette::Result<()> {
    let config = keymouse_config::parse_config(config_path)?;
    let mode = config
        .modes
        .get(mode_name)
        .ok_or_else(|| miette::miette!("Unknown mode: {}", mode_name))?;

    for line in combo_lines(mode) {
        println!("{}", line);
    }
    Ok(())
}

fn summary(config: &Config) -> Vec<String> {
    let mut lines = vec![
        format!("  Initial mode: {}", config.global.initial_mode),
        format!("  Modes: {}", config.modes.len()),
    ];
    for mode in config.modes.iter() {
        let mut traits = vec![format!("{} combo(s)", mode.combo_map.len())];
        if let Some(timeout) = &mode.timeout {
            traits.push(format!(
                "timeout {}ms -> {}{}",
                timeout.duration.as_millis(),
                timeout.next_mode,
                if timeout.only_if_idle { " (idle)" } else { "" }
            ));
        }
        if mode.hide_cursor.enabled {
            traits.push(format!(
                "hides cursor after {}ms",
                mode.hide_cursor.idle_duration.as_millis()
            ));
        }
        if mode.push_to_history {
            traits.push("pushed to history".to_string());
        }
        lines.push(format!("    - {} ({})", mode.name, traits.join(", ")));
    }
    lines
}

fn combo_lines(mode: &Mode) -> Vec<String> {
    mode.combo_map
        .iter()
        .map(|(combo, commands)| {
            let commands: Vec<String> = commands.iter().map(ToString::to_string).collect();
            format!("{}  =>  {}", combo, commands.join(", "))
        })
        .collect()
}
