// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
mod config;
mod dispatch;
mod engine;
mod midi;
mod router;
mod server;
#[cfg(test)]
mod testutil;
mod watcher;

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{crate_version, Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{error, info};

use config::Config;
use dispatch::Dispatcher;
use router::Router;

const SYSTEMD_SERVICE: &str = r#"
[Unit]
Description=SoundFont instrument bank router

[Service]
Type=simple
Restart=on-failure
EnvironmentFile=-/etc/default/sf2router
ExecStart=/usr/local/bin/sf2router start "$SF2ROUTER_CONFIG"

[Install]
WantedBy=multi-user.target
Alias=sf2router.service
"#;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A SoundFont instrument bank router."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Starts the router.
    Start {
        /// The path to the router config.
        config_path: String,
    },
    /// Lists the banks and instruments in the given config.
    Banks {
        /// The path to the router config.
        config_path: String,
    },
    /// Lists the presets of an instrument's sound bank.
    Presets {
        /// The path to the router config.
        config_path: String,
        /// The instrument name.
        instrument: String,
    },
    /// Lists the available MIDI input devices.
    MidiDevices {},
    /// Prints a systemd service definition to stdout.
    Systemd {},
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start { config_path } => {
            run(PathBuf::from(config_path)).await?;
        }
        Commands::Banks { config_path } => {
            let config = Config::load(Path::new(&config_path))?;

            if config.banks().is_empty() && config.instruments().is_empty() {
                println!("No banks or instruments configured.");
                return Ok(());
            }

            println!("Banks (count: {}):", config.banks().len());
            for bank in config.banks() {
                let marker = if config.active_bank() == Some(bank.name()) {
                    " (active)"
                } else {
                    ""
                };
                println!("- {}{}", bank.name(), marker);
                for instrument in bank.instruments() {
                    println!(
                        "  - {} (channel {}, {})",
                        instrument.name(),
                        instrument.channel(),
                        instrument.file()
                    );
                }
            }

            if !config.instruments().is_empty() {
                println!("\nFallback instruments (count: {}):", config.instruments().len());
                for instrument in config.instruments() {
                    println!(
                        "- {} (channel {}, {})",
                        instrument.name(),
                        instrument.channel(),
                        instrument.file()
                    );
                }
            }
        }
        Commands::Presets {
            config_path,
            instrument,
        } => {
            let config = Config::load(Path::new(&config_path))?;
            let definition = config
                .banks()
                .iter()
                .flat_map(|bank| bank.instruments().iter())
                .chain(config.instruments().iter())
                .find(|definition| definition.name() == instrument)
                .ok_or_else(|| format!("no instrument named {}", instrument))?;

            let mut path = PathBuf::from(definition.file());
            if path.is_relative() {
                if let Some(base_dir) = definition.presets_dir() {
                    path = base_dir.join(path);
                }
            }

            let presets = engine::read_presets(&path)?;
            println!("Presets in {} (count: {}):", path.display(), presets.len());
            for preset in presets {
                println!("- {:03}:{:03} {}", preset.bank, preset.preset, preset.name);
            }
        }
        Commands::MidiDevices {} => {
            let devices = midi::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Systemd {} => {
            println!("{}", SYSTEMD_SERVICE)
        }
    }

    Ok(())
}

/// Runs the router until interrupted: engine, preload, activation, MIDI
/// inputs, hot reload, and the admin API.
async fn run(config_path: PathBuf) -> Result<(), Box<dyn Error>> {
    let config = Config::load(&config_path)?;

    let engine = engine::get_engine(config.audio())?;
    let router = Arc::new(Router::new(engine, &config));
    router.preload_all();
    router.activate_current();

    let (reload_tx, reload_rx) = mpsc::channel::<()>(1);
    let dispatcher = Arc::new(Dispatcher::new(
        router.clone(),
        config.midi(),
        reload_tx.clone(),
    ));

    let (event_tx, event_rx) = mpsc::channel::<Vec<u8>>(256);
    let devices = midi::open_inputs(config.midi().inputs())?;
    for device in devices.iter() {
        device.watch_events(event_tx.clone())?;
    }
    // The watchers hold the only remaining senders; the dispatcher
    // stops when every input closes.
    drop(event_tx);
    tokio::spawn(dispatcher.clone().run(event_rx));

    let _debouncer = if config.auto_reload() {
        Some(watcher::watch_config(&config_path, reload_tx.clone())?)
    } else {
        None
    };
    tokio::spawn(watcher::run_reloads(
        config_path.clone(),
        router.clone(),
        dispatcher.clone(),
        reload_rx,
    ));

    if let Some(http) = config.http() {
        let bind = http.bind_addr()?;
        let router = router.clone();
        let reload_tx = reload_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = server::serve(bind, router, reload_tx).await {
                error!(err = e.to_string(), "Admin API stopped.");
            }
        });
    }

    info!("Router running, press Ctrl-C to stop.");
    tokio::signal::ctrl_c().await?;

    info!("Shutting down.");
    router.panic();
    for device in devices.iter() {
        device.stop_watch_events();
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::sync::Arc;

    use tokio::sync::mpsc;

    use crate::config::{Config, Instrument};
    use crate::dispatch::Dispatcher;
    use crate::engine::mock::Engine as MockEngine;
    use crate::midi;
    use crate::router::Router;
    use crate::testutil::eventually_async;

    /// Full path from a mock input port through the dispatcher to the
    /// engine.
    #[tokio::test(flavor = "multi_thread")]
    async fn test_events_flow_from_input_to_engine() {
        let dir = tempfile::tempdir().expect("unable to create temp dir");
        fs::write(dir.path().join("piano.sf2"), b"sf2").expect("write failed");
        let file = dir.path().join("piano.sf2");

        let config = Config::new_for_test(
            None,
            vec![],
            vec![Instrument::new_for_test(
                "piano",
                file.to_str().unwrap(),
                0,
                0,
                0,
                100,
                Some(21),
                false,
                (0, 127),
            )],
        );

        let engine = MockEngine::get();
        let router = Arc::new(Router::new(Arc::new(engine), &config));
        router.preload_all();
        router.activate_current();

        let (reload_tx, _reload_rx) = mpsc::channel(1);
        let dispatcher = Arc::new(Dispatcher::new(router.clone(), config.midi(), reload_tx));

        let devices =
            midi::open_inputs(&["mock:pedalboard".to_string()]).expect("unable to open inputs");
        assert_eq!(1, devices.len());

        let (event_tx, event_rx) = mpsc::channel(16);
        devices[0]
            .watch_events(event_tx)
            .expect("unable to watch events");
        tokio::spawn(dispatcher.clone().run(event_rx));

        let mock = devices[0].to_mock().expect("not a mock device");
        tokio::task::spawn_blocking(move || mock.mock_event(&[0xB0, 21, 64]))
            .await
            .expect("mock event failed");

        let registry = router.registry();
        eventually_async(
            || async { registry.get("piano").expect("piano missing").volume() == 64 },
            "volume change never reached the registry",
        )
        .await;

        devices[0].stop_watch_events();
    }
}
