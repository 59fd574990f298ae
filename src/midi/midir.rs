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
use std::{
    error::Error,
    fmt, mem,
    sync::{Arc, Mutex},
};

use midir::{MidiInput, MidiInputConnection, MidiInputPort};
use tokio::sync::mpsc::Sender;
use tracing::{error, info, span, warn, Level};

pub struct Device {
    name: String,
    input_port: MidiInputPort,
    event_connection: Mutex<Option<MidiInputConnection<()>>>,
}

impl super::Device for Device {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn watch_events(&self, sender: Sender<Vec<u8>>) -> Result<(), Box<dyn Error>> {
        let span = span!(Level::INFO, "watch events (midir)");
        let _enter = span.enter();

        let mut event_connection = self.event_connection.lock().expect("unable to get lock");
        if event_connection.is_some() {
            return Err("Already watching events.".into());
        }

        info!(device = self.name, "Watching MIDI events.");

        let input = MidiInput::new("sf2router input")?;
        *event_connection = Some(input.connect(
            &self.input_port,
            "sf2router input watcher",
            move |_, raw_event, _| {
                if let Err(e) = sender.blocking_send(Vec::from(raw_event)) {
                    error!(
                        err = format!("{:?}", e),
                        "Error sending MIDI event to receiver."
                    );
                }
            },
            (),
        )?);

        Ok(())
    }

    /// Stops watching events.
    fn stop_watch_events(&self) {
        // Explicitly drop the connection.
        let event_connection = self
            .event_connection
            .lock()
            .expect("error getting mutex")
            .take();

        mem::drop(event_connection);
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Input)", self.name)
    }
}

/// Lists midir input devices and produces the Device trait.
pub fn list() -> Result<Vec<Box<dyn super::Device>>, Box<dyn Error>> {
    Ok(list_midir_inputs()?
        .into_iter()
        .map(|device| {
            let device: Box<dyn super::Device> = Box::new(device);
            device
        })
        .collect())
}

/// Lists midir input devices.
fn list_midir_inputs() -> Result<Vec<Device>, Box<dyn Error>> {
    let input = MidiInput::new("sf2router input listing")?;

    let mut devices: Vec<Device> = Vec::new();
    for port in input.ports() {
        devices.push(Device {
            name: input.port_name(&port)?,
            input_port: port,
            event_connection: Mutex::new(None),
        });
    }

    devices.sort_by_key(|device| device.name.clone());
    Ok(devices)
}

/// Opens the input ports whose names contain any of the given name
/// fragments, falling back to every port when nothing matches.
pub fn open_inputs(fragments: &[String]) -> Result<Vec<Arc<dyn super::Device>>, Box<dyn Error>> {
    let devices = list_midir_inputs()?;

    let mut selected: Vec<Device> = Vec::new();
    let mut remaining: Vec<Device> = Vec::new();
    for device in devices {
        let name = device.name.to_lowercase();
        if fragments
            .iter()
            .any(|fragment| name.contains(&fragment.to_lowercase()))
        {
            info!(device = device.name, "Opening MIDI input port.");
            selected.push(device);
        } else {
            remaining.push(device);
        }
    }

    if selected.is_empty() {
        warn!("No MIDI input port matched the configured names, opening all ports.");
        selected = remaining;
    }

    if selected.is_empty() {
        return Err("no MIDI input ports available".into());
    }

    Ok(selected
        .into_iter()
        .map(|device| {
            let device: Arc<dyn super::Device> = Arc::new(device);
            device
        })
        .collect())
}
