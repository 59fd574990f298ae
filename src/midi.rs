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
use std::{error::Error, fmt, sync::Arc};

use tokio::sync::mpsc::Sender;

mod midir;
pub mod mock;

/// A MIDI input source that delivers raw messages.
pub trait Device: fmt::Display + std::marker::Send + std::marker::Sync {
    /// Returns the name of the device.
    fn name(&self) -> String;

    /// Watches MIDI input for events and sends the raw bytes to the
    /// given sender.
    fn watch_events(&self, sender: Sender<Vec<u8>>) -> Result<(), Box<dyn Error>>;

    /// Stops watching events.
    fn stop_watch_events(&self);

    /// Converts the device to a mock device for test inspection.
    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<mock::Device>, Box<dyn Error>> {
        Err("not a mock device".into())
    }
}

/// Lists input devices known to midir.
pub fn list_devices() -> Result<Vec<Box<dyn Device>>, Box<dyn Error>> {
    midir::list()
}

/// Opens the input ports whose names contain any of the given
/// fragments. When no fragment matches (or none are configured), every
/// available input port is opened. Names starting with "mock" produce
/// mock devices.
pub fn open_inputs(fragments: &[String]) -> Result<Vec<Arc<dyn Device>>, Box<dyn Error>> {
    if fragments.iter().any(|fragment| fragment.starts_with("mock")) {
        return Ok(fragments
            .iter()
            .filter(|fragment| fragment.starts_with("mock"))
            .map(|fragment| {
                let device: Arc<dyn Device> = Arc::new(mock::Device::get(fragment));
                device
            })
            .collect());
    }

    midir::open_inputs(fragments)
}
