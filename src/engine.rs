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
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::config::AudioConfig;

pub mod mock;
mod synth;

pub use synth::read_presets;

/// An opaque handle to a sound bank loaded into the engine.
pub type FontHandle = usize;

/// One preset inside a sound-bank file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Preset {
    /// The bank number the preset lives in.
    pub bank: u16,
    /// The program number within the bank.
    pub preset: u8,
    /// The human readable preset name.
    pub name: String,
}

/// Engine failures that are fatal or typed enough to act on. Everything
/// else the engine logs and swallows; commands are fire-and-forget.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("unable to start audio engine: {0}")]
    Start(String),
    #[error("error loading sound bank {}: {message}", path.display())]
    Load { path: PathBuf, message: String },
}

/// The narrow command interface of the sound-producing engine. All
/// commands except `load` are fire-and-forget: failures are logged by
/// the implementation and never surface to dispatch.
pub trait Engine: Send + Sync {
    /// Loads a sound-bank file, returning its handle and preset table.
    fn load(&self, path: &Path) -> Result<(FontHandle, Vec<Preset>), EngineError>;

    /// Selects a (bank, program) preset from the given sound bank on a
    /// channel.
    fn select_program(&self, channel: u8, handle: FontHandle, bank: u16, program: u8);

    /// Sends a control change to a channel.
    fn set_control(&self, channel: u8, controller: u8, value: u8);

    /// Starts a note on a channel.
    fn note_on(&self, channel: u8, note: u8, velocity: u8);

    /// Stops a note on a channel.
    fn note_off(&self, channel: u8, note: u8);

    /// Sends a raw program change to a channel.
    fn program_change(&self, channel: u8, program: u8);
}

/// Gets an engine for the given audio configuration. Device names
/// starting with "mock" produce a non-sounding engine that records
/// commands.
pub fn get_engine(config: &AudioConfig) -> Result<Arc<dyn Engine>, EngineError> {
    if config.device().is_some_and(|name| name.starts_with("mock")) {
        return Ok(Arc::new(mock::Engine::get()));
    }

    Ok(Arc::new(synth::SynthEngine::start(config)?))
}

#[cfg(test)]
mod test {
    use crate::config::AudioConfig;

    #[test]
    fn test_mock_device_name_selects_mock_engine() {
        let config = AudioConfig::new_for_test(Some("mock"));
        assert!(super::get_engine(&config).is_ok());
    }
}
