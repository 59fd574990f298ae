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
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::{EngineError, FontHandle, Preset};

/// A command issued against the mock engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    SelectProgram {
        channel: u8,
        handle: FontHandle,
        bank: u16,
        program: u8,
    },
    SetControl {
        channel: u8,
        controller: u8,
        value: u8,
    },
    NoteOn {
        channel: u8,
        note: u8,
        velocity: u8,
    },
    NoteOff {
        channel: u8,
        note: u8,
    },
    ProgramChange {
        channel: u8,
        program: u8,
    },
}

/// A mock engine. Doesn't produce any sound; records every command and
/// load for inspection.
#[derive(Clone, Default)]
pub struct Engine {
    loads: Arc<Mutex<Vec<PathBuf>>>,
    presets: Arc<Mutex<HashMap<PathBuf, Vec<Preset>>>>,
    commands: Arc<Mutex<Vec<Command>>>,
}

impl Engine {
    /// Gets a mock engine.
    pub fn get() -> Engine {
        Engine::default()
    }

    /// Seeds the preset table returned for a path on load.
    #[cfg(test)]
    pub fn set_presets(&self, path: &Path, presets: Vec<Preset>) {
        self.presets.lock().insert(path.to_path_buf(), presets);
    }

    /// Returns how many loads the engine has seen.
    #[cfg(test)]
    pub fn load_count(&self) -> usize {
        self.loads.lock().len()
    }

    /// Returns the recorded commands.
    #[cfg(test)]
    pub fn commands(&self) -> Vec<Command> {
        self.commands.lock().clone()
    }

    /// Clears the recorded commands.
    #[cfg(test)]
    pub fn clear_commands(&self) {
        self.commands.lock().clear();
    }

    fn record(&self, command: Command) {
        debug!(command = format!("{:?}", command), "Mock engine command.");
        self.commands.lock().push(command);
    }
}

impl super::Engine for Engine {
    fn load(&self, path: &Path) -> Result<(FontHandle, Vec<Preset>), EngineError> {
        let mut loads = self.loads.lock();
        loads.push(path.to_path_buf());
        let presets = self
            .presets
            .lock()
            .get(path)
            .cloned()
            .unwrap_or_default();
        Ok((loads.len() - 1, presets))
    }

    fn select_program(&self, channel: u8, handle: FontHandle, bank: u16, program: u8) {
        self.record(Command::SelectProgram {
            channel,
            handle,
            bank,
            program,
        });
    }

    fn set_control(&self, channel: u8, controller: u8, value: u8) {
        self.record(Command::SetControl {
            channel,
            controller,
            value,
        });
    }

    fn note_on(&self, channel: u8, note: u8, velocity: u8) {
        self.record(Command::NoteOn {
            channel,
            note,
            velocity,
        });
    }

    fn note_off(&self, channel: u8, note: u8) {
        self.record(Command::NoteOff { channel, note });
    }

    fn program_change(&self, channel: u8, program: u8) {
        self.record(Command::ProgramChange { channel, program });
    }
}
