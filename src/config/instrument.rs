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

use serde::Deserialize;

use super::error::ConfigError;

const DEFAULT_INITIAL_VOLUME: u8 = 100;
const DEFAULT_MAX_NOTE: u8 = 127;

/// A YAML representation of a single instrument: a voice bound to an
/// output channel, a sound-bank file, and a preset within it.
#[derive(Deserialize, Clone)]
pub struct Instrument {
    /// The instrument name. Must be unique within the activated set.
    name: String,
    /// The sound-bank (.sf2) file the instrument plays from.
    file: String,
    /// The bank number within the sound-bank file.
    #[serde(default)]
    bank: u16,
    /// The preset (program) number within the bank.
    #[serde(default)]
    preset: u8,
    /// The engine output channel (0-15). Channels may be shared
    /// deliberately for layering.
    #[serde(default)]
    channel: u8,
    /// The volume applied when the instrument is activated.
    #[serde(default = "default_initial_volume")]
    initial_volume: u8,
    /// The CC number that directly drives this instrument's volume.
    volume_cc: Option<u8>,
    /// Whether sustain broadcasts reach this instrument.
    #[serde(default)]
    use_sustain: bool,
    /// The lowest note the instrument responds to.
    #[serde(default)]
    min_note: u8,
    /// The highest note the instrument responds to.
    #[serde(default = "default_max_note")]
    max_note: u8,
    /// Base directory for resolving a relative sound-bank path.
    presets_dir: Option<PathBuf>,
}

fn default_initial_volume() -> u8 {
    DEFAULT_INITIAL_VOLUME
}

fn default_max_note() -> u8 {
    DEFAULT_MAX_NOTE
}

impl Instrument {
    /// Returns the instrument name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the sound-bank file reference as configured.
    pub fn file(&self) -> &str {
        &self.file
    }

    /// Returns the bank number inside the sound-bank file.
    pub fn bank(&self) -> u16 {
        self.bank
    }

    /// Returns the preset (program) number.
    pub fn preset(&self) -> u8 {
        self.preset
    }

    /// Returns the output channel.
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Returns the initial volume.
    pub fn initial_volume(&self) -> u8 {
        self.initial_volume
    }

    /// Returns the CC number bound to this instrument's volume, if any.
    pub fn volume_cc(&self) -> Option<u8> {
        self.volume_cc
    }

    /// Returns whether sustain broadcasts reach this instrument.
    pub fn use_sustain(&self) -> bool {
        self.use_sustain
    }

    /// Returns the permitted note range, inclusive.
    pub fn note_range(&self) -> (u8, u8) {
        (self.min_note, self.max_note)
    }

    /// Returns the directory relative sound-bank paths resolve against.
    pub fn presets_dir(&self) -> Option<&Path> {
        self.presets_dir.as_deref()
    }

    /// Validates field ranges once at the parse boundary.
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.channel > 15 {
            return Err(ConfigError::Invalid(format!(
                "instrument {}: channel {} out of range 0-15",
                self.name, self.channel
            )));
        }
        if self.initial_volume > 127 {
            return Err(ConfigError::Invalid(format!(
                "instrument {}: initial_volume {} out of range 0-127",
                self.name, self.initial_volume
            )));
        }
        if self.min_note > 127 || self.max_note > 127 || self.min_note > self.max_note {
            return Err(ConfigError::Invalid(format!(
                "instrument {}: note range {}-{} is invalid",
                self.name, self.min_note, self.max_note
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
impl Instrument {
    /// Builds an instrument definition without going through YAML.
    #[allow(clippy::too_many_arguments)]
    pub fn new_for_test(
        name: &str,
        file: &str,
        bank: u16,
        preset: u8,
        channel: u8,
        initial_volume: u8,
        volume_cc: Option<u8>,
        use_sustain: bool,
        note_range: (u8, u8),
    ) -> Instrument {
        Instrument {
            name: name.to_string(),
            file: file.to_string(),
            bank,
            preset,
            channel,
            initial_volume,
            volume_cc,
            use_sustain,
            min_note: note_range.0,
            max_note: note_range.1,
            presets_dir: None,
        }
    }
}
