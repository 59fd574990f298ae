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

//! The activated instrument set of the current bank.
//!
//! A registry is built as a whole during activation and published as an
//! immutable snapshot; only volume and preset selection mutate in place
//! afterwards.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::cache::SoundBankResource;
use crate::config::Instrument;

/// The currently selected preset of an active instrument.
#[derive(Clone, Debug)]
pub struct PresetSelection {
    /// The program number.
    pub program: u8,
    /// The preset name, "Unknown" when the sound bank doesn't list it.
    pub name: String,
}

/// The runtime projection of a configured instrument.
pub struct ActiveInstrument {
    name: String,
    channel: u8,
    bank: u16,
    volume_controller: Option<u8>,
    use_sustain: bool,
    min_note: u8,
    max_note: u8,
    resource: Arc<SoundBankResource>,
    current_volume: AtomicU8,
    current_preset: Mutex<PresetSelection>,
}

impl ActiveInstrument {
    /// Creates an active instrument from its definition and resolved
    /// resource.
    pub fn new(
        definition: &Instrument,
        resource: Arc<SoundBankResource>,
        preset_name: String,
    ) -> ActiveInstrument {
        let (min_note, max_note) = definition.note_range();
        ActiveInstrument {
            name: definition.name().to_string(),
            channel: definition.channel(),
            bank: definition.bank(),
            volume_controller: definition.volume_cc(),
            use_sustain: definition.use_sustain(),
            min_note,
            max_note,
            resource,
            current_volume: AtomicU8::new(definition.initial_volume().min(127)),
            current_preset: Mutex::new(PresetSelection {
                program: definition.preset(),
                name: preset_name,
            }),
        }
    }

    /// Returns the instrument name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the output channel.
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Returns the bank number within the sound-bank file.
    pub fn bank(&self) -> u16 {
        self.bank
    }

    /// Returns the CC number driving this instrument's volume, if any.
    pub fn volume_controller(&self) -> Option<u8> {
        self.volume_controller
    }

    /// Returns whether sustain broadcasts reach this instrument.
    pub fn use_sustain(&self) -> bool {
        self.use_sustain
    }

    /// Returns the resolved sound-bank resource.
    pub fn resource(&self) -> &Arc<SoundBankResource> {
        &self.resource
    }

    /// Returns whether the note falls in the permitted range.
    pub fn in_range(&self, note: u8) -> bool {
        (self.min_note..=self.max_note).contains(&note)
    }

    /// Returns the current volume.
    pub fn volume(&self) -> u8 {
        self.current_volume.load(Ordering::Relaxed)
    }

    /// Stores the current volume, clamped to 0-127.
    pub fn store_volume(&self, value: u8) {
        self.current_volume.store(value.min(127), Ordering::Relaxed);
    }

    /// Returns the current preset selection.
    pub fn preset(&self) -> PresetSelection {
        self.current_preset.lock().clone()
    }

    /// Stores the current preset selection.
    pub fn store_preset(&self, program: u8, name: String) {
        *self.current_preset.lock() = PresetSelection { program, name };
    }
}

/// The activated instruments of the current bank, in configuration
/// order. Replaced wholesale on bank switch and reload.
#[derive(Default)]
pub struct Registry {
    instruments: Vec<Arc<ActiveInstrument>>,
}

impl Registry {
    /// Creates a registry from the given instruments.
    pub fn new(instruments: Vec<Arc<ActiveInstrument>>) -> Registry {
        Registry { instruments }
    }

    /// Creates an empty registry.
    pub fn empty() -> Registry {
        Registry::default()
    }

    /// Iterates the instruments in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ActiveInstrument>> {
        self.instruments.iter()
    }

    /// Gets an instrument by name.
    pub fn get(&self, name: &str) -> Option<&Arc<ActiveInstrument>> {
        self.instruments
            .iter()
            .find(|instrument| instrument.name() == name)
    }

    /// Returns the number of active instruments.
    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    /// Returns whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::sync::Arc;

    use crate::config::Instrument;
    use crate::engine::mock;
    use crate::router::cache::ResourceCache;

    use super::ActiveInstrument;

    fn active(definition: &Instrument) -> ActiveInstrument {
        let dir = tempfile::tempdir().expect("unable to create temp dir");
        fs::write(dir.path().join("piano.sf2"), b"sf2").expect("write failed");
        let mut cache = ResourceCache::new(Arc::new(mock::Engine::get()));
        let resource = cache
            .ensure_loaded("piano.sf2", Some(dir.path()))
            .expect("load failed");
        ActiveInstrument::new(definition, resource, "Unknown".to_string())
    }

    #[test]
    fn test_volume_clamped() {
        let definition =
            Instrument::new_for_test("piano", "piano.sf2", 0, 0, 0, 100, Some(7), false, (0, 127));
        let instrument = active(&definition);

        assert_eq!(100, instrument.volume());
        instrument.store_volume(250);
        assert_eq!(127, instrument.volume());
        instrument.store_volume(0);
        assert_eq!(0, instrument.volume());
    }

    #[test]
    fn test_note_range() {
        let definition =
            Instrument::new_for_test("bass", "piano.sf2", 0, 0, 0, 100, None, false, (24, 48));
        let instrument = active(&definition);

        assert!(!instrument.in_range(23));
        assert!(instrument.in_range(24));
        assert!(instrument.in_range(48));
        assert!(!instrument.in_range(49));
    }
}
