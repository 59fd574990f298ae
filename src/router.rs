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

//! The instrument bank router.
//!
//! Preloads every sound bank referenced by the configuration, activates
//! one bank's instruments onto output channels, and switches banks
//! atomically. Because everything is preloaded, a bank switch only
//! issues program-select calls and never touches a file.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{Bank, Config, Instrument};
use crate::engine::{Engine, EngineError, Preset};

pub mod cache;
pub mod registry;

use cache::ResourceCache;
use registry::{ActiveInstrument, Registry};

/// The volume controller number on the engine side.
pub(crate) const CC_VOLUME: u8 = 7;
/// The sustain pedal controller number.
pub(crate) const CC_SUSTAIN: u8 = 64;
const CC_ALL_SOUND_OFF: u8 = 120;
const CC_ALL_NOTES_OFF: u8 = 123;

const UNKNOWN_PRESET: &str = "Unknown";

/// Typed errors for router operations.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("no bank named {0}")]
    BankNotFound(String),
    #[error("no active instrument named {0}")]
    UnknownInstrument(String),
    #[error("sound bank {} not found", .0.display())]
    ResourceNotFound(PathBuf),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// The switchable bank state taken from one configuration snapshot.
struct BankSet {
    banks: Vec<Bank>,
    active: Option<String>,
    fallback: Vec<Instrument>,
}

impl BankSet {
    fn from_config(config: &Config) -> BankSet {
        BankSet {
            banks: config.banks().to_vec(),
            active: config.active_bank().map(String::from),
            fallback: config.instruments().to_vec(),
        }
    }

    fn bank(&self, name: &str) -> Option<&Bank> {
        self.banks.iter().find(|bank| bank.name() == name)
    }

    /// The definitions of the active bank, or the flat fallback list
    /// when no bank is active.
    fn active_definitions(&self) -> Vec<Instrument> {
        match self.active.as_deref().and_then(|name| self.bank(name)) {
            Some(bank) => bank.instruments().to_vec(),
            None => self.fallback.clone(),
        }
    }

    /// Every instrument definition in every bank plus the fallback
    /// list.
    fn all_definitions(&self) -> Vec<Instrument> {
        self.banks
            .iter()
            .flat_map(|bank| bank.instruments().iter().cloned())
            .chain(self.fallback.iter().cloned())
            .collect()
    }
}

/// A bank as reported to front ends.
#[derive(Clone, Debug, Serialize)]
pub struct BankSummary {
    pub name: String,
    pub description: String,
    pub active: bool,
}

/// An active instrument as reported to front ends.
#[derive(Clone, Debug, Serialize)]
pub struct InstrumentStatus {
    pub name: String,
    pub channel: u8,
    pub volume: u8,
    pub file: String,
    pub preset: u8,
    pub preset_name: String,
}

/// The instrument bank router. All entry points are safe to call
/// concurrently with ongoing dispatch: the registry is published as an
/// immutable snapshot and replaced as a unit.
pub struct Router {
    engine: Arc<dyn Engine>,
    cache: Mutex<ResourceCache>,
    registry: RwLock<Arc<Registry>>,
    banks: RwLock<BankSet>,
}

impl Router {
    /// Creates a router over the given engine and configuration.
    pub fn new(engine: Arc<dyn Engine>, config: &Config) -> Router {
        Router {
            cache: Mutex::new(ResourceCache::new(engine.clone())),
            engine,
            registry: RwLock::new(Arc::new(Registry::empty())),
            banks: RwLock::new(BankSet::from_config(config)),
        }
    }

    /// Returns the current registry snapshot.
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.read().clone()
    }

    /// Preloads the sound banks of every configured instrument, in
    /// every bank and the fallback list. A failure skips that
    /// instrument and is not fatal to the preload as a whole.
    pub fn preload_all(&self) {
        let definitions = self.banks.read().all_definitions();
        self.preload(&definitions);
    }

    fn preload(&self, definitions: &[Instrument]) {
        let mut cache = self.cache.lock();
        for definition in definitions {
            if let Err(e) = cache.ensure_loaded(definition.file(), definition.presets_dir()) {
                warn!(
                    instrument = definition.name(),
                    err = e.to_string(),
                    "Unable to preload sound bank, skipping instrument."
                );
            }
        }
    }

    /// Activates the instruments of the currently selected bank (or
    /// the fallback list).
    pub fn activate_current(&self) {
        let definitions = self.banks.read().active_definitions();
        self.activate(&definitions);
    }

    /// Clears and rebuilds the instrument registry from the given
    /// definitions. The new registry is published only once it is
    /// complete; readers never observe a half-rebuilt set.
    fn activate(&self, definitions: &[Instrument]) {
        let cache = self.cache.lock();
        let mut instruments: Vec<Arc<ActiveInstrument>> = Vec::with_capacity(definitions.len());

        for definition in definitions {
            if instruments
                .iter()
                .any(|instrument| instrument.name() == definition.name())
            {
                warn!(
                    instrument = definition.name(),
                    "Duplicate instrument name, skipping."
                );
                continue;
            }

            let resource = match cache.get(definition.file(), definition.presets_dir()) {
                Some(resource) => resource,
                None => {
                    warn!(
                        instrument = definition.name(),
                        file = definition.file(),
                        "Sound bank not cached, skipping instrument."
                    );
                    continue;
                }
            };

            let preset_name = resource
                .preset_name(definition.bank(), definition.preset())
                .unwrap_or(UNKNOWN_PRESET)
                .to_string();

            self.engine.select_program(
                definition.channel(),
                resource.handle(),
                definition.bank(),
                definition.preset(),
            );
            let volume = definition.initial_volume().min(127);
            self.engine
                .set_control(definition.channel(), CC_VOLUME, volume);

            debug!(
                instrument = definition.name(),
                channel = definition.channel(),
                preset = preset_name,
                "Instrument activated."
            );
            instruments.push(Arc::new(ActiveInstrument::new(
                definition,
                resource,
                preset_name,
            )));
        }

        info!(instruments = instruments.len(), "Registry activated.");
        *self.registry.write() = Arc::new(Registry::new(instruments));
    }

    /// Switches to the named bank. Because every sound bank was
    /// preloaded, this issues only program-select and volume calls.
    pub fn switch_bank(&self, name: &str) -> Result<(), RouterError> {
        let definitions = {
            let mut banks = self.banks.write();
            let definitions = banks
                .bank(name)
                .map(|bank| bank.instruments().to_vec())
                .ok_or_else(|| RouterError::BankNotFound(name.to_string()))?;
            banks.active = Some(name.to_string());
            definitions
        };

        info!(bank = name, "Switching bank.");
        self.activate(&definitions);
        Ok(())
    }

    /// Cyclically advances to the next bank in configuration order and
    /// returns its name, or None when no banks are configured.
    pub fn next_bank(&self) -> Option<String> {
        self.cycle(1)
    }

    /// Cyclically retreats to the previous bank in configuration order
    /// and returns its name, or None when no banks are configured.
    pub fn prev_bank(&self) -> Option<String> {
        self.cycle(-1)
    }

    fn cycle(&self, step: isize) -> Option<String> {
        let target = {
            let banks = self.banks.read();
            if banks.banks.is_empty() {
                return None;
            }
            let len = banks.banks.len() as isize;
            let position = banks
                .active
                .as_deref()
                .and_then(|active| banks.banks.iter().position(|bank| bank.name() == active));
            // An unknown or cleared active bank selects the first bank.
            let next = match position {
                Some(position) => (position as isize + step).rem_euclid(len) as usize,
                None => 0,
            };
            banks.banks[next].name().to_string()
        };

        match self.switch_bank(&target) {
            Ok(()) => Some(target),
            Err(e) => {
                warn!(err = e.to_string(), "Unable to cycle banks.");
                None
            }
        }
    }

    /// Applies a new configuration snapshot without restarting the
    /// engine. The previously active bank stays selected unless the new
    /// configuration no longer has it, in which case the flat fallback
    /// list activates. The resource cache persists across reloads.
    pub fn reload(&self, config: &Config) {
        let mut next = BankSet::from_config(config);

        let previous = self.banks.read().active.clone();
        next.active = match previous {
            Some(name) if next.bank(&name).is_some() => Some(name),
            Some(_) => None,
            None => next.active.take(),
        };

        self.preload(&next.all_definitions());
        let definitions = next.active_definitions();
        *self.banks.write() = next;
        self.activate(&definitions);
        info!("Configuration reloaded.");
    }

    /// Silences every sounding note: all-notes-off and all-sound-off on
    /// every channel. Idempotent; registry state is untouched.
    pub fn panic(&self) {
        info!("Panic: silencing all channels.");
        for channel in 0..16u8 {
            self.engine.set_control(channel, CC_ALL_NOTES_OFF, 0);
            self.engine.set_control(channel, CC_ALL_SOUND_OFF, 0);
        }
    }

    /// Sets an instrument's volume by name, clamped to 0-127. Returns
    /// the stored value.
    pub fn set_instrument_volume(&self, name: &str, value: u8) -> Result<u8, RouterError> {
        let registry = self.registry();
        let instrument = registry
            .get(name)
            .ok_or_else(|| RouterError::UnknownInstrument(name.to_string()))?;

        let value = value.min(127);
        self.engine
            .set_control(instrument.channel(), CC_VOLUME, value);
        instrument.store_volume(value);
        debug!(instrument = name, volume = value, "Volume set.");
        Ok(value)
    }

    /// Selects a different preset for an instrument within its
    /// configured bank number. Returns the preset name.
    pub fn set_preset(&self, name: &str, program: u8) -> Result<String, RouterError> {
        let registry = self.registry();
        let instrument = registry
            .get(name)
            .ok_or_else(|| RouterError::UnknownInstrument(name.to_string()))?;

        let resource = instrument.resource();
        let preset_name = resource
            .preset_name(instrument.bank(), program)
            .unwrap_or(UNKNOWN_PRESET)
            .to_string();

        self.engine.select_program(
            instrument.channel(),
            resource.handle(),
            instrument.bank(),
            program,
        );
        instrument.store_preset(program, preset_name.clone());
        info!(instrument = name, program, preset = preset_name, "Preset set.");
        Ok(preset_name)
    }

    /// Sends a raw control change to the engine (passthrough).
    pub fn send_control(&self, channel: u8, controller: u8, value: u8) {
        self.engine.set_control(channel, controller, value);
    }

    /// Starts a note on an engine channel.
    pub fn note_on(&self, channel: u8, note: u8, velocity: u8) {
        self.engine.note_on(channel, note, velocity);
    }

    /// Stops a note on an engine channel.
    pub fn note_off(&self, channel: u8, note: u8) {
        self.engine.note_off(channel, note);
    }

    /// Forwards a program change verbatim to the engine.
    pub fn program_change(&self, channel: u8, program: u8) {
        self.engine.program_change(channel, program);
    }

    /// Lists the configured banks in declaration order.
    pub fn list_banks(&self) -> Vec<BankSummary> {
        let banks = self.banks.read();
        banks
            .banks
            .iter()
            .map(|bank| BankSummary {
                name: bank.name().to_string(),
                description: bank.description().to_string(),
                active: banks.active.as_deref() == Some(bank.name()),
            })
            .collect()
    }

    /// Returns the active bank name, if any.
    pub fn active_bank(&self) -> Option<String> {
        self.banks.read().active.clone()
    }

    /// Reports the status of every active instrument.
    pub fn statuses(&self) -> Vec<InstrumentStatus> {
        self.registry()
            .iter()
            .map(|instrument| {
                let preset = instrument.preset();
                InstrumentStatus {
                    name: instrument.name().to_string(),
                    channel: instrument.channel(),
                    volume: instrument.volume(),
                    file: instrument.resource().path().display().to_string(),
                    preset: preset.program,
                    preset_name: preset.name,
                }
            })
            .collect()
    }

    /// Returns the preset table of the sound bank behind an active
    /// instrument.
    pub fn presets_for_instrument(&self, name: &str) -> Result<Vec<Preset>, RouterError> {
        let registry = self.registry();
        let instrument = registry
            .get(name)
            .ok_or_else(|| RouterError::UnknownInstrument(name.to_string()))?;
        Ok(instrument.resource().presets().to_vec())
    }
}
