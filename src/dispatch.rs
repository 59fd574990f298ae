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

//! The MIDI event dispatcher.
//!
//! Receives raw MIDI bytes from the opened input ports and routes them:
//! control changes run through the action bindings, the per-instrument
//! volume controllers, and the named control mappings, in that order;
//! notes broadcast to every active instrument that accepts them.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use midly::{live::LiveEvent, MidiMessage};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc::{Receiver, Sender};
use tracing::{debug, info, warn};

use crate::config::{Action, Actions, ControlTarget, MidiConfig};
use crate::router::{Router, CC_SUSTAIN};

/// The control surface state the dispatcher consults for every control
/// change. Swapped wholesale on configuration reload.
struct Controls {
    learn_mode: bool,
    cc_map: HashMap<u8, ControlTarget>,
    actions: Actions,
}

impl Controls {
    fn from_config(midi: &MidiConfig) -> Controls {
        Controls {
            learn_mode: midi.learn_mode(),
            cc_map: midi.cc_map().clone(),
            actions: midi.actions().clone(),
        }
    }
}

/// Routes incoming MIDI events to the router and engine.
pub struct Dispatcher {
    router: Arc<Router>,
    controls: RwLock<Controls>,
    reload: Sender<()>,
    seen_controllers: Mutex<HashSet<u8>>,
}

impl Dispatcher {
    /// Creates a dispatcher over the given router. Reload requests
    /// triggered by a bound CC are sent on the reload channel.
    pub fn new(router: Arc<Router>, midi: &MidiConfig, reload: Sender<()>) -> Dispatcher {
        Dispatcher {
            router,
            controls: RwLock::new(Controls::from_config(midi)),
            reload,
            seen_controllers: Mutex::new(HashSet::new()),
        }
    }

    /// Swaps in the control mappings of a freshly loaded configuration.
    pub fn update_controls(&self, midi: &MidiConfig) {
        *self.controls.write() = Controls::from_config(midi);
        self.seen_controllers.lock().clear();
    }

    /// Receives raw MIDI events until every input port closes.
    pub async fn run(self: Arc<Self>, mut events: Receiver<Vec<u8>>) {
        info!("Dispatcher running.");
        while let Some(event) = events.recv().await {
            self.handle_event(&event);
        }
        info!("Dispatcher stopped.");
    }

    /// Routes one raw MIDI event.
    pub fn handle_event(&self, raw: &[u8]) {
        match LiveEvent::parse(raw) {
            Ok(LiveEvent::Midi { channel, message }) => match message {
                MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                    self.note_on(key.as_int(), vel.as_int());
                }
                // A note on with velocity zero is a note off.
                MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                    self.note_off(key.as_int());
                }
                MidiMessage::Controller { controller, value } => {
                    self.control_change(channel.as_int(), controller.as_int(), value.as_int());
                }
                MidiMessage::ProgramChange { program } => {
                    self.router.program_change(channel.as_int(), program.as_int());
                }
                _ => {}
            },
            Ok(_) => {}
            Err(e) => {
                warn!(err = e.to_string(), "Dropping unparseable MIDI event.");
            }
        }
    }

    /// Broadcasts a note on to every active instrument whose note range
    /// admits the note and whose volume is above zero.
    fn note_on(&self, note: u8, velocity: u8) {
        let registry = self.router.registry();
        for instrument in registry.iter() {
            if instrument.volume() > 0 && instrument.in_range(note) {
                self.router.note_on(instrument.channel(), note, velocity);
            }
        }
    }

    /// Broadcasts a note off with the same targeting rule as note on.
    fn note_off(&self, note: u8) {
        let registry = self.router.registry();
        for instrument in registry.iter() {
            if instrument.volume() > 0 && instrument.in_range(note) {
                self.router.note_off(instrument.channel(), note);
            }
        }
    }

    /// Runs an incoming control change through the cascade: action
    /// bindings first, then per-instrument volume controllers, then the
    /// named control mappings. Whatever matches first consumes the
    /// event.
    fn control_change(&self, channel: u8, cc: u8, value: u8) {
        let controls = self.controls.read();

        // Learn mode is diagnostics only and sees every controller,
        // even those consumed by the cascade below.
        if controls.learn_mode && self.seen_controllers.lock().insert(cc) {
            info!(cc, value, channel, "New controller seen.");
        }

        if let Some(action) = controls.actions.resolve(cc, value) {
            self.run_action(action);
            return;
        }

        let registry = self.router.registry();
        // First matching instrument wins when several share a
        // controller number.
        let target = registry
            .iter()
            .find(|instrument| instrument.volume_controller() == Some(cc))
            .map(|instrument| instrument.name().to_string());
        if let Some(name) = target {
            if let Err(e) = self.router.set_instrument_volume(&name, value) {
                warn!(err = e.to_string(), "Unable to set instrument volume.");
            }
            return;
        }

        match controls.cc_map.get(&cc) {
            Some(ControlTarget::Sustain) => {
                let mut receivers = 0;
                for instrument in registry.iter().filter(|instrument| instrument.use_sustain()) {
                    self.router
                        .send_control(instrument.channel(), CC_SUSTAIN, value);
                    receivers += 1;
                }
                if receivers == 0 {
                    debug!(cc, value, "Sustain broadcast with no receivers.");
                }
            }
            Some(ControlTarget::Instrument(name)) => {
                if self.router.set_instrument_volume(name, value).is_err() {
                    // The mapping names no active instrument; forward
                    // the control change untouched.
                    debug!(cc, name, "Mapped instrument not active, passing through.");
                    self.router.send_control(channel, cc, value);
                }
            }
            None => {
                debug!(channel, cc, value, "Unmapped control change.");
            }
        }
    }

    fn run_action(&self, action: Action) {
        match action {
            Action::NextBank => {
                self.router.next_bank();
            }
            Action::PrevBank => {
                self.router.prev_bank();
            }
            Action::Panic => self.router.panic(),
            Action::ReloadConfig => {
                info!("Reload requested via MIDI.");
                if let Err(e) = self.reload.try_send(()) {
                    warn!(err = e.to_string(), "Unable to request reload.");
                }
            }
        }
    }
}
