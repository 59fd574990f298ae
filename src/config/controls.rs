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

use serde::Deserialize;

/// The target a named control mapping routes a CC value to.
///
/// YAML values are plain strings: the literal `sustain` broadcasts to
/// every instrument configured with `use_sustain`; anything else names
/// an instrument whose volume the CC drives. A name that matches no
/// active instrument falls through to raw passthrough at dispatch time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlTarget {
    /// Broadcast the value as a sustain command.
    Sustain,
    /// Route the value to the named instrument's volume.
    Instrument(String),
}

impl From<String> for ControlTarget {
    fn from(value: String) -> Self {
        if value == "sustain" {
            ControlTarget::Sustain
        } else {
            ControlTarget::Instrument(value)
        }
    }
}

impl<'de> Deserialize<'de> for ControlTarget {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(ControlTarget::from(String::deserialize(deserializer)?))
    }
}

/// The closed set of actions a CC can be bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    NextBank,
    PrevBank,
    Panic,
    ReloadConfig,
}

/// A YAML representation of a CC binding for one action. The binding
/// fires on a matching CC number; when `value` is set, only on that
/// exact incoming value.
#[derive(Deserialize, Clone, Debug)]
pub struct ActionTrigger {
    /// The CC number that fires the action.
    cc: u8,
    /// When set, the exact CC value required to fire.
    value: Option<u8>,
}

impl ActionTrigger {
    /// Returns whether an incoming CC matches this trigger.
    pub fn matches(&self, cc: u8, value: u8) -> bool {
        self.cc == cc && self.value.is_none_or(|required| required == value)
    }
}

#[cfg(test)]
impl ActionTrigger {
    /// Builds an action trigger without going through YAML.
    pub fn new_for_test(cc: u8, value: Option<u8>) -> ActionTrigger {
        ActionTrigger { cc, value }
    }
}

/// The YAML representation of all action bindings.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Actions {
    /// Cycles forward through the configured banks.
    next_bank: Option<ActionTrigger>,
    /// Cycles backward through the configured banks.
    prev_bank: Option<ActionTrigger>,
    /// Silences every sounding note on all channels.
    panic: Option<ActionTrigger>,
    /// Requests a configuration reload.
    reload_config: Option<ActionTrigger>,
}

impl Actions {
    /// Resolves an incoming CC against the bindings. First match in
    /// declaration order wins.
    pub fn resolve(&self, cc: u8, value: u8) -> Option<Action> {
        let bindings = [
            (&self.next_bank, Action::NextBank),
            (&self.prev_bank, Action::PrevBank),
            (&self.panic, Action::Panic),
            (&self.reload_config, Action::ReloadConfig),
        ];
        bindings
            .into_iter()
            .find(|(trigger, _)| {
                trigger
                    .as_ref()
                    .is_some_and(|trigger| trigger.matches(cc, value))
            })
            .map(|(_, action)| action)
    }
}

#[cfg(test)]
impl Actions {
    /// Builds action bindings without going through YAML.
    pub fn new_for_test(
        next_bank: Option<ActionTrigger>,
        prev_bank: Option<ActionTrigger>,
        panic: Option<ActionTrigger>,
        reload_config: Option<ActionTrigger>,
    ) -> Actions {
        Actions {
            next_bank,
            prev_bank,
            panic,
            reload_config,
        }
    }
}

/// The MIDI input section of the configuration: which ports to open,
/// the named control mappings, and the action bindings. CC numbers are
/// plain integers in YAML and stay integers from here on.
#[derive(Deserialize, Clone, Default)]
pub struct MidiConfig {
    /// Name fragments used to select MIDI input ports. When empty or
    /// nothing matches, every available input port is opened.
    #[serde(default)]
    inputs: Vec<String>,
    /// Flags previously unseen CC numbers to aid configuration
    /// authoring. Diagnostics only.
    #[serde(default)]
    learn_mode: bool,
    /// Named control mappings, keyed by CC number.
    #[serde(default)]
    cc_map: HashMap<u8, ControlTarget>,
    /// Action bindings.
    #[serde(default)]
    actions: Actions,
}

impl MidiConfig {
    /// Returns the input port name fragments.
    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    /// Returns whether discovery mode is enabled.
    pub fn learn_mode(&self) -> bool {
        self.learn_mode
    }

    /// Returns the named control mappings.
    pub fn cc_map(&self) -> &HashMap<u8, ControlTarget> {
        &self.cc_map
    }

    /// Returns the action bindings.
    pub fn actions(&self) -> &Actions {
        &self.actions
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_control_target_from_yaml() {
        let map: HashMap<u8, ControlTarget> =
            serde_yml::from_str("21: piano\n64: sustain\n").expect("parse failed");

        assert_eq!(
            Some(&ControlTarget::Instrument("piano".to_string())),
            map.get(&21)
        );
        assert_eq!(Some(&ControlTarget::Sustain), map.get(&64));
    }

    #[test]
    fn test_action_resolution() {
        let actions: Actions = serde_yml::from_str(
            r#"
next_bank:
  cc: 105
prev_bank:
  cc: 106
  value: 127
panic:
  cc: 123
"#,
        )
        .expect("parse failed");

        assert_eq!(Some(Action::NextBank), actions.resolve(105, 0));
        assert_eq!(Some(Action::NextBank), actions.resolve(105, 64));
        // Value-gated binding only fires on the exact value.
        assert_eq!(None, actions.resolve(106, 0));
        assert_eq!(Some(Action::PrevBank), actions.resolve(106, 127));
        assert_eq!(Some(Action::Panic), actions.resolve(123, 0));
        assert_eq!(None, actions.resolve(110, 0));
    }
}
