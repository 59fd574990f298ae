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
use std::collections::HashSet;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;

use serde::Deserialize;

pub mod bank;
pub mod controls;
pub mod error;
pub mod instrument;

pub use bank::Bank;
pub use controls::{Action, Actions, ControlTarget, MidiConfig};
pub use error::ConfigError;
pub use instrument::Instrument;

const DEFAULT_HTTP_BIND: &str = "127.0.0.1:5000";

/// The immutable configuration snapshot the router, dispatcher, and
/// admin surface consult. Produced once per load/reload; never mutated
/// in place.
#[derive(Deserialize, Clone, Default)]
pub struct Config {
    /// The audio engine configuration.
    #[serde(default)]
    audio: AudioConfig,
    /// The name of the bank to activate at startup.
    active_bank: Option<String>,
    /// The switchable banks.
    #[serde(default)]
    banks: Vec<Bank>,
    /// The flat instrument list used when no bank is active.
    #[serde(default)]
    instruments: Vec<Instrument>,
    /// The MIDI input configuration.
    #[serde(default)]
    midi: MidiConfig,
    /// Whether editing the config file triggers a live reload.
    #[serde(default = "default_auto_reload")]
    auto_reload: bool,
    /// The admin HTTP configuration.
    http: Option<Http>,
}

fn default_auto_reload() -> bool {
    true
}

impl Config {
    /// Loads and validates a configuration snapshot from a YAML file.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let config: Config = serde_yml::from_str(&fs::read_to_string(path)?)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates field ranges and name uniqueness once at the boundary.
    fn validate(&self) -> Result<(), ConfigError> {
        let mut bank_names: HashSet<&str> = HashSet::new();
        for bank in &self.banks {
            if !bank_names.insert(bank.name()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate bank name {}",
                    bank.name()
                )));
            }
            for instrument in bank.instruments() {
                instrument.validate()?;
            }
        }
        for instrument in &self.instruments {
            instrument.validate()?;
        }
        if let Some(active) = &self.active_bank {
            if !self.banks.iter().any(|bank| bank.name() == active) {
                return Err(ConfigError::Invalid(format!(
                    "active_bank {} does not name a configured bank",
                    active
                )));
            }
        }
        Ok(())
    }

    /// Returns the audio engine configuration.
    pub fn audio(&self) -> &AudioConfig {
        &self.audio
    }

    /// Returns the bank active at startup, if any.
    pub fn active_bank(&self) -> Option<&str> {
        self.active_bank.as_deref()
    }

    /// Returns the configured banks in declaration order.
    pub fn banks(&self) -> &[Bank] {
        &self.banks
    }

    /// Returns the flat fallback instrument list.
    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    /// Returns the MIDI input configuration.
    pub fn midi(&self) -> &MidiConfig {
        &self.midi
    }

    /// Returns whether the config watcher should be started.
    pub fn auto_reload(&self) -> bool {
        self.auto_reload
    }

    /// Returns the admin HTTP configuration, if enabled.
    pub fn http(&self) -> Option<&Http> {
        self.http.as_ref().filter(|http| http.enabled)
    }
}

#[cfg(test)]
impl Config {
    /// Builds a configuration without going through YAML.
    pub fn new_for_test(
        active_bank: Option<&str>,
        banks: Vec<Bank>,
        instruments: Vec<Instrument>,
    ) -> Config {
        Config {
            audio: AudioConfig::default(),
            active_bank: active_bank.map(String::from),
            banks,
            instruments,
            midi: MidiConfig::default(),
            auto_reload: true,
            http: None,
        }
    }
}

/// The audio engine section of the configuration.
#[derive(Deserialize, Clone, Default)]
pub struct AudioConfig {
    /// The output device name (substring match). Default output when
    /// unset.
    device: Option<String>,
    /// Master gain, 0.0-1.0.
    gain: Option<f32>,
}

impl AudioConfig {
    /// Returns the configured output device name.
    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    /// Returns the configured master gain.
    pub fn gain(&self) -> Option<f32> {
        self.gain
    }
}

#[cfg(test)]
impl AudioConfig {
    /// Builds an audio config without going through YAML.
    pub fn new_for_test(device: Option<&str>) -> AudioConfig {
        AudioConfig {
            device: device.map(String::from),
            gain: None,
        }
    }
}

/// The admin HTTP section of the configuration.
#[derive(Deserialize, Clone)]
pub struct Http {
    /// Whether the admin surface is served at all.
    #[serde(default)]
    enabled: bool,
    /// The address to bind, e.g. `127.0.0.1:5000`.
    bind: Option<String>,
}

impl Http {
    /// Returns the bind address for the admin surface.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .as_deref()
            .unwrap_or(DEFAULT_HTTP_BIND)
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("bad http bind address: {}", e)))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const FULL_CONFIG: &str = r#"
audio:
  device: "USB Audio"
  gain: 0.8
active_bank: jazz
banks:
  - name: jazz
    description: Small combo setup
    instruments:
      - name: piano
        file: piano.sf2
        channel: 0
        volume_cc: 7
  - name: classical
    instruments:
      - name: strings
        file: orchestra.sf2
        bank: 1
        preset: 48
        channel: 1
        initial_volume: 90
        min_note: 36
        max_note: 96
instruments:
  - name: organ
    file: organ.sf2
midi:
  inputs: ["keyboard", "ctrl"]
  learn_mode: true
  cc_map:
    21: piano
    64: sustain
  actions:
    next_bank:
      cc: 105
    panic:
      cc: 123
      value: 127
auto_reload: false
http:
  enabled: true
  bind: "0.0.0.0:8080"
"#;

    #[test]
    fn test_parse_full_config() {
        let config: Config = serde_yml::from_str(FULL_CONFIG).expect("parse failed");
        config.validate().expect("validate failed");

        assert_eq!(Some("USB Audio"), config.audio().device());
        assert_eq!(Some("jazz"), config.active_bank());
        assert_eq!(2, config.banks().len());
        assert_eq!("Small combo setup", config.banks()[0].description());

        let strings = &config.banks()[1].instruments()[0];
        assert_eq!(1, strings.bank());
        assert_eq!(48, strings.preset());
        assert_eq!(90, strings.initial_volume());
        assert_eq!((36, 96), strings.note_range());

        // Defaults on the flat fallback instrument.
        let organ = &config.instruments()[0];
        assert_eq!(0, organ.channel());
        assert_eq!(100, organ.initial_volume());
        assert_eq!((0, 127), organ.note_range());
        assert_eq!(None, organ.volume_cc());
        assert!(!organ.use_sustain());

        assert!(config.midi().learn_mode());
        assert!(!config.auto_reload());
        assert_eq!(
            "0.0.0.0:8080".parse::<std::net::SocketAddr>().unwrap(),
            config.http().expect("http missing").bind_addr().unwrap()
        );
    }

    #[test]
    fn test_minimal_config_defaults() {
        let config: Config = serde_yml::from_str("instruments: []").expect("parse failed");
        config.validate().expect("validate failed");

        assert!(config.auto_reload());
        assert!(config.banks().is_empty());
        assert!(config.active_bank().is_none());
        assert!(config.http().is_none());
        assert!(config.midi().cc_map().is_empty());
    }

    #[test]
    fn test_invalid_channel_rejected() {
        let config: Config = serde_yml::from_str(
            r#"
instruments:
  - name: piano
    file: piano.sf2
    channel: 16
"#,
        )
        .expect("parse failed");

        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid(message)) if message.contains("channel")
        ));
    }

    #[test]
    fn test_unknown_active_bank_rejected() {
        let config: Config =
            serde_yml::from_str("active_bank: missing\nbanks: []").expect("parse failed");

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inverted_note_range_rejected() {
        let config: Config = serde_yml::from_str(
            r#"
instruments:
  - name: piano
    file: piano.sf2
    min_note: 90
    max_note: 30
"#,
        )
        .expect("parse failed");

        assert!(config.validate().is_err());
    }
}
