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
use serde::Deserialize;

use super::instrument::Instrument;

/// A YAML representation of a named, switchable group of instruments.
#[derive(Deserialize, Clone)]
pub struct Bank {
    /// The bank name. Unique across the configuration.
    name: String,
    /// A human readable description of the bank.
    #[serde(default)]
    description: String,
    /// The instruments activated when this bank is selected.
    #[serde(default)]
    instruments: Vec<Instrument>,
}

impl Bank {
    /// Returns the bank name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the bank description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the instruments in this bank, in configuration order.
    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }
}

#[cfg(test)]
impl Bank {
    /// Builds a bank without going through YAML.
    pub fn new_for_test(name: &str, instruments: Vec<Instrument>) -> Bank {
        Bank {
            name: name.to_string(),
            description: String::new(),
            instruments,
        }
    }
}
