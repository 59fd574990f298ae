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

//! SoundFont engine backed by rustysynth with rodio output.
//!
//! Each loaded sound bank gets its own synthesizer; the mixed output of
//! all of them plays through a single output stream. `select_program`
//! records which sound bank owns a channel so later channel commands
//! reach the right synthesizer.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rodio::cpal::traits::{DeviceTrait, HostTrait};
use rodio::{OutputStream, OutputStreamHandle, Source};
use rustysynth::{SoundFont, Synthesizer, SynthesizerSettings};
use tracing::{debug, info, warn};

use super::{EngineError, FontHandle, Preset};
use crate::config::AudioConfig;

/// Sample rate for synthesis.
const SAMPLE_RATE: u32 = 44100;

/// Render block size. Smaller means lower latency, higher CPU.
const BUFFER_SIZE: usize = 256;

const CC_BANK_SELECT_MSB: i32 = 0x00;
const STATUS_CONTROL_CHANGE: i32 = 0xB0;
const STATUS_PROGRAM_CHANGE: i32 = 0xC0;

/// A continuous stereo stream pulling rendered blocks from one
/// synthesizer.
struct SynthSource {
    synth: Arc<Mutex<Synthesizer>>,
    left: Vec<f32>,
    right: Vec<f32>,
    position: usize,
    channel: usize,
}

impl SynthSource {
    fn new(synth: Arc<Mutex<Synthesizer>>) -> SynthSource {
        SynthSource {
            synth,
            left: vec![0.0; BUFFER_SIZE],
            right: vec![0.0; BUFFER_SIZE],
            // Start exhausted so the first pull renders a block.
            position: BUFFER_SIZE,
            channel: 0,
        }
    }
}

impl Iterator for SynthSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.position >= BUFFER_SIZE {
            self.synth.lock().render(&mut self.left, &mut self.right);
            self.position = 0;
        }

        // Interleave stereo samples: L, R, L, R, ...
        let sample = if self.channel == 0 {
            self.left[self.position]
        } else {
            self.right[self.position]
        };
        self.channel = 1 - self.channel;
        if self.channel == 0 {
            self.position += 1;
        }

        Some(sample)
    }
}

impl Source for SynthSource {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        2
    }

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

/// The real engine. Channel commands route to the synthesizer whose
/// sound bank owns the channel; an unowned channel broadcasts to all
/// synthesizers, which is harmless for channels nothing renders on.
pub struct SynthEngine {
    stream_handle: OutputStreamHandle,
    fonts: Mutex<Vec<Arc<Mutex<Synthesizer>>>>,
    owners: Mutex<[Option<FontHandle>; 16]>,
    gain: Option<f32>,
}

impl SynthEngine {
    /// Starts the engine, trying the configured output device first and
    /// the default output second before giving up.
    pub fn start(config: &AudioConfig) -> Result<SynthEngine, EngineError> {
        // The output stream itself isn't Send; it lives on a dedicated
        // thread that parks for the process lifetime, and only the
        // handle leaves it.
        let device = config.device().map(String::from);
        let (handle_tx, handle_rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || match open_output(device.as_deref()) {
            Ok((stream, stream_handle)) => {
                if handle_tx.send(Ok(stream_handle)).is_err() {
                    return;
                }
                // Dropping the stream stops playback; hold it here.
                let _stream = stream;
                loop {
                    std::thread::park();
                }
            }
            Err(e) => {
                let _ = handle_tx.send(Err(e));
            }
        });
        let stream_handle = handle_rx
            .recv()
            .map_err(|e| EngineError::Start(e.to_string()))??;

        info!(device = config.device().unwrap_or("default"), "Audio engine started.");

        Ok(SynthEngine {
            stream_handle,
            fonts: Mutex::new(Vec::new()),
            owners: Mutex::new([None; 16]),
            gain: config.gain(),
        })
    }

    /// Runs a command against the synthesizer owning the channel, or
    /// against all synthesizers when the channel is unowned.
    fn with_channel<F>(&self, channel: u8, command: F)
    where
        F: Fn(&mut Synthesizer),
    {
        let owner = self.owners.lock()[usize::from(channel & 0x0F)];
        let fonts = self.fonts.lock();
        match owner.and_then(|handle| fonts.get(handle)) {
            Some(synth) => command(&mut synth.lock()),
            None => {
                for synth in fonts.iter() {
                    command(&mut synth.lock());
                }
            }
        }
    }
}

impl super::Engine for SynthEngine {
    fn load(&self, path: &Path) -> Result<(FontHandle, Vec<Preset>), EngineError> {
        let mut reader = BufReader::new(File::open(path).map_err(|e| EngineError::Load {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?);
        let sound_font = Arc::new(SoundFont::new(&mut reader).map_err(|e| EngineError::Load {
            path: path.to_path_buf(),
            message: format!("{:?}", e),
        })?);
        let presets = presets_of(&sound_font);

        let settings = SynthesizerSettings::new(SAMPLE_RATE as i32);
        let mut synth = Synthesizer::new(&sound_font, &settings).map_err(|e| EngineError::Load {
            path: path.to_path_buf(),
            message: format!("{:?}", e),
        })?;
        if let Some(gain) = self.gain {
            synth.set_master_volume(gain);
        }

        let synth = Arc::new(Mutex::new(synth));
        if let Err(e) = self.stream_handle.play_raw(SynthSource::new(synth.clone())) {
            return Err(EngineError::Load {
                path: path.to_path_buf(),
                message: e.to_string(),
            });
        }

        let mut fonts = self.fonts.lock();
        fonts.push(synth);
        let handle = fonts.len() - 1;

        info!(
            path = %path.display(),
            handle,
            presets = presets.len(),
            "Sound bank loaded."
        );

        Ok((handle, presets))
    }

    fn select_program(&self, channel: u8, handle: FontHandle, bank: u16, program: u8) {
        let channel = channel & 0x0F;
        self.owners.lock()[usize::from(channel)] = Some(handle);

        let fonts = self.fonts.lock();
        let synth = match fonts.get(handle) {
            Some(synth) => synth,
            None => {
                warn!(handle, "Program select against unknown sound bank handle.");
                return;
            }
        };

        let mut synth = synth.lock();
        synth.process_midi_message(
            i32::from(channel),
            STATUS_CONTROL_CHANGE,
            CC_BANK_SELECT_MSB,
            i32::from(bank),
        );
        synth.process_midi_message(
            i32::from(channel),
            STATUS_PROGRAM_CHANGE,
            i32::from(program),
            0,
        );
        debug!(channel, handle, bank, program, "Program selected.");
    }

    fn set_control(&self, channel: u8, controller: u8, value: u8) {
        self.with_channel(channel, |synth| {
            synth.process_midi_message(
                i32::from(channel & 0x0F),
                STATUS_CONTROL_CHANGE,
                i32::from(controller),
                i32::from(value),
            );
        });
    }

    fn note_on(&self, channel: u8, note: u8, velocity: u8) {
        self.with_channel(channel, |synth| {
            synth.note_on(
                i32::from(channel & 0x0F),
                i32::from(note),
                i32::from(velocity),
            );
        });
    }

    fn note_off(&self, channel: u8, note: u8) {
        self.with_channel(channel, |synth| {
            synth.note_off(i32::from(channel & 0x0F), i32::from(note));
        });
    }

    fn program_change(&self, channel: u8, program: u8) {
        self.with_channel(channel, |synth| {
            synth.process_midi_message(
                i32::from(channel & 0x0F),
                STATUS_PROGRAM_CHANGE,
                i32::from(program),
                0,
            );
        });
    }
}

/// Opens the output stream, preferring the configured device.
fn open_output(device_name: Option<&str>) -> Result<(OutputStream, OutputStreamHandle), EngineError> {
    if let Some(name) = device_name {
        match find_device(name) {
            Some(device) => match OutputStream::try_from_device(&device) {
                Ok(output) => return Ok(output),
                Err(e) => {
                    warn!(
                        device = name,
                        err = e.to_string(),
                        "Unable to open configured output device, falling back to default."
                    );
                }
            },
            None => {
                warn!(
                    device = name,
                    "Configured output device not found, falling back to default."
                );
            }
        }
    }

    OutputStream::try_default().map_err(|e| EngineError::Start(e.to_string()))
}

/// Finds an output device whose name contains the given fragment.
fn find_device(name: &str) -> Option<rodio::cpal::Device> {
    let host = rodio::cpal::default_host();
    host.output_devices()
        .ok()?
        .find(|device| device.name().is_ok_and(|n| n.contains(name)))
}

/// Enumerates the presets of a sound font in declaration order.
/// Entries with out-of-range bank or program numbers are skipped.
fn presets_of(sound_font: &SoundFont) -> Vec<Preset> {
    sound_font
        .get_presets()
        .iter()
        .filter_map(|preset| {
            let bank = u16::try_from(preset.get_bank_number()).ok()?;
            let program = u8::try_from(preset.get_patch_number()).ok()?;
            Some(Preset {
                bank,
                preset: program,
                name: preset.get_name().to_string(),
            })
        })
        .collect()
}

/// Reads the preset table of a sound-bank file without starting the
/// engine. Used by the preset listing CLI.
pub fn read_presets(path: &Path) -> Result<Vec<Preset>, EngineError> {
    let mut reader = BufReader::new(File::open(path).map_err(|e| EngineError::Load {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?);
    let sound_font = SoundFont::new(&mut reader).map_err(|e| EngineError::Load {
        path: path.to_path_buf(),
        message: format!("{:?}", e),
    })?;
    Ok(presets_of(&sound_font))
}
