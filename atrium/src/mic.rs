//! Microphone recordings keyed by uid.
//!
//! The device thread appends 16-bit mono samples to the active recording
//! and checks its stop flag on every callback. Stopping finalizes a WAV
//! stream that apps read back by uid.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::error::{HostError, Result};

pub const SAMPLE_RATE: u32 = 16_000;

/// Device callback. Returns false to end the capture.
pub type AudioCallback = Box<dyn FnMut(&[i16]) -> bool + Send>;

/// Audio capture backend.
pub trait AudioDevice: Send + Sync {
    fn sample_rate(&self) -> u32;

    /// Start capturing; `callback` runs on the device thread until it
    /// returns false.
    fn start(&self, callback: AudioCallback) -> Result<()>;
}

/// A device producing silence, used headless.
#[derive(Debug, Default)]
pub struct SilentDevice;

impl AudioDevice for SilentDevice {
    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn start(&self, mut callback: AudioCallback) -> Result<()> {
        let block = vec![0i16; (SAMPLE_RATE / 100) as usize];
        std::thread::Builder::new()
            .name("atrium-mic".into())
            .spawn(move || {
                while callback(&block) {
                    std::thread::sleep(Duration::from_millis(10));
                }
            })
            .map_err(|e| HostError::Audio(e.to_string()))?;
        Ok(())
    }
}

#[derive(Default)]
struct Recording {
    samples: Arc<Mutex<Vec<i16>>>,
    stop: Arc<AtomicBool>,
    wav: Option<Vec<u8>>,
}

#[derive(Default)]
struct RecorderState {
    recordings: HashMap<String, Recording>,
    active: Option<String>,
}

/// Recorder shared by every app of the host.
#[derive(Clone)]
pub struct Recorder {
    device: Arc<dyn AudioDevice>,
    state: Arc<Mutex<RecorderState>>,
}

impl Recorder {
    pub fn new(device: Arc<dyn AudioDevice>) -> Self {
        Self { device, state: Arc::new(Mutex::new(RecorderState::default())) }
    }

    fn lock(&self) -> MutexGuard<'_, RecorderState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Begin recording under `uid`. False while another recording runs.
    pub fn start(&self, uid: &str) -> bool {
        let mut state = self.lock();
        if state.active.is_some() {
            return false;
        }
        let rec = Recording::default();
        let samples = rec.samples.clone();
        let stop = rec.stop.clone();
        let callback: AudioCallback = Box::new(move |block| {
            if stop.load(Ordering::Acquire) {
                return false;
            }
            match samples.lock() {
                Ok(mut buf) => buf.extend_from_slice(block),
                Err(poisoned) => poisoned.into_inner().extend_from_slice(block),
            }
            true
        });
        if let Err(e) = self.device.start(callback) {
            tracing::warn!(uid, "microphone start failed: {e}");
            return false;
        }
        state.recordings.insert(uid.to_string(), rec);
        state.active = Some(uid.to_string());
        tracing::info!(uid, "recording started");
        true
    }

    /// True while `uid` is the recording in progress.
    pub fn is_recording(&self, uid: &str) -> bool {
        self.lock().active.as_deref() == Some(uid)
    }

    /// Stop recording `uid` and finalize its WAV stream. False when `uid`
    /// is not the recording in progress.
    pub fn stop(&self, uid: &str) -> bool {
        let rate = self.device.sample_rate();
        let mut state = self.lock();
        if state.active.as_deref() != Some(uid) {
            return false;
        }
        state.active = None;
        let Some(rec) = state.recordings.get_mut(uid) else {
            return false;
        };
        rec.stop.store(true, Ordering::Release);
        let samples = match rec.samples.lock() {
            Ok(mut buf) => std::mem::take(&mut *buf),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        tracing::info!(uid, samples = samples.len(), "recording stopped");
        rec.wav = Some(wav_bytes(&samples, rate));
        true
    }

    /// WAV bytes of a finished recording.
    pub fn read(&self, uid: &str) -> Option<Vec<u8>> {
        self.lock().recordings.get(uid).and_then(|r| r.wav.clone())
    }
}

/// 16-bit mono PCM wrapped in a RIFF/WAVE header.
pub fn wav_bytes(samples: &[i16], rate: u32) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let mut out = Vec::with_capacity(44 + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVEfmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&1u16.to_le_bytes()); // mono
    out.extend_from_slice(&rate.to_le_bytes());
    out.extend_from_slice(&(rate * 2).to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}
