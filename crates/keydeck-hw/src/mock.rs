//! In-memory panel for exercising a [`StreamDeck`](crate::StreamDeck)
//! without hardware.
//!
//! [`MockTransport`] decodes the reports written to it and keeps the state a
//! real panel would show; the paired [`MockPanel`] handle inspects that state
//! and injects key presses.

use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use crate::model::{Generation, Model};
use crate::protocol::{input_report_len, IMAGE_REPORT_ID};
use crate::transport::Transport;
use crate::Result;

#[derive(Debug, Default)]
struct PanelState {
    brightness: Option<u8>,
    images: BTreeMap<u8, Vec<u8>>,
    partial: BTreeMap<u8, Vec<u8>>,
    resets: usize,
    keys: Vec<bool>,
    input: VecDeque<Vec<u8>>,
    closed: bool,
}

/// Transport half, handed to [`StreamDeck::with_transport`](crate::StreamDeck::with_transport).
pub struct MockTransport {
    model: Model,
    state: Arc<Mutex<PanelState>>,
}

/// Test-side handle onto the emulated panel.
#[derive(Clone)]
pub struct MockPanel {
    model: Model,
    state: Arc<Mutex<PanelState>>,
}

impl MockTransport {
    /// Creates an emulated panel of the given model.
    pub fn new(model: Model) -> (Self, MockPanel) {
        let state = Arc::new(Mutex::new(PanelState {
            keys: vec![false; model.key_count() as usize],
            ..PanelState::default()
        }));
        (
            Self {
                model,
                state: Arc::clone(&state),
            },
            MockPanel { model, state },
        )
    }
}

impl Transport for MockTransport {
    fn write(&self, data: &[u8]) -> Result<usize> {
        if data.first() != Some(&IMAGE_REPORT_ID) {
            return Ok(data.len());
        }

        let (key, is_last, payload) = match self.model.generation() {
            Generation::Mini => (data[5].wrapping_sub(1), data[4] != 0, &data[16..]),
            Generation::Gen2 => {
                let len = u16::from_le_bytes([data[4], data[5]]) as usize;
                (data[2], data[3] != 0, &data[8..8 + len])
            }
        };

        let mut state = self.state.lock();
        state.partial.entry(key).or_default().extend_from_slice(payload);
        if is_last {
            if let Some(image) = state.partial.remove(&key) {
                state.images.insert(key, image);
            }
        }
        Ok(data.len())
    }

    fn send_feature_report(&self, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        match (self.model.generation(), data) {
            (Generation::Mini, [0x0B, 0x63, ..]) | (Generation::Gen2, [0x03, 0x02, ..]) => {
                state.images.clear();
                state.partial.clear();
                state.resets += 1;
            }
            (Generation::Mini, [0x05, 0x55, 0xAA, 0xD1, 0x01, percent, ..])
            | (Generation::Gen2, [0x03, 0x08, percent, ..]) => {
                state.brightness = Some(*percent);
            }
            _ => {}
        }
        Ok(())
    }

    fn read_timeout(&self, buf: &mut [u8], timeout_ms: i32) -> Result<usize> {
        if let Some(report) = self.state.lock().input.pop_front() {
            let len = report.len().min(buf.len());
            buf[..len].copy_from_slice(&report[..len]);
            return Ok(len);
        }
        std::thread::sleep(Duration::from_millis(timeout_ms.clamp(0, 5) as u64));
        Ok(0)
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        self.state.lock().closed = true;
    }
}

impl MockPanel {
    /// Returns the last brightness set, if any.
    pub fn brightness(&self) -> Option<u8> {
        self.state.lock().brightness
    }

    /// Returns the encoded image currently shown on a key.
    pub fn image(&self, key: u8) -> Option<Vec<u8>> {
        self.state.lock().images.get(&key).cloned()
    }

    /// Returns the keys that currently show an image.
    pub fn keys_with_images(&self) -> Vec<u8> {
        self.state.lock().images.keys().copied().collect()
    }

    /// Returns how many reset reports were received.
    pub fn reset_count(&self) -> usize {
        self.state.lock().resets
    }

    /// Returns true once the transport has been released by the handle.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Queues an input report pressing a key.
    pub fn press(&self, key: u8) {
        self.set_key(key, true);
    }

    /// Queues an input report releasing a key.
    pub fn release(&self, key: u8) {
        self.set_key(key, false);
    }

    fn set_key(&self, key: u8, pressed: bool) {
        let mut state = self.state.lock();
        if let Some(slot) = state.keys.get_mut(key as usize) {
            *slot = pressed;
        }

        let offset = self.model.generation().key_state_offset();
        let mut report = vec![0u8; input_report_len(self.model)];
        report[0] = 0x01;
        for (i, &down) in state.keys.iter().enumerate() {
            report[offset + i] = down as u8;
        }
        state.input.push_back(report);
    }
}
