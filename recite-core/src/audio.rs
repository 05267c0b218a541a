//! Outbound audio framing
//!
//! Capture happens outside this crate; an `AudioInput` hands over f32 sample
//! blocks and this module turns them into the 16 kHz mono 16-bit
//! little-endian PCM frames the recognizer expects.

use async_trait::async_trait;
use byteorder::{ByteOrder, LittleEndian};
use tokio::sync::mpsc;

use crate::error::Result;

/// Raw 16-bit PCM bytes
pub type AudioData = Vec<u8>;

/// Source of captured audio, e.g. a microphone pipeline
#[async_trait]
pub trait AudioInput: Send {
    /// Acquire the device and start delivering mono 16 kHz sample blocks
    ///
    /// Permission or device failures surface as `Error::Audio`.
    async fn open(&mut self) -> Result<mpsc::Receiver<Vec<f32>>>;

    /// Stop capture and release the device
    fn release(&mut self);
}

/// Convert f32 samples to 16-bit little-endian PCM bytes
pub fn encode_pcm16le(samples: &[f32]) -> AudioData {
    let pcm: Vec<i16> = samples
        .iter()
        .map(|&sample| (sample.clamp(-1.0, 1.0) * 32767.0) as i16)
        .collect();
    let mut bytes = vec![0u8; pcm.len() * 2];
    LittleEndian::write_i16_into(&pcm, &mut bytes);
    bytes
}
