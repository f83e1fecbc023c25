// Decode module - raw PCM bytes to gain-adjusted 16-bit samples
//
// Samples arrive little-endian from the microphone. Gain is applied in a
// wider integer type and the result is clamped back into the 16-bit range,
// emulating analog clipping instead of wrapping on overflow.

use crate::config::{LevelConfig, SampleFormat};
use crate::error::AudioError;

/// Converts a raw sample buffer into signed 16-bit samples
#[derive(Debug, Clone)]
pub struct SampleDecoder {
    format: SampleFormat,
    gain: i64,
    correction_shift: u32,
}

impl SampleDecoder {
    pub fn new(format: SampleFormat, gain: i32, correction_shift: u32) -> Self {
        Self {
            format,
            gain: gain as i64,
            correction_shift,
        }
    }

    pub fn from_config(format: SampleFormat, level: &LevelConfig) -> Self {
        Self::new(format, level.gain, level.correction_shift)
    }

    /// Decode `bytes` into `out`, replacing its contents
    ///
    /// # Errors
    /// `AudioError::Decode` if the buffer is empty or its length is not a
    /// multiple of the sample width. `out` is left empty in that case.
    pub fn decode_into(&self, bytes: &[u8], out: &mut Vec<i16>) -> Result<(), AudioError> {
        out.clear();
        let width = self.format.bytes_per_sample();

        if bytes.is_empty() {
            return Err(AudioError::Decode {
                len: 0,
                reason: "empty buffer".to_string(),
            });
        }
        if bytes.len() % width != 0 {
            return Err(AudioError::Decode {
                len: bytes.len(),
                reason: format!("length is not a multiple of {} bytes", width),
            });
        }

        out.reserve(bytes.len() / width);
        for frame in bytes.chunks_exact(width) {
            let raw = match self.format {
                SampleFormat::S16Le => i16::from_le_bytes([frame[0], frame[1]]),
                SampleFormat::S32Le => {
                    let wide = i32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);
                    (wide >> 16) as i16
                }
            };
            out.push(self.apply_gain(raw));
        }

        Ok(())
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<Vec<i16>, AudioError> {
        let mut out = Vec::new();
        self.decode_into(bytes, &mut out)?;
        Ok(out)
    }

    fn apply_gain(&self, raw: i16) -> i16 {
        let corrected = (raw >> self.correction_shift) as i64;
        (corrected * self.gain).clamp(i16::MIN as i64, i16::MAX as i64) as i16
    }
}

/// Encode samples back to little-endian bytes
pub fn encode_s16le(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}
