//! # WAV Header Probe
//!
//! Reads the RIFF/WAVE header of an upload so requests can be logged with
//! their format and duration. The probe never rejects anything: an upload
//! that fails to parse is still forwarded to the model untouched.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};

/// Format details from a WAV file's `fmt ` and `data` chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavInfo {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub data_len: u32,
}

impl WavInfo {
    /// Parse the header from the start of `bytes`.
    ///
    /// ## Returns:
    /// - **Some(info)**: a RIFF/WAVE file with both `fmt ` and `data` chunks
    /// - **None**: anything else (other containers, truncated uploads)
    pub fn probe(bytes: &[u8]) -> Option<Self> {
        let mut cursor = Cursor::new(bytes);

        let mut tag = [0u8; 4];
        cursor.read_exact(&mut tag).ok()?;
        if &tag != b"RIFF" {
            return None;
        }
        cursor.read_u32::<LittleEndian>().ok()?;
        cursor.read_exact(&mut tag).ok()?;
        if &tag != b"WAVE" {
            return None;
        }

        let mut format: Option<(u16, u32, u16)> = None;

        // Walk chunks until `data`; `fmt ` must come first in a valid file.
        loop {
            cursor.read_exact(&mut tag).ok()?;
            let chunk_len = cursor.read_u32::<LittleEndian>().ok()?;

            match &tag {
                b"fmt " => {
                    let start = cursor.position();
                    let _audio_format = cursor.read_u16::<LittleEndian>().ok()?;
                    let channels = cursor.read_u16::<LittleEndian>().ok()?;
                    let sample_rate = cursor.read_u32::<LittleEndian>().ok()?;
                    let _byte_rate = cursor.read_u32::<LittleEndian>().ok()?;
                    let _block_align = cursor.read_u16::<LittleEndian>().ok()?;
                    let bits_per_sample = cursor.read_u16::<LittleEndian>().ok()?;
                    format = Some((channels, sample_rate, bits_per_sample));
                    cursor.set_position(start + padded(chunk_len));
                }
                b"data" => {
                    let (channels, sample_rate, bits_per_sample) = format?;
                    return Some(Self {
                        channels,
                        sample_rate,
                        bits_per_sample,
                        data_len: chunk_len,
                    });
                }
                _ => {
                    let next = cursor.position() + padded(chunk_len);
                    if next > bytes.len() as u64 {
                        return None;
                    }
                    cursor.set_position(next);
                }
            }
        }
    }

    /// Playback length in seconds, from the declared data chunk size.
    pub fn duration_secs(&self) -> f64 {
        let bytes_per_second = self.sample_rate as u64
            * self.channels as u64
            * (self.bits_per_sample as u64 / 8);
        if bytes_per_second == 0 {
            return 0.0;
        }
        self.data_len as f64 / bytes_per_second as f64
    }
}

// Chunks are word aligned.
fn padded(len: u32) -> u64 {
    len as u64 + (len as u64 & 1)
}

#[cfg(test)]
pub(crate) fn pcm16_wav(sample_rate: u32, channels: u16, samples: &[i16]) -> Vec<u8> {
    use byteorder::WriteBytesExt;

    let data_len = (samples.len() * 2) as u32;
    let mut out = Vec::new();
    out.extend_from_slice(b"RIFF");
    out.write_u32::<LittleEndian>(36 + data_len).unwrap();
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.write_u32::<LittleEndian>(16).unwrap();
    out.write_u16::<LittleEndian>(1).unwrap();
    out.write_u16::<LittleEndian>(channels).unwrap();
    out.write_u32::<LittleEndian>(sample_rate).unwrap();
    out.write_u32::<LittleEndian>(sample_rate * channels as u32 * 2).unwrap();
    out.write_u16::<LittleEndian>(channels * 2).unwrap();
    out.write_u16::<LittleEndian>(16).unwrap();
    out.extend_from_slice(b"data");
    out.write_u32::<LittleEndian>(data_len).unwrap();
    for sample in samples {
        out.write_i16::<LittleEndian>(*sample).unwrap();
    }
    out
}
