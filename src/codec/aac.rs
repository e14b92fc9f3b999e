//! MPEG-4 AudioSpecificConfig parsing (ISO 14496-3).

use bytes::Bytes;

use crate::error::FlvError;
use crate::reader::BitReader;

/// Sampling frequencies addressed by the 4-bit frequency index.
const SAMPLING_FREQUENCIES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// Parsed AudioSpecificConfig.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AacConfig {
    /// RFC 6381 string, e.g. `mp4a.40.2` for AAC-LC.
    pub codec: String,
    pub object_type: u8,
    pub sampling_frequency_index: u8,
    pub sample_rate: u32,
    pub channel_count: u8,
    /// The raw config bytes as they appeared in the stream.
    pub config: Bytes,
}

/// Parse the AudioSpecificConfig carried by an AAC sequence-header tag.
pub fn parse_audio_specific_config(data: &[u8]) -> Result<AacConfig, FlvError> {
    if data.is_empty() {
        return Err(FlvError::MalformedPayload("empty audio specific config".into()));
    }
    let mut r = BitReader::new(data);

    let mut object_type = r.read_bits(5)? as u8;
    if object_type == 31 {
        object_type = 32 + r.read_bits(6)? as u8;
    }

    let sampling_frequency_index = r.read_bits(4)? as u8;
    let mut sample_rate = read_sample_rate(&mut r, sampling_frequency_index)?;

    let channel_configuration = r.read_bits(4)? as u8;
    if channel_configuration > 7 {
        return Err(FlvError::MalformedPayload(format!(
            "bad channel configuration {channel_configuration}"
        )));
    }
    let channel_count = if channel_configuration == 7 {
        8
    } else {
        channel_configuration
    };

    // HE-AAC (SBR/PS) signals the real output rate in an extension field.
    if object_type == 5 || object_type == 29 {
        let extension_index = r.read_bits(4)? as u8;
        sample_rate = read_sample_rate(&mut r, extension_index)?;
        let _ = r.read_bits(5)?;
    }

    Ok(AacConfig {
        codec: format!("mp4a.40.{object_type}"),
        object_type,
        sampling_frequency_index,
        sample_rate,
        channel_count,
        config: Bytes::copy_from_slice(data),
    })
}

fn read_sample_rate(r: &mut BitReader, index: u8) -> Result<u32, FlvError> {
    if index == 15 {
        return r.read_bits(24);
    }
    SAMPLING_FREQUENCIES
        .get(index as usize)
        .copied()
        .ok_or_else(|| FlvError::MalformedPayload(format!("bad sampling frequency index {index}")))
}
