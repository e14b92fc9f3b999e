//! Track records owned by the demuxer and the per-sample types appended to
//! them. Sample lists are transient (cleared at the start of the next
//! `demux` call); parameter sets and codec fields persist until a new
//! configuration record arrives or the stream is reset.

use bytes::Bytes;
use scuffle_amf0::Amf0Value;

use crate::codec::{AudioCodec, VideoCodec};
use crate::nalu::SeiMessage;

/// One video access unit.
#[derive(Debug, Clone)]
pub struct VideoSample {
    /// Presentation timestamp: `dts + cts`, sign-preserving.
    pub pts: i64,
    /// Decode timestamp, the 32-bit FLV tag timestamp.
    pub dts: u32,
    /// Signed 24-bit composition offset.
    pub cts: i32,
    /// NAL unit payloads in stream order, length prefixes stripped.
    pub units: Vec<Bytes>,
    pub keyframe: bool,
    /// Group-of-pictures id; bumps once per keyframe, never resets.
    pub gop_id: u32,
}

/// One audio frame (raw AAC frame or raw G.711 payload).
#[derive(Debug, Clone)]
pub struct AudioSample {
    pub pts: u32,
    pub data: Bytes,
}

/// An AMF value decoded from a script tag.
#[derive(Debug, Clone)]
pub struct ScriptSample {
    pub name: String,
    pub value: Amf0Value<'static>,
    pub pts: u32,
}

/// An SEI message lifted out of the video stream.
#[derive(Debug, Clone)]
pub struct SeiSample {
    pub sei: SeiMessage,
    pub pts: i64,
}

#[derive(Debug, Clone, Default)]
pub struct VideoTrack {
    /// Advertised by the FLV header flags.
    pub present: bool,
    pub timescale: u32,
    pub format_timescale: u32,
    pub codec_type: Option<VideoCodec>,
    /// RFC 6381 string, e.g. `avc1.64001f` or `hev1.1.6.L93.B0`.
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub sar_ratio: (u32, u32),
    pub fps_num: u32,
    pub fps_den: u32,
    pub sps: Vec<Bytes>,
    pub pps: Vec<Bytes>,
    /// Empty for AVC.
    pub vps: Vec<Bytes>,
    /// NAL length-prefix width in bytes (1, 2 or 4).
    pub nal_unit_size: u8,
    /// Raw HEVCDecoderConfigurationRecord, kept from the first one seen.
    pub hvcc: Option<Bytes>,
    pub samples: Vec<VideoSample>,
    pub warnings: Vec<String>,
}

impl VideoTrack {
    pub fn new() -> Self {
        Self {
            nal_unit_size: 4,
            ..Default::default()
        }
    }

    /// Drop everything except header presence: codec identity, parameter
    /// sets, samples and warnings.
    pub fn reset(&mut self) {
        let present = self.present;
        *self = Self::new();
        self.present = present;
    }

    /// Clear only the per-call output.
    pub fn clear_transient(&mut self) {
        self.samples.clear();
        self.warnings.clear();
    }
}

#[derive(Debug, Clone, Default)]
pub struct AudioTrack {
    /// Advertised by the FLV header flags.
    pub present: bool,
    /// Equals the sample rate, 0 while unknown.
    pub timescale: u32,
    pub format_timescale: u32,
    pub codec_type: Option<AudioCodec>,
    /// RFC 6381 string for AAC (`mp4a.40.N`), `g7110a`/`g7110m` for G.711.
    pub codec: String,
    pub sample_rate: u32,
    /// Sample width in bits as signalled by the tag flags.
    pub sample_size: u16,
    pub channel_count: u8,
    /// Raw AudioSpecificConfig bytes (AAC only).
    pub config: Bytes,
    pub object_type: u8,
    pub sample_rate_index: u8,
    pub samples: Vec<AudioSample>,
    pub warnings: Vec<String>,
}

impl AudioTrack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        let present = self.present;
        *self = Self::new();
        self.present = present;
    }

    pub fn clear_transient(&mut self) {
        self.samples.clear();
        self.warnings.clear();
    }
}

#[derive(Debug, Clone, Default)]
pub struct MetadataTrack {
    pub timescale: u32,
    pub script_samples: Vec<ScriptSample>,
    pub sei_samples: Vec<SeiSample>,
}

impl MetadataTrack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn clear_transient(&mut self) {
        self.script_samples.clear();
        self.sei_samples.clear();
    }
}
