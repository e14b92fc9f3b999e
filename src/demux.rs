//! The FLV framing state machine and tag dispatch.
//!
//! [`FlvDemuxer::demux`] accepts arbitrarily fragmented byte slices,
//! buffers any trailing partial tag, and appends per-sample records to the
//! three track records it owns. A fatal error is raised only for a bad
//! container signature; every other anomaly degrades to a per-track
//! warning so subsequent tags keep parsing.

use bytes::Bytes;
use scuffle_amf0::{Amf0Decoder, Amf0Value};
use tracing::{debug, warn};

use crate::codec::{AudioCodec, SpsInfo, VideoCodec, aac, avc, hevc};
use crate::error::FlvError;
use crate::nalu::{self, nal_type};
use crate::reader::{read_u24_be, read_u32_be, sign_extend_24};
use crate::track::{
    AudioSample, AudioTrack, MetadataTrack, ScriptSample, SeiSample, VideoSample, VideoTrack,
};

/// FLV tag types.
mod tag_type {
    pub const AUDIO: u8 = 8;
    pub const VIDEO: u8 = 9;
    pub const SCRIPT: u8 = 18;
}

/// FLV audio sound formats.
mod sound_format {
    pub const G711_ALAW: u8 = 7;
    pub const G711_MULAW: u8 = 8;
    pub const AAC: u8 = 10;
}

/// FLV video codec ids.
mod video_codec_id {
    pub const AVC: u8 = 7;
    pub const HEVC: u8 = 12;
}

/// Sound-rate index table from the audio tag flags.
const SOUND_RATES: [u32; 4] = [5500, 11000, 22000, 44000];

/// Shared borrows of the demuxer's output tracks, valid until the next
/// `demux` call mutates them.
#[derive(Debug)]
pub struct Tracks<'a> {
    pub video: &'a VideoTrack,
    pub audio: &'a AudioTrack,
    pub metadata: &'a MetadataTrack,
}

/// The downstream track normalizer (timestamp fixing, gap removal). It is
/// an external collaborator; the demuxer only hands it the tracks.
pub trait TrackFixer {
    fn fix(
        &mut self,
        video: &mut VideoTrack,
        audio: &mut AudioTrack,
        metadata: &mut MetadataTrack,
        start_time: u32,
        discontinuity: bool,
        contiguous: bool,
    );
}

/// Streaming FLV demultiplexer.
///
/// Owns the three track records and the cross-call state (header flag,
/// remainder buffer, GOP counter, HEVC parameter-set latch). Not
/// re-entrant: one byte stream per instance.
pub struct FlvDemuxer {
    header_parsed: bool,
    /// Copied tail of the previous buffer (never aliases caller memory).
    remaining: Vec<u8>,
    gop_id: u32,
    /// HEVC-only: parameter sets still need to be inserted in-band before
    /// the first keyframe NAL.
    need_params_before_keyframe: bool,
    video: VideoTrack,
    audio: AudioTrack,
    metadata: MetadataTrack,
}

impl Default for FlvDemuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl FlvDemuxer {
    pub fn new() -> Self {
        Self {
            header_parsed: false,
            remaining: Vec::new(),
            gop_id: 0,
            need_params_before_keyframe: true,
            video: VideoTrack::new(),
            audio: AudioTrack::new(),
            metadata: MetadataTrack::new(),
        }
    }

    /// True iff `data` starts with a well-formed FLV file header:
    /// `"FLV"`, version 1, header length >= 9.
    pub fn probe(data: &[u8]) -> bool {
        data.len() >= 9
            && data[0..4] == [0x46, 0x4C, 0x56, 0x01]
            && read_u32_be(data, 5) >= 9
    }

    pub fn tracks(&self) -> Tracks<'_> {
        Tracks {
            video: &self.video,
            audio: &self.audio,
            metadata: &self.metadata,
        }
    }

    /// Demultiplex the next chunk of the stream.
    ///
    /// `discontinuity` signals a seek or stream switch: all track state is
    /// reset and the header is expected again. `contiguous = false` only
    /// drops the buffered remainder (the new data starts at a tag
    /// boundary). The returned tracks hold the samples produced by *this*
    /// call; they are cleared again when the next call starts.
    pub fn demux(
        &mut self,
        data: &[u8],
        discontinuity: bool,
        contiguous: bool,
    ) -> Result<Tracks<'_>, FlvError> {
        if discontinuity || !contiguous {
            self.remaining.clear();
        }
        if discontinuity {
            self.header_parsed = false;
            self.video.reset();
            self.audio.reset();
            self.metadata.reset();
            self.video.present = false;
            self.audio.present = false;
        } else {
            self.video.clear_transient();
            self.audio.clear_transient();
            self.metadata.clear_transient();
        }

        let buf: Bytes = if self.remaining.is_empty() {
            Bytes::copy_from_slice(data)
        } else {
            let mut joined = std::mem::take(&mut self.remaining);
            joined.extend_from_slice(data);
            Bytes::from(joined)
        };
        if buf.is_empty() {
            return Ok(self.tracks());
        }

        let mut cursor = 0usize;
        if !self.header_parsed {
            if buf.len() < 9 {
                self.remaining = buf.to_vec();
                return Ok(self.tracks());
            }
            if !Self::probe(&buf) {
                return Err(FlvError::InvalidContainer("bad FLV signature"));
            }
            let header_len = read_u32_be(&buf, 5) as usize;
            // Header plus the leading previous-tag-size word.
            if buf.len() < header_len + 4 {
                self.remaining = buf.to_vec();
                return Ok(self.tracks());
            }
            let flags = buf[4];
            self.audio.present = flags & 0x04 != 0;
            self.video.present = flags & 0x01 != 0;
            self.header_parsed = true;
            cursor = header_len + 4;
            debug!(
                "[flv] header parsed, audio={} video={}",
                self.audio.present, self.video.present
            );
        }

        // 11-byte tag header + at least the trailing previous-tag-size.
        while cursor + 15 <= buf.len() {
            let tag_type = buf[cursor];
            let data_size = read_u24_be(&buf, cursor + 1) as usize;
            if cursor + 11 + data_size + 4 > buf.len() {
                break; // incomplete tag, keep for the next call
            }
            // Timestamp extension byte is the *high* byte of the 32-bit value.
            let timestamp = ((buf[cursor + 7] as u32) << 24)
                | ((buf[cursor + 4] as u32) << 16)
                | ((buf[cursor + 5] as u32) << 8)
                | buf[cursor + 6] as u32;
            let body = buf.slice(cursor + 11..cursor + 11 + data_size);

            match tag_type {
                tag_type::AUDIO => self.parse_audio(body, timestamp),
                tag_type::VIDEO => self.parse_video(body, timestamp),
                tag_type::SCRIPT => self.parse_script(&body, timestamp),
                other => {
                    let err = FlvError::MalformedFraming(format!("unknown tag type {other}"));
                    warn!("[flv] {err}, tag skipped");
                }
            }

            let prev_tag_size = read_u32_be(&buf, cursor + 11 + data_size) as usize;
            if prev_tag_size != 11 + data_size {
                let err = FlvError::MalformedFraming(format!(
                    "previous tag size {} does not match {}",
                    prev_tag_size,
                    11 + data_size
                ));
                warn!("[flv] {err}");
            }
            cursor += 11 + data_size + 4;
        }

        if cursor < buf.len() {
            self.remaining = buf[cursor..].to_vec();
        }

        self.video.timescale = 1000;
        self.video.format_timescale = 1000;
        self.metadata.timescale = 1000;
        self.audio.format_timescale = 1000;
        self.audio.timescale = self.audio.sample_rate;

        // The container header is authoritative: drop samples for tracks it
        // does not advertise.
        if !self.video.present && !self.video.samples.is_empty() {
            warn!("[flv] video samples in a stream with no video flag, dropping track");
            self.video.reset();
        }
        if !self.audio.present && !self.audio.samples.is_empty() {
            warn!("[flv] audio samples in a stream with no audio flag, dropping track");
            self.audio.reset();
        }

        Ok(self.tracks())
    }

    /// Run the external fixer over the current tracks.
    pub fn fix<F: TrackFixer>(
        &mut self,
        fixer: &mut F,
        start_time: u32,
        discontinuity: bool,
        contiguous: bool,
    ) -> Tracks<'_> {
        fixer.fix(
            &mut self.video,
            &mut self.audio,
            &mut self.metadata,
            start_time,
            discontinuity,
            contiguous,
        );
        self.tracks()
    }

    /// `demux` then `fix`, the usual per-chunk pipeline.
    pub fn demux_and_fix<F: TrackFixer>(
        &mut self,
        data: &[u8],
        fixer: &mut F,
        start_time: u32,
        discontinuity: bool,
        contiguous: bool,
    ) -> Result<Tracks<'_>, FlvError> {
        self.demux(data, discontinuity, contiguous)?;
        Ok(self.fix(fixer, start_time, discontinuity, contiguous))
    }

    fn parse_audio(&mut self, body: Bytes, pts: u32) {
        if body.is_empty() {
            self.audio.warnings.push("empty audio tag".into());
            return;
        }
        let format = body[0] >> 4;
        match format {
            sound_format::G711_ALAW | sound_format::G711_MULAW => {
                let codec_type = if format == sound_format::G711_ALAW {
                    AudioCodec::G711Alaw
                } else {
                    AudioCodec::G711Mulaw
                };
                self.audio.sample_rate = SOUND_RATES[((body[0] >> 2) & 0x03) as usize];
                self.audio.sample_size = if (body[0] >> 1) & 1 == 1 { 16 } else { 8 };
                self.audio.channel_count = (body[0] & 1) + 1;
                // The flags rate field lies for G.711, which is always 8 kHz.
                self.audio.sample_rate = 8000;
                self.audio.codec_type = Some(codec_type);
                self.audio.codec = codec_type.codec_string().to_string();
                self.audio.samples.push(AudioSample {
                    pts,
                    data: body.slice(1..),
                });
            }
            sound_format::AAC => {
                if body.len() < 2 {
                    self.audio.warnings.push("truncated aac audio tag".into());
                    return;
                }
                self.audio.codec_type = Some(AudioCodec::Aac);
                match body[1] {
                    0 => match aac::parse_audio_specific_config(&body[2..]) {
                        Ok(cfg) => {
                            debug!(
                                "[flv] aac config: {} {} Hz {} ch",
                                cfg.codec, cfg.sample_rate, cfg.channel_count
                            );
                            self.audio.codec = cfg.codec;
                            self.audio.object_type = cfg.object_type;
                            self.audio.sample_rate_index = cfg.sampling_frequency_index;
                            self.audio.sample_rate = cfg.sample_rate;
                            self.audio.channel_count = cfg.channel_count;
                            self.audio.config = cfg.config;
                        }
                        Err(e) => {
                            warn!("[flv] bad audio specific config: {e}");
                            self.audio.reset();
                            self.audio.warnings.push(format!("bad audio specific config: {e}"));
                        }
                    },
                    1 => {
                        self.audio.samples.push(AudioSample {
                            pts,
                            data: body.slice(2..),
                        });
                    }
                    other => {
                        self.audio
                            .warnings
                            .push(format!("unknown aac packet type {other}"));
                    }
                }
            }
            other => {
                let err = FlvError::UnsupportedCodec(format!("audio format {other}"));
                warn!("[flv] {err}");
                self.audio.reset();
                self.audio.warnings.push(err.to_string());
            }
        }
    }

    fn parse_video(&mut self, body: Bytes, dts: u32) {
        if body.len() < 6 {
            self.video.warnings.push("truncated video tag".into());
            return;
        }
        let frame_type = body[0] >> 4;
        let codec_id = body[0] & 0x0F;
        let codec = match codec_id {
            video_codec_id::AVC => VideoCodec::Avc,
            video_codec_id::HEVC => VideoCodec::Hevc,
            other => {
                let err = FlvError::UnsupportedCodec(format!("video codec id {other}"));
                warn!("[flv] {err}");
                self.video.reset();
                self.video.warnings.push(err.to_string());
                return;
            }
        };
        self.video.codec_type = Some(codec);

        let packet_type = body[1];
        let cts = sign_extend_24(read_u24_be(&body, 2));

        match packet_type {
            0 => self.parse_video_config(codec, body.slice(5..)),
            1 => self.parse_video_nalus(codec, body.slice(5..), frame_type, dts, cts),
            2 => {} // end of sequence
            other => {
                self.video
                    .warnings
                    .push(format!("unknown video packet type {other}"));
            }
        }
    }

    fn parse_video_config(&mut self, codec: VideoCodec, record: Bytes) {
        match codec {
            VideoCodec::Avc => match avc::parse_decoder_configuration_record(&record) {
                Ok(rec) => {
                    self.video.nal_unit_size = rec.nal_unit_size;
                    if !rec.sps_arr.is_empty() {
                        self.video.sps = rec.sps_arr;
                    }
                    if !rec.pps_arr.is_empty() {
                        self.video.pps = rec.pps_arr;
                    }
                    if let Some(info) = rec.sps {
                        self.apply_sps_info(info);
                    }
                }
                Err(e) => {
                    warn!("[flv] bad avc decoder configuration record: {e}");
                    self.video
                        .warnings
                        .push(format!("bad avc decoder configuration record: {e}"));
                }
            },
            VideoCodec::Hevc => match hevc::parse_decoder_configuration_record(&record) {
                Ok(rec) => {
                    if self.video.hvcc.is_none() {
                        self.video.hvcc = Some(rec.hvcc);
                    }
                    self.video.nal_unit_size = rec.nal_unit_size;
                    if !rec.vps_arr.is_empty() {
                        self.video.vps = rec.vps_arr;
                    }
                    if !rec.sps_arr.is_empty() {
                        self.video.sps = rec.sps_arr;
                    }
                    if !rec.pps_arr.is_empty() {
                        self.video.pps = rec.pps_arr;
                    }
                    if let Some(info) = rec.sps {
                        self.apply_sps_info(info);
                    }
                }
                Err(e) => {
                    warn!("[flv] bad hevc decoder configuration record: {e}");
                    self.video
                        .warnings
                        .push(format!("bad hevc decoder configuration record: {e}"));
                }
            },
        }
    }

    fn apply_sps_info(&mut self, info: SpsInfo) {
        if !info.codec.is_empty() {
            self.video.codec = info.codec;
        }
        if info.width != 0 {
            self.video.width = info.width;
        }
        if info.height != 0 {
            self.video.height = info.height;
        }
        self.video.sar_ratio = info.sar_ratio;
        if info.fps_num != 0 {
            self.video.fps_num = info.fps_num;
            self.video.fps_den = info.fps_den;
        }
    }

    fn parse_video_nalus(
        &mut self,
        codec: VideoCodec,
        payload: Bytes,
        frame_type: u8,
        dts: u32,
        cts: i32,
    ) {
        let mut units = nalu::parse_avcc(&payload, self.video.nal_unit_size);
        units = self.insert_parameter_sets(codec, units);
        if units.is_empty() {
            self.video.warnings.push("video tag with no NAL units".into());
            return;
        }

        let pts = dts as i64 + cts as i64;
        let mut keyframe = frame_type == 1;
        for unit in &units {
            if unit.is_empty() {
                continue;
            }
            match codec {
                VideoCodec::Avc => {
                    let nal = unit[0] & 0x1F;
                    if nal == nal_type::AVC_IDR {
                        keyframe = true;
                    } else if nal == nal_type::AVC_SEI {
                        self.push_sei(unit, false, pts);
                    }
                }
                VideoCodec::Hevc => {
                    let nal = (unit[0] >> 1) & 0x3F;
                    if (nal_type::HEVC_IRAP_FIRST..=nal_type::HEVC_IRAP_LAST).contains(&nal) {
                        keyframe = true;
                    } else if nal == nal_type::HEVC_SEI_PREFIX || nal == nal_type::HEVC_SEI_SUFFIX {
                        self.push_sei(unit, true, pts);
                    }
                }
            }
        }

        if keyframe {
            self.gop_id += 1;
        }
        self.video.samples.push(VideoSample {
            pts,
            dts,
            cts,
            units,
            keyframe,
            gop_id: self.gop_id,
        });
    }

    /// HEVC streams that carry parameter sets only in the configuration
    /// record need them re-emitted in-band before the first keyframe NAL;
    /// downstream packagers rely on it.
    fn insert_parameter_sets(&mut self, codec: VideoCodec, units: Vec<Bytes>) -> Vec<Bytes> {
        if codec == VideoCodec::Avc {
            self.need_params_before_keyframe = false;
            return units;
        }
        let has_vps = units
            .iter()
            .any(|u| !u.is_empty() && (u[0] >> 1) & 0x3F == nal_type::HEVC_VPS);
        if has_vps {
            self.need_params_before_keyframe = false;
            return units;
        }
        if !self.need_params_before_keyframe {
            return units;
        }
        let mut head: Vec<Bytes> = Vec::with_capacity(3 + units.len());
        head.extend(self.video.vps.first().cloned());
        head.extend(self.video.sps.first().cloned());
        head.extend(self.video.pps.first().cloned());
        if head.is_empty() {
            // Nothing to insert yet; keep the latch armed for the next tag.
            return units;
        }
        debug!("[flv] inserted {} parameter sets before keyframe", head.len());
        self.need_params_before_keyframe = false;
        head.extend(units);
        head
    }

    fn push_sei(&mut self, unit: &Bytes, is_hevc: bool, pts: i64) {
        let rbsp = nalu::remove_epb(unit);
        match nalu::parse_sei(&rbsp, is_hevc) {
            Ok(sei) => self.metadata.sei_samples.push(SeiSample { sei, pts }),
            Err(e) => {
                self.video.warnings.push(format!("bad sei message: {e}"));
            }
        }
    }

    fn parse_script(&mut self, body: &Bytes, pts: u32) {
        let mut decoder = Amf0Decoder::new(body);
        let name = match decoder.decode() {
            Ok(Amf0Value::String(name)) => name.to_string(),
            Ok(other) => {
                warn!("[flv] script tag name is not a string: {other:?}");
                return;
            }
            Err(e) => {
                warn!("[flv] bad script tag: {e:?}");
                return;
            }
        };
        match decoder.decode() {
            Ok(value) => {
                debug!("[flv] script tag {name}");
                self.metadata.script_samples.push(ScriptSample {
                    name,
                    value: value.to_owned(),
                    pts,
                });
            }
            Err(e) => {
                warn!("[flv] bad script tag {name}: {e:?}");
            }
        }
    }
}
