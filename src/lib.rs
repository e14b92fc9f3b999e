//! # liveflv
//!
//! A streaming FLV (Flash Video) demultiplexer. Feed it byte chunks of any
//! size and it produces three logically separate tracks of per-sample
//! records, ready for remuxing into fragmented MP4: video (AVC/HEVC access
//! units as length-stripped NAL lists), audio (raw AAC frames or G.711
//! payloads) and metadata (AMF script values and SEI messages).
//!
//! ```no_run
//! use liveflv::FlvDemuxer;
//!
//! let mut demuxer = FlvDemuxer::new();
//! # let chunk: &[u8] = &[];
//! let tracks = demuxer.demux(chunk, false, true)?;
//! for sample in &tracks.video.samples {
//!     println!("dts {} with {} NAL units", sample.dts, sample.units.len());
//! }
//! # Ok::<(), liveflv::FlvError>(())
//! ```
//!
//! The demuxer carries its state across calls: a partially received tag is
//! buffered and finished by the next chunk, GOP numbering continues, and
//! parameter sets persist until a new configuration record arrives. Pass
//! `discontinuity = true` after a seek or stream switch to start over.

pub mod codec;
pub mod demux;
pub mod error;
pub mod nalu;
pub mod reader;
pub mod track;

pub use codec::{AudioCodec, SpsInfo, VideoCodec};
pub use scuffle_amf0::Amf0Value;
pub use demux::{FlvDemuxer, TrackFixer, Tracks};
pub use error::FlvError;
pub use nalu::SeiMessage;
pub use track::{
    AudioSample, AudioTrack, MetadataTrack, ScriptSample, SeiSample, VideoSample, VideoTrack,
};
