use thiserror::Error;

/// Errors raised while demultiplexing an FLV byte stream.
///
/// Only [`FlvError::InvalidContainer`] ever escapes
/// [`FlvDemuxer::demux`](crate::FlvDemuxer::demux); the other variants are
/// produced by the payload parsers and degrade to per-track warnings.
#[derive(Debug, Error)]
pub enum FlvError {
    /// The stream does not start with a well-formed FLV header.
    #[error("invalid FLV container: {0}")]
    InvalidContainer(&'static str),

    /// Audio format or video codec id this demuxer does not handle.
    #[error("unsupported codec: {0}")]
    UnsupportedCodec(String),

    /// Tag-level framing damage (bad sizes, unknown tag types).
    #[error("malformed framing: {0}")]
    MalformedFraming(String),

    /// A tag body or embedded record that cannot be decoded.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}
