//! Error kinds for every stage of the relay.
//!
//! Each component owns a closed enum so callers can branch on the kind; the
//! FFmpeg status is kept as the source instead of being flattened to text.

use thiserror::Error;

/// Failure to open a source or destination container.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("invalid locator {locator:?}")]
    InvalidLocator { locator: String },
    #[error("input format not found: {name}")]
    FormatNotFound { name: String },
    #[error("cannot open input {locator}: {source}")]
    CannotOpen {
        locator: String,
        source: ffmpeg_next::Error,
    },
    #[error("cannot find stream info for {locator}: {source}")]
    NoStreamInfo {
        locator: String,
        source: ffmpeg_next::Error,
    },
    #[error("cannot deduce output format for {locator} (format hint {format:?}): {source}")]
    CannotDeduceFormat {
        locator: String,
        format: Option<String>,
        source: ffmpeg_next::Error,
    },
    #[error("cannot open output sink {locator}: {source}")]
    CannotOpenSink {
        locator: String,
        source: ffmpeg_next::Error,
    },
}

/// Failure while demuxing. End of stream is not an error.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("read packet from {locator} failed: {source}")]
    Demux {
        locator: String,
        source: ffmpeg_next::Error,
    },
    #[error("packet references unknown source stream {index}")]
    UnknownStream { index: usize },
    /// A live source has nothing ready yet. Not fatal; read again.
    #[error("{locator} has no packet ready")]
    WouldBlock { locator: String },
}

impl ReadError {
    pub fn is_would_block(&self) -> bool {
        matches!(self, ReadError::WouldBlock { .. })
    }
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("header already written to {locator}")]
    HeaderAlreadyWritten { locator: String },
    #[error("header not yet written to {locator}")]
    HeaderNotWritten { locator: String },
    #[error("output {locator} is closed")]
    Closed { locator: String },
    #[error("cannot create destination stream for source stream {source_index}: {source}")]
    StreamCreation {
        source_index: usize,
        source: ffmpeg_next::Error,
    },
    #[error("destination stream {index} does not exist")]
    UnknownStream { index: usize },
    #[error("write header to {locator} failed: {source}")]
    Header {
        locator: String,
        source: ffmpeg_next::Error,
    },
    #[error("write packet to stream {index} failed: {source}")]
    Packet {
        index: usize,
        source: ffmpeg_next::Error,
    },
    #[error("write trailer to {locator} failed: {source}")]
    Trailer {
        locator: String,
        source: ffmpeg_next::Error,
    },
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("codec not found: {codec}")]
    CodecNotFound { codec: String },
    #[error("cannot allocate codec context for {codec}")]
    ContextAllocationFailed { codec: String },
    #[error("cannot copy stream parameters into {codec} context: {source}")]
    ParameterCopyFailed {
        codec: String,
        source: ffmpeg_next::Error,
    },
    #[error("cannot open codec {codec}: {source}")]
    OpenFailed {
        codec: String,
        source: ffmpeg_next::Error,
    },
    #[error("codec {codec} has unsupported media type {medium:?}")]
    UnsupportedMedium {
        codec: String,
        medium: ffmpeg_next::media::Type,
    },
    #[error("frame type does not match the {codec} session")]
    FrameMismatch { codec: String },
    #[error("send to {codec} failed: {source}")]
    Send {
        codec: String,
        source: ffmpeg_next::Error,
    },
    #[error("{codec} refused input but produced no output")]
    Stalled { codec: String },
    #[error("receive from {codec} failed: {source}")]
    Receive {
        codec: String,
        source: ffmpeg_next::Error,
    },
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("no bitstream parser for codec {codec:?}")]
    ParserNotFound { codec: ffmpeg_next::codec::Id },
    #[error("malformed input at byte offset {offset}: {source}")]
    Malformed {
        offset: u64,
        source: ffmpeg_next::Error,
    },
    #[error("parser made no progress at byte offset {offset} with {pending} bytes pending")]
    Stalled { offset: u64, pending: usize },
    #[error("read elementary stream failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Anything that aborts a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Open(#[from] OpenError),
    #[error(transparent)]
    Read(#[from] ReadError),
    #[error(transparent)]
    Write(#[from] WriteError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("invalid pipeline configuration: {0}")]
    Config(String),
}
