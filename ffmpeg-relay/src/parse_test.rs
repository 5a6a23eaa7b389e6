use std::collections::VecDeque;
use std::io::{self, Cursor, Read};

use ffmpeg_next::format::Pixel;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::{
    annexb::AnnexBParser,
    error::{CodecError, ParseError},
    frame::RawVideoFrame,
    session::{Received, Submit},
    testing::{TEST_HEIGHT, TEST_WIDTH, mpeg2_elementary},
};

/// Turns every packet into one small picture.
#[derive(Default)]
struct PictureSession {
    ready: VecDeque<RawFrame>,
    flushed: bool,
    sizes: Vec<usize>,
}

impl CodecSession for PictureSession {
    type Input = RawPacket;
    type Output = RawFrame;

    fn send(&mut self, input: Option<&RawPacket>) -> Result<Submit, CodecError> {
        match input {
            Some(packet) => {
                self.sizes.push(packet.size());
                self.ready
                    .push_back(RawFrame::Video(RawVideoFrame::new(Pixel::GRAY8, 2, 2)));
            }
            None => self.flushed = true,
        }
        Ok(Submit::Accepted)
    }

    fn receive(&mut self) -> Result<Received<RawFrame>, CodecError> {
        match self.ready.pop_front() {
            Some(frame) => Ok(Received::Data(frame)),
            None if self.flushed => Ok(Received::EndOfStream),
            None => Ok(Received::Pending),
        }
    }

    fn name(&self) -> &str {
        "picture"
    }
}

const ANNEXB: &[u8] = &[
    0, 0, 0, 1, 0x67, 1, 2, //
    0, 0, 0, 1, 0x68, 3, //
    0, 0, 1, 0x65, 4, 5, 6,
];

#[test]
fn test_parse_annexb_units() -> anyhow::Result<()> {
    let options = ParseOptions {
        chunk_size: 2,
        ..Default::default()
    };
    let mut pipeline = ParsePipeline::new(
        Cursor::new(ANNEXB.to_vec()),
        AnnexBParser::new(),
        PictureSession::default(),
        options,
    );
    let mut events = Vec::new();
    let summary = pipeline.run(&CancellationToken::new(), |event| {
        events.push((event.packet, event.index))
    })?;
    assert_eq!(summary.bytes, ANNEXB.len() as u64);
    assert_eq!(summary.packets, 3);
    assert_eq!(summary.frames, 3);
    assert_eq!(events, vec![(1, 0), (2, 0), (3, 0)]);
    assert_eq!(pipeline.decoder.sizes, vec![7, 6, 7]);
    assert_eq!(pipeline.state(), PipelineState::Closed);
    Ok(())
}

#[test]
fn test_parse_cancelled_before_reading() -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut pipeline = ParsePipeline::new(
        Cursor::new(ANNEXB.to_vec()),
        AnnexBParser::new(),
        PictureSession::default(),
        ParseOptions::default(),
    );
    let summary = pipeline.run(&cancel, |_| {})?;
    assert!(summary.cancelled);
    assert_eq!(summary.bytes, 0);
    assert_eq!(summary.packets, 0);
    Ok(())
}

struct BrokenSource;

impl Read for BrokenSource {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::other("device gone"))
    }
}

#[test]
fn test_parse_read_error_is_fatal() {
    let mut pipeline = ParsePipeline::new(
        BrokenSource,
        AnnexBParser::new(),
        PictureSession::default(),
        ParseOptions::default(),
    );
    let err = pipeline.run(&CancellationToken::new(), |_| {}).unwrap_err();
    assert!(matches!(err, PipelineError::Parse(ParseError::Io(_))));
}

#[test]
fn test_parse_zero_packet_limit_decodes_nothing() -> anyhow::Result<()> {
    let options = ParseOptions {
        max_packets: Some(0),
        ..Default::default()
    };
    let mut pipeline = ParsePipeline::new(
        Cursor::new(ANNEXB.to_vec()),
        AnnexBParser::new(),
        PictureSession::default(),
        options,
    );
    let mut frames = 0;
    let summary = pipeline.run(&CancellationToken::new(), |_| frames += 1)?;
    assert_eq!(summary.packets, 0);
    assert_eq!(summary.frames, 0);
    assert_eq!(summary.bytes, 0);
    assert_eq!(frames, 0);
    assert!(pipeline.decoder.sizes.is_empty());
    Ok(())
}

#[test]
fn test_parse_limit_stops_before_next_packet() -> anyhow::Result<()> {
    let options = ParseOptions {
        chunk_size: ANNEXB.len(),
        max_packets: Some(1),
    };
    let mut pipeline = ParsePipeline::new(
        Cursor::new(ANNEXB.to_vec()),
        AnnexBParser::new(),
        PictureSession::default(),
        options,
    );
    let summary = pipeline.run(&CancellationToken::new(), |_| {})?;
    assert_eq!(summary.packets, 1);
    assert_eq!(pipeline.decoder.sizes, vec![7]);
    Ok(())
}

#[test]
fn test_parse_runs_once() -> anyhow::Result<()> {
    let mut pipeline = ParsePipeline::new(
        Cursor::new(ANNEXB.to_vec()),
        AnnexBParser::new(),
        PictureSession::default(),
        ParseOptions::default(),
    );
    pipeline.run(&CancellationToken::new(), |_| {})?;
    let err = pipeline.run(&CancellationToken::new(), |_| {}).unwrap_err();
    assert!(matches!(err, PipelineError::Config(_)));
    Ok(())
}

fn mpeg2_file(frames: i64) -> anyhow::Result<tempfile::NamedTempFile> {
    let stream = mpeg2_elementary(frames)?;
    let mut file = tempfile::NamedTempFile::new()?;
    std::io::Write::write_all(&mut file, &stream)?;
    Ok(file)
}

#[test]
fn test_parse_mpeg2_file_any_chunk_size() -> anyhow::Result<()> {
    let file = mpeg2_file(12)?;
    for chunk_size in [1, 7, 4096] {
        let options = ParseOptions {
            chunk_size,
            ..Default::default()
        };
        let mut pipeline = ParsePipeline::open(
            file.path(),
            ffmpeg_next::codec::Id::MPEG2VIDEO,
            options,
        )?;
        let mut sizes = Vec::new();
        let summary = pipeline.run(&CancellationToken::new(), |event| {
            if let RawFrame::Video(frame) = event.frame {
                sizes.push((frame.width(), frame.height()));
            }
        })?;
        assert_eq!(summary.packets, 12, "chunk size {}", chunk_size);
        assert_eq!(summary.frames, 12, "chunk size {}", chunk_size);
        assert!(sizes.iter().all(|s| *s == (TEST_WIDTH, TEST_HEIGHT)));
    }
    Ok(())
}

#[test]
fn test_parse_packet_limit() -> anyhow::Result<()> {
    let file = mpeg2_file(12)?;
    let options = ParseOptions {
        max_packets: Some(3),
        ..Default::default()
    };
    let mut pipeline = ParsePipeline::open(file.path(), "mpeg2video", options)?;
    let summary = pipeline.run(&CancellationToken::new(), |_| {})?;
    assert_eq!(summary.packets, 3);
    assert!(summary.frames <= 3);
    Ok(())
}

#[test]
fn test_open_unknown_codec() -> anyhow::Result<()> {
    let file = mpeg2_file(1)?;
    let err = ParsePipeline::open(file.path(), "no-such-codec", ParseOptions::default())
        .err()
        .unwrap();
    assert!(matches!(
        err,
        PipelineError::Codec(CodecError::CodecNotFound { .. })
    ));
    Ok(())
}

#[test]
fn test_open_missing_file() {
    let err = ParsePipeline::open(
        "/nonexistent/stream.m2v",
        "mpeg2video",
        ParseOptions::default(),
    )
    .err()
    .unwrap();
    assert!(matches!(err, PipelineError::Parse(ParseError::Io(_))));
}
