//! Elementary stream decoding: chunked bytes -> parser -> decoder -> frames.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use ffmpeg_next::Rational;
use tokio_util::sync::CancellationToken;

use crate::{
    decoder::Decoder,
    error::{ParseError, PipelineError},
    frame::RawFrame,
    packet::RawPacket,
    parser::{AvParser, BitstreamParser, IncrementalParser},
    remux::PipelineState,
    session::{self, CodecSelector, CodecSession},
};

/// Bytes read from the source per step.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

#[derive(Debug, Clone)]
pub struct ParseOptions {
    pub chunk_size: usize,
    /// Stop after this many packets have been decoded.
    pub max_packets: Option<u64>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_packets: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseSummary {
    pub bytes: u64,
    pub packets: u64,
    pub frames: u64,
    pub cancelled: bool,
}

/// One decoded frame and the packet (1-based) that completed it.
pub struct FrameEvent<'a> {
    pub packet: u64,
    /// Position among the frames that packet produced.
    pub index: usize,
    pub frame: &'a RawFrame,
}

pub struct ParsePipeline<S, P, D>
where
    S: Read,
    P: BitstreamParser,
    D: CodecSession<Input = RawPacket, Output = RawFrame>,
{
    source: S,
    parser: IncrementalParser<P>,
    decoder: D,
    options: ParseOptions,
    state: PipelineState,
}

impl ParsePipeline<BufReader<File>, AvParser, Decoder> {
    /// Decode the elementary stream at `path` with the named or identified
    /// codec. The parser is chosen to match the decoder.
    pub fn open(
        path: impl AsRef<Path>,
        codec: impl Into<CodecSelector>,
        options: ParseOptions,
    ) -> Result<Self, PipelineError> {
        let file = File::open(path.as_ref()).map_err(ParseError::from)?;
        let decoder = Decoder::open(codec, None, None)?;
        let parser = AvParser::new(decoder.id())?;
        log::info!("parsing {} as {:?}", path.as_ref().display(), decoder.id());
        Ok(Self::new(BufReader::new(file), parser, decoder, options))
    }
}

impl<S, P, D> ParsePipeline<S, P, D>
where
    S: Read,
    P: BitstreamParser,
    D: CodecSession<Input = RawPacket, Output = RawFrame>,
{
    pub fn new(source: S, parser: P, decoder: D, options: ParseOptions) -> Self {
        Self {
            source,
            parser: IncrementalParser::new(parser, 0, Rational(1, 1)),
            decoder,
            options,
            state: PipelineState::Opened,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Read until end of input, the packet limit, or cancellation, feeding
    /// every reassembled packet to the decoder, then flush the decoder.
    pub fn run<F>(
        &mut self,
        cancel: &CancellationToken,
        mut on_frame: F,
    ) -> Result<ParseSummary, PipelineError>
    where
        F: FnMut(FrameEvent<'_>),
    {
        if self.state != PipelineState::Opened {
            return Err(PipelineError::Config(format!(
                "parse cannot run from state {:?}",
                self.state
            )));
        }
        self.state = PipelineState::Streaming;
        let result = self.stream(cancel, &mut on_frame);
        self.state = PipelineState::Closed;
        result
    }

    fn stream<F>(
        &mut self,
        cancel: &CancellationToken,
        on_frame: &mut F,
    ) -> Result<ParseSummary, PipelineError>
    where
        F: FnMut(FrameEvent<'_>),
    {
        let mut summary = ParseSummary::default();
        let mut chunk = vec![0u8; self.options.chunk_size.max(1)];
        let max_packets = self.options.max_packets;
        let limit_reached =
            |summary: &ParseSummary| max_packets.is_some_and(|max| summary.packets >= max);

        'read: loop {
            if cancel.is_cancelled() {
                log::info!("parse cancelled after {} packets", summary.packets);
                summary.cancelled = true;
                break;
            }
            if limit_reached(&summary) {
                log::info!("packet limit reached");
                break;
            }
            let n = match self.source.read(&mut chunk) {
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(ParseError::from(e).into()),
            };
            summary.bytes += n as u64;

            if n == 0 {
                for packet in self.parser.finish() {
                    if limit_reached(&summary) {
                        break;
                    }
                    decode(&mut self.decoder, &packet?, &mut summary, on_frame)?;
                }
                break;
            }
            for packet in self.parser.feed(&chunk[..n]) {
                if limit_reached(&summary) {
                    log::info!("packet limit reached");
                    break 'read;
                }
                decode(&mut self.decoder, &packet?, &mut summary, on_frame)?;
            }
        }

        let packet = summary.packets;
        let mut index = 0;
        let flushed = session::finish(&mut self.decoder, &mut |frame: RawFrame| {
            log::debug!("frame[{}:{}] {}", packet, index, frame);
            on_frame(FrameEvent {
                packet,
                index,
                frame: &frame,
            });
            index += 1;
        })?;
        summary.frames += flushed as u64;
        log::info!(
            "parsed {} bytes into {} packets, {} frames",
            summary.bytes,
            summary.packets,
            summary.frames
        );
        Ok(summary)
    }
}

fn decode<D, F>(
    decoder: &mut D,
    packet: &RawPacket,
    summary: &mut ParseSummary,
    on_frame: &mut F,
) -> Result<(), PipelineError>
where
    D: CodecSession<Input = RawPacket, Output = RawFrame>,
    F: FnMut(FrameEvent<'_>),
{
    summary.packets += 1;
    let number = summary.packets;
    log::trace!("packet {}: {} bytes", number, packet.size());
    let mut index = 0;
    let drained = session::push(decoder, Some(packet), &mut |frame: RawFrame| {
        log::debug!("frame[{}:{}] {}", number, index, frame);
        on_frame(FrameEvent {
            packet: number,
            index,
            frame: &frame,
        });
        index += 1;
    })?;
    summary.frames += drained.count as u64;
    Ok(())
}

#[cfg(test)]
#[path = "parse_test.rs"]
mod parse_test;
