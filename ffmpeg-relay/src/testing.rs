//! In-memory stand-ins for the container and codec seams.

use std::collections::VecDeque;

use ffmpeg_next::{Dictionary, Rational, codec, format::Pixel, media};

use crate::{
    encoder::{Encoder, Settings, video_parameters},
    error::{CodecError, ReadError, WriteError},
    frame::{RawFrame, RawVideoFrame},
    input::ContainerReader,
    output::{AvOutput, ContainerWriter, WriteMode},
    packet::RawPacket,
    session::{self, CodecSession, Received, Submit},
    stream::StreamDescriptor,
};

pub fn video_stream(index: usize) -> StreamDescriptor {
    StreamDescriptor::new(index, media::Type::Video, codec::Id::H264, Rational(1, 90000))
}

pub fn audio_stream(index: usize) -> StreamDescriptor {
    StreamDescriptor::new(index, media::Type::Audio, codec::Id::AAC, Rational(1, 48000))
}

pub fn subtitle_stream(index: usize) -> StreamDescriptor {
    StreamDescriptor::new(
        index,
        media::Type::Subtitle,
        codec::Id::SUBRIP,
        Rational(1, 1000),
    )
}

pub fn packet(index: usize, time_base: Rational, pts: i64, size: usize) -> RawPacket {
    let mut packet = RawPacket::copy_from(&vec![index as u8; size], index, time_base);
    packet.set_pts(Some(pts));
    packet.set_dts(Some(pts));
    packet
}

pub struct MemoryReader {
    streams: Vec<StreamDescriptor>,
    packets: VecDeque<RawPacket>,
    fail_at_end: bool,
    blocked: usize,
    pub reads: usize,
}

impl MemoryReader {
    pub fn new(streams: Vec<StreamDescriptor>, packets: Vec<RawPacket>) -> Self {
        Self {
            streams,
            packets: packets.into(),
            fail_at_end: false,
            blocked: 0,
            reads: 0,
        }
    }

    /// Report a demux error instead of end of stream once packets run out.
    pub fn failing_at_end(mut self) -> Self {
        self.fail_at_end = true;
        self
    }

    /// Report that nothing is ready for the first `reads` reads.
    pub fn blocking(mut self, reads: usize) -> Self {
        self.blocked = reads;
        self
    }
}

impl ContainerReader for MemoryReader {
    fn streams(&self) -> &[StreamDescriptor] {
        &self.streams
    }

    fn read_packet(&mut self) -> Result<Option<RawPacket>, ReadError> {
        self.reads += 1;
        if self.blocked > 0 {
            self.blocked -= 1;
            return Err(ReadError::WouldBlock {
                locator: self.locator().to_string(),
            });
        }
        match self.packets.pop_front() {
            Some(packet) => Ok(Some(packet)),
            None if self.fail_at_end => Err(ReadError::Demux {
                locator: self.locator().to_string(),
                source: ffmpeg_next::Error::InvalidData,
            }),
            None => Ok(None),
        }
    }

    fn locator(&self) -> &str {
        "memory://source"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriterEvent {
    AddStream(usize),
    Header,
    Packet {
        index: usize,
        pts: Option<i64>,
        dts: Option<i64>,
        duration: i64,
        size: usize,
        mode: WriteMode,
    },
    Trailer,
    Close,
}

/// Records every call; optionally fails the n-th packet write.
#[derive(Default)]
pub struct MemoryWriter {
    pub streams: Vec<StreamDescriptor>,
    pub events: Vec<WriterEvent>,
    header_written: bool,
    trailer_owed: bool,
    closed: bool,
    fail_packet_at: Option<usize>,
    packets_written: usize,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_packet_at(mut self, n: usize) -> Self {
        self.fail_packet_at = Some(n);
        self
    }

    pub fn count(&self, event: fn(&WriterEvent) -> bool) -> usize {
        self.events.iter().filter(|e| event(e)).count()
    }

    pub fn packets(&self) -> Vec<&WriterEvent> {
        self.events
            .iter()
            .filter(|e| matches!(e, WriterEvent::Packet { .. }))
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl ContainerWriter for MemoryWriter {
    fn add_stream(&mut self, source: &StreamDescriptor) -> Result<usize, WriteError> {
        if self.header_written {
            return Err(WriteError::HeaderAlreadyWritten {
                locator: "memory://sink".to_string(),
            });
        }
        let index = self.streams.len();
        self.streams.push(source.renumbered(index));
        self.events.push(WriterEvent::AddStream(index));
        Ok(index)
    }

    fn write_header(&mut self, _options: Option<Dictionary<'_>>) -> Result<(), WriteError> {
        if self.header_written {
            return Err(WriteError::HeaderAlreadyWritten {
                locator: "memory://sink".to_string(),
            });
        }
        self.header_written = true;
        self.trailer_owed = true;
        self.events.push(WriterEvent::Header);
        Ok(())
    }

    fn stream_time_base(&self, index: usize) -> Option<Rational> {
        self.streams.get(index).map(|s| s.time_base())
    }

    fn stream(&self, index: usize) -> Option<StreamDescriptor> {
        self.streams.get(index).cloned()
    }

    fn write_packet(&mut self, packet: RawPacket, mode: WriteMode) -> Result<(), WriteError> {
        if !self.header_written {
            return Err(WriteError::HeaderNotWritten {
                locator: "memory://sink".to_string(),
            });
        }
        if self.fail_packet_at == Some(self.packets_written) {
            return Err(WriteError::Packet {
                index: packet.index(),
                source: ffmpeg_next::Error::InvalidData,
            });
        }
        self.packets_written += 1;
        self.events.push(WriterEvent::Packet {
            index: packet.index(),
            pts: packet.pts(),
            dts: packet.dts(),
            duration: packet.duration(),
            size: packet.size(),
            mode,
        });
        Ok(())
    }

    fn close(&mut self) -> Result<(), WriteError> {
        if self.closed {
            return Ok(());
        }
        if self.trailer_owed {
            self.trailer_owed = false;
            self.events.push(WriterEvent::Trailer);
        }
        self.closed = true;
        self.events.push(WriterEvent::Close);
        Ok(())
    }

    fn is_header_written(&self) -> bool {
        self.header_written
    }
}

/// A session that holds back `delay` inputs before emitting one output per
/// input and refuses input while `capacity` outputs are waiting.
pub struct LookaheadSession {
    delay: usize,
    capacity: usize,
    pending: VecDeque<u32>,
    ready: VecDeque<u32>,
    flushing: bool,
}

impl LookaheadSession {
    pub fn new(delay: usize, capacity: usize) -> Self {
        Self {
            delay,
            capacity: capacity.max(1),
            pending: VecDeque::new(),
            ready: VecDeque::new(),
            flushing: false,
        }
    }
}

impl CodecSession for LookaheadSession {
    type Input = u32;
    type Output = u32;

    fn send(&mut self, input: Option<&u32>) -> Result<Submit, CodecError> {
        if self.ready.len() >= self.capacity {
            return Ok(Submit::TryAgain);
        }
        match input {
            Some(unit) => {
                self.pending.push_back(*unit);
                while self.pending.len() > self.delay {
                    if let Some(unit) = self.pending.pop_front() {
                        self.ready.push_back(unit);
                    }
                }
            }
            None => {
                self.flushing = true;
                self.ready.extend(self.pending.drain(..));
            }
        }
        Ok(Submit::Accepted)
    }

    fn receive(&mut self) -> Result<Received<u32>, CodecError> {
        match self.ready.pop_front() {
            Some(unit) => Ok(Received::Data(unit)),
            None if self.flushing => Ok(Received::EndOfStream),
            None => Ok(Received::Pending),
        }
    }

    fn name(&self) -> &str {
        "lookahead"
    }
}

pub const TEST_WIDTH: u32 = 64;
pub const TEST_HEIGHT: u32 = 48;

/// An mpeg2video encoder for small test pictures. `max_b_frames` adds
/// reorder delay.
pub fn mpeg2_encoder(max_b_frames: u32) -> Result<Encoder, CodecError> {
    let _ = ffmpeg_next::init();
    let parameters = video_parameters(Pixel::YUV420P, TEST_WIDTH, TEST_HEIGHT);
    let settings = Settings {
        keyframe_interval: Some(5),
        max_b_frames: Some(max_b_frames),
        ..Settings::default()
    };
    Encoder::open(codec::Id::MPEG2VIDEO, Some(&parameters), &settings, None)
}

/// A flat picture whose brightness depends on `n`.
pub fn test_frame(n: i64) -> RawFrame {
    let mut frame = RawVideoFrame::new(Pixel::YUV420P, TEST_WIDTH, TEST_HEIGHT);
    let luma = 16 + ((n * 37) % 200) as u8;
    frame.get_mut().data_mut(0).fill(luma);
    frame.get_mut().data_mut(1).fill(128);
    frame.get_mut().data_mut(2).fill(128);
    frame.get_mut().set_pts(Some(n));
    RawFrame::Video(frame)
}

/// Encode `frames` pictures and return every packet, flush included.
pub fn encode_mpeg2(encoder: &mut Encoder, frames: i64) -> Result<Vec<RawPacket>, CodecError> {
    let mut packets = Vec::new();
    for n in 0..frames {
        session::push(encoder, Some(&test_frame(n)), &mut |p| packets.push(p))?;
    }
    session::finish(encoder, &mut |p| packets.push(p))?;
    Ok(packets)
}

/// An mpeg2 elementary stream of `frames` pictures.
pub fn mpeg2_elementary(frames: i64) -> Result<Vec<u8>, CodecError> {
    let mut encoder = mpeg2_encoder(2)?;
    let packets = encode_mpeg2(&mut encoder, frames)?;
    Ok(packets.iter().flat_map(|p| p.as_slice().to_vec()).collect())
}

/// Write a one-stream mpeg2 container file and return the packet count.
pub fn write_mpeg2_file(path: &str, format: Option<&str>, frames: i64) -> anyhow::Result<usize> {
    let mut encoder = mpeg2_encoder(0)?;
    let packets = encode_mpeg2(&mut encoder, frames)?;

    let mut output = AvOutput::open(path, format)?;
    let descriptor = StreamDescriptor::with_parameters(
        0,
        encoder.parameters(),
        encoder.time_base(),
        Rational(25, 1),
    );
    output.add_stream(&descriptor)?;
    output.write_header(None)?;
    let time_base = output
        .stream_time_base(0)
        .ok_or(WriteError::UnknownStream { index: 0 })?;
    let count = packets.len();
    for mut packet in packets {
        packet.set_index(0);
        packet.rescale_to(time_base);
        output.write_packet(packet, WriteMode::Interleaved)?;
    }
    output.close()?;
    Ok(count)
}
