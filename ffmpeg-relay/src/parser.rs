//! Access unit reassembly from an arbitrarily chunked elementary stream.

use std::ptr;

use bytes::Bytes;
use ffmpeg_next::{Rational, codec, ffi};

use crate::{error::ParseError, packet::RawPacket};

/// FFmpeg's AV_NOPTS_VALUE.
const NO_TIMESTAMP: i64 = i64::MIN;

/// One complete unit emitted by a parse step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUnit {
    pub data: Bytes,
    pub key: bool,
}

/// Result of one parse step over the front of the remaining input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseStep {
    pub consumed: usize,
    pub unit: Option<ParsedUnit>,
}

/// A reassembly engine. It decides unit boundaries; the caller only moves
/// the cursor.
pub trait BitstreamParser {
    /// Consume a prefix of `input`. An empty `input` flushes whatever unit
    /// the parser is still holding.
    fn parse(&mut self, input: &[u8]) -> Result<ParseStep, ParseError>;

    /// Forget all buffered state, for a restarted stream.
    fn reset(&mut self) -> Result<(), ParseError>;
}

/// FFmpeg's stream-level parser for one codec (`av_parser_parse2`).
pub struct AvParser {
    codec_id: codec::Id,
    parser: *mut ffi::AVCodecParserContext,
    context: ffmpeg_next::codec::Context,
    offset: u64,
}

unsafe impl Send for AvParser {}

impl AvParser {
    pub fn new(codec_id: codec::Id) -> Result<Self, ParseError> {
        let parser = Self::init(codec_id)?;
        Ok(Self {
            codec_id,
            parser,
            context: ffmpeg_next::codec::Context::new(),
            offset: 0,
        })
    }

    fn init(codec_id: codec::Id) -> Result<*mut ffi::AVCodecParserContext, ParseError> {
        let id: ffi::AVCodecID = codec_id.into();
        let parser = unsafe { ffi::av_parser_init(id as i32) };
        if parser.is_null() {
            return Err(ParseError::ParserNotFound { codec: codec_id });
        }
        Ok(parser)
    }

    pub fn codec_id(&self) -> codec::Id {
        self.codec_id
    }
}

impl BitstreamParser for AvParser {
    fn parse(&mut self, input: &[u8]) -> Result<ParseStep, ParseError> {
        let mut out: *mut u8 = ptr::null_mut();
        let mut out_size: i32 = 0;
        let size = input.len().min(i32::MAX as usize);
        let rc = unsafe {
            ffi::av_parser_parse2(
                self.parser,
                self.context.as_mut_ptr(),
                &mut out,
                &mut out_size,
                input.as_ptr(),
                size as i32,
                NO_TIMESTAMP,
                NO_TIMESTAMP,
                self.offset as i64,
            )
        };
        if rc < 0 {
            return Err(ParseError::Malformed {
                offset: self.offset,
                source: ffmpeg_next::Error::from(rc),
            });
        }
        let consumed = rc as usize;
        self.offset += consumed as u64;

        let unit = if out_size > 0 && !out.is_null() {
            // The output buffer belongs to the parser and is only valid
            // until the next call.
            let data = unsafe { std::slice::from_raw_parts(out, out_size as usize) };
            // Parsers that leave key_frame unset report the picture type.
            let key = unsafe {
                let ctx = &*self.parser;
                ctx.key_frame == 1
                    || (ctx.key_frame == -1
                        && ctx.pict_type == ffi::AVPictureType::AV_PICTURE_TYPE_I as i32)
            };
            Some(ParsedUnit {
                data: Bytes::copy_from_slice(data),
                key,
            })
        } else {
            None
        };
        Ok(ParseStep { consumed, unit })
    }

    fn reset(&mut self) -> Result<(), ParseError> {
        let fresh = Self::init(self.codec_id)?;
        unsafe { ffi::av_parser_close(self.parser) };
        self.parser = fresh;
        self.offset = 0;
        Ok(())
    }
}

impl Drop for AvParser {
    fn drop(&mut self) {
        unsafe { ffi::av_parser_close(self.parser) };
    }
}

/// Turns chunks of bytes into packets, whatever the chunk boundaries.
pub struct IncrementalParser<P: BitstreamParser> {
    parser: P,
    stream_index: usize,
    time_base: Rational,
    consumed: u64,
    emitted: u64,
}

impl<P: BitstreamParser> IncrementalParser<P> {
    pub fn new(parser: P, stream_index: usize, time_base: Rational) -> Self {
        Self {
            parser,
            stream_index,
            time_base,
            consumed: 0,
            emitted: 0,
        }
    }

    /// Lazily parse `chunk`; every complete unit found is yielded as a
    /// packet. Input left in the parser carries over to the next call.
    pub fn feed<'a>(&'a mut self, chunk: &'a [u8]) -> Feed<'a, P> {
        Feed {
            parser: self,
            remaining: chunk,
            flushing: false,
            done: false,
        }
    }

    /// Flush units the parser still holds at end of input.
    pub fn finish(&mut self) -> Feed<'_, P> {
        Feed {
            parser: self,
            remaining: &[],
            flushing: true,
            done: false,
        }
    }

    /// Restart on a new stream: buffered bytes are discarded.
    pub fn restart(&mut self) -> Result<(), ParseError> {
        self.parser.reset()?;
        self.consumed = 0;
        Ok(())
    }

    /// Input bytes consumed since start or restart.
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Packets produced over the parser's lifetime.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    fn packet(&mut self, unit: ParsedUnit) -> RawPacket {
        self.emitted += 1;
        let mut packet = RawPacket::copy_from(&unit.data, self.stream_index, self.time_base);
        packet.set_key(unit.key);
        packet
    }
}

pub struct Feed<'a, P: BitstreamParser> {
    parser: &'a mut IncrementalParser<P>,
    remaining: &'a [u8],
    flushing: bool,
    done: bool,
}

impl<P: BitstreamParser> Iterator for Feed<'_, P> {
    type Item = Result<RawPacket, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            if self.remaining.is_empty() && !self.flushing {
                self.done = true;
                return None;
            }
            let step = match self.parser.parser.parse(self.remaining) {
                Ok(step) => step,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };
            let consumed = step.consumed.min(self.remaining.len());
            self.remaining = &self.remaining[consumed..];
            self.parser.consumed += consumed as u64;

            match step.unit {
                Some(unit) if !unit.data.is_empty() => {
                    return Some(Ok(self.parser.packet(unit)));
                }
                _ if self.flushing => {
                    // A flush step that yields nothing means the parser is empty.
                    self.done = true;
                    return None;
                }
                _ if consumed == 0 => {
                    self.done = true;
                    return Some(Err(ParseError::Stalled {
                        offset: self.parser.consumed,
                        pending: self.remaining.len(),
                    }));
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
#[path = "parser_test.rs"]
mod parser_test;
