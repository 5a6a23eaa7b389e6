//! Annex B start-code handling for H.264/HEVC elementary streams.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use ffmpeg_next::codec::Parameters;

use crate::{
    error::ParseError,
    parser::{BitstreamParser, ParseStep, ParsedUnit},
};

/// Annex B start code (4-byte)
const START_CODE: &[u8] = &[0x00, 0x00, 0x00, 0x01];

/// Reads extradata from codec parameters via the raw AVCodecParameters pointer.
/// Returns None if extradata is null or empty.
fn get_extradata(codec_params: &Parameters) -> Option<&[u8]> {
    unsafe {
        let p = codec_params.as_ptr();
        let extradata_ptr = (*p).extradata;
        if extradata_ptr.is_null() {
            return None;
        }
        let size = (*p).extradata_size;
        if size <= 0 {
            return None;
        }
        Some(std::slice::from_raw_parts(extradata_ptr, size as usize))
    }
}

/// Check if the codec parameters indicate AVCC/HVCC format (needs conversion to Annex B).
pub fn needs_annexb_conversion(codec_params: &Parameters) -> bool {
    let extradata = match get_extradata(codec_params) {
        Some(d) => d,
        None => return false,
    };
    if extradata.len() < 4 || is_annexb_packet(extradata) {
        return false;
    }
    // AVCC/HVCC records start with configurationVersion = 1
    extradata[0] == 0x01 && extradata.len() >= 7
}

/// Check if packet data is in Annex B format by looking at the start codes.
pub fn is_annexb_packet(data: &[u8]) -> bool {
    data.starts_with(&[0x00, 0x00, 0x01]) || data.starts_with(START_CODE)
}

/// Converts AVCC (4-byte big-endian length + NAL, repeated) to Annex B
/// (start code + NAL). A truncated length ends the conversion.
pub fn convert_avcc_to_annexb(avcc: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(avcc.len() + 16);
    let mut i = 0;
    while i + 4 <= avcc.len() {
        let len = u32::from_be_bytes([avcc[i], avcc[i + 1], avcc[i + 2], avcc[i + 3]]) as usize;
        i += 4;
        if len == 0 || i + len > avcc.len() {
            break;
        }
        out.extend_from_slice(START_CODE);
        out.extend_from_slice(&avcc[i..i + len]);
        i += len;
    }
    out.freeze()
}

/// Location of one NAL unit inside an Annex B buffer (start code excluded).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalUnit {
    pub offset: usize,
    pub size: usize,
    pub header: u8,
}

impl NalUnit {
    pub fn h264_type(&self) -> u8 {
        self.header & 0x1f
    }

    pub fn hevc_type(&self) -> u8 {
        (self.header >> 1) & 0x3f
    }
}

/// Find every NAL unit in an Annex B buffer.
pub fn nal_units(data: &[u8]) -> Vec<NalUnit> {
    let mut starts = Vec::new();
    let mut i = 0;
    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            starts.push(i + 3);
            i += 3;
        } else {
            i += 1;
        }
    }

    let mut units = Vec::with_capacity(starts.len());
    for (n, &start) in starts.iter().enumerate() {
        let mut end = match starts.get(n + 1) {
            Some(&next) => next - 3,
            None => data.len(),
        };
        // A leading zero of a 4-byte start code belongs to the next unit.
        while end > start && data[end - 1] == 0 && starts.get(n + 1).is_some() {
            end -= 1;
        }
        if end > start {
            units.push(NalUnit {
                offset: start,
                size: end - start,
                header: data[start],
            });
        }
    }
    units
}

/// Splits an Annex B byte stream into NAL units, each emitted with its own
/// start code. Bytes before the first start code are dropped.
#[derive(Debug, Default)]
pub struct AnnexBParser {
    buf: BytesMut,
    synced: bool,
}

impl AnnexBParser {
    pub fn new() -> Self {
        Self::default()
    }

    fn unit(data: Bytes) -> ParsedUnit {
        let key = nal_units(&data)
            .first()
            .is_some_and(|nal| matches!(nal.h264_type(), 5 | 7 | 8));
        ParsedUnit { data, key }
    }
}

impl BitstreamParser for AnnexBParser {
    fn parse(&mut self, input: &[u8]) -> Result<ParseStep, ParseError> {
        if input.is_empty() {
            let unit = if self.synced && !self.buf.is_empty() {
                Some(Self::unit(self.buf.split().freeze()))
            } else {
                None
            };
            return Ok(ParseStep { consumed: 0, unit });
        }

        for (i, &byte) in input.iter().enumerate() {
            self.buf.put_u8(byte);
            if !self.synced && self.buf.len() > 4 {
                // Only a possible start code is worth keeping before sync.
                let excess = self.buf.len() - 4;
                self.buf.advance(excess);
            }
            let len = self.buf.len();
            if len < 3 || self.buf[len - 3..] != [0x00, 0x00, 0x01] {
                continue;
            }
            let mut start = len - 3;
            if start > 0 && self.buf[start - 1] == 0x00 {
                start -= 1;
            }
            if !self.synced {
                self.buf.advance(start);
                self.synced = true;
                continue;
            }
            if start > 0 {
                let unit = self.buf.split_to(start).freeze();
                return Ok(ParseStep {
                    consumed: i + 1,
                    unit: Some(Self::unit(unit)),
                });
            }
        }
        Ok(ParseStep {
            consumed: input.len(),
            unit: None,
        })
    }

    fn reset(&mut self) -> Result<(), ParseError> {
        self.buf.clear();
        self.synced = false;
        Ok(())
    }
}

#[cfg(test)]
#[path = "annexb_test.rs"]
mod annexb_test;
