use bytes::Bytes;
use ffmpeg_next::Rational;

use crate::rescale;

/// One encoded packet together with the time base its timestamps are in.
///
/// The backing buffer is released when the packet is dropped or consumed
/// by a write, so at most one buffer is live per read slot.
pub struct RawPacket {
    packet: ffmpeg_next::codec::packet::Packet,
    time_base: Rational,
}

impl RawPacket {
    /// Copy `data` into a new packet buffer. Timestamps start undefined.
    pub fn copy_from(data: &[u8], stream_index: usize, time_base: Rational) -> Self {
        let mut packet = ffmpeg_next::codec::packet::Packet::copy(data);
        packet.set_stream(stream_index);
        Self { packet, time_base }
    }

    pub fn pts(&self) -> Option<i64> {
        self.packet.pts()
    }

    pub fn dts(&self) -> Option<i64> {
        self.packet.dts()
    }

    pub fn duration(&self) -> i64 {
        self.packet.duration()
    }

    /// Byte offset hint in the source, `None` when unknown.
    pub fn position(&self) -> Option<i64> {
        match self.packet.position() {
            pos if pos < 0 => None,
            pos => Some(pos as i64),
        }
    }

    pub fn size(&self) -> usize {
        self.packet.size()
    }

    pub fn index(&self) -> usize {
        self.packet.stream()
    }

    pub fn data(&self) -> Bytes {
        self.packet
            .data()
            .map(Bytes::copy_from_slice)
            .unwrap_or_default()
    }

    pub fn as_slice(&self) -> &[u8] {
        self.packet.data().unwrap_or_default()
    }

    pub fn is_key(&self) -> bool {
        self.packet.is_key()
    }

    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    pub fn set_pts(&mut self, pts: Option<i64>) {
        self.packet.set_pts(pts);
    }

    pub fn set_dts(&mut self, dts: Option<i64>) {
        self.packet.set_dts(dts);
    }

    pub fn set_duration(&mut self, duration: i64) {
        self.packet.set_duration(duration);
    }

    pub fn set_index(&mut self, index: usize) {
        self.packet.set_stream(index);
    }

    pub fn set_key(&mut self, key: bool) {
        let flags = self.packet.flags();
        if key {
            self.packet
                .set_flags(flags | ffmpeg_next::codec::packet::Flags::KEY);
        } else {
            self.packet
                .set_flags(flags - ffmpeg_next::codec::packet::Flags::KEY);
        }
    }

    /// Declare which time base the timestamps are in without touching them.
    pub fn retag(&mut self, time_base: Rational) {
        self.time_base = time_base;
    }

    /// Move the packet into `to`: pts, dts and duration are rescaled and the
    /// byte offset hint is cleared.
    pub fn rescale_to(&mut self, to: Rational) {
        let from = self.time_base;
        let p = &mut self.packet;
        p.set_pts(rescale::rescale_ts(p.pts(), from, to));
        p.set_dts(rescale::rescale_ts(p.dts(), from, to));
        p.set_duration(rescale::rescale(p.duration(), from, to));
        p.set_position(-1);
        self.time_base = to;
    }

    pub fn get_mut(&mut self) -> &mut ffmpeg_next::codec::packet::Packet {
        &mut self.packet
    }

    /// Get a reference to the inner packet (for codec and muxer calls).
    pub fn packet(&self) -> &ffmpeg_next::codec::packet::Packet {
        &self.packet
    }
}

impl From<(ffmpeg_next::codec::packet::Packet, Rational)> for RawPacket {
    fn from((packet, time_base): (ffmpeg_next::codec::packet::Packet, Rational)) -> Self {
        Self { packet, time_base }
    }
}

impl std::fmt::Debug for RawPacket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawPacket")
            .field("index", &self.index())
            .field("pts", &self.pts())
            .field("dts", &self.dts())
            .field("duration", &self.duration())
            .field("size", &self.size())
            .field("key", &self.is_key())
            .finish()
    }
}
