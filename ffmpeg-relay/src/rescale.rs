//! Timestamp conversion between time bases.
//!
//! All arithmetic is done on exact 128-bit products and rounded once to the
//! nearest tick (halves away from zero), which is how FFmpeg's
//! `av_rescale_q` rounds, so long runs do not accumulate drift.

use ffmpeg_next::Rational;

use crate::packet::RawPacket;

/// Milliseconds, the unit the pacing timeline is measured in.
pub const MILLISECONDS: Rational = Rational(1, 1000);

/// Rescale `value` ticks of `from` into ticks of `to`.
///
/// Degenerate time bases (zero numerator or denominator) leave the value
/// untouched.
pub fn rescale(value: i64, from: Rational, to: Rational) -> i64 {
    let mut num = from.numerator() as i128 * to.denominator() as i128;
    let mut den = from.denominator() as i128 * to.numerator() as i128;
    if num == 0 || den == 0 {
        return value;
    }
    if den < 0 {
        num = -num;
        den = -den;
    }

    let product = value as i128 * num;
    let half = den / 2;
    let rounded = if product >= 0 {
        (product + half) / den
    } else {
        -((-product + half) / den)
    };
    rounded.clamp(i64::MIN as i128 + 1, i64::MAX as i128) as i64
}

/// Rescale an optional timestamp. `None` is FFmpeg's "no timestamp" and is
/// never treated as zero.
pub fn rescale_ts(value: Option<i64>, from: Rational, to: Rational) -> Option<i64> {
    value.map(|v| rescale(v, from, to))
}

/// Convert a timestamp in `time_base` to milliseconds.
pub fn to_millis(value: i64, time_base: Rational) -> i64 {
    rescale(value, time_base, MILLISECONDS)
}

/// Rescale a packet from `from` into `to`, clearing its position hint.
pub fn rescale_packet(packet: &mut RawPacket, from: Rational, to: Rational) {
    packet.retag(from);
    packet.rescale_to(to);
}

#[cfg(test)]
#[path = "rescale_test.rs"]
mod rescale_test;
