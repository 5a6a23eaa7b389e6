//! Real-time pacing for relays into sinks that are consumed at wall-clock
//! rate.
//!
//! The controller is advisory: when the packet timeline runs ahead of the
//! wall clock by more than the slack, it asks for a sleep of 4/5 of the
//! lead. Under-sleeping lets the pipeline converge instead of oscillating.

use std::time::{Duration, Instant};

use ffmpeg_next::Rational;

use crate::{packet::RawPacket, rescale};

/// Slack for relaying a source on its own packet timestamps.
pub const RELAY_SLACK: Duration = Duration::from_millis(1000);

/// Slack for the fixed frame-rate scheduling variant.
pub const FRAME_SCHEDULE_SLACK: Duration = Duration::from_millis(3000);

/// A packet timestamp further than this from the timeline position is a
/// discontinuity (wrap, splice, corrupt dts) and re-bases the timeline.
pub const DISCONTINUITY_THRESHOLD_MS: i64 = 10_000;

/// Frame rate of the fixed scheduling variant when none is given.
pub const DEFAULT_SCHEDULE_FPS: u32 = 60;

/// Sleep needed when the timeline leads the wall clock by `lead_ms`.
pub fn suspend_for(lead_ms: i64, slack_ms: i64) -> Option<Duration> {
    if lead_ms > slack_ms {
        Some(Duration::from_millis((lead_ms.saturating_mul(4) / 5) as u64))
    } else {
        None
    }
}

pub struct PacingController {
    start: Instant,
    slack_ms: i64,
}

impl PacingController {
    pub fn new(slack: Duration) -> Self {
        Self {
            start: Instant::now(),
            slack_ms: slack.as_millis() as i64,
        }
    }

    pub fn relay() -> Self {
        Self::new(RELAY_SLACK)
    }

    pub fn frame_scheduled() -> Self {
        Self::new(FRAME_SCHEDULE_SLACK)
    }

    pub fn slack(&self) -> Duration {
        Duration::from_millis(self.slack_ms as u64)
    }

    pub fn elapsed_ms(&self) -> i64 {
        self.start.elapsed().as_millis() as i64
    }

    /// How long to suspend before delivering a packet at `timeline_ms`.
    pub fn observe(&self, timeline_ms: i64) -> Option<Duration> {
        self.observe_at(timeline_ms, self.elapsed_ms())
    }

    /// [`observe`](Self::observe) against an explicit elapsed wall time.
    pub fn observe_at(&self, timeline_ms: i64, elapsed_ms: i64) -> Option<Duration> {
        suspend_for(timeline_ms.saturating_sub(elapsed_ms), self.slack_ms)
    }
}

/// Where the pacing timeline comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeline {
    /// The packets' own decode (or presentation) timestamps.
    PacketTimestamps,
    /// A synthetic clock advancing `fps` units per second, one per packet.
    /// Packets are restamped onto it.
    FrameRate { fps: u32 },
}

/// Pacing configuration for a remux run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub slack: Duration,
    pub timeline: Timeline,
}

impl Pacing {
    pub fn relay() -> Self {
        Self {
            slack: RELAY_SLACK,
            timeline: Timeline::PacketTimestamps,
        }
    }

    pub fn frame_scheduled(fps: u32) -> Self {
        Self {
            slack: FRAME_SCHEDULE_SLACK,
            timeline: Timeline::FrameRate { fps: fps.max(1) },
        }
    }
}

/// Cumulative position on the pacing timeline, in milliseconds.
#[derive(Debug)]
pub struct TimelineClock {
    timeline: Timeline,
    origin_ms: Option<i64>,
    position_ms: i64,
    frames: u64,
}

impl TimelineClock {
    pub fn new(timeline: Timeline) -> Self {
        Self {
            timeline,
            origin_ms: None,
            position_ms: 0,
            frames: 0,
        }
    }

    /// Advance with one packet and return the timeline position it belongs
    /// at. The position never moves backwards; a discontinuity holds it
    /// where it is and measures later packets from the new timestamps.
    pub fn advance(&mut self, packet: &RawPacket) -> i64 {
        match self.timeline {
            Timeline::PacketTimestamps => {
                if let Some(ts) = packet.dts().or(packet.pts()) {
                    let ms = rescale::to_millis(ts, packet.time_base());
                    let origin = *self.origin_ms.get_or_insert(ms);
                    let mut relative = ms.saturating_sub(origin);
                    if relative.abs_diff(self.position_ms) > DISCONTINUITY_THRESHOLD_MS as u64 {
                        log::warn!(
                            "timestamp jump from {} ms to {} ms, re-basing pacing timeline",
                            self.position_ms,
                            relative
                        );
                        self.origin_ms = Some(ms.saturating_sub(self.position_ms));
                        relative = self.position_ms;
                    }
                    self.position_ms = self.position_ms.max(relative);
                }
            }
            Timeline::FrameRate { fps } => {
                self.position_ms = rescale::rescale(
                    self.frames as i64,
                    Rational(1, fps as i32),
                    rescale::MILLISECONDS,
                );
                self.frames += 1;
            }
        }
        self.position_ms
    }

    pub fn position_ms(&self) -> i64 {
        self.position_ms
    }
}

#[cfg(test)]
#[path = "pacing_test.rs"]
mod pacing_test;
