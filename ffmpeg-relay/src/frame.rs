use std::fmt::{Display, Formatter};

use ffmpeg_next::Rational;

#[derive(Clone)]
pub enum RawFrame {
    Video(RawVideoFrame),
    Audio(RawAudioFrame),
}

impl RawFrame {
    pub fn pts(&self) -> Option<i64> {
        match self {
            RawFrame::Video(f) => f.pts(),
            RawFrame::Audio(f) => f.pts(),
        }
    }

    pub fn set_pts(&mut self, pts: Option<i64>) {
        match self {
            RawFrame::Video(f) => f.get_mut().set_pts(pts),
            RawFrame::Audio(f) => f.get_mut().set_pts(pts),
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, RawFrame::Video(_))
    }
}

impl Display for RawFrame {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RawFrame::Video(v) => write!(
                f,
                "{}*{} {:?}",
                v.width(),
                v.height(),
                v.format()
            ),
            RawFrame::Audio(a) => write!(
                f,
                "{} samples @ {} Hz {:?}",
                a.samples(),
                a.rate(),
                a.format()
            ),
        }
    }
}

#[derive(Clone)]
pub struct RawAudioFrame {
    frame: ffmpeg_next::frame::Audio,
}

impl RawAudioFrame {
    pub fn pts(&self) -> Option<i64> {
        self.frame.pts()
    }

    pub fn format(&self) -> ffmpeg_next::format::Sample {
        self.frame.format()
    }

    pub fn samples(&self) -> usize {
        self.frame.samples()
    }

    pub fn rate(&self) -> u32 {
        self.frame.rate()
    }

    pub fn get_mut(&mut self) -> &mut ffmpeg_next::frame::Audio {
        &mut self.frame
    }

    pub fn as_audio(&self) -> &ffmpeg_next::frame::Audio {
        &self.frame
    }
}

impl From<ffmpeg_next::frame::Audio> for RawAudioFrame {
    fn from(frame: ffmpeg_next::frame::Audio) -> Self {
        Self { frame }
    }
}

#[derive(Clone)]
pub struct RawVideoFrame {
    frame: ffmpeg_next::frame::Video,
}

impl From<ffmpeg_next::frame::Video> for RawVideoFrame {
    fn from(frame: ffmpeg_next::frame::Video) -> Self {
        Self { frame }
    }
}

impl RawVideoFrame {
    /// Allocate a blank frame, e.g. to feed an encoder.
    pub fn new(format: ffmpeg_next::format::Pixel, width: u32, height: u32) -> Self {
        Self {
            frame: ffmpeg_next::frame::Video::new(format, width, height),
        }
    }

    pub fn width(&self) -> u32 {
        self.frame.width()
    }

    pub fn height(&self) -> u32 {
        self.frame.height()
    }

    pub fn format(&self) -> ffmpeg_next::format::Pixel {
        self.frame.format()
    }

    pub fn pts(&self) -> Option<i64> {
        self.frame.pts()
    }

    pub fn get_mut(&mut self) -> &mut ffmpeg_next::frame::Video {
        &mut self.frame
    }

    pub fn as_video(&self) -> &ffmpeg_next::frame::Video {
        &self.frame
    }

    pub fn is_key(&self) -> bool {
        self.frame.is_key()
    }

    pub fn pts_ms(&self, time_base: Rational) -> Option<i64> {
        self.frame
            .pts()
            .map(|pts| crate::rescale::to_millis(pts, time_base))
    }
}
