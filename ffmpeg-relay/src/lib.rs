//! Container remuxing and elementary stream decoding on top of FFmpeg.

/// Registers FFmpeg formats and capture devices. Call once at startup.
pub fn init() -> anyhow::Result<()> {
    ffmpeg_next::init().map_err(|e| anyhow::anyhow!("ffmpeg init: {}", e))
}

pub mod annexb;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod input;
pub mod mapper;
pub mod output;
pub mod pacing;
pub mod packet;
pub mod parse;
pub mod parser;
pub mod remux;
pub mod rescale;
pub mod session;
pub mod stream;

#[cfg(test)]
mod testing;
