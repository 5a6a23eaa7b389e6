use ffmpeg_next::{Dictionary, Rational, codec::Parameters, ffi, media};

use crate::{
    decoder::{receive_status, submit_status},
    error::CodecError,
    frame::RawFrame,
    packet::RawPacket,
    session::{CodecSelector, CodecSession, Received, Submit},
};

pub enum EncoderType {
    Video(ffmpeg_next::codec::encoder::Video),
    Audio(ffmpeg_next::codec::encoder::Audio),
}

/// Context settings that codec parameters do not carry.
#[derive(Debug, Clone)]
pub struct Settings {
    pub time_base: Rational,
    pub frame_rate: Option<Rational>,
    pub keyframe_interval: Option<u32>,
    pub max_b_frames: Option<u32>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            time_base: Rational(1, 25),
            frame_rate: Some(Rational(25, 1)),
            keyframe_interval: Some(25),
            max_b_frames: None,
        }
    }
}

/// Codec parameters for a video encoder fed with `format` frames of the
/// given size.
pub fn video_parameters(
    format: ffmpeg_next::format::Pixel,
    width: u32,
    height: u32,
) -> Parameters {
    let mut parameters = Parameters::new();
    unsafe {
        let ptr = parameters.as_mut_ptr();
        (*ptr).codec_type = media::Type::Video.into();
        (*ptr).width = width as i32;
        (*ptr).height = height as i32;
        (*ptr).format = ffi::AVPixelFormat::from(format) as i32;
    }
    parameters
}

pub struct Encoder {
    name: String,
    inner: EncoderType,
    encoder_time_base: Rational,
    frames_sent: u64,
}

impl Encoder {
    /// Open an encoder by id or name. `parameters` seed the context (size,
    /// pixel or sample format); `settings` supply timing.
    pub fn open(
        selector: impl Into<CodecSelector>,
        parameters: Option<&Parameters>,
        settings: &Settings,
        options: Option<Dictionary>,
    ) -> Result<Self, CodecError> {
        let selector = selector.into();
        let codec = match &selector {
            CodecSelector::Id(id) => ffmpeg_next::encoder::find(*id),
            CodecSelector::Name(name) => ffmpeg_next::encoder::find_by_name(name),
        }
        .ok_or_else(|| CodecError::CodecNotFound {
            codec: selector.to_string(),
        })?;
        let name = codec.name().to_string();

        let mut encoder_ctx = ffmpeg_next::codec::Context::new_with_codec(codec);
        if unsafe { encoder_ctx.as_ptr().is_null() } {
            return Err(CodecError::ContextAllocationFailed { codec: name });
        }
        if let Some(parameters) = parameters {
            encoder_ctx
                .set_parameters(parameters.clone())
                .map_err(|source| CodecError::ParameterCopyFailed {
                    codec: name.clone(),
                    source,
                })?;
        }
        unsafe {
            let ctx = encoder_ctx.as_mut_ptr();
            // Parameters may come from another codec's stream.
            (*ctx).codec_id = codec.id().into();
            (*ctx).codec_tag = 0;
            (*ctx).time_base = settings.time_base.into();
            if let Some(rate) = settings.frame_rate {
                (*ctx).framerate = rate.into();
            }
            if let Some(gop) = settings.keyframe_interval {
                (*ctx).gop_size = gop as i32;
            }
            if let Some(b_frames) = settings.max_b_frames {
                (*ctx).max_b_frames = b_frames as i32;
            }
        }

        let open_failed = |source| CodecError::OpenFailed {
            codec: name.clone(),
            source,
        };
        let opts = options.unwrap_or_default();
        let inner = match codec.medium() {
            media::Type::Video => EncoderType::Video(
                encoder_ctx
                    .encoder()
                    .video()
                    .and_then(|encoder| encoder.open_as_with(codec, opts))
                    .map_err(open_failed)?,
            ),
            media::Type::Audio => EncoderType::Audio(
                encoder_ctx
                    .encoder()
                    .audio()
                    .and_then(|encoder| encoder.open_as_with(codec, opts))
                    .map_err(open_failed)?,
            ),
            medium => {
                return Err(CodecError::UnsupportedMedium {
                    codec: name,
                    medium,
                });
            }
        };

        let encoder_time_base: Rational = unsafe {
            match &inner {
                EncoderType::Video(encoder) => (*encoder.as_ptr()).time_base.into(),
                EncoderType::Audio(encoder) => (*encoder.as_ptr()).time_base.into(),
            }
        };
        log::info!("encoder opened: {}, time base {}", name, encoder_time_base);

        Ok(Self {
            name,
            inner,
            encoder_time_base,
            frames_sent: 0,
        })
    }

    /// Time base of the packets this encoder produces.
    pub fn time_base(&self) -> Rational {
        self.encoder_time_base
    }

    /// Codec parameters describing this encoder's output, for a muxer
    /// stream.
    pub fn parameters(&self) -> Parameters {
        match &self.inner {
            EncoderType::Video(encoder) => Parameters::from(encoder),
            EncoderType::Audio(encoder) => Parameters::from(encoder),
        }
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn send_frame(&mut self, frame: &RawFrame) -> Result<Submit, CodecError> {
        let result = match (&mut self.inner, frame) {
            (EncoderType::Video(encoder), RawFrame::Video(frame)) => {
                encoder.send_frame(frame.as_video())
            }
            (EncoderType::Audio(encoder), RawFrame::Audio(frame)) => {
                encoder.send_frame(frame.as_audio())
            }
            _ => {
                return Err(CodecError::FrameMismatch {
                    codec: self.name.clone(),
                });
            }
        };
        let status = submit_status(result, &self.name)?;
        if status == Submit::Accepted {
            self.frames_sent += 1;
        }
        Ok(status)
    }

    pub fn send_eof(&mut self) -> Result<Submit, CodecError> {
        let result = match &mut self.inner {
            EncoderType::Video(encoder) => encoder.send_eof(),
            EncoderType::Audio(encoder) => encoder.send_eof(),
        };
        submit_status(result, &self.name)
    }

    pub fn receive_packet(&mut self) -> Result<Received<RawPacket>, CodecError> {
        let mut packet = ffmpeg_next::codec::packet::Packet::empty();
        let result = match &mut self.inner {
            EncoderType::Video(encoder) => encoder.receive_packet(&mut packet),
            EncoderType::Audio(encoder) => encoder.receive_packet(&mut packet),
        };
        let time_base = self.encoder_time_base;
        receive_status(result, || RawPacket::from((packet, time_base)), &self.name)
    }
}

impl CodecSession for Encoder {
    type Input = RawFrame;
    type Output = RawPacket;

    fn send(&mut self, input: Option<&RawFrame>) -> Result<Submit, CodecError> {
        match input {
            Some(frame) => self.send_frame(frame),
            None => self.send_eof(),
        }
    }

    fn receive(&mut self) -> Result<Received<RawPacket>, CodecError> {
        self.receive_packet()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
#[path = "encoder_test.rs"]
mod encoder_test;
