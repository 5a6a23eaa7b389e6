use ffmpeg_next::{
    Dictionary, Rational,
    codec::{self, Parameters},
    media,
};

use crate::{
    error::CodecError,
    frame::{RawAudioFrame, RawFrame, RawVideoFrame},
    packet::RawPacket,
    session::{CodecSelector, CodecSession, Received, Submit},
    stream::StreamDescriptor,
};

enum DecoderType {
    Video(ffmpeg_next::codec::decoder::Video),
    Audio(ffmpeg_next::codec::decoder::Audio),
}

/// Map a send status to the session protocol.
pub(crate) fn submit_status(
    result: Result<(), ffmpeg_next::Error>,
    codec: &str,
) -> Result<Submit, CodecError> {
    match result {
        Ok(()) => Ok(Submit::Accepted),
        Err(ffmpeg_next::Error::Other { errno }) if errno == ffmpeg_next::util::error::EAGAIN => {
            Ok(Submit::TryAgain)
        }
        Err(source) => Err(CodecError::Send {
            codec: codec.to_string(),
            source,
        }),
    }
}

/// Map a receive status to the session protocol.
pub(crate) fn receive_status<T>(
    result: Result<(), ffmpeg_next::Error>,
    output: impl FnOnce() -> T,
    codec: &str,
) -> Result<Received<T>, CodecError> {
    match result {
        Ok(()) => Ok(Received::Data(output())),
        Err(ffmpeg_next::Error::Eof) => Ok(Received::EndOfStream),
        Err(ffmpeg_next::Error::Other { errno }) if errno == ffmpeg_next::util::error::EAGAIN => {
            Ok(Received::Pending)
        }
        Err(source) => Err(CodecError::Receive {
            codec: codec.to_string(),
            source,
        }),
    }
}

pub struct Decoder {
    name: String,
    id: codec::Id,
    inner: DecoderType,
    /// Time base incoming packets are converted to before decoding.
    decoder_time_base: Option<Rational>,
}

impl Decoder {
    /// Open a decoder by id or name, optionally seeded with stream
    /// parameters.
    pub fn open(
        selector: impl Into<CodecSelector>,
        parameters: Option<&Parameters>,
        options: Option<Dictionary>,
    ) -> Result<Self, CodecError> {
        Self::open_inner(selector.into(), parameters, None, options)
    }

    /// Open the decoder matching a demuxed stream.
    pub fn for_stream(stream: &StreamDescriptor) -> Result<Self, CodecError> {
        Self::open_inner(
            CodecSelector::Id(stream.codec_id()),
            Some(stream.parameters()),
            Some(stream.time_base()),
            None,
        )
    }

    fn open_inner(
        selector: CodecSelector,
        parameters: Option<&Parameters>,
        time_base: Option<Rational>,
        options: Option<Dictionary>,
    ) -> Result<Self, CodecError> {
        let codec = match &selector {
            CodecSelector::Id(id) => ffmpeg_next::decoder::find(*id),
            CodecSelector::Name(name) => ffmpeg_next::decoder::find_by_name(name),
        }
        .ok_or_else(|| CodecError::CodecNotFound {
            codec: selector.to_string(),
        })?;
        let name = codec.name().to_string();

        let mut decoder_ctx = ffmpeg_next::codec::Context::new_with_codec(codec);
        if unsafe { decoder_ctx.as_ptr().is_null() } {
            return Err(CodecError::ContextAllocationFailed { codec: name });
        }
        if let Some(parameters) = parameters {
            decoder_ctx
                .set_parameters(parameters.clone())
                .map_err(|source| CodecError::ParameterCopyFailed {
                    codec: name.clone(),
                    source,
                })?;
        }
        if let Some(time_base) = time_base {
            unsafe {
                (*decoder_ctx.as_mut_ptr()).time_base = time_base.into();
                (*decoder_ctx.as_mut_ptr()).pkt_timebase = time_base.into();
            }
        }

        let opened = decoder_ctx
            .decoder()
            .open_as_with(codec, options.unwrap_or_default())
            .map_err(|source| CodecError::OpenFailed {
                codec: name.clone(),
                source,
            })?;

        let open_failed = |source| CodecError::OpenFailed {
            codec: name.clone(),
            source,
        };
        let inner = match codec.medium() {
            media::Type::Video => DecoderType::Video(opened.video().map_err(open_failed)?),
            media::Type::Audio => DecoderType::Audio(opened.audio().map_err(open_failed)?),
            medium => {
                return Err(CodecError::UnsupportedMedium {
                    codec: name,
                    medium,
                });
            }
        };
        log::info!("decoder opened: {}", name);

        Ok(Self {
            name,
            id: codec.id(),
            inner,
            decoder_time_base: time_base,
        })
    }

    pub fn id(&self) -> codec::Id {
        self.id
    }

    pub fn send_packet(&mut self, packet: &RawPacket) -> Result<Submit, CodecError> {
        let result = match (self.decoder_time_base, &mut self.inner) {
            (Some(time_base), inner) if packet.time_base() != time_base => {
                let mut converted = RawPacket::from((packet.packet().clone(), packet.time_base()));
                converted.rescale_to(time_base);
                inner.send(converted.packet())
            }
            (_, inner) => inner.send(packet.packet()),
        };
        submit_status(result, &self.name)
    }

    pub fn send_eof(&mut self) -> Result<Submit, CodecError> {
        let result = match &mut self.inner {
            DecoderType::Video(decoder) => decoder.send_eof(),
            DecoderType::Audio(decoder) => decoder.send_eof(),
        };
        submit_status(result, &self.name)
    }

    pub fn receive_frame(&mut self) -> Result<Received<RawFrame>, CodecError> {
        match &mut self.inner {
            DecoderType::Video(decoder) => {
                let mut frame = ffmpeg_next::frame::Video::empty();
                let result = decoder.receive_frame(&mut frame);
                receive_status(
                    result,
                    || RawFrame::Video(RawVideoFrame::from(frame)),
                    &self.name,
                )
            }
            DecoderType::Audio(decoder) => {
                let mut frame = ffmpeg_next::frame::Audio::empty();
                let result = decoder.receive_frame(&mut frame);
                receive_status(
                    result,
                    || RawFrame::Audio(RawAudioFrame::from(frame)),
                    &self.name,
                )
            }
        }
    }

    /// Drop buffered state, e.g. when the bitstream restarts.
    pub fn flush(&mut self) {
        match &mut self.inner {
            DecoderType::Video(decoder) => decoder.flush(),
            DecoderType::Audio(decoder) => decoder.flush(),
        }
    }
}

impl DecoderType {
    fn send(
        &mut self,
        packet: &ffmpeg_next::codec::packet::Packet,
    ) -> Result<(), ffmpeg_next::Error> {
        match self {
            DecoderType::Video(decoder) => decoder.send_packet(packet),
            DecoderType::Audio(decoder) => decoder.send_packet(packet),
        }
    }
}

impl CodecSession for Decoder {
    type Input = RawPacket;
    type Output = RawFrame;

    fn send(&mut self, input: Option<&RawPacket>) -> Result<Submit, CodecError> {
        match input {
            Some(packet) => self.send_packet(packet),
            None => self.send_eof(),
        }
    }

    fn receive(&mut self) -> Result<Received<RawFrame>, CodecError> {
        self.receive_frame()
    }

    fn name(&self) -> &str {
        &self.name
    }
}
