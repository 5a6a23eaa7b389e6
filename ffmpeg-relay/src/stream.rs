use ffmpeg_next::{Rational, codec::Parameters, format::stream, media};

unsafe impl Send for StreamDescriptor {}
unsafe impl Sync for StreamDescriptor {}

/// Coarse media classification used for stream selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
    Other,
}

impl From<media::Type> for MediaKind {
    fn from(value: media::Type) -> Self {
        match value {
            media::Type::Video => MediaKind::Video,
            media::Type::Audio => MediaKind::Audio,
            _ => MediaKind::Other,
        }
    }
}

/// Immutable description of one stream inside a container.
pub struct StreamDescriptor {
    index: usize,
    parameters: Parameters,
    time_base: Rational,
    rate: Rational,
}

impl StreamDescriptor {
    /// Describe a stream that does not come from an opened container, e.g.
    /// a destination stream or a stream fed from an elementary bitstream.
    pub fn new(
        index: usize,
        medium: media::Type,
        codec_id: ffmpeg_next::codec::Id,
        time_base: Rational,
    ) -> Self {
        let mut parameters = Parameters::new();
        unsafe {
            let ptr = parameters.as_mut_ptr();
            (*ptr).codec_type = medium.into();
            (*ptr).codec_id = codec_id.into();
        }
        Self {
            index,
            parameters,
            time_base,
            rate: Rational::new(0, 1),
        }
    }

    pub fn with_parameters(
        index: usize,
        parameters: Parameters,
        time_base: Rational,
        rate: Rational,
    ) -> Self {
        Self {
            index,
            parameters,
            time_base,
            rate,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    pub fn rate(&self) -> Rational {
        self.rate
    }

    pub fn medium(&self) -> media::Type {
        self.parameters.medium()
    }

    pub fn kind(&self) -> MediaKind {
        self.medium().into()
    }

    pub fn codec_id(&self) -> ffmpeg_next::codec::Id {
        self.parameters.id()
    }

    pub fn is_video(&self) -> bool {
        self.kind() == MediaKind::Video
    }

    pub fn is_audio(&self) -> bool {
        self.kind() == MediaKind::Audio
    }

    pub fn width(&self) -> u32 {
        unsafe {
            let ptr = self.parameters.as_ptr();
            (*ptr).width.max(0) as u32
        }
    }

    pub fn height(&self) -> u32 {
        unsafe {
            let ptr = self.parameters.as_ptr();
            (*ptr).height.max(0) as u32
        }
    }

    /// Container specific fourcc carried by the codec parameters.
    pub fn codec_tag(&self) -> u32 {
        unsafe { (*self.parameters.as_ptr()).codec_tag }
    }

    /// Codec parameters prepared for a destination stream: a full copy with
    /// the codec tag reset so the muxer picks its own.
    pub fn destination_parameters(&self) -> Parameters {
        let mut params = self.parameters.clone();
        unsafe {
            (*params.as_mut_ptr()).codec_tag = 0;
        }
        params
    }

    /// Same stream, renumbered for the destination container.
    pub fn renumbered(&self, index: usize) -> Self {
        Self {
            index,
            ..self.clone()
        }
    }
}

impl From<stream::Stream<'_>> for StreamDescriptor {
    fn from(stream: stream::Stream<'_>) -> Self {
        Self {
            index: stream.index(),
            parameters: stream.parameters(),
            time_base: stream.time_base(),
            rate: stream.avg_frame_rate(),
        }
    }
}

impl Clone for StreamDescriptor {
    fn clone(&self) -> Self {
        Self {
            index: self.index,
            parameters: self.parameters.clone(),
            time_base: self.time_base,
            rate: self.rate,
        }
    }
}

impl std::fmt::Debug for StreamDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamDescriptor")
            .field("index", &self.index)
            .field("medium", &self.medium())
            .field("codec", &self.codec_id())
            .field("time_base", &self.time_base)
            .finish()
    }
}
