//! Container-to-container relay without decoding.
//!
//! Packets are read in container order, renumbered onto the destination
//! streams, rescaled to the destination time bases, optionally paced to the
//! wall clock, and written. The trailer is owed from the moment the header
//! is written and is paid on every exit path, cancellation included.
//!
//! The frame-scheduled relay can join several sources one after another into
//! one destination stream; the synthetic timeline keeps counting across them.

use ffmpeg_next::{Dictionary, Rational};
use tokio_util::sync::CancellationToken;

use crate::{
    error::{PipelineError, WriteError},
    input::{AvInput, ContainerReader},
    mapper::{StreamMapper, StreamMapping, StreamSelection},
    output::{AvOutput, ContainerWriter, WriteMode},
    pacing::{Pacing, PacingController, Timeline, TimelineClock},
    packet::RawPacket,
    rescale,
};

/// Lifecycle of a pipeline run. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineState {
    Created,
    Opened,
    HeaderWritten,
    Streaming,
    Closed,
}

/// Everything about a remux run except where the bytes come from and go.
#[derive(Debug, Clone, Default)]
pub struct RemuxOptions {
    pub selection: StreamSelection,
    pub write_mode: WriteMode,
    pub pacing: Option<Pacing>,
    /// Muxer options passed with the header, e.g. `movflags`.
    pub header_options: Vec<(String, String)>,
    /// Stop after this many packets have been written.
    pub max_packets: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct RemuxConfig {
    /// Sources in relay order. Only the frame-scheduled relay takes more
    /// than one.
    pub inputs: Vec<String>,
    pub input_format: Option<String>,
    pub output: String,
    pub output_format: Option<String>,
    pub options: RemuxOptions,
}

impl RemuxConfig {
    pub fn builder(input: impl Into<String>, output: impl Into<String>) -> RemuxConfigBuilder {
        RemuxConfigBuilder {
            config: RemuxConfig {
                inputs: vec![input.into()],
                input_format: None,
                output: output.into(),
                output_format: None,
                options: RemuxOptions::default(),
            },
        }
    }
}

pub struct RemuxConfigBuilder {
    config: RemuxConfig,
}

impl RemuxConfigBuilder {
    /// Relay `input` after the sources given so far.
    pub fn then_input(mut self, input: impl Into<String>) -> Self {
        self.config.inputs.push(input.into());
        self
    }

    pub fn input_format(mut self, format: impl Into<String>) -> Self {
        self.config.input_format = Some(format.into());
        self
    }

    pub fn output_format(mut self, format: impl Into<String>) -> Self {
        self.config.output_format = Some(format.into());
        self
    }

    pub fn selection(mut self, selection: StreamSelection) -> Self {
        self.config.options.selection = selection;
        self
    }

    pub fn write_mode(mut self, mode: WriteMode) -> Self {
        self.config.options.write_mode = mode;
        self
    }

    pub fn pacing(mut self, pacing: Pacing) -> Self {
        self.config.options.pacing = Some(pacing);
        self
    }

    pub fn header_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config
            .options
            .header_options
            .push((key.into(), value.into()));
        self
    }

    pub fn max_packets(mut self, max: u64) -> Self {
        self.config.options.max_packets = Some(max);
        self
    }

    pub fn build(self) -> RemuxConfig {
        self.config
    }
}

/// Counters of a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemuxSummary {
    pub streams_mapped: usize,
    pub sources_relayed: usize,
    /// Sources with no stream the selection carries.
    pub sources_skipped: usize,
    pub packets_read: u64,
    pub packets_written: u64,
    /// Packets of streams that are not carried.
    pub packets_skipped: u64,
    pub cancelled: bool,
}

pub struct RemuxPipeline<R: ContainerReader, W: ContainerWriter> {
    sources: Vec<R>,
    writer: W,
    options: RemuxOptions,
    state: PipelineState,
}

impl RemuxPipeline<AvInput, AvOutput> {
    /// Open every source, then the destination. If anything fails to open,
    /// whatever was already opened is released before returning.
    pub fn open(config: &RemuxConfig) -> Result<Self, PipelineError> {
        let mut sources = Vec::with_capacity(config.inputs.len());
        for input in &config.inputs {
            sources.push(AvInput::open(input, config.input_format.as_deref(), None)?);
        }
        let writer = AvOutput::open(&config.output, config.output_format.as_deref())?;
        Ok(Self::with_sources(sources, writer, config.options.clone()))
    }
}

impl<R: ContainerReader, W: ContainerWriter> RemuxPipeline<R, W> {
    /// Build a pipeline over ends that are already open.
    pub fn new(reader: R, writer: W, options: RemuxOptions) -> Self {
        Self::with_sources(vec![reader], writer, options)
    }

    /// Build a pipeline that relays `sources` in order into one writer.
    pub fn with_sources(sources: Vec<R>, writer: W, options: RemuxOptions) -> Self {
        Self {
            sources,
            writer,
            options,
            state: PipelineState::Opened,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn sources(&self) -> &[R] {
        &self.sources
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    /// Stream until the sources run out, the packet limit, cancellation, or
    /// the first error, then close the destination. A close failure is
    /// reported only when the run itself succeeded.
    pub fn run(&mut self, cancel: &CancellationToken) -> Result<RemuxSummary, PipelineError> {
        if self.state != PipelineState::Opened {
            return Err(PipelineError::Config(format!(
                "remux cannot run from state {:?}",
                self.state
            )));
        }
        let result = self.stream(cancel);
        let closed = self.close();
        match (result, closed) {
            (Ok(summary), Ok(())) => Ok(summary),
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close_err)) => {
                log::error!("close after failed run: {}", close_err);
                Err(e)
            }
        }
    }

    /// Release the destination, writing the trailer if the header went out.
    pub fn close(&mut self) -> Result<(), WriteError> {
        if self.state == PipelineState::Closed {
            return Ok(());
        }
        self.state = PipelineState::Closed;
        self.writer.close()
    }

    fn frame_scheduled(&self) -> bool {
        matches!(
            self.options.pacing.map(|pacing| pacing.timeline),
            Some(Timeline::FrameRate { .. })
        )
    }

    fn stream(&mut self, cancel: &CancellationToken) -> Result<RemuxSummary, PipelineError> {
        if self.sources.is_empty() {
            return Err(PipelineError::Config("remux needs a source".to_string()));
        }
        if self.sources.len() > 1 && !self.frame_scheduled() {
            return Err(PipelineError::Config(format!(
                "{} sources given; only the frame-scheduled relay joins sources",
                self.sources.len()
            )));
        }

        let mut summary = RemuxSummary::default();
        let mut pacer = self.options.pacing.map(Pacer::new);
        for position in 0..self.sources.len() {
            let Some(mapping) = self.prepare(position, &mut summary)? else {
                summary.sources_skipped += 1;
                continue;
            };
            self.state = PipelineState::Streaming;
            summary.sources_relayed += 1;
            if !self.relay(position, &mapping, &mut pacer, &mut summary, cancel)? {
                break;
            }
        }

        if self.state < PipelineState::HeaderWritten {
            return Err(PipelineError::Config(
                "no source carries a stream for frame scheduling".to_string(),
            ));
        }
        Ok(summary)
    }

    /// Map the streams of one source. The first source that carries anything
    /// creates the destination streams and writes the header; later sources
    /// reuse them. `None` skips the source.
    fn prepare(
        &mut self,
        position: usize,
        summary: &mut RemuxSummary,
    ) -> Result<Option<StreamMapping>, PipelineError> {
        let frame_scheduled = self.frame_scheduled();
        let mapper = StreamMapper::new(self.options.selection);
        let source = &self.sources[position];
        let planned = mapper.plan(source.streams());

        if frame_scheduled {
            if planned.is_empty() {
                log::warn!(
                    "no stream of {} is carried by {:?}, skipping it",
                    source.locator(),
                    self.options.selection
                );
                return Ok(None);
            }
            if planned.len() != 1 {
                return Err(PipelineError::Config(format!(
                    "frame scheduling carries one stream per source, {:?} selects {} of {}",
                    self.options.selection,
                    planned.len(),
                    source.locator()
                )));
            }
        }

        if self.state >= PipelineState::HeaderWritten {
            for (source_index, destination) in planned.iter() {
                let carried = source.streams().iter().find(|s| s.index() == source_index);
                let existing = self.writer.stream(destination);
                if let (Some(carried), Some(existing)) = (carried, existing) {
                    if carried.codec_id() != existing.codec_id() {
                        log::warn!(
                            "{} stream {} is {:?} but destination stream {} is {:?}",
                            source.locator(),
                            source_index,
                            carried.codec_id(),
                            destination,
                            existing.codec_id()
                        );
                    }
                }
            }
            log::info!("continue with {}", source.locator());
            return Ok(Some(planned));
        }

        let mapping = mapper.map(source.streams(), &mut self.writer)?;
        if mapping.is_empty() {
            log::warn!(
                "no stream of {} is carried by {:?}",
                source.locator(),
                self.options.selection
            );
        }

        let options = if self.options.header_options.is_empty() {
            None
        } else {
            let mut dict = Dictionary::new();
            for (key, value) in &self.options.header_options {
                dict.set(key, value);
            }
            Some(dict)
        };
        self.writer.write_header(options)?;
        self.state = PipelineState::HeaderWritten;
        summary.streams_mapped = mapping.len();
        Ok(Some(mapping))
    }

    /// Relay one source to its end. Returns `false` when the run must stop
    /// before the next source: cancellation or the packet limit.
    fn relay(
        &mut self,
        position: usize,
        mapping: &StreamMapping,
        pacer: &mut Option<Pacer>,
        summary: &mut RemuxSummary,
        cancel: &CancellationToken,
    ) -> Result<bool, PipelineError> {
        let reader = &mut self.sources[position];
        loop {
            if cancel.is_cancelled() {
                log::info!("remux cancelled after {} packets", summary.packets_written);
                summary.cancelled = true;
                return Ok(false);
            }
            if self
                .options
                .max_packets
                .is_some_and(|max| summary.packets_written >= max)
            {
                log::info!("packet limit reached");
                return Ok(false);
            }

            let mut packet = match reader.read_packet() {
                Ok(Some(packet)) => packet,
                Ok(None) => {
                    log::info!("end of input {}", reader.locator());
                    return Ok(true);
                }
                Err(e) if e.is_would_block() => continue,
                Err(e) => return Err(e.into()),
            };
            summary.packets_read += 1;

            let Some(destination) = mapping.destination(packet.index()) else {
                summary.packets_skipped += 1;
                continue;
            };
            let time_base = self
                .writer
                .stream_time_base(destination)
                .ok_or(WriteError::UnknownStream { index: destination })?;
            packet.set_index(destination);

            match pacer.as_mut() {
                Some(pacer) => pacer.pace(&mut packet, time_base),
                None => packet.rescale_to(time_base),
            }

            self.writer.write_packet(packet, self.options.write_mode)?;
            summary.packets_written += 1;
        }
    }
}

impl<R: ContainerReader, W: ContainerWriter> Drop for RemuxPipeline<R, W> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::error!("close remux destination failed: {}", e);
        }
    }
}

/// Pacing state shared by every source of a run.
struct Pacer {
    controller: PacingController,
    clock: TimelineClock,
    restamp: bool,
}

impl Pacer {
    fn new(pacing: Pacing) -> Self {
        Self {
            controller: PacingController::new(pacing.slack),
            clock: TimelineClock::new(pacing.timeline),
            restamp: matches!(pacing.timeline, Timeline::FrameRate { .. }),
        }
    }

    /// Place a packet on the timeline, express it in `time_base`, and hold it
    /// back while the timeline leads the wall clock.
    fn pace(&mut self, packet: &mut RawPacket, time_base: Rational) {
        let position = self.clock.advance(packet);
        if self.restamp {
            restamp(packet, position);
        }
        packet.rescale_to(time_base);
        if let Some(sleep) = self.controller.observe(position) {
            log::debug!(
                "timeline at {} ms leads wall clock, sleep {} ms",
                position,
                sleep.as_millis()
            );
            std::thread::sleep(sleep);
        }
    }
}

/// Put a packet on the synthetic millisecond timeline.
fn restamp(packet: &mut RawPacket, position_ms: i64) {
    packet.retag(rescale::MILLISECONDS);
    packet.set_pts(Some(position_ms));
    packet.set_dts(Some(position_ms));
    packet.set_duration(0);
}

#[cfg(test)]
#[path = "remux_test.rs"]
mod remux_test;
