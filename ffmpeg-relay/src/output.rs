use std::ffi::CString;
use std::ptr;

use ffmpeg_next::{Dictionary, Rational, ffi};

use crate::{error::OpenError, error::WriteError, packet::RawPacket, stream::StreamDescriptor};

/// How a packet reaches the sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WriteMode {
    /// The muxer may buffer and reorder across streams so every stream stays
    /// monotonic before bytes reach the sink.
    #[default]
    Interleaved,
    /// Written exactly in call order; the caller owns ordering.
    Immediate,
}

/// Destination side of a remux: stream creation, header, packets, trailer.
///
/// Implementations write the header at most once and, once it is written,
/// owe exactly one trailer which `close` pays. `close` is idempotent.
pub trait ContainerWriter {
    /// Allocate a destination stream carrying a copy of `source`'s codec
    /// parameters. Only valid before the header is written.
    fn add_stream(&mut self, source: &StreamDescriptor) -> Result<usize, WriteError>;

    fn write_header(&mut self, options: Option<Dictionary<'_>>) -> Result<(), WriteError>;

    /// Time base of a destination stream. After the header this is the value
    /// the muxer settled on.
    fn stream_time_base(&self, index: usize) -> Option<Rational>;

    /// Destination stream as the muxer holds it.
    fn stream(&self, index: usize) -> Option<StreamDescriptor>;

    /// Write one packet already expressed in the destination stream's index
    /// and time base. The packet buffer is released by the call.
    fn write_packet(&mut self, packet: RawPacket, mode: WriteMode) -> Result<(), WriteError>;

    /// Write the trailer if owed, then release the sink.
    fn close(&mut self) -> Result<(), WriteError>;

    fn is_header_written(&self) -> bool;
}

pub struct AvOutput {
    inner: Option<ffmpeg_next::format::context::Output>,
    locator: String,
    streams: Vec<StreamDescriptor>,
    have_written_header: bool,
    need_trailer: bool,
}

unsafe impl Send for AvOutput {}

impl AvOutput {
    /// Allocate a muxer for `url`, deducing the format from `format` or the
    /// locator's extension, and open the byte sink unless the format does
    /// its own I/O.
    pub fn open(url: &str, format: Option<&str>) -> Result<Self, OpenError> {
        let c_url = CString::new(url).map_err(|_| OpenError::InvalidLocator {
            locator: url.to_string(),
        })?;
        let c_format = match format {
            Some(name) => Some(CString::new(name).map_err(|_| OpenError::InvalidLocator {
                locator: name.to_string(),
            })?),
            None => None,
        };

        let output = unsafe {
            let mut ctx: *mut ffi::AVFormatContext = ptr::null_mut();
            let rc = ffi::avformat_alloc_output_context2(
                &mut ctx,
                ptr::null_mut(),
                c_format.as_ref().map_or(ptr::null(), |f| f.as_ptr()),
                c_url.as_ptr(),
            );
            if rc < 0 || ctx.is_null() {
                let source = if rc < 0 {
                    ffmpeg_next::Error::from(rc)
                } else {
                    ffmpeg_next::Error::MuxerNotFound
                };
                return Err(OpenError::CannotDeduceFormat {
                    locator: url.to_string(),
                    format: format.map(str::to_string),
                    source,
                });
            }

            let flags = (*(*ctx).oformat).flags;
            if flags & ffi::AVFMT_NOFILE as i32 == 0 {
                let rc =
                    ffi::avio_open(&mut (*ctx).pb, c_url.as_ptr(), ffi::AVIO_FLAG_WRITE as i32);
                if rc < 0 {
                    ffi::avformat_free_context(ctx);
                    return Err(OpenError::CannotOpenSink {
                        locator: url.to_string(),
                        source: ffmpeg_next::Error::from(rc),
                    });
                }
            }

            // The wrapper closes pb and frees the context on drop.
            ffmpeg_next::format::context::Output::wrap(ctx)
        };

        log::info!("opened output {} as {}", url, output.format().name());

        Ok(Self {
            inner: Some(output),
            locator: url.to_string(),
            streams: Vec::new(),
            have_written_header: false,
            need_trailer: false,
        })
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    /// Destination streams created so far.
    pub fn streams(&self) -> &[StreamDescriptor] {
        &self.streams
    }

    fn output_mut(&mut self) -> Result<&mut ffmpeg_next::format::context::Output, WriteError> {
        match self.inner.as_mut() {
            Some(output) => Ok(output),
            None => Err(WriteError::Closed {
                locator: self.locator.clone(),
            }),
        }
    }
}

impl ContainerWriter for AvOutput {
    fn add_stream(&mut self, source: &StreamDescriptor) -> Result<usize, WriteError> {
        if self.have_written_header {
            return Err(WriteError::HeaderAlreadyWritten {
                locator: self.locator.clone(),
            });
        }
        let output = self.output_mut()?;
        let mut writer_stream = output
            .add_stream(ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::None))
            .map_err(|source_err| WriteError::StreamCreation {
                source_index: source.index(),
                source: source_err,
            })?;
        writer_stream.set_parameters(source.destination_parameters());
        writer_stream.set_time_base(source.time_base());
        let index = writer_stream.index();

        self.streams.push(source.renumbered(index));
        Ok(index)
    }

    fn write_header(&mut self, options: Option<Dictionary<'_>>) -> Result<(), WriteError> {
        if self.have_written_header {
            return Err(WriteError::HeaderAlreadyWritten {
                locator: self.locator.clone(),
            });
        }
        let locator = self.locator.clone();
        let output = self.output_mut()?;
        let result = match options {
            Some(options) => output.write_header_with(options).map(|unused| {
                for (key, value) in unused.iter() {
                    log::warn!("muxer ignored header option {}={}", key, value);
                }
            }),
            None => output.write_header(),
        };
        result.map_err(|source| WriteError::Header { locator, source })?;

        self.have_written_header = true;
        self.need_trailer = true;
        log::debug!("header written to {}", self.locator);
        Ok(())
    }

    fn stream_time_base(&self, index: usize) -> Option<Rational> {
        self.inner
            .as_ref()
            .and_then(|output| output.stream(index))
            .map(|stream| stream.time_base())
    }

    fn stream(&self, index: usize) -> Option<StreamDescriptor> {
        self.inner
            .as_ref()
            .and_then(|output| output.stream(index))
            .map(StreamDescriptor::from)
    }

    fn write_packet(&mut self, packet: RawPacket, mode: WriteMode) -> Result<(), WriteError> {
        if !self.have_written_header {
            return Err(WriteError::HeaderNotWritten {
                locator: self.locator.clone(),
            });
        }
        let index = packet.index();
        if index >= self.streams.len() {
            return Err(WriteError::UnknownStream { index });
        }
        let output = self.output_mut()?;
        let result = match mode {
            WriteMode::Interleaved => packet.packet().write_interleaved(output),
            WriteMode::Immediate => packet.packet().write(output).map(|_| ()),
        };
        result.map_err(|source| WriteError::Packet { index, source })
    }

    fn close(&mut self) -> Result<(), WriteError> {
        let Some(mut output) = self.inner.take() else {
            return Ok(());
        };
        let mut result = Ok(());
        if self.need_trailer {
            self.need_trailer = false;
            if let Err(source) = output.write_trailer() {
                result = Err(WriteError::Trailer {
                    locator: self.locator.clone(),
                    source,
                });
            }
        }
        drop(output);
        log::info!("closed output {}", self.locator);
        result
    }

    fn is_header_written(&self) -> bool {
        self.have_written_header
    }
}

impl Drop for AvOutput {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::error!("close output {} failed: {}", self.locator, e);
        }
    }
}

#[cfg(test)]
#[path = "output_test.rs"]
mod output_test;
