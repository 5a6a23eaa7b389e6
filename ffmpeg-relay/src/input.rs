use std::ffi::CString;
use std::ptr;
use std::time::Duration;

use ffmpeg_next::{Dictionary, ffi, util::error::EAGAIN};

use crate::{
    error::{OpenError, ReadError},
    packet::RawPacket,
    stream::StreamDescriptor,
};

/// Pause before reporting that a live source has nothing ready.
pub const RETRY_DELAY: Duration = Duration::from_millis(10);

/// Source side of a remux: stream metadata plus a pull-based packet cursor.
pub trait ContainerReader {
    fn streams(&self) -> &[StreamDescriptor];

    /// Next packet in container order, tagged with its stream's time base.
    /// `Ok(None)` is end of stream. [`ReadError::WouldBlock`] means nothing is
    /// ready yet and the caller may read again; any other `Err` is fatal.
    fn read_packet(&mut self) -> Result<Option<RawPacket>, ReadError>;

    fn locator(&self) -> &str;
}

/// Lazy packet sequence over any reader. Retries while the source would
/// block; stops after end of stream or after yielding the first error.
pub struct Packets<'a, R: ContainerReader + ?Sized> {
    reader: &'a mut R,
    done: bool,
}

impl<R: ContainerReader + ?Sized> Iterator for Packets<'_, R> {
    type Item = Result<RawPacket, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            return match self.reader.read_packet() {
                Ok(Some(packet)) => Some(Ok(packet)),
                Ok(None) => {
                    self.done = true;
                    None
                }
                Err(e) if e.is_would_block() => continue,
                Err(e) => {
                    self.done = true;
                    Some(Err(e))
                }
            };
        }
    }
}

pub fn packets<R: ContainerReader + ?Sized>(reader: &mut R) -> Packets<'_, R> {
    Packets {
        reader,
        done: false,
    }
}

pub struct AvInput {
    inner: ffmpeg_next::format::context::Input,
    locator: String,
    streams: Vec<StreamDescriptor>,
}

unsafe impl Send for AvInput {}

impl AvInput {
    /// Resolve input format by name (e.g. "x11grab", "v4l2") via FFmpeg's av_find_input_format.
    fn find_input_format(name: &str) -> Result<*const ffi::AVInputFormat, OpenError> {
        let cname = CString::new(name).map_err(|_| OpenError::InvalidLocator {
            locator: name.to_string(),
        })?;
        let ptr = unsafe { ffi::av_find_input_format(cname.as_ptr()) };
        if ptr.is_null() {
            return Err(OpenError::FormatNotFound {
                name: name.to_string(),
            });
        }
        Ok(ptr as *const _)
    }

    /// Open `url` and resolve its stream metadata.
    pub fn open(
        url: &str,
        format: Option<&str>,
        options: Option<Dictionary>,
    ) -> Result<Self, OpenError> {
        let c_url = CString::new(url).map_err(|_| OpenError::InvalidLocator {
            locator: url.to_string(),
        })?;
        let input_format = match format {
            Some(name) => Self::find_input_format(name)?,
            None => ptr::null(),
        };

        let input = unsafe {
            let mut ctx: *mut ffi::AVFormatContext = ptr::null_mut();
            let mut opts = options.unwrap_or_default().disown();
            let rc =
                ffi::avformat_open_input(&mut ctx, c_url.as_ptr(), input_format as _, &mut opts);
            Dictionary::own(opts);
            if rc < 0 {
                return Err(OpenError::CannotOpen {
                    locator: url.to_string(),
                    source: ffmpeg_next::Error::from(rc),
                });
            }

            let rc = ffi::avformat_find_stream_info(ctx, ptr::null_mut());
            if rc < 0 {
                ffi::avformat_close_input(&mut ctx);
                return Err(OpenError::NoStreamInfo {
                    locator: url.to_string(),
                    source: ffmpeg_next::Error::from(rc),
                });
            }

            ffmpeg_next::format::context::Input::wrap(ctx)
        };

        let streams: Vec<StreamDescriptor> =
            input.streams().map(StreamDescriptor::from).collect();
        log::info!(
            "opened input {} ({}), {} streams",
            url,
            input.format().name(),
            streams.len()
        );

        Ok(Self {
            inner: input,
            locator: url.to_string(),
            streams,
        })
    }
}

impl ContainerReader for AvInput {
    fn streams(&self) -> &[StreamDescriptor] {
        &self.streams
    }

    fn read_packet(&mut self) -> Result<Option<RawPacket>, ReadError> {
        let mut packet = ffmpeg_next::codec::packet::Packet::empty();
        match packet.read(&mut self.inner) {
            Ok(()) => {
                let index = packet.stream();
                let time_base = self
                    .streams
                    .get(index)
                    .map(|s| s.time_base())
                    .ok_or(ReadError::UnknownStream { index })?;
                Ok(Some((packet, time_base).into()))
            }
            Err(ffmpeg_next::Error::Eof) => Ok(None),
            Err(ffmpeg_next::Error::Other { errno }) if errno == EAGAIN => {
                // Live sources report EAGAIN when nothing is ready yet.
                std::thread::sleep(RETRY_DELAY);
                Err(ReadError::WouldBlock {
                    locator: self.locator.clone(),
                })
            }
            Err(source) => Err(ReadError::Demux {
                locator: self.locator.clone(),
                source,
            }),
        }
    }

    fn locator(&self) -> &str {
        &self.locator
    }
}
