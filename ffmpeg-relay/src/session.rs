//! Push/pull protocol shared by decoders and encoders.
//!
//! One input unit may produce zero, one or many output units, so sending and
//! receiving are decoupled. A send can be refused while outputs are pending;
//! the caller drains and retries. The helpers here implement that loop once.

use std::fmt;

use ffmpeg_next::codec;

use crate::error::CodecError;

/// Result of offering one unit to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submit {
    Accepted,
    /// The session is full; drain outputs before sending again.
    TryAgain,
}

/// Result of asking a session for one output unit.
#[derive(Debug, PartialEq, Eq)]
pub enum Received<T> {
    Data(T),
    /// Nothing ready yet; send more input.
    Pending,
    /// The session was flushed and every output has been returned.
    EndOfStream,
}

/// An open encode or decode context.
pub trait CodecSession {
    type Input;
    type Output;

    /// Offer one unit; `None` signals end of input and starts the flush.
    fn send(&mut self, input: Option<&Self::Input>) -> Result<Submit, CodecError>;

    fn receive(&mut self) -> Result<Received<Self::Output>, CodecError>;

    /// Codec name, for diagnostics.
    fn name(&self) -> &str;
}

/// How a session is chosen at open time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecSelector {
    Id(codec::Id),
    Name(String),
}

impl From<codec::Id> for CodecSelector {
    fn from(id: codec::Id) -> Self {
        CodecSelector::Id(id)
    }
}

impl From<&str> for CodecSelector {
    fn from(name: &str) -> Self {
        CodecSelector::Name(name.to_string())
    }
}

impl fmt::Display for CodecSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecSelector::Id(id) => write!(f, "{:?}", id),
            CodecSelector::Name(name) => f.write_str(name),
        }
    }
}

/// Outcome of a drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Drained {
    pub count: usize,
    pub finished: bool,
}

/// Receive until the session reports pending or end of stream.
pub fn drain<S, F>(session: &mut S, on_output: &mut F) -> Result<Drained, CodecError>
where
    S: CodecSession + ?Sized,
    F: FnMut(S::Output),
{
    let mut drained = Drained::default();
    loop {
        match session.receive()? {
            Received::Data(output) => {
                drained.count += 1;
                on_output(output);
            }
            Received::Pending => return Ok(drained),
            Received::EndOfStream => {
                drained.finished = true;
                return Ok(drained);
            }
        }
    }
}

/// Send one unit, draining whenever the session refuses it, then drain what
/// the unit produced.
pub fn push<S, F>(
    session: &mut S,
    input: Option<&S::Input>,
    on_output: &mut F,
) -> Result<Drained, CodecError>
where
    S: CodecSession + ?Sized,
    F: FnMut(S::Output),
{
    let mut total = Drained::default();
    loop {
        match session.send(input)? {
            Submit::Accepted => break,
            Submit::TryAgain => {
                let drained = drain(session, on_output)?;
                total.count += drained.count;
                if drained.finished {
                    total.finished = true;
                    return Ok(total);
                }
                if drained.count == 0 {
                    return Err(CodecError::Stalled {
                        codec: session.name().to_string(),
                    });
                }
            }
        }
    }
    let drained = drain(session, on_output)?;
    total.count += drained.count;
    total.finished = drained.finished;
    Ok(total)
}

/// Signal end of input and collect every remaining output.
pub fn finish<S, F>(session: &mut S, on_output: &mut F) -> Result<usize, CodecError>
where
    S: CodecSession + ?Sized,
    F: FnMut(S::Output),
{
    let mut count = 0;
    let mut drained = push(session, None, on_output)?;
    count += drained.count;
    while !drained.finished {
        drained = drain(session, on_output)?;
        count += drained.count;
        if drained.count == 0 && !drained.finished {
            // Flushed sessions that answer "pending" have nothing left.
            break;
        }
    }
    Ok(count)
}

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;
