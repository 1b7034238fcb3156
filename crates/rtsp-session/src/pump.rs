use std::io::{ErrorKind, Read};
use tracing::{debug, error};

use rtsp_proto::protocol::{RawFrame, StreamGeometry};

use crate::error::PumpError;

/// Result of one successful pipe read.
#[derive(Debug)]
pub enum PumpRead {
    Frame(RawFrame),
    /// The pipe is closed: the decoder exited or the stream ended.
    EndOfStream,
}

/// Cuts the decoder's raw `rgb24` byte stream into frames.
pub struct FramePump<R> {
    reader: R,
    width: u32,
    height: u32,
    frame_size: usize,
}

impl<R: Read> FramePump<R> {
    pub fn new(reader: R, geometry: StreamGeometry) -> Self {
        Self {
            reader,
            width: geometry.width,
            height: geometry.height,
            frame_size: geometry.frame_size(),
        }
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Block until a whole frame has arrived or the pipe closes.
    ///
    /// Zero bytes before EOF is `EndOfStream`; any other short count is a
    /// `Desync` and is never padded or retried.
    pub fn read_frame(&mut self) -> Result<PumpRead, PumpError> {
        let mut buf = vec![0u8; self.frame_size];
        let got = read_full(&mut self.reader, &mut buf)?;

        if got == 0 {
            debug!("pump: end of stream");
            return Ok(PumpRead::EndOfStream);
        }
        if got != self.frame_size {
            error!("pump: short frame, {} of {} bytes", got, self.frame_size);
            return Err(PumpError::Desync {
                expected: self.frame_size,
                got,
            });
        }

        let frame = RawFrame::from_bytes(self.width, self.height, buf).map_err(|e| {
            PumpError::Desync {
                expected: e.expected,
                got: e.got,
            }
        })?;
        Ok(PumpRead::Frame(frame))
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Fill `buf` from `reader`, tolerating short pipe reads. Returns the number of
/// bytes read, which is less than `buf.len()` only at EOF.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
