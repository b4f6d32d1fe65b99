use std::sync::Arc;

use statestream_serde::{WireError, WireRead};

use crate::{
    muxer::{buffer::Buffer, muxer::LogMux},
    types::LogKind,
};

/// Sequential consumer over one log's completed buffers.
///
/// Buffers are checked out in FIFO order; reading atomically decrements each
/// buffer's remaining-byte counter, and a fully drained buffer is released
/// back toward the pool before the reader moves on, so a producer still
/// finishing the same buffer can never race the free.
pub struct LogReader<'a> {
    mux: &'a LogMux,
    log: LogKind,
    current: Option<Arc<Buffer>>,
}

impl<'a> LogReader<'a> {
    pub(crate) fn new(mux: &'a LogMux, log: LogKind) -> Self {
        Self {
            mux,
            log,
            current: None,
        }
    }

    pub fn log(&self) -> LogKind {
        self.log
    }

    /// Ensure the reader is positioned on a buffer with unread bytes.
    fn advance(&mut self) -> bool {
        loop {
            if let Some(buffer) = &self.current {
                if buffer.remaining() > 0 {
                    return true;
                }
                self.release_current();
                continue;
            }
            match self.mux.checkout(self.log) {
                Some(buffer) => self.current = Some(buffer),
                None => return false,
            }
        }
    }

    /// Let go of a drained buffer immediately; holding it any longer would
    /// let the pool recycle it out from under us.
    fn release_current(&mut self) {
        if let Some(buffer) = self.current.take() {
            drop(buffer);
            self.mux.finish_buffer(self.log);
        }
    }

    /// True when no unconsumed bytes are available right now.
    pub fn is_empty(&mut self) -> bool {
        !self.advance()
    }
}

impl WireRead for LogReader<'_> {
    fn read_exact(&mut self, out: &mut [u8]) -> Result<(), WireError> {
        let mut filled = 0;
        while filled < out.len() {
            if !self.advance() {
                return Err(WireError::UnexpectedEnd {
                    needed: out.len() - filled,
                    remaining: filled,
                });
            }
            let buffer = self.current.as_ref().expect("advance positioned a buffer");
            filled += buffer.read_into(&mut out[filled..]);
        }
        if let Some(buffer) = &self.current {
            if buffer.remaining() == 0 {
                self.release_current();
            }
        }
        Ok(())
    }

    fn remaining(&self) -> usize {
        self.current
            .as_ref()
            .map(|buffer| buffer.remaining())
            .unwrap_or(0)
    }
}

impl Drop for LogReader<'_> {
    fn drop(&mut self) {
        self.release_current();
    }
}
