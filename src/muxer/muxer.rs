use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread::{self, ThreadId},
};

use log::{trace, warn};
use statestream_serde::{WireError, WireWrite};

use crate::{
    muxer::{
        buffer::{BufState, Buffer},
        error::MuxError,
        pool::BufferPool,
        reader::LogReader,
    },
    types::LogKind,
};

/// Sizing for a multiplexer's buffer pool.
#[derive(Clone, Copy, Debug)]
pub struct MuxConfig {
    /// Data bytes per buffer; also the maximum size of one opcode.
    pub buffer_capacity: usize,
    /// Maximum number of buffers ever allocated across all logs.
    pub pool_limit: usize,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 8192,
            pool_limit: 64,
        }
    }
}

/// Which logs get handed to the send callback during a flush.
#[derive(Clone, Copy, Debug, Default)]
pub struct FlushOptions {
    pub forward_updates: bool,
    pub forward_events: bool,
}

/// The externally supplied send callback: the remote boundary of this core.
///
/// Implementations must not log new opcodes into the multiplexer from inside
/// `send`; the pool lock is held across the flush scan.
pub trait BufferSink {
    fn send(&mut self, log: LogKind, payload: &[u8]) -> bool;
}

/// Per-(thread, log) write position.
struct WriteCursor {
    log: LogKind,
    buffer: Option<Arc<Buffer>>,
    /// Offset of the opcode currently being written.
    op_start: usize,
    /// The buffer was allocated during the current op and is not queued yet.
    fresh: bool,
    in_op: bool,
}

impl WriteCursor {
    fn new(log: LogKind) -> Self {
        Self {
            log,
            buffer: None,
            op_start: 0,
            fresh: false,
            in_op: false,
        }
    }

    /// Drop the reference to the current buffer. Only the owning cursor may
    /// clear the claim, and only after letting go of the Writing state.
    fn abandon(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            buffer.set_claimed(false);
        }
        self.fresh = false;
    }
}

/// Concurrent log multiplexer.
///
/// Many producer threads append opcodes concurrently, batched into reusable
/// fixed-size buffers organized into the four logical logs. Each (thread,
/// log) pair owns one write cursor from an explicit map — there is no
/// ambient global state — and at most one buffer is open for append per
/// cursor at any instant. A periodic [`flush`](LogMux::flush) hands
/// completed buffers to local replay and/or the send callback.
pub struct LogMux {
    pool: BufferPool,
    cursors: Mutex<HashMap<(ThreadId, LogKind), Arc<Mutex<WriteCursor>>>>,
    open: AtomicBool,
}

impl LogMux {
    pub fn new(config: MuxConfig) -> Self {
        Self {
            pool: BufferPool::new(config.buffer_capacity, config.pool_limit),
            cursors: Mutex::new(HashMap::new()),
            open: AtomicBool::new(true),
        }
    }

    /// Maximum size of a single opcode, in bytes.
    pub fn capacity(&self) -> usize {
        self.pool.capacity()
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Stop accepting ops and drop all pooled buffers. Producers must be
    /// quiescent.
    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
        self.clear();
    }

    /// Drop all cursors and pooled buffers but keep accepting ops.
    /// Producers must be quiescent.
    pub fn clear(&self) {
        let mut cursors = self.cursors.lock().expect("cursor map lock poisoned");
        for cursor in cursors.values() {
            let mut cursor = cursor.lock().expect("write cursor lock poisoned");
            cursor.abandon();
        }
        cursors.clear();
        self.pool.clear();
    }

    fn cursor_for(&self, log: LogKind) -> Arc<Mutex<WriteCursor>> {
        let thread_id = thread::current().id();
        let mut cursors = self.cursors.lock().expect("cursor map lock poisoned");
        cursors
            .entry((thread_id, log))
            .or_insert_with(|| Arc::new(Mutex::new(WriteCursor::new(log))))
            .clone()
    }

    /// Start one opcode on the calling thread's cursor for `log`.
    ///
    /// Reuses the cursor's open buffer when it can be reclaimed and has
    /// room, otherwise allocates a fresh buffer from the pool. Pool
    /// exhaustion is returned to the caller, never waited out. The returned
    /// writer must be finished (or dropped) before the same thread begins
    /// another op on the same log.
    pub fn begin_op(&self, log: LogKind) -> Result<OpWriter<'_>, MuxError> {
        if !self.is_open() {
            return Err(MuxError::LogClosed);
        }
        let cursor = self.cursor_for(log);
        {
            let mut c = cursor.lock().expect("write cursor lock poisoned");
            debug_assert!(!c.in_op, "op already in progress on this (thread, log)");

            let mut reclaimed = false;
            if let Some(buffer) = &c.buffer {
                // the claim keeps the pool from recycling it, so a
                // successful CAS means the buffer is still ours
                if buffer.used() < self.pool.capacity()
                    && buffer.try_transition(BufState::Sealed, BufState::Writing)
                {
                    reclaimed = true;
                }
            }
            if reclaimed {
                let used = c.buffer.as_ref().expect("reclaimed cursor buffer").used();
                c.op_start = used;
                c.fresh = false;
            } else {
                c.abandon();
                let buffer = self.pool.allocate(log)?;
                c.op_start = 0;
                c.buffer = Some(buffer);
                c.fresh = true;
            }
            c.in_op = true;
        }
        Ok(OpWriter {
            mux: self,
            cursor,
            error: None,
            done: false,
        })
    }

    /// Sequential consumer over one log's completed buffers.
    pub fn reader(&self, log: LogKind) -> LogReader<'_> {
        LogReader::new(self, log)
    }

    /// Whether the log has any unconsumed bytes ready for a reader.
    pub fn is_empty(&self, log: LogKind) -> bool {
        let inner = self.pool.lock();
        for buffer in inner.ready[log.index()].iter() {
            match buffer.state() {
                BufState::Sealed | BufState::Draining if buffer.remaining() > 0 => return false,
                // mid-write; nothing behind it is consumable until it seals
                BufState::Writing => return true,
                _ => {}
            }
        }
        true
    }

    /// Claim the next readable buffer of a log, preserving FIFO order.
    pub(crate) fn checkout(&self, log: LogKind) -> Option<Arc<Buffer>> {
        let mut inner = self.pool.lock();
        BufferPool::sweep(&mut inner, log);
        for buffer in inner.ready[log.index()].iter() {
            match buffer.state() {
                BufState::Draining if buffer.remaining() > 0 => return Some(buffer.clone()),
                BufState::Sealed => {
                    if buffer.remaining() == 0 {
                        continue; // sealed empty; reclaimable by its cursor
                    }
                    if buffer.try_transition(BufState::Sealed, BufState::Draining) {
                        return Some(buffer.clone());
                    }
                    return None; // owner got it back first; retry later
                }
                // a buffer mid-write blocks the queue behind it, otherwise
                // one thread's ops could replay out of order
                BufState::Writing => return None,
                _ => {}
            }
        }
        None
    }

    /// Called by a reader when it has fully drained a buffer.
    pub(crate) fn finish_buffer(&self, log: LogKind) {
        let mut inner = self.pool.lock();
        BufferPool::sweep(&mut inner, log);
    }

    /// Hand completed buffers to the send callback and/or retain them for
    /// local replay, per log semantics, then recycle drained buffers.
    ///
    /// Called once per synchronization point by the consumer side. The pool
    /// lock is held for the whole scan.
    pub fn flush(&self, options: FlushOptions, sink: &mut dyn BufferSink) {
        let mut inner = self.pool.lock();
        for log in LogKind::ALL {
            for buffer in inner.ready[log.index()].iter() {
                // claim exactly once; a buffer that stays Draining from an
                // earlier flush is not forwarded again
                if !buffer.try_transition(BufState::Sealed, BufState::Draining) {
                    continue;
                }
                let forward = match log {
                    LogKind::Event => options.forward_events,
                    _ => options.forward_updates,
                };
                if forward && buffer.used() > 0 {
                    trace!(
                        "flush: {:?} buffer {} -> sink, {} bytes",
                        log,
                        buffer.id(),
                        buffer.used()
                    );
                    let delivered = buffer.with_payload(|payload| sink.send(log, payload));
                    if !delivered {
                        warn!("flush: sink refused {:?} buffer {}", log, buffer.id());
                    }
                }
                match log {
                    // remote-only logs are never replayed locally; their
                    // buffers are discarded whether or not forwarding is on
                    LogKind::Priority | LogKind::Update => buffer.consume_all(),
                    // retained for the local consumer
                    LogKind::Event | LogKind::Deferred => {}
                }
            }
            BufferPool::sweep(&mut inner, log);
        }
    }
}

/// Writer for one opcode, checked out from a (thread, log) cursor.
///
/// All bytes written between checkout and [`commit`](OpWriter::commit) form
/// one opcode and are guaranteed contiguous in exactly one buffer. Dropping
/// the writer without committing discards the opcode's bytes.
pub struct OpWriter<'a> {
    mux: &'a LogMux,
    cursor: Arc<Mutex<WriteCursor>>,
    error: Option<MuxError>,
    done: bool,
}

impl OpWriter<'_> {
    /// Append bytes belonging to the current opcode.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), MuxError> {
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        let capacity = self.mux.pool.capacity();
        if bytes.is_empty() {
            return Ok(());
        }
        // a single write larger than a whole buffer fails up front,
        // mutating nothing
        if bytes.len() > capacity {
            return self.fail(MuxError::OversizeOp {
                size: bytes.len(),
                capacity,
            });
        }
        let cursor = self.cursor.clone();
        let mut c = cursor.lock().expect("write cursor lock poisoned");
        let buffer = c.buffer.as_ref().expect("op without buffer").clone();
        if buffer.used() + bytes.len() > capacity {
            if let Err(error) = self.rotate(&mut c, bytes.len()) {
                return Err(error);
            }
        }
        let buffer = c.buffer.as_ref().expect("op without buffer");
        buffer.append(bytes);
        Ok(())
    }

    /// Swap in a fresh buffer, carrying the incomplete opcode's bytes
    /// forward so they stay contiguous. The old buffer keeps only complete
    /// opcodes and is sealed for the consumer.
    fn rotate(&mut self, c: &mut WriteCursor, incoming: usize) -> Result<(), MuxError> {
        let capacity = self.mux.pool.capacity();
        let old = c.buffer.as_ref().expect("op without buffer").clone();
        let moved = old.used() - c.op_start;

        if moved + incoming > capacity {
            // the opcode as a whole cannot fit in any buffer
            old.truncate_to(c.op_start);
            return self.fail(MuxError::OversizeOp {
                size: moved + incoming,
                capacity,
            });
        }
        let fresh = match self.mux.pool.allocate(c.log) {
            Ok(buffer) => buffer,
            Err(error) => {
                // discard only the in-progress opcode; sealed buffers are
                // not rolled back
                old.truncate_to(c.op_start);
                return self.fail(error);
            }
        };
        trace!(
            "rotate: {:?} buffer {} sealed with {} bytes, {} carried into buffer {}",
            c.log,
            old.id(),
            c.op_start,
            moved,
            fresh.id()
        );
        old.move_tail_into(c.op_start, &fresh);
        old.force_state(BufState::Sealed);
        self.mux.pool.submit(&old);
        old.set_claimed(false);

        c.buffer = Some(fresh);
        c.op_start = 0;
        c.fresh = true;
        Ok(())
    }

    fn fail(&mut self, error: MuxError) -> Result<(), MuxError> {
        self.error = Some(error.clone());
        Err(error)
    }

    /// The first error hit while writing this op, if any.
    pub fn take_error(&mut self) -> Option<MuxError> {
        self.error.take()
    }

    /// Mark the opcode complete. Seals and enqueues the buffer if it was
    /// freshly allocated during this op, otherwise just releases the claim
    /// for reuse.
    pub fn commit(mut self) -> Result<(), MuxError> {
        if let Some(error) = self.error.take() {
            self.close_out(false);
            return Err(error);
        }
        self.close_out(true);
        Ok(())
    }

    fn close_out(&mut self, commit: bool) {
        if self.done {
            return;
        }
        self.done = true;
        let mut c = self.cursor.lock().expect("write cursor lock poisoned");
        c.in_op = false;
        let Some(buffer) = c.buffer.as_ref().cloned() else {
            return;
        };
        if !commit {
            buffer.truncate_to(c.op_start);
        }
        buffer.force_state(BufState::Sealed);
        if c.fresh {
            c.fresh = false;
            if buffer.used() > 0 {
                self.mux.pool.submit(&buffer);
            }
        }
    }
}

impl Drop for OpWriter<'_> {
    fn drop(&mut self) {
        // dropping without commit discards the in-progress opcode
        self.close_out(false);
    }
}

impl WireWrite for OpWriter<'_> {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), WireError> {
        self.write(bytes).map_err(|_| WireError::ShortWrite {
            written: 0,
            requested: bytes.len(),
        })
    }
}
