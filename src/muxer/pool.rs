use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
};

use log::trace;

use crate::{
    muxer::{
        buffer::{BufState, Buffer},
        error::MuxError,
    },
    types::LogKind,
};

pub(crate) struct PoolInner {
    free: Vec<Arc<Buffer>>,
    pub ready: [VecDeque<Arc<Buffer>>; LogKind::COUNT],
    allocated: usize,
    next_id: u32,
}

/// Shared pool of fixed-size buffers plus the per-log ready FIFOs.
///
/// One coarse lock serializes allocation, recycling, enqueueing and the
/// flush scan; the append path never takes it except to allocate.
pub(crate) struct BufferPool {
    capacity: usize,
    limit: usize,
    inner: Mutex<PoolInner>,
}

impl BufferPool {
    pub fn new(capacity: usize, limit: usize) -> Self {
        Self {
            capacity,
            limit,
            inner: Mutex::new(PoolInner {
                free: Vec::new(),
                ready: Default::default(),
                allocated: 0,
                next_id: 0,
            }),
        }
    }

    /// Data bytes per buffer; also the maximum size of a single opcode.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn lock(&self) -> MutexGuard<'_, PoolInner> {
        self.inner.lock().expect("buffer pool lock poisoned")
    }

    /// Claim a buffer for writing on the given log. Exhaustion is a
    /// caller-visible failure, never a block.
    pub fn allocate(&self, log: LogKind) -> Result<Arc<Buffer>, MuxError> {
        let mut inner = self.lock();
        if inner.free.is_empty() && inner.allocated >= self.limit {
            // reclaim anything fully drained before giving up
            for log in LogKind::ALL {
                Self::sweep(&mut inner, log);
            }
        }
        let buffer = match inner.free.pop() {
            Some(existing) => existing,
            None => {
                if inner.allocated >= self.limit {
                    return Err(MuxError::PoolExhausted { limit: self.limit });
                }
                inner.allocated += 1;
                inner.next_id += 1;
                Arc::new(Buffer::new(inner.next_id, self.capacity))
            }
        };
        debug_assert_eq!(buffer.state(), BufState::Free);
        buffer.set_log(log);
        buffer.set_claimed(true);
        buffer.force_state(BufState::Writing);
        trace!("pool: buffer {} -> writing ({:?})", buffer.id(), log);
        Ok(buffer)
    }

    /// Put a sealed buffer on its log's FIFO. Idempotent per checkout.
    pub fn submit(&self, buffer: &Arc<Buffer>) {
        if buffer.mark_queued() {
            let mut inner = self.lock();
            trace!(
                "pool: buffer {} queued on {:?} with {} bytes",
                buffer.id(),
                buffer.log(),
                buffer.used()
            );
            inner.ready[buffer.log().index()].push_back(buffer.clone());
        }
    }

    /// Drop every buffer and queue; producers must be quiescent.
    pub fn clear(&self) {
        let mut inner = self.lock();
        for queue in inner.ready.iter_mut() {
            for buffer in queue.iter() {
                buffer.reset();
            }
            queue.clear();
        }
        inner.free.clear();
        inner.allocated = 0;
    }

    /// Recycle buffers that are fully drained and no longer referenced by a
    /// cursor. Called with the pool lock already held.
    pub fn sweep(inner: &mut PoolInner, log: LogKind) {
        let queue = &mut inner.ready[log.index()];
        let mut recycled = Vec::new();
        queue.retain(|buffer| {
            let done = buffer.state() == BufState::Draining
                && buffer.remaining() == 0
                && !buffer.is_claimed();
            if done {
                recycled.push(buffer.clone());
            }
            !done
        });
        for buffer in recycled {
            trace!("pool: buffer {} recycled", buffer.id());
            buffer.reset();
            inner.free.push(buffer);
        }
    }
}
