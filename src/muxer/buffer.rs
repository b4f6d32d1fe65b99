use std::sync::{
    atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering},
    Mutex,
};

use crate::types::LogKind;

/// Lifecycle of one pooled buffer.
///
/// ```text
/// Free -> Writing   claimed by one (thread, log) cursor, bytes appended
/// Writing -> Sealed end of op / rotation / close; enqueued on its log's FIFO
/// Sealed -> Writing the owning cursor reclaims it for the next op
/// Sealed -> Draining the consumer claims it; no further appends
/// Draining -> Free  remaining bytes hit zero and no cursor references it
/// ```
///
/// All transitions are compare-and-swap on an atomic, so a producer finishing
/// an op and the consumer claiming the buffer can never both win.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum BufState {
    Free = 0,
    Writing = 1,
    Sealed = 2,
    Draining = 3,
}

impl BufState {
    fn from_u8(raw: u8) -> BufState {
        match raw {
            0 => BufState::Free,
            1 => BufState::Writing,
            2 => BufState::Sealed,
            _ => BufState::Draining,
        }
    }
}

/// Fixed-capacity byte container, the unit of pool allocation and recycling.
///
/// `used` is the append offset, `remaining` the count of written but not yet
/// consumed bytes. The two diverge once a reader starts draining. Byte
/// storage sits behind its own mutex; the state machine and counters stay
/// lock-free so lifecycle decisions never wait on a copy.
pub(crate) struct Buffer {
    id: u32,
    capacity: usize,
    log: AtomicU8,
    state: AtomicU8,
    claimed: AtomicBool,
    queued: AtomicBool,
    used: AtomicUsize,
    remaining: AtomicUsize,
    read_pos: AtomicUsize,
    data: Mutex<Box<[u8]>>,
}

impl Buffer {
    pub fn new(id: u32, capacity: usize) -> Self {
        Self {
            id,
            capacity,
            log: AtomicU8::new(0),
            state: AtomicU8::new(BufState::Free as u8),
            claimed: AtomicBool::new(false),
            queued: AtomicBool::new(false),
            used: AtomicUsize::new(0),
            remaining: AtomicUsize::new(0),
            read_pos: AtomicUsize::new(0),
            data: Mutex::new(vec![0u8; capacity].into_boxed_slice()),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // State machine

    pub fn state(&self) -> BufState {
        BufState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn try_transition(&self, from: BufState, to: BufState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Unconditional transition; only valid while the caller has exclusive
    /// control of the buffer (pool lock held, or owning the Writing claim).
    pub fn force_state(&self, to: BufState) {
        self.state.store(to as u8, Ordering::Release);
    }

    pub fn log(&self) -> LogKind {
        LogKind::ALL[self.log.load(Ordering::Acquire) as usize % LogKind::COUNT]
    }

    pub fn set_log(&self, log: LogKind) {
        self.log.store(log.index() as u8, Ordering::Release);
    }

    // Cursor / queue bookkeeping

    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }

    pub fn set_claimed(&self, claimed: bool) {
        self.claimed.store(claimed, Ordering::Release);
    }

    pub fn is_queued(&self) -> bool {
        self.queued.load(Ordering::Acquire)
    }

    /// Returns true the first time; buffers join their log's FIFO only once.
    pub fn mark_queued(&self) -> bool {
        !self.queued.swap(true, Ordering::AcqRel)
    }

    // Counters

    pub fn used(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    // Producer side (requires the Writing claim)

    /// Append bytes at the current offset. The caller has verified capacity
    /// under its cursor lock.
    pub fn append(&self, bytes: &[u8]) {
        let offset = self.used.load(Ordering::Acquire);
        debug_assert!(offset + bytes.len() <= self.capacity);
        {
            let mut data = self.data.lock().expect("buffer data lock poisoned");
            data[offset..offset + bytes.len()].copy_from_slice(bytes);
        }
        self.used.store(offset + bytes.len(), Ordering::Release);
        self.remaining.fetch_add(bytes.len(), Ordering::AcqRel);
    }

    /// Shrink the append offset back to `offset`, surrendering the bytes of
    /// an incomplete opcode. Used by rotation and by op abort.
    pub fn truncate_to(&self, offset: usize) {
        let used = self.used.load(Ordering::Acquire);
        debug_assert!(offset <= used);
        let dropped = used - offset;
        if dropped > 0 {
            self.used.store(offset, Ordering::Release);
            self.remaining.fetch_sub(dropped, Ordering::AcqRel);
        }
    }

    /// Move this buffer's tail (an opcode still being written) into the
    /// front of a freshly allocated buffer.
    pub fn move_tail_into(&self, from: usize, target: &Buffer) {
        let used = self.used.load(Ordering::Acquire);
        debug_assert!(from <= used);
        let moved = used - from;
        if moved == 0 {
            return;
        }
        {
            let data = self.data.lock().expect("buffer data lock poisoned");
            let mut other = target.data.lock().expect("buffer data lock poisoned");
            other[..moved].copy_from_slice(&data[from..used]);
        }
        target.used.store(moved, Ordering::Release);
        target.remaining.store(moved, Ordering::Release);
        self.truncate_to(from);
    }

    // Consumer side (requires the Draining claim)

    /// Copy unconsumed bytes into `out`, decrementing the remaining counter.
    /// Returns the number of bytes copied.
    pub fn read_into(&self, out: &mut [u8]) -> usize {
        let pos = self.read_pos.load(Ordering::Acquire);
        let used = self.used.load(Ordering::Acquire);
        let count = out.len().min(used.saturating_sub(pos));
        if count == 0 {
            return 0;
        }
        {
            let data = self.data.lock().expect("buffer data lock poisoned");
            out[..count].copy_from_slice(&data[pos..pos + count]);
        }
        self.read_pos.store(pos + count, Ordering::Release);
        self.remaining.fetch_sub(count, Ordering::AcqRel);
        count
    }

    /// Hand the full written payload to a closure (used when forwarding to
    /// the send callback; does not consume).
    pub fn with_payload<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let used = self.used.load(Ordering::Acquire);
        let data = self.data.lock().expect("buffer data lock poisoned");
        f(&data[..used])
    }

    /// Mark every written byte consumed (remote-only logs discard locally).
    pub fn consume_all(&self) {
        let used = self.used.load(Ordering::Acquire);
        self.read_pos.store(used, Ordering::Release);
        self.remaining.store(0, Ordering::Release);
    }

    /// Return the buffer to its pristine pool state.
    pub fn reset(&self) {
        self.used.store(0, Ordering::Release);
        self.remaining.store(0, Ordering::Release);
        self.read_pos.store(0, Ordering::Release);
        self.queued.store(false, Ordering::Release);
        self.claimed.store(false, Ordering::Release);
        self.force_state(BufState::Free);
    }
}
