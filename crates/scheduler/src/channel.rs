//! Per-`(src, dst)` cross-thread messaging (§4.2): a bounded channel with a
//! fixed power-of-two capacity, inline payloads capped at 32 bytes, and one
//! of a task reference or an immediate-function id attached.
//!
//! The original implements this channel as a lock-free SPSC ring buffer
//! with a CAS-updated head pointer (§9 DESIGN NOTES, same family of
//! problem as the thread-local allocator's cross-thread free lists). We
//! make the same call documented for C2 in `DESIGN.md`: a hand-rolled
//! lock-free ring buffer is a distraction with no safety upside over a
//! `parking_lot::Mutex`-guarded `VecDeque` at this message rate (one
//! enqueue per cross-thread RPC hop, not per allocation), so this channel
//! is safe-Rust and still satisfies every contract in §4.2 — bounded
//! capacity, FIFO within a `(src, dst)` pair, fail-fast when full.

use crate::task::TaskId;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Maximum inline payload size (§4.2 "≤32 bytes").
pub const INLINE_PAYLOAD_LEN: usize = 32;

/// An id identifying a pre-registered immediate function (§4.2), invoked
/// inline on the destination thread when its message is drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImmediateFnId(pub u32);

/// What a message asks the destination thread to do with it.
#[derive(Debug, Clone, Copy)]
pub enum Dispatch {
    /// Deliver to a specific task's mailbox, waking it if `Waiting`.
    Task(TaskId),
    /// Invoke a pre-registered callback inline, at drain time.
    Immediate(ImmediateFnId),
}

/// One cross-thread message: a dispatch target plus an inline payload.
#[derive(Clone, Copy)]
pub struct Message {
    /// Where this message is routed.
    pub dispatch: Dispatch,
    /// Inline payload bytes; `len` of them are meaningful.
    pub payload: [u8; INLINE_PAYLOAD_LEN],
    /// Number of valid bytes in `payload`.
    pub len: u8,
}

impl Message {
    /// Builds a message carrying `payload` (truncated with a debug-assert
    /// if it exceeds [`INLINE_PAYLOAD_LEN`]).
    pub fn new(dispatch: Dispatch, payload: &[u8]) -> Self {
        debug_assert!(payload.len() <= INLINE_PAYLOAD_LEN, "message payload exceeds the inline limit");
        let mut buf = [0u8; INLINE_PAYLOAD_LEN];
        let n = payload.len().min(INLINE_PAYLOAD_LEN);
        buf[..n].copy_from_slice(&payload[..n]);
        Message { dispatch, payload: buf, len: n as u8 }
    }

    /// The meaningful payload bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.payload[..self.len as usize]
    }
}

struct Inner {
    ring: Mutex<VecDeque<Message>>,
    capacity: usize,
    /// Set by the destination thread before it parks on its sleep event,
    /// cleared after waking (§4.2 "tracked by an `asleep` flag"). The
    /// sender only pays for a wake signal when this is true.
    dst_asleep: AtomicBool,
}

/// The sending half of one `(src, dst)` channel.
#[derive(Clone)]
pub struct Sender {
    inner: Arc<Inner>,
    waker: Arc<dyn Fn() + Send + Sync>,
}

/// The receiving half of one `(src, dst)` channel.
pub struct Receiver {
    inner: Arc<Inner>,
}

/// Builds a bounded channel of `capacity` (rounded up to a power of two),
/// paired with `waker` — the destination thread's "ring its event-fd"
/// callback, invoked only when [`Receiver::mark_asleep`] was called and not
/// yet cleared (§4.2 wake-on-message contract).
pub fn channel(capacity: usize, waker: Arc<dyn Fn() + Send + Sync>) -> (Sender, Receiver) {
    let capacity = capacity.next_power_of_two().max(1);
    let inner = Arc::new(Inner {
        ring: Mutex::new(VecDeque::with_capacity(capacity)),
        capacity,
        dst_asleep: AtomicBool::new(false),
    });
    (
        Sender { inner: Arc::clone(&inner), waker },
        Receiver { inner },
    )
}

/// Returned by [`Sender::try_send`] when the channel is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelFull;

impl Sender {
    /// Enqueues `msg`, failing fast if the channel is full (§4.2 "enqueue
    /// fails fast when full; sender retries with back-off"). Wakes the
    /// destination if it was parked.
    pub fn try_send(&self, msg: Message) -> Result<(), ChannelFull> {
        {
            let mut ring = self.inner.ring.lock();
            if ring.len() >= self.inner.capacity {
                return Err(ChannelFull);
            }
            ring.push_back(msg);
        }
        if self.inner.dst_asleep.swap(false, Ordering::AcqRel) {
            (self.waker)();
        }
        Ok(())
    }

    /// Current queue depth, for backpressure/instrumentation (§4.2, §5
    /// "monitors send-queue depth").
    pub fn depth(&self) -> usize {
        self.inner.ring.lock().len()
    }

    /// Configured capacity (always a power of two).
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }
}

impl Receiver {
    /// Drains every currently-queued message into `out`, in FIFO order.
    /// Returns the number drained.
    pub fn drain_into(&self, out: &mut Vec<Message>) -> usize {
        let mut ring = self.inner.ring.lock();
        let n = ring.len();
        out.extend(ring.drain(..));
        n
    }

    /// Marks this side as about to park on its sleep event-fd; the next
    /// `try_send` on the paired sender will invoke the wake callback
    /// exactly once. Must be called immediately before the actual `poll`
    /// (§4.2 "set before `poll` and cleared after").
    pub fn mark_asleep(&self) {
        self.inner.dst_asleep.store(true, Ordering::Release);
    }

    /// Clears the asleep flag (called after waking, whether from a message
    /// or a timeout).
    pub fn mark_awake(&self) {
        self.inner.dst_asleep.store(false, Ordering::Release);
    }

    /// True if at least one message is queued.
    pub fn has_messages(&self) -> bool {
        !self.inner.ring.lock().is_empty()
    }
}
