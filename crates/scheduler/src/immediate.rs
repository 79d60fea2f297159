//! Immediate-function registry (§4.2): callbacks pre-registered on a
//! thread and invoked inline, at message-drain time, without allocating a
//! task. Used for the hot RPC-reply path and for requests that must not
//! allocate (§4.2 "used for the hot path and for requests that must not
//! allocate a task").

use crate::channel::ImmediateFnId;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// A registered immediate function: takes the message's inline payload
/// bytes, runs synchronously on the destination thread.
pub type ImmediateFn = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Per-thread table of registered immediate functions.
#[derive(Default, Clone)]
pub struct ImmediateTable {
    fns: FxHashMap<ImmediateFnId, ImmediateFn>,
}

impl ImmediateTable {
    /// An empty table.
    pub fn new() -> Self {
        ImmediateTable::default()
    }

    /// Registers `f` under `id`, replacing any previous registration.
    pub fn register(&mut self, id: ImmediateFnId, f: ImmediateFn) {
        self.fns.insert(id, f);
    }

    /// Invokes the function registered under `id` with `payload`. No-op
    /// (and logged) if `id` was never registered — this should not happen
    /// in a correctly wired node, but a stale/foreign id must not panic the
    /// worker thread.
    pub fn invoke(&self, id: ImmediateFnId, payload: &[u8]) {
        match self.fns.get(&id) {
            Some(f) => f(payload),
            None => tracing::warn!(id = id.0, "immediate function id has no registration"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn invokes_registered_function_with_payload() {
        let seen = Arc::new(AtomicU32::new(0));
        let seen2 = Arc::clone(&seen);
        let mut table = ImmediateTable::new();
        table.register(ImmediateFnId(1), Arc::new(move |bytes| {
            seen2.store(bytes[0] as u32, Ordering::SeqCst);
        }));
        table.invoke(ImmediateFnId(1), &[9]);
        assert_eq!(seen.load(Ordering::SeqCst), 9);
    }

    #[test]
    fn unregistered_id_does_not_panic() {
        let table = ImmediateTable::new();
        table.invoke(ImmediateFnId(99), &[]);
    }
}
