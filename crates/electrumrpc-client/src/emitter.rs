//! Notification listener registry.
//!
//! Maps a notification method name to its listeners, invoked in registration
//! order. The registry belongs to one client and survives reconnects.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

/// A notification listener. Receives the notification's `params`.
pub type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

/// Handle returned by [`EventEmitter::on`], used to remove the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
pub struct EventEmitter {
    listeners: Mutex<HashMap<String, Vec<(ListenerId, Listener)>>>,
    next_id: AtomicU64,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for `name`, after any existing listeners.
    pub fn on<F>(&self, name: impl Into<String>, listener: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .entry(name.into())
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove one listener. Returns `false` if it was not registered.
    pub fn off(&self, name: &str, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let Some(list) = listeners.get_mut(name) else {
            return false;
        };
        let before = list.len();
        list.retain(|(lid, _)| *lid != id);
        let removed = list.len() != before;
        if list.is_empty() {
            listeners.remove(name);
        }
        removed
    }

    /// Remove every listener for `name`. Returns how many were removed.
    pub fn clear(&self, name: &str) -> usize {
        self.listeners.lock().remove(name).map_or(0, |l| l.len())
    }

    pub fn listener_count(&self, name: &str) -> usize {
        self.listeners.lock().get(name).map_or(0, Vec::len)
    }

    /// Invoke every listener for `name` with `payload`, in registration
    /// order. Listeners run on a snapshot taken before the first call, so
    /// they may register or remove listeners freely. Returns the number of
    /// listeners invoked.
    pub fn emit(&self, name: &str, payload: &Value) -> usize {
        let snapshot: Vec<Listener> = match self.listeners.lock().get(name) {
            Some(list) => list.iter().map(|(_, l)| Arc::clone(l)).collect(),
            None => return 0,
        };
        for listener in &snapshot {
            listener(payload);
        }
        snapshot.len()
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let listeners = self.listeners.lock();
        let counts: HashMap<&str, usize> =
            listeners.iter().map(|(k, v)| (k.as_str(), v.len())).collect();
        f.debug_struct("EventEmitter").field("listeners", &counts).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn listeners_run_in_registration_order() {
        let emitter = EventEmitter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s = Arc::clone(&seen);
        emitter.on("blockchain.headers.subscribe", move |p| s.lock().push(("first", p.clone())));
        let s = Arc::clone(&seen);
        emitter.on("blockchain.headers.subscribe", move |p| s.lock().push(("second", p.clone())));

        let params = json!([{"height": 840000, "hex": "00"}]);
        assert_eq!(emitter.emit("blockchain.headers.subscribe", &params), 2);

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], ("first", params.clone()));
        assert_eq!(seen[1], ("second", params));
    }

    #[test]
    fn emit_without_listeners_is_a_noop() {
        let emitter = EventEmitter::new();
        assert_eq!(emitter.emit("blockchain.scripthash.subscribe", &json!([])), 0);
    }

    #[test]
    fn off_and_clear() {
        let emitter = EventEmitter::new();
        let a = emitter.on("m", |_| {});
        let _b = emitter.on("m", |_| {});
        assert_eq!(emitter.listener_count("m"), 2);

        assert!(emitter.off("m", a));
        assert!(!emitter.off("m", a));
        assert_eq!(emitter.listener_count("m"), 1);

        assert_eq!(emitter.clear("m"), 1);
        assert_eq!(emitter.listener_count("m"), 0);
        assert_eq!(emitter.clear("m"), 0);
    }

    #[test]
    fn listener_may_register_another_during_emit() {
        let emitter = Arc::new(EventEmitter::new());
        let calls = Arc::new(Mutex::new(Vec::new()));

        let em = Arc::clone(&emitter);
        let c = Arc::clone(&calls);
        emitter.on("m", move |_| {
            c.lock().push("outer");
            let c2 = Arc::clone(&c);
            em.on("m", move |_| c2.lock().push("late"));
        });

        // the late listener is not part of the running snapshot
        assert_eq!(emitter.emit("m", &Value::Null), 1);
        assert_eq!(*calls.lock(), vec!["outer"]);

        assert_eq!(emitter.emit("m", &Value::Null), 2);
        assert_eq!(*calls.lock(), vec!["outer", "outer", "late"]);
    }

    #[test]
    fn listener_may_remove_itself_during_emit() {
        let emitter = Arc::new(EventEmitter::new());
        let hits = Arc::new(AtomicU64::new(0));

        let em = Arc::clone(&emitter);
        let h = Arc::clone(&hits);
        let id = Arc::new(Mutex::new(None::<ListenerId>));
        let id_slot = Arc::clone(&id);
        let registered = emitter.on("m", move |_| {
            h.fetch_add(1, Ordering::SeqCst);
            if let Some(me) = *id_slot.lock() {
                em.off("m", me);
            }
        });
        *id.lock() = Some(registered);

        emitter.emit("m", &Value::Null);
        emitter.emit("m", &Value::Null);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
