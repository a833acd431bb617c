//! Session store (spec §4.4): sessions keyed by Session-Id, sharded for
//! concurrent access, reclaimed by a global time-ordered expiry list woken
//! through a `tokio::sync::Notify` rather than a condition variable.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::Notify;

/// Default session lifetime per spec §4.4: 31 days.
pub const DEFAULT_LIFETIME: Duration = Duration::from_secs(31 * 24 * 60 * 60);

const SHARD_COUNT: usize = 16;

#[derive(Debug)]
pub struct Session {
    pub id: String,
    refcount: AtomicU64,
    deadline: Mutex<Instant>,
}

impl Session {
    fn new(id: String, deadline: Instant) -> Session {
        Session {
            id,
            refcount: AtomicU64::new(0),
            deadline: Mutex::new(deadline),
        }
    }

    pub fn acquire(self: &Arc<Session>) {
        self.refcount.fetch_add(1, Ordering::SeqCst);
    }

    pub fn release(self: &Arc<Session>) {
        self.refcount.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn refcount(&self) -> u64 {
        self.refcount.load(Ordering::SeqCst)
    }

    pub fn deadline(&self) -> Instant {
        *self.deadline.lock().unwrap()
    }
}

struct Shard {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
}

impl Shard {
    fn new() -> Shard {
        Shard {
            sessions: Mutex::new(HashMap::new()),
        }
    }
}

fn shard_index(sid: &str) -> usize {
    let mut hash: u64 = 1469598103934665603;
    for b in sid.bytes() {
        hash ^= b as u64;
        hash = hash.wrapping_mul(1099511628211);
    }
    (hash as usize) % SHARD_COUNT
}

/// A cleanup callback invoked by the expiry sweep when a session is
/// destroyed, mirroring spec §4.4's "invoking each handler's cleanup(sid,
/// slot) callback".
pub type CleanupFn = Box<dyn Fn(&str) + Send + Sync>;

struct ExpiryEntry {
    sid: String,
    deadline: Instant,
}

/// Sessions live in two structures that must stay linked: the
/// hash-by-Session-Id shards and a global time-ordered expiry list. Lock
/// order is always shard before expiry list (spec §4.4).
pub struct SessionStore {
    shards: Vec<Shard>,
    expiry: Mutex<Vec<ExpiryEntry>>,
    notify: Notify,
    cleanup_handlers: Mutex<Vec<CleanupFn>>,
    local_diameter_id: String,
    seq: AtomicU64,
}

pub enum GetOrCreate {
    Existing(Arc<Session>),
    Created(Arc<Session>),
}

impl SessionStore {
    pub fn new(local_diameter_id: &str) -> Arc<SessionStore> {
        Arc::new(SessionStore {
            shards: (0..SHARD_COUNT).map(|_| Shard::new()).collect(),
            expiry: Mutex::new(Vec::new()),
            notify: Notify::new(),
            cleanup_handlers: Mutex::new(Vec::new()),
            local_diameter_id: local_diameter_id.to_string(),
            seq: AtomicU64::new(0),
        })
    }

    pub fn register_cleanup(&self, f: CleanupFn) {
        self.cleanup_handlers.lock().unwrap().push(f);
    }

    /// Generates a Session-Id of the form
    /// `<local-diameter-id>;<monotonic-hi>;<monotonic-lo>` (spec §3).
    pub fn generate_session_id(&self) -> String {
        let n = self.seq.fetch_add(1, Ordering::SeqCst);
        let hi = (n >> 32) as u32;
        let lo = n as u32;
        format!("{};{};{}", self.local_diameter_id, hi, lo)
    }

    /// `fd_sess_new` semantics (spec §9 open question): a caller-provided
    /// sid that already exists returns the existing session rather than
    /// erroring, so callers must branch on `GetOrCreate`.
    pub fn get_or_create(&self, sid: &str) -> GetOrCreate {
        let idx = shard_index(sid);
        let mut sessions = self.shards[idx].sessions.lock().unwrap();
        if let Some(existing) = sessions.get(sid) {
            return GetOrCreate::Existing(Arc::clone(existing));
        }

        let deadline = Instant::now() + DEFAULT_LIFETIME;
        let session = Arc::new(Session::new(sid.to_string(), deadline));
        sessions.insert(sid.to_string(), Arc::clone(&session));
        drop(sessions);

        let mut expiry = self.expiry.lock().unwrap();
        expiry.push(ExpiryEntry {
            sid: sid.to_string(),
            deadline,
        });
        expiry.sort_by_key(|e| e.deadline);
        drop(expiry);
        self.notify.notify_one();

        GetOrCreate::Created(session)
    }

    pub fn get(&self, sid: &str) -> Option<Arc<Session>> {
        let idx = shard_index(sid);
        self.shards[idx].sessions.lock().unwrap().get(sid).cloned()
    }

    /// Updates a session's timeout, relinking the expiry list and waking
    /// the expiry sweep so a shortened deadline is observed promptly.
    pub fn set_timeout(&self, sid: &str, lifetime: Duration) {
        let deadline = Instant::now() + lifetime;
        if let Some(session) = self.get(sid) {
            *session.deadline.lock().unwrap() = deadline;
        } else {
            return;
        }

        let mut expiry = self.expiry.lock().unwrap();
        if let Some(entry) = expiry.iter_mut().find(|e| e.sid == sid) {
            entry.deadline = deadline;
        }
        expiry.sort_by_key(|e| e.deadline);
        drop(expiry);
        self.notify.notify_one();
    }

    fn reclaim(&self, sid: &str) -> bool {
        let idx = shard_index(sid);
        let mut sessions = self.shards[idx].sessions.lock().unwrap();
        match sessions.get(sid) {
            Some(session) if session.refcount() == 0 => {
                sessions.remove(sid);
                true
            }
            _ => false,
        }
    }

    /// Destroys all sessions whose deadline has passed, invoking the
    /// registered cleanup callbacks once per destroyed session.
    fn sweep_expired(&self) {
        let now = Instant::now();
        let expired: Vec<String> = {
            let mut expiry = self.expiry.lock().unwrap();
            let split = expiry.partition_point(|e| e.deadline <= now);
            expiry.drain(..split).map(|e| e.sid).collect()
        };

        for sid in expired {
            if self.reclaim(&sid) {
                for f in self.cleanup_handlers.lock().unwrap().iter() {
                    f(&sid);
                }
            }
        }
    }

    /// The expiry sweep: sleeps until the head of the list is due (or it
    /// is woken early by `set_timeout`/`get_or_create`), then destroys
    /// every session whose deadline has passed. Intended to be spawned
    /// once as a long-lived `tokio` task for the life of the node.
    pub async fn run_expiry_loop(self: Arc<Self>) {
        loop {
            let sleep_for = {
                let expiry = self.expiry.lock().unwrap();
                match expiry.first() {
                    Some(entry) => entry.deadline.saturating_duration_since(Instant::now()),
                    None => Duration::from_secs(3600),
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                _ = self.notify.notified() => {}
            }

            self.sweep_expired();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_create_returns_existing() {
        let store = SessionStore::new("host.example.net");
        let a = match store.get_or_create("host.example.net;1;1") {
            GetOrCreate::Created(s) => s,
            GetOrCreate::Existing(_) => panic!("expected Created"),
        };
        let b = match store.get_or_create("host.example.net;1;1") {
            GetOrCreate::Existing(s) => s,
            GetOrCreate::Created(_) => panic!("expected Existing"),
        };
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_reclaim_only_when_refcount_zero() {
        let store = SessionStore::new("host.example.net");
        let session = match store.get_or_create("sid-1") {
            GetOrCreate::Created(s) => s,
            GetOrCreate::Existing(_) => unreachable!(),
        };
        session.acquire();
        assert!(!store.reclaim("sid-1"));
        session.release();
        assert!(store.reclaim("sid-1"));
    }

    #[tokio::test]
    async fn test_expiry_sweep_invokes_cleanup() {
        let store = SessionStore::new("host.example.net");
        let (tx, rx) = tokio::sync::oneshot::channel();
        let tx = std::sync::Mutex::new(Some(tx));
        store.register_cleanup(Box::new(move |sid| {
            if let Some(tx) = tx.lock().unwrap().take() {
                let _ = tx.send(sid.to_string());
            }
        }));

        store.get_or_create("sid-expiring");
        store.set_timeout("sid-expiring", Duration::from_millis(10));

        tokio::time::sleep(Duration::from_millis(50)).await;
        store.sweep_expired();

        let sid = rx.await.unwrap();
        assert_eq!(sid, "sid-expiring");
        assert!(store.get("sid-expiring").is_none());
    }
}
