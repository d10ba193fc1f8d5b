//! Per-user session key store.
//!
//! Session keys replace the long-lived shared secret for the bulk of
//! heartbeat traffic. Keys are 32 printable characters, live only in process
//! memory and expire 30 minutes after creation. The store is owned explicitly
//! (constructed at startup, injected into handlers) rather than living in an
//! ambient global, so it can be swapped for a distributed cache later without
//! touching the orchestrator.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use rand::rngs::OsRng;
use rand::TryRngCore;

/// Session key length in characters.
pub const SESSION_KEY_LEN: usize = 32;

/// Default session key lifetime: 30 minutes.
pub const SESSION_KEY_TTL_SECS: u64 = 30 * 60;

const ALPHABET: &[u8; 62] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

#[derive(Debug, Clone)]
struct SessionEntry {
    key: String,
    expires_at: Instant,
}

/// Generate a random 32-character session key from the 62-symbol alphabet.
pub fn generate_session_key() -> String {
    let mut bytes = [0u8; SESSION_KEY_LEN];
    let mut rng = OsRng;

    rng.try_fill_bytes(&mut bytes)
        .expect("OsRng failed to generate session key");

    bytes
        .iter()
        .map(|b| ALPHABET[*b as usize % ALPHABET.len()] as char)
        .collect()
}

/// Time-bounded map from user id to that user's current session key.
///
/// All operations take the lock only for the map access itself; nothing
/// blocks or awaits while holding it.
#[derive(Debug)]
pub struct SessionKeyStore {
    ttl: Duration,
    entries: RwLock<HashMap<String, SessionEntry>>,
}

impl Default for SessionKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionKeyStore {
    /// Create a store with the default 30-minute TTL.
    pub fn new() -> Self {
        Self::with_ttl(Duration::from_secs(SESSION_KEY_TTL_SECS))
    }

    /// Create a store with a custom TTL (shorter values are useful in tests).
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Return the user's current session key if one exists and is not
    /// expired. Never mutates the store.
    pub fn get(&self, user_id: &str) -> Option<String> {
        let entries = self.entries.read().expect("session store lock poisoned");

        entries
            .get(user_id)
            .filter(|entry| Instant::now() < entry.expires_at)
            .map(|entry| entry.key.clone())
    }

    /// Return the user's current session key, minting a fresh one if absent
    /// or expired.
    ///
    /// The existence check is repeated under the write lock, so concurrent
    /// callers for the same user converge on a single winning key.
    pub fn get_or_create(&self, user_id: &str) -> String {
        if let Some(key) = self.get(user_id) {
            return key;
        }

        let mut entries = self.entries.write().expect("session store lock poisoned");

        // Another caller may have won the race between our read and write.
        if let Some(entry) = entries.get(user_id) {
            if Instant::now() < entry.expires_at {
                return entry.key.clone();
            }
        }

        let key = generate_session_key();
        entries.insert(
            user_id.to_string(),
            SessionEntry {
                key: key.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );

        key
    }

    /// The configured key lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Explicitly evict the user's session key, if any.
    pub fn remove(&self, user_id: &str) {
        let mut entries = self.entries.write().expect("session store lock poisoned");
        entries.remove(user_id);
    }

    /// Evict every expired entry; returns the number evicted.
    ///
    /// The cutoff instant is captured once, before scanning: an entry created
    /// while the sweep runs carries a later expiry and survives.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().expect("session store lock poisoned");

        let before = entries.len();
        entries.retain(|_, entry| now < entry.expires_at);
        before - entries.len()
    }

    /// Number of entries currently held (expired or not).
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .expect("session store lock poisoned")
            .len()
    }

    /// Whether the store holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn generated_keys_use_alphabet_and_length() {
        let key = generate_session_key();

        assert_eq!(key.len(), SESSION_KEY_LEN);
        assert!(key.bytes().all(|b| ALPHABET.contains(&b)));

        // Ensure randomness
        assert_ne!(key, generate_session_key());
    }

    #[test]
    fn get_or_create_is_idempotent_within_ttl() {
        let store = SessionKeyStore::new();

        let first = store.get_or_create("user-1");
        let second = store.get_or_create("user-1");

        assert_eq!(first, second);
        assert_eq!(store.get("user-1"), Some(first));
    }

    #[test]
    fn get_does_not_mint() {
        let store = SessionKeyStore::new();

        assert_eq!(store.get("user-1"), None);
        assert!(store.is_empty());
    }

    #[test]
    fn expired_key_is_replaced() {
        let store = SessionKeyStore::with_ttl(Duration::from_millis(5));

        let first = store.get_or_create("user-1");
        thread::sleep(Duration::from_millis(20));

        assert_eq!(store.get("user-1"), None, "expired key must not be served");

        let second = store.get_or_create("user-1");
        assert_ne!(first, second, "a fresh key must be minted after expiry");
    }

    #[test]
    fn concurrent_creators_converge_on_one_key() {
        let store = Arc::new(SessionKeyStore::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.get_or_create("user-1"))
            })
            .collect();

        let keys: Vec<String> = handles
            .into_iter()
            .map(|h| h.join().expect("creator thread should not panic"))
            .collect();

        let winner = keys[0].clone();
        assert!(
            keys.iter().all(|k| *k == winner),
            "every racing caller must see the same key"
        );
        assert_eq!(store.get("user-1"), Some(winner.clone()));
        assert_eq!(store.len(), 1);

        // An uncontested user still gets an independent key.
        assert_ne!(store.get_or_create("user-2"), winner);
    }

    #[test]
    fn keys_are_per_user() {
        let store = SessionKeyStore::new();

        let a = store.get_or_create("user-a");
        let b = store.get_or_create("user-b");

        assert_ne!(a, b);
    }

    #[test]
    fn remove_evicts_immediately() {
        let store = SessionKeyStore::new();

        store.get_or_create("user-1");
        store.remove("user-1");

        assert_eq!(store.get("user-1"), None);
    }

    #[test]
    fn sweep_evicts_expired_entries() {
        let store = SessionKeyStore::with_ttl(Duration::from_millis(5));

        store.get_or_create("stale-1");
        store.get_or_create("stale-2");
        thread::sleep(Duration::from_millis(20));

        assert_eq!(store.sweep(), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn sweep_leaves_live_entries_alone() {
        let store = SessionKeyStore::with_ttl(Duration::from_secs(60));

        let key = store.get_or_create("user-1");

        assert_eq!(store.sweep(), 0);
        assert_eq!(store.get("user-1"), Some(key));
    }
}
