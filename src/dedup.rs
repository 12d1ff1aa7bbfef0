//! Request deduplication cache.
//!
//! Keyed by a fingerprint of (normalized source text, target language,
//! provider). A `Miss` grants exclusive ownership of producing the result
//! for that key; every other concurrent caller receives an in-flight
//! handle and awaits the producer instead of issuing a duplicate provider
//! call. Completed entries are served from cache until a short TTL
//! expires, checked lazily on access.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// Deterministic key identifying one unique translation request.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0[..8] {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Hash of (normalized text, target language, provider id).
pub fn fingerprint(source_text: &str, target_lang: &str, provider: &str) -> Fingerprint {
    let normalized = normalize(source_text);
    let mut hasher = blake3::Hasher::new();
    hasher.update(normalized.as_bytes());
    hasher.update(&[0]);
    hasher.update(target_lang.as_bytes());
    hasher.update(&[0]);
    hasher.update(provider.as_bytes());
    Fingerprint(*hasher.finalize().as_bytes())
}

/// Whitespace-insensitive normalization so trivially reformatted text
/// shares a cache entry. Case is preserved: it changes translations.
fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Broadcast state of an in-flight production.
#[derive(Debug, Clone)]
pub enum FlightState {
    Pending,
    Done(String),
    Failed,
}

#[derive(Debug)]
enum Slot {
    Ready { text: String, stored_at: Instant },
    InFlight(watch::Receiver<FlightState>),
}

type Shared = Arc<Mutex<HashMap<Fingerprint, Slot>>>;

/// Result of an atomic check-and-claim.
pub enum Lookup {
    /// A recent completed result.
    Hit(String),
    /// Another caller is producing this key; await the handle.
    InFlight(watch::Receiver<FlightState>),
    /// Exclusive claim to produce the result.
    Miss(Claim),
}

#[derive(Debug)]
pub struct DedupCache {
    ttl: Duration,
    inner: Shared,
}

impl DedupCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Atomic check-and-claim for `key`. The claim is registered before
    /// this returns, so two concurrent misses for the same key cannot
    /// both claim it.
    pub fn lookup(&self, key: &Fingerprint) -> Lookup {
        let mut map = self.inner.lock().expect("dedup cache lock poisoned");
        match map.get(key) {
            Some(Slot::Ready { text, stored_at }) => {
                if stored_at.elapsed() <= self.ttl {
                    return Lookup::Hit(text.clone());
                }
                map.remove(key);
            }
            Some(Slot::InFlight(rx)) => return Lookup::InFlight(rx.clone()),
            None => {}
        }
        let (tx, rx) = watch::channel(FlightState::Pending);
        map.insert(key.clone(), Slot::InFlight(rx));
        Lookup::Miss(Claim {
            key: key.clone(),
            tx: Some(tx),
            inner: Arc::clone(&self.inner),
        })
    }
}

/// Exclusive right to produce the result for one fingerprint. Dropping a
/// claim without completing it releases the key and wakes waiters with
/// `Failed`, so an abandoned producer never wedges other requests.
#[derive(Debug)]
pub struct Claim {
    key: Fingerprint,
    tx: Option<watch::Sender<FlightState>>,
    inner: Shared,
}

impl Claim {
    /// Store the produced result and wake all waiters with it.
    pub fn complete(mut self, text: String) {
        if let Some(tx) = self.tx.take() {
            {
                let mut map = self.inner.lock().expect("dedup cache lock poisoned");
                map.insert(
                    self.key.clone(),
                    Slot::Ready {
                        text: text.clone(),
                        stored_at: Instant::now(),
                    },
                );
            }
            let _ = tx.send(FlightState::Done(text));
        }
    }

    /// Release the key without a result; waiters observe `Failed`.
    pub fn fail(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(tx) = self.tx.take() {
            {
                let mut map = self.inner.lock().expect("dedup cache lock poisoned");
                if matches!(map.get(&self.key), Some(Slot::InFlight(_))) {
                    map.remove(&self.key);
                }
            }
            let _ = tx.send(FlightState::Failed);
        }
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        self.release();
    }
}

/// Await an in-flight handle until the producer finishes.
pub async fn await_flight(mut rx: watch::Receiver<FlightState>) -> Option<String> {
    loop {
        let state = rx.borrow().clone();
        match state {
            FlightState::Done(text) => return Some(text),
            FlightState::Failed => return None,
            FlightState::Pending => {}
        }
        if rx.changed().await.is_err() {
            return None;
        }
    }
}
