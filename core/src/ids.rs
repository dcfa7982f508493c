use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::TryRngCore;
use rand::rngs::OsRng;
use uuid::Builder;

/// Source of fresh record identifiers.
///
/// The store and the widget reconciler both take one of these instead of
/// calling a random source directly, so tests can supply deterministic ids.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// UUID v4 from 128 bits of OS randomness.
///
/// When the OS source is unavailable, falls back to a timestamp plus a
/// per-process counter, which is still unique for the process lifetime.
#[derive(Debug, Default)]
pub struct RandomIds {
    fallback_counter: AtomicU64,
}

impl RandomIds {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn fallback_id(&self) -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_millis());
        let n = self.fallback_counter.fetch_add(1, Ordering::Relaxed);
        format!("meal-{millis:x}-{n:x}")
    }
}

impl IdGenerator for RandomIds {
    fn next_id(&self) -> String {
        let mut bytes = [0u8; 16];
        match OsRng.try_fill_bytes(&mut bytes) {
            Ok(()) => Builder::from_random_bytes(bytes).into_uuid().to_string(),
            Err(e) => {
                tracing::warn!("OS random source unavailable ({e}), using fallback id");
                self.fallback_id()
            }
        }
    }
}

/// Deterministic `<prefix>-1`, `<prefix>-2`, ... ids.
#[derive(Debug)]
pub struct SequentialIds {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIds {
    #[must_use]
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            next: AtomicU64::new(1),
        }
    }
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self::new("meal")
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}-{n}", self.prefix)
    }
}
