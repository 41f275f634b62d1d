//! API key selection across a provider's key list
//!
//! Keeps per-provider counters so round-robin and least-used strategies
//! spread requests over every configured key.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use converse_config::{KeyStrategy, ProviderConfig};
use dashmap::DashMap;
use secrecy::SecretString;

/// Per-provider rotation state
#[derive(Debug)]
struct KeyState {
    /// Next index for round-robin
    cursor: AtomicUsize,
    /// Requests served per key
    usage: Vec<AtomicU64>,
}

impl KeyState {
    fn new(keys: usize) -> Self {
        Self {
            cursor: AtomicUsize::new(0),
            usage: (0..keys).map(|_| AtomicU64::new(0)).collect(),
        }
    }
}

/// Chooses which API key a request uses
#[derive(Debug, Default)]
pub struct KeyRotator {
    providers: DashMap<String, Arc<KeyState>>,
}

impl KeyRotator {
    /// Create an empty rotator
    pub fn new() -> Self {
        Self::default()
    }

    /// Key for the next request to `provider`, per its strategy
    ///
    /// Returns `None` when no key is configured. Selection is fair under
    /// concurrency only on a best-effort basis.
    pub fn select(&self, provider: &ProviderConfig) -> Option<SecretString> {
        let keys = &provider.api_keys;
        if keys.len() <= 1 || provider.key_strategy == KeyStrategy::First {
            return keys.first().cloned();
        }

        let state = self.state(&provider.id, keys.len());
        let index = match provider.key_strategy {
            KeyStrategy::First => 0,
            KeyStrategy::RoundRobin => state.cursor.fetch_add(1, Ordering::Relaxed) % keys.len(),
            KeyStrategy::LeastUsed => state
                .usage
                .iter()
                .enumerate()
                .min_by_key(|(_, count)| count.load(Ordering::Relaxed))
                .map_or(0, |(index, _)| index),
        };
        state.usage[index].fetch_add(1, Ordering::Relaxed);

        tracing::trace!(provider = %provider.id, key_index = index, "selected api key");
        keys.get(index).cloned()
    }

    /// Rotation state for a provider, reset when its key count changes
    fn state(&self, provider: &str, keys: usize) -> Arc<KeyState> {
        if let Some(state) = self.providers.get(provider)
            && state.usage.len() == keys
        {
            return Arc::clone(&state);
        }

        let state = Arc::new(KeyState::new(keys));
        self.providers.insert(provider.to_owned(), Arc::clone(&state));
        state
    }
}
