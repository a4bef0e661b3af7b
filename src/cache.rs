//! Bounded least-recently-used memo of generated phrases.

use std::num::NonZeroUsize;

use lru::LruCache;

/// Maximum number of cached results.
pub const CACHE_MAX: usize = 50;

const CAPACITY: NonZeroUsize = match NonZeroUsize::new(CACHE_MAX) {
    Some(capacity) => capacity,
    None => panic!("CACHE_MAX must be non-zero"),
};

/// Phrase cache keyed by [`cache_key`].
///
/// `get` marks an entry most-recently-used, `put` replaces an existing key or
/// evicts the least-recently-used entry once `CACHE_MAX` is reached.
pub type PhraseCache<V> = LruCache<String, V>;

pub fn phrase_cache<V>() -> PhraseCache<V> {
    LruCache::new(CAPACITY)
}

/// Build the cache key for a request: `speed ++ ":" ++ text`.
///
/// The key uses the caller's original text, not the inference-normalized form,
/// so two stylings of the same phrase are cached separately.
pub fn cache_key(text: &str, speed: f32) -> String {
    format!("{speed}:{text}")
}
