//! Memoized knowledge base construction keyed by record-set identity.

use crate::embed::EmbeddingProvider;
use crate::error::Result;
use crate::knowledge::KnowledgeBase;
use crate::model::{QaPair, Record};
use crate::pairs::ReplySelection;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// SHA-256 over every record field, in order. Equal record sets in the same
/// order share a fingerprint.
pub fn fingerprint(records: &[Record]) -> String {
    let mut hasher = Sha256::new();
    hasher.update((records.len() as u64).to_le_bytes());
    for record in records {
        hash_id(&mut hasher, record.id);
        hasher.update((record.text.len() as u64).to_le_bytes());
        hasher.update(record.text.as_bytes());
        hasher.update([record.is_inbound as u8]);
        hash_id(&mut hasher, record.in_reply_to_id);
    }
    format!("{:x}", hasher.finalize())
}

fn hash_id(hasher: &mut Sha256, id: Option<i64>) {
    match id {
        Some(v) => {
            hasher.update([1u8]);
            hasher.update(v.to_le_bytes());
        }
        None => hasher.update([0u8]),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub fingerprint: String,
    pub selection: ReplySelection,
    pub model_id: String,
}

impl CacheKey {
    pub fn new(records: &[Record], selection: ReplySelection, model_id: &str) -> Self {
        Self {
            fingerprint: fingerprint(records),
            selection,
            model_id: model_id.to_string(),
        }
    }
}

/// Builds each distinct knowledge base once and hands out shared handles.
#[derive(Default)]
pub struct KbCache {
    entries: Mutex<HashMap<CacheKey, Arc<KnowledgeBase>>>,
    seed: Vec<QaPair>,
}

impl KbCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `seed` instead of the built-in fallback for every build.
    pub fn with_seed(seed: Vec<QaPair>) -> Self {
        Self {
            entries: Mutex::default(),
            seed,
        }
    }

    pub fn get_or_build<E>(
        &self,
        records: &[Record],
        embedder: &E,
        selection: ReplySelection,
    ) -> Result<Arc<KnowledgeBase>>
    where
        E: EmbeddingProvider + ?Sized,
    {
        let key = CacheKey::new(records, selection, embedder.model_id());

        // The lock is held across the build so concurrent callers with the
        // same key never build twice.
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(kb) = entries.get(&key) {
            debug!(fingerprint = %key.fingerprint, "knowledge base cache hit");
            return Ok(Arc::clone(kb));
        }

        debug!(fingerprint = %key.fingerprint, "knowledge base cache miss");
        let kb = Arc::new(KnowledgeBase::build_with_seed(
            records, embedder, selection, &self.seed,
        )?);
        entries.insert(key, Arc::clone(&kb));
        Ok(kb)
    }

    /// Drops one entry. Returns whether it was present.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some()
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashEmbeddingProvider;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        inner: HashEmbeddingProvider,
        calls: AtomicUsize,
    }

    impl EmbeddingProvider for Counting {
        fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.embed(text)
        }

        fn model_id(&self) -> &str {
            self.inner.model_id()
        }
    }

    fn corpus() -> Vec<Record> {
        vec![Record::inbound(1, "hi"), Record::reply(2, "hello", 1)]
    }

    #[test]
    fn fingerprint_tracks_content_and_order() {
        let a = corpus();
        let mut b = corpus();
        assert_eq!(fingerprint(&a), fingerprint(&b));

        b[0].text.push('!');
        assert_ne!(fingerprint(&a), fingerprint(&b));

        let reversed: Vec<Record> = a.iter().rev().cloned().collect();
        assert_ne!(fingerprint(&a), fingerprint(&reversed));

        let mut nulled = corpus();
        nulled[0].id = None;
        assert_ne!(fingerprint(&a), fingerprint(&nulled));
    }

    #[test]
    fn repeated_builds_are_served_from_cache() {
        let embedder = Counting {
            inner: HashEmbeddingProvider::new(16),
            calls: AtomicUsize::new(0),
        };
        let cache = KbCache::new();
        let records = corpus();

        let first = cache
            .get_or_build(&records, &embedder, ReplySelection::Last)
            .unwrap();
        let second = cache
            .get_or_build(&records, &embedder, ReplySelection::Last)
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn selection_policy_is_part_of_the_key() {
        let embedder = HashEmbeddingProvider::new(16);
        let cache = KbCache::new();
        let records = corpus();

        cache
            .get_or_build(&records, &embedder, ReplySelection::Last)
            .unwrap();
        cache
            .get_or_build(&records, &embedder, ReplySelection::All)
            .unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn invalidation_forces_a_rebuild() {
        let embedder = HashEmbeddingProvider::new(16);
        let cache = KbCache::new();
        let records = corpus();

        let first = cache
            .get_or_build(&records, &embedder, ReplySelection::Last)
            .unwrap();
        let key = CacheKey::new(&records, ReplySelection::Last, embedder.model_id());
        assert!(cache.invalidate(&key));
        assert!(!cache.invalidate(&key));

        let rebuilt = cache
            .get_or_build(&records, &embedder, ReplySelection::Last)
            .unwrap();
        assert!(!Arc::ptr_eq(&first, &rebuilt));

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn configured_seed_is_used_for_empty_corpus() {
        let cache = KbCache::with_seed(vec![QaPair::new("opening hours", "9 to 5")]);
        let kb = cache
            .get_or_build(&[], &HashEmbeddingProvider::new(8), ReplySelection::Last)
            .unwrap();
        assert_eq!(kb.len(), 1);
    }
}
