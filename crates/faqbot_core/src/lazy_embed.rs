//! Process-wide embedder slot.
//!
//! Model loading is expensive, so the provider is built once on first use and
//! shared by every caller until the slot is dropped. A failed load leaves the
//! slot empty; the next call tries again.

use crate::embed::EmbeddingProvider;
use crate::error::{FaqError, Result};
use std::sync::{Mutex, OnceLock, PoisonError};
use tracing::{info, warn};

type Loader = Box<dyn Fn() -> anyhow::Result<Box<dyn EmbeddingProvider>> + Send + Sync>;

pub struct LazyEmbedder {
    model_id: String,
    loader: Loader,
    slot: OnceLock<Box<dyn EmbeddingProvider>>,
    loading: Mutex<()>,
}

impl LazyEmbedder {
    pub fn new<F>(model_id: impl Into<String>, loader: F) -> Self
    where
        F: Fn() -> anyhow::Result<Box<dyn EmbeddingProvider>> + Send + Sync + 'static,
    {
        Self {
            model_id: model_id.into(),
            loader: Box::new(loader),
            slot: OnceLock::new(),
            loading: Mutex::new(()),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.slot.get().is_some()
    }

    /// Returns the shared provider, loading it on first use.
    pub fn get(&self) -> Result<&dyn EmbeddingProvider> {
        if let Some(provider) = self.slot.get() {
            return Ok(provider.as_ref());
        }

        let _guard = self.loading.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(provider) = self.slot.get() {
            return Ok(provider.as_ref());
        }

        info!(model = %self.model_id, "loading embedding model");
        let provider = (self.loader)().map_err(|err| {
            warn!(model = %self.model_id, error = %err, "embedding model failed to load");
            FaqError::EmbedderUnavailable(err)
        })?;
        let _ = self.slot.set(provider);

        self.slot.get().map(|p| p.as_ref()).ok_or_else(|| {
            FaqError::EmbedderUnavailable(anyhow::anyhow!("embedder slot empty after load"))
        })
    }

    fn provider(&self) -> anyhow::Result<&dyn EmbeddingProvider> {
        self.get().map_err(|err| match err {
            FaqError::EmbedderUnavailable(inner) => inner,
            other => other.into(),
        })
    }
}

impl EmbeddingProvider for LazyEmbedder {
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.provider()?.embed(text)
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn encode(&self, texts: &[&str], normalize: bool) -> anyhow::Result<Vec<Vec<f32>>> {
        self.provider()?.encode(texts, normalize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashEmbeddingProvider;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting(loads: Arc<AtomicUsize>) -> LazyEmbedder {
        LazyEmbedder::new("hash-16", move || {
            loads.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(HashEmbeddingProvider::new(16)) as Box<dyn EmbeddingProvider>)
        })
    }

    #[test]
    fn loads_once_on_first_use() {
        let loads = Arc::new(AtomicUsize::new(0));
        let lazy = counting(loads.clone());

        assert!(!lazy.is_loaded());
        assert_eq!(lazy.model_id(), "hash-16");
        assert_eq!(loads.load(Ordering::SeqCst), 0);

        lazy.embed("one").unwrap();
        lazy.embed("two").unwrap();
        lazy.encode(&["three", "four"], true).unwrap();

        assert!(lazy.is_loaded());
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_first_use_loads_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let lazy = counting(loads.clone());

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| lazy.embed("where is my order").unwrap());
            }
        });

        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_load_is_reported_and_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let lazy = LazyEmbedder::new("flaky", move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                anyhow::bail!("model file not found");
            }
            Ok(Box::new(HashEmbeddingProvider::new(8)) as Box<dyn EmbeddingProvider>)
        });

        let err = lazy.get().err().expect("first load fails");
        assert!(matches!(err, FaqError::EmbedderUnavailable(_)));
        assert!(err.to_string().contains("model file not found"));
        assert!(!lazy.is_loaded());

        assert!(lazy.get().is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
