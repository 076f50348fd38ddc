use crate::config::DEFAULT_EMBEDDING_DIM;
use anyhow::Result;
use rayon::prelude::*;

/// Text to fixed-dimension vector. Implementations must be deterministic for
/// a fixed model; a knowledge base and the queries against it must use the
/// same provider.
pub trait EmbeddingProvider: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Identifies the embedding space, e.g. the model name.
    fn model_id(&self) -> &str;

    /// Embeds a batch. Rows come back in input order.
    fn encode(&self, texts: &[&str], normalize: bool) -> Result<Vec<Vec<f32>>> {
        let mut rows = texts
            .par_iter()
            .map(|text| self.embed(text))
            .collect::<Result<Vec<_>>>()?;
        if normalize {
            rows.iter_mut().for_each(|row| l2_normalize(row));
        }
        Ok(rows)
    }
}

/// Scales `v` to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Bag-of-tokens embedder: each lowercase alphanumeric token is hashed
/// (FNV-1a) into one of `dim` buckets. Needs no model files.
#[derive(Debug, Clone)]
pub struct HashEmbeddingProvider {
    dim: usize,
    model_id: String,
}

impl HashEmbeddingProvider {
    pub fn new(dim: usize) -> Self {
        let dim = dim.max(8);
        Self {
            dim,
            model_id: format!("hash-{dim}"),
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }
}

impl Default for HashEmbeddingProvider {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_DIM)
    }
}

impl HashEmbeddingProvider {
    fn counts(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dim];

        for token in text
            .to_ascii_lowercase()
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut h: u64 = 1469598103934665603;
            for b in token.as_bytes() {
                h ^= *b as u64;
                h = h.wrapping_mul(1099511628211);
            }
            v[(h as usize) % self.dim] += 1.0;
        }

        v
    }
}

impl EmbeddingProvider for HashEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = self.counts(text);
        l2_normalize(&mut v);
        Ok(v)
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Rows are normalized once, so `encode(&[t], true)[0] == embed(t)`.
    fn encode(&self, texts: &[&str], normalize: bool) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .par_iter()
            .map(|text| {
                let mut v = self.counts(text);
                if normalize {
                    l2_normalize(&mut v);
                }
                v
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    #[test]
    fn hash_embedding_is_unit_norm_and_deterministic() {
        let p = HashEmbeddingProvider::default();
        let a = p.embed("How do I reset my password?").unwrap();
        let b = p.embed("How do I reset my password?").unwrap();

        assert_eq!(a.len(), DEFAULT_EMBEDDING_DIM);
        assert_eq!(a, b);
        assert!((norm(&a) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn hash_embedding_ignores_case_and_punctuation() {
        let p = HashEmbeddingProvider::new(64);
        let a = p.embed("Track ORDER!").unwrap();
        let b = p.embed("track order").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn empty_text_embeds_to_zero_vector() {
        let p = HashEmbeddingProvider::new(16);
        let v = p.embed("  ?! ").unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn dimension_has_a_floor() {
        let p = HashEmbeddingProvider::new(2);
        assert_eq!(p.dim(), 8);
        assert_eq!(p.model_id(), "hash-8");
    }

    #[test]
    fn encode_preserves_input_order() {
        let p = HashEmbeddingProvider::new(32);
        let texts = ["refund policy", "contact support", "reset password"];
        let rows = p.encode(&texts, true).unwrap();

        assert_eq!(rows.len(), 3);
        for (row, text) in rows.iter().zip(texts) {
            assert_eq!(row, &p.embed(text).unwrap());
        }
    }

    #[test]
    fn unnormalized_encode_returns_token_counts() {
        let p = HashEmbeddingProvider::new(64);
        let rows = p.encode(&["refund refund"], false).unwrap();
        assert_eq!(rows[0].iter().sum::<f32>(), 2.0);
        assert_eq!(rows[0].iter().filter(|x| **x > 0.0).count(), 1);
    }

    #[test]
    fn l2_normalize_scales_to_unit_length() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        l2_normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }
}
