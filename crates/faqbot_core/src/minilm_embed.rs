use anyhow::{anyhow, bail, Result};
use candle_core::{DType, Device, Module, Tensor, D};
use candle_nn::{Embedding, LayerNorm, Linear, VarBuilder};
use std::path::Path;
use tokenizers::{Tokenizer, TruncationParams};

use crate::config::{DEFAULT_EMBEDDING_DIM, DEFAULT_MODEL_ID};
use crate::embed::EmbeddingProvider;

// all-MiniLM-L6-v2
const HIDDEN: usize = DEFAULT_EMBEDDING_DIM;
const INTERMEDIATE: usize = 1536;
const HEADS: usize = 12;
const HEAD_DIM: usize = HIDDEN / HEADS;
const LAYERS: usize = 6;
const VOCAB: usize = 30522;
const MAX_POSITIONS: usize = 512;
const TYPE_VOCAB: usize = 2;
const LAYER_NORM_EPS: f64 = 1e-12;
const PAD_ID: u32 = 0;

struct EncoderLayer {
    query: Linear,
    key: Linear,
    value: Linear,
    attn_out: Linear,
    attn_norm: LayerNorm,
    up: Linear,
    down: Linear,
    ffn_norm: LayerNorm,
}

impl EncoderLayer {
    fn load(vb: VarBuilder) -> Result<Self> {
        let attn = vb.pp("attention");
        let self_attn = attn.pp("self");
        Ok(Self {
            query: candle_nn::linear(HIDDEN, HIDDEN, self_attn.pp("query"))?,
            key: candle_nn::linear(HIDDEN, HIDDEN, self_attn.pp("key"))?,
            value: candle_nn::linear(HIDDEN, HIDDEN, self_attn.pp("value"))?,
            attn_out: candle_nn::linear(HIDDEN, HIDDEN, attn.pp("output").pp("dense"))?,
            attn_norm: candle_nn::layer_norm(
                HIDDEN,
                LAYER_NORM_EPS,
                attn.pp("output").pp("LayerNorm"),
            )?,
            up: candle_nn::linear(HIDDEN, INTERMEDIATE, vb.pp("intermediate").pp("dense"))?,
            down: candle_nn::linear(INTERMEDIATE, HIDDEN, vb.pp("output").pp("dense"))?,
            ffn_norm: candle_nn::layer_norm(
                HIDDEN,
                LAYER_NORM_EPS,
                vb.pp("output").pp("LayerNorm"),
            )?,
        })
    }

    fn split_heads(&self, x: &Tensor, batch: usize, seq: usize) -> Result<Tensor> {
        Ok(x.reshape((batch, seq, HEADS, HEAD_DIM))?
            .transpose(1, 2)?
            .contiguous()?)
    }

    /// `mask_bias` is `(batch, 1, 1, seq)`: 0 for real tokens, large negative for padding.
    fn forward(&self, x: &Tensor, mask_bias: &Tensor) -> Result<Tensor> {
        let (batch, seq, _) = x.dims3()?;

        let q = self.split_heads(&self.query.forward(x)?, batch, seq)?;
        let k = self.split_heads(&self.key.forward(x)?, batch, seq)?;
        let v = self.split_heads(&self.value.forward(x)?, batch, seq)?;

        let scores = q
            .matmul(&k.t()?.contiguous()?)?
            .affine(1.0 / (HEAD_DIM as f64).sqrt(), 0.0)?
            .broadcast_add(mask_bias)?;
        let weights = candle_nn::ops::softmax_last_dim(&scores)?;
        let context = weights
            .matmul(&v)?
            .transpose(1, 2)?
            .contiguous()?
            .reshape((batch, seq, HIDDEN))?;

        let x = self.attn_norm.forward(&(x + self.attn_out.forward(&context)?)?)?;
        let h = self.down.forward(&self.up.forward(&x)?.gelu_erf()?)?;
        Ok(self.ffn_norm.forward(&(x + h)?)?)
    }
}

struct MiniLm {
    words: Embedding,
    positions: Embedding,
    token_types: Embedding,
    embedding_norm: LayerNorm,
    layers: Vec<EncoderLayer>,
    device: Device,
}

impl MiniLm {
    fn load(path: &Path, device: Device) -> Result<Self> {
        // SAFETY: the weights file is mapped read-only and not modified while loaded.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[path], DType::F32, &device)? };
        let emb = vb.pp("embeddings");

        let layers = (0..LAYERS)
            .map(|i| EncoderLayer::load(vb.pp("encoder").pp("layer").pp(i.to_string())))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            words: candle_nn::embedding(VOCAB, HIDDEN, emb.pp("word_embeddings"))?,
            positions: candle_nn::embedding(MAX_POSITIONS, HIDDEN, emb.pp("position_embeddings"))?,
            token_types: candle_nn::embedding(TYPE_VOCAB, HIDDEN, emb.pp("token_type_embeddings"))?,
            embedding_norm: candle_nn::layer_norm(HIDDEN, LAYER_NORM_EPS, emb.pp("LayerNorm"))?,
            layers,
            device,
        })
    }

    /// Runs a padded batch and returns one mean-pooled row per sequence.
    fn forward(&self, ids: Vec<u32>, mask: Vec<f32>, batch: usize, seq: usize) -> Result<Tensor> {
        let ids = Tensor::from_vec(ids, (batch, seq), &self.device)?;
        let mask = Tensor::from_vec(mask, (batch, seq), &self.device)?;
        let positions = Tensor::arange(0u32, seq as u32, &self.device)?;
        let types = ids.zeros_like()?;

        let mut hidden = self
            .words
            .forward(&ids)?
            .broadcast_add(&self.positions.forward(&positions)?)?
            .add(&self.token_types.forward(&types)?)?;
        hidden = self.embedding_norm.forward(&hidden)?;

        let mask_bias = mask
            .affine(1.0, -1.0)?
            .affine(10_000.0, 0.0)?
            .reshape((batch, 1, 1, seq))?;
        for layer in &self.layers {
            hidden = layer.forward(&hidden, &mask_bias)?;
        }

        // Mean over real tokens only.
        let mask = mask.unsqueeze(2)?;
        let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
        let counts = mask.sum(1)?.maximum(1.0)?;
        Ok(summed.broadcast_div(&counts)?)
    }
}

/// Sentence embeddings from a local all-MiniLM-L6-v2 safetensors checkpoint.
pub struct MiniLmEmbeddingProvider {
    model: MiniLm,
    tokenizer: Tokenizer,
}

impl MiniLmEmbeddingProvider {
    pub fn load(model_path: &Path, tokenizer_path: &Path) -> Result<Self> {
        let model = MiniLm::load(model_path, Device::Cpu)?;

        let mut tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| anyhow!("load tokenizer {}: {e}", tokenizer_path.display()))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_POSITIONS,
                ..Default::default()
            }))
            .map_err(|e| anyhow!("configure truncation: {e}"))?;

        Ok(Self { model, tokenizer })
    }

    fn run(&self, texts: &[&str], normalize: bool) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow!("tokenize: {e}"))?;
        let seq = encodings.iter().map(|e| e.get_ids().len()).max().unwrap_or(0);
        if seq == 0 {
            bail!("tokenizer produced no tokens");
        }

        let batch = encodings.len();
        let mut ids = Vec::with_capacity(batch * seq);
        let mut mask = Vec::with_capacity(batch * seq);
        for encoding in &encodings {
            let len = encoding.get_ids().len();
            ids.extend_from_slice(encoding.get_ids());
            ids.extend(std::iter::repeat(PAD_ID).take(seq - len));
            mask.extend(encoding.get_attention_mask().iter().map(|m| *m as f32));
            mask.extend(std::iter::repeat(0.0f32).take(seq - len));
        }

        let mut pooled = self.model.forward(ids, mask, batch, seq)?;
        if normalize {
            let norms = pooled.sqr()?.sum_keepdim(D::Minus1)?.sqrt()?.maximum(1e-12)?;
            pooled = pooled.broadcast_div(&norms)?;
        }
        Ok(pooled.to_vec2::<f32>()?)
    }
}

impl EmbeddingProvider for MiniLmEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.run(&[text], true)?
            .pop()
            .ok_or_else(|| anyhow!("empty embedding batch"))
    }

    fn model_id(&self) -> &str {
        DEFAULT_MODEL_ID
    }

    fn encode(&self, texts: &[&str], normalize: bool) -> Result<Vec<Vec<f32>>> {
        self.run(texts, normalize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn model_files() -> Option<(PathBuf, PathBuf)> {
        let base = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../models");
        let model = base.join("all-MiniLM-L6-v2.safetensors");
        let tokenizer = base.join("all-MiniLM-L6-v2-tokenizer.json");
        if model.exists() && tokenizer.exists() {
            Some((model, tokenizer))
        } else {
            eprintln!("Skipping: all-MiniLM-L6-v2 model or tokenizer not found");
            None
        }
    }

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn embeds_to_unit_vectors_of_model_dimension() {
        let Some((model, tokenizer)) = model_files() else {
            return;
        };
        let provider = MiniLmEmbeddingProvider::load(&model, &tokenizer).unwrap();
        let embedding = provider.embed("How do I reset my password?").unwrap();

        assert_eq!(embedding.len(), DEFAULT_EMBEDDING_DIM);
        let norm = dot(&embedding, &embedding).sqrt();
        assert!((norm - 1.0).abs() < 0.01, "L2 norm should be ~1.0, got {norm}");
    }

    #[test]
    fn padded_batch_matches_single_encoding() {
        let Some((model, tokenizer)) = model_files() else {
            return;
        };
        let provider = MiniLmEmbeddingProvider::load(&model, &tokenizer).unwrap();

        let short = "refund";
        let long = "I forgot my password, how can I sign in to my account again?";
        let batch = provider.encode(&[short, long], true).unwrap();
        let single = provider.embed(short).unwrap();

        assert!(dot(&batch[0], &single) > 0.999);
    }

    #[test]
    fn related_questions_score_higher_than_unrelated() {
        let Some((model, tokenizer)) = model_files() else {
            return;
        };
        let provider = MiniLmEmbeddingProvider::load(&model, &tokenizer).unwrap();
        let rows = provider
            .encode(
                &[
                    "how to reset my password",
                    "I forgot my password, how can I sign in again?",
                    "What is the weather like in Tokyo?",
                ],
                true,
            )
            .unwrap();

        let related = dot(&rows[0], &rows[1]);
        let unrelated = dot(&rows[0], &rows[2]);
        assert!(related > unrelated);
        assert!(related > 0.4, "related questions should clear the threshold");
    }
}
