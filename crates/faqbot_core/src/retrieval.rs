use crate::embed::EmbeddingProvider;
use crate::error::{FaqError, Result};
use crate::knowledge::KnowledgeBase;
use crate::model::{Decision, RetrievalMatch};

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let (dot, na, nb) = a
        .iter()
        .zip(b.iter())
        .fold((0.0f32, 0.0f32, 0.0f32), |(d, aa, bb), (x, y)| {
            (d + (x * y), aa + (x * x), bb + (y * y))
        });

    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na.sqrt() * nb.sqrt())
    }
}

/// Index and score of the most similar row. Ties go to the lowest index.
pub fn top_match(query_embedding: &[f32], rows: &[Vec<f32>]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, row) in rows.iter().enumerate() {
        let score = cosine_similarity(query_embedding, row);
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((idx, score)),
        }
    }
    best
}

/// Inclusive: a score equal to the threshold is accepted.
pub fn accepts(score: f32, threshold: f32) -> bool {
    score >= threshold
}

/// Picks the best answer for an already embedded query.
pub fn decide(query_embedding: &[f32], kb: &KnowledgeBase, threshold: f32) -> RetrievalMatch {
    match top_match(query_embedding, kb.embeddings()) {
        Some((idx, score)) if accepts(score, threshold) => RetrievalMatch {
            index: Some(idx),
            answer: Some(kb.pairs()[idx].answer.clone()),
            score,
            decision: Decision::Hit,
        },
        Some((idx, score)) => RetrievalMatch {
            index: Some(idx),
            answer: None,
            score,
            decision: Decision::Miss,
        },
        None => RetrievalMatch {
            index: None,
            answer: None,
            score: 0.0,
            decision: Decision::Miss,
        },
    }
}

/// Embeds `query` and looks it up in `kb`.
///
/// `embedder` must be the provider that built `kb`; a query vector of a
/// different width is rejected with [`FaqError::DimensionMismatch`]. A
/// failing embedder surfaces as [`FaqError::EmbedderUnavailable`], never as a
/// miss.
pub fn retrieve<E>(
    query: &str,
    kb: &KnowledgeBase,
    embedder: &E,
    threshold: f32,
) -> Result<RetrievalMatch>
where
    E: EmbeddingProvider + ?Sized,
{
    let query_embedding = embedder
        .encode(&[query], true)
        .map_err(FaqError::EmbedderUnavailable)?
        .pop()
        .ok_or_else(|| FaqError::EmbedderUnavailable(anyhow::anyhow!("embedder returned no rows")))?;

    if query_embedding.len() != kb.dim() {
        return Err(FaqError::DimensionMismatch {
            expected: kb.dim(),
            actual: query_embedding.len(),
        });
    }

    Ok(decide(&query_embedding, kb, threshold))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_THRESHOLD;
    use crate::embed::HashEmbeddingProvider;
    use crate::model::QaPair;

    fn kb(rows: Vec<Vec<f32>>) -> KnowledgeBase {
        let pairs = (0..rows.len())
            .map(|i| QaPair::new(format!("q{i}"), format!("answer-{i}")))
            .collect();
        KnowledgeBase::from_parts(pairs, rows, "test").unwrap()
    }

    #[test]
    fn cosine_works_for_unit_vectors() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        let c = vec![0.0, 1.0, 0.0];

        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
        assert!((cosine_similarity(&a, &c) - 0.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&a, &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn top_match_selects_best_row() {
        let rows = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let (idx, score) = top_match(&[0.9, 0.1], &rows).expect("match");

        assert_eq!(idx, 0);
        assert!(score > 0.9);
    }

    #[test]
    fn ties_go_to_first_row() {
        let rows = vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![1.0, 0.0]];
        let (idx, _) = top_match(&[1.0, 0.0], &rows).unwrap();
        assert_eq!(idx, 1);
    }

    #[test]
    fn exact_row_returns_its_answer() {
        let kb = kb(vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]]);
        let hit = decide(&[0.0, 1.0, 0.0], &kb, DEFAULT_THRESHOLD);
        assert_eq!(hit.decision, Decision::Hit);
        assert_eq!(hit.index, Some(1));
        assert_eq!(hit.into_answer().unwrap(), "answer-1");
    }

    #[test]
    fn threshold_is_inclusive() {
        // cos([1,0,0,0], [2,4,2,1]) = 2/5 exactly.
        let kb = kb(vec![vec![1.0, 0.0, 0.0, 0.0]]);
        let at = decide(&[2.0, 4.0, 2.0, 1.0], &kb, 0.4);
        assert_eq!(at.score, 0.4);
        assert_eq!(at.decision, Decision::Hit);

        // cos([1,0,0,0], [1,2,2,0]) = 1/3.
        let below = decide(&[1.0, 2.0, 2.0, 0.0], &kb, 0.4);
        assert_eq!(below.decision, Decision::Miss);
        assert_eq!(below.index, Some(0));
        let no_match = below.into_answer().unwrap_err();
        assert!(no_match.best_score < 0.4);

        assert!(accepts(0.4, 0.4));
        assert!(!accepts(0.399_999, 0.4));
    }

    #[test]
    fn retrieve_is_deterministic() {
        let embedder = HashEmbeddingProvider::new(64);
        let questions = ["how to reset my password", "where is my order"];
        let rows = embedder.encode(&questions, true).unwrap();
        let pairs = vec![
            QaPair::new(questions[0], "settings"),
            QaPair::new(questions[1], "my orders"),
        ];
        let kb = KnowledgeBase::from_parts(pairs, rows, embedder.model_id()).unwrap();

        let first = retrieve("reset password", &kb, &embedder, DEFAULT_THRESHOLD).unwrap();
        for _ in 0..5 {
            let again = retrieve("reset password", &kb, &embedder, DEFAULT_THRESHOLD).unwrap();
            assert_eq!(again, first);
        }
        assert_eq!(first.answer.as_deref(), Some("settings"));
    }

    #[test]
    fn retrieve_rejects_foreign_embedding_space() {
        let kb = kb(vec![vec![1.0, 0.0, 0.0]]);
        let err = retrieve("anything", &kb, &HashEmbeddingProvider::new(16), 0.4).unwrap_err();
        assert!(matches!(
            err,
            FaqError::DimensionMismatch {
                expected: 3,
                actual: 16
            }
        ));
    }

    struct Broken;

    impl EmbeddingProvider for Broken {
        fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            anyhow::bail!("inference backend down")
        }

        fn model_id(&self) -> &str {
            "broken"
        }
    }

    #[test]
    fn embedder_failure_is_not_a_miss() {
        let kb = kb(vec![vec![1.0, 0.0]]);
        let err = retrieve("hello", &kb, &Broken, 0.4).unwrap_err();
        assert!(matches!(err, FaqError::EmbedderUnavailable(_)));
    }
}
