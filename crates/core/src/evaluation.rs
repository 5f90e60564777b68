//! Batch scoring of the question-answering pipeline against labelled pairs.
//!
//! Each item is retrieved with a fixed `top_k` of 5, answered, and compared to
//! the expected answer by exact match after trimming. Groundedness only asks
//! whether the expected answer appears verbatim in any retrieved chunk, so an
//! item can be grounded without being answered correctly.

use crate::answer::RagService;
use crate::embeddings::Embedder;
use crate::error::EvaluationError;
use crate::generation::Generator;
use crate::models::{EvalItem, EvalRecord, EvalReport, Relevance};
use crate::traits::VectorIndex;
use tracing::info;

pub const EVAL_TOP_K: usize = 5;

/// Runs every item in order. The first retrieval or generation failure stops
/// the run; no item is scored as wrong because a collaborator failed.
pub async fn evaluate<E, V, G>(
    service: &RagService<E, V, G>,
    items: &[EvalItem],
) -> Result<EvalReport, EvaluationError>
where
    E: Embedder,
    V: VectorIndex,
    G: Generator,
{
    let mut results = Vec::with_capacity(items.len());

    for (index, item) in items.iter().enumerate() {
        let expected = item.expected_answer.trim().to_string();
        let contexts = service
            .retrieve(&item.query, EVAL_TOP_K)
            .await
            .map_err(|source| EvaluationError::Retrieval { index, source })?
            .texts();
        let answer = service
            .generate(&item.query, &contexts)
            .await
            .map_err(|source| EvaluationError::Generation { index, source })?
            .into_answer()
            .trim()
            .to_string();

        let correct = answer == expected;
        let grounded = is_grounded(&expected, &contexts);

        results.push(EvalRecord {
            query: item.query.clone(),
            expected,
            answer,
            correct,
            grounded,
            relevance: if grounded {
                Relevance::High
            } else {
                Relevance::Low
            },
            contexts,
        });
    }

    let report = EvalReport {
        accuracy: accuracy(&results),
        results,
    };
    info!(
        items = report.results.len(),
        accuracy = report.accuracy,
        "evaluation finished"
    );
    Ok(report)
}

pub fn is_grounded(expected: &str, contexts: &[String]) -> bool {
    contexts.iter().any(|context| context.contains(expected))
}

pub fn accuracy(results: &[EvalRecord]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    let correct = results.iter().filter(|record| record.correct).count();
    correct as f64 / results.len() as f64
}
