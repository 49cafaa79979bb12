use crate::error::{AnalysisError, Result};
use crate::policy::{certainty_score, MatchPolicy};
use crate::types::{MatchOutcome, MatchResult, RankedMatch};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use trace_catalog::ChangeUnit;
use trace_vector_store::{
    embed_with_timeout, CorpusFingerprint, EmbeddingProvider, RequirementIndex, VectorStoreError,
};

const DEFAULT_EMBED_TIMEOUT: Duration = Duration::from_secs(30);

/// Ranks catalog requirements against change descriptions.
///
/// Every change is matched in isolation: an embedding or index failure turns
/// into an empty result for that change and never aborts the batch.
#[derive(Clone)]
pub struct ChangeMatcher {
    index: Arc<RequirementIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    policy: MatchPolicy,
    embed_timeout: Duration,
    max_concurrency: usize,
    expected_corpus: Option<CorpusFingerprint>,
}

impl ChangeMatcher {
    pub fn new(
        index: Arc<RequirementIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        policy: MatchPolicy,
    ) -> Result<Self> {
        policy.validate().map_err(AnalysisError::InvalidPolicy)?;
        Ok(Self {
            index,
            embedder,
            policy,
            embed_timeout: DEFAULT_EMBED_TIMEOUT,
            max_concurrency: 1,
            expected_corpus: None,
        })
    }

    #[must_use]
    pub const fn with_embed_timeout(mut self, timeout: Duration) -> Self {
        self.embed_timeout = timeout;
        self
    }

    /// Match up to `limit` changes at once (1 = sequential).
    #[must_use]
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = limit.max(1);
        self
    }

    /// Only accept answers from the index while it holds `fingerprint`.
    #[must_use]
    pub fn expecting_corpus(mut self, fingerprint: CorpusFingerprint) -> Self {
        self.expected_corpus = Some(fingerprint);
        self
    }

    #[must_use]
    pub const fn policy(&self) -> &MatchPolicy {
        &self.policy
    }

    pub async fn match_change(&self, change: &ChangeUnit) -> MatchResult {
        let vector = match embed_with_timeout(
            self.embedder.as_ref(),
            &change.description,
            self.embed_timeout,
        )
        .await
        {
            Ok(vector) => vector,
            Err(err) => {
                log::warn!(
                    "Embedding failed for change '{}': {err}",
                    change.description
                );
                return unmatched(
                    change,
                    MatchOutcome::EmbeddingFailed {
                        reason: err.to_string(),
                    },
                );
            }
        };

        let queried = match &self.expected_corpus {
            Some(expected) => {
                self.index
                    .query_corpus(expected, &vector, self.policy.max_candidates)
            }
            None => self.index.query(&vector, self.policy.max_candidates),
        };
        let candidates = match queried {
            Ok(candidates) => candidates,
            Err(VectorStoreError::StaleCorpus { expected, active }) => {
                log::warn!(
                    "Index moved to corpus {active} while matching '{}' against {expected}",
                    change.description
                );
                return unmatched(change, MatchOutcome::StaleCorpus);
            }
            Err(err) => {
                log::warn!("Index query failed for '{}': {err}", change.description);
                return unmatched(
                    change,
                    MatchOutcome::IndexUnavailable {
                        reason: err.to_string(),
                    },
                );
            }
        };

        let nearest = candidates.first().map(|c| c.distance);
        let selected = self.policy.select(candidates);
        if selected.is_empty() {
            log::debug!(
                "No requirement under {:.2} for '{}' (nearest: {nearest:?})",
                self.policy.acceptance_threshold,
                change.description
            );
            return unmatched(change, MatchOutcome::NoQualifyingMatch);
        }

        let ranked_matches = selected
            .into_iter()
            .map(|candidate| RankedMatch {
                certainty_score: certainty_score(candidate.distance),
                requirement_id: candidate.id,
                requirement_text: candidate.text,
                distance: candidate.distance,
            })
            .collect::<Vec<_>>();
        log::debug!(
            "Matched '{}' to {} requirements",
            change.description,
            ranked_matches.len()
        );

        MatchResult {
            change_description: change.description.clone(),
            declared_requirement_id: change.declared_requirement_id.clone(),
            ranked_matches,
            outcome: MatchOutcome::Matched,
        }
    }

    /// Match every change, preserving input order.
    pub async fn match_all(&self, changes: &[ChangeUnit]) -> Vec<MatchResult> {
        if self.max_concurrency <= 1 || changes.len() <= 1 {
            let mut results = Vec::with_capacity(changes.len());
            for change in changes {
                results.push(self.match_change(change).await);
            }
            return results;
        }

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();
        for (pos, change) in changes.iter().cloned().enumerate() {
            let matcher = self.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                (pos, matcher.match_change(&change).await)
            });
        }

        let mut slots: Vec<Option<MatchResult>> = (0..changes.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((pos, result)) => slots[pos] = Some(result),
                Err(err) => log::warn!("Match task failed: {err}"),
            }
        }

        slots
            .into_iter()
            .zip(changes)
            .map(|(slot, change)| {
                slot.unwrap_or_else(|| {
                    unmatched(
                        change,
                        MatchOutcome::IndexUnavailable {
                            reason: "match task aborted".to_string(),
                        },
                    )
                })
            })
            .collect()
    }
}

fn unmatched(change: &ChangeUnit, outcome: MatchOutcome) -> MatchResult {
    MatchResult {
        change_description: change.description.clone(),
        declared_requirement_id: change.declared_requirement_id.clone(),
        ranked_matches: Vec::new(),
        outcome,
    }
}
