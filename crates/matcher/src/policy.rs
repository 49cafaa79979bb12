use serde::{Deserialize, Serialize};
use trace_vector_store::Candidate;

/// Distance threshold and ranking rules applied to raw index candidates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchPolicy {
    /// Candidates fetched from the index before filtering
    pub max_candidates: usize,

    /// Candidates at or beyond this cosine distance are discarded
    pub acceptance_threshold: f32,

    /// Maximum matches reported per change
    pub top_k: usize,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            max_candidates: 10,
            acceptance_threshold: 0.4,
            top_k: 5,
        }
    }
}

impl MatchPolicy {
    pub fn validate(&self) -> Result<(), String> {
        if self.top_k == 0 {
            return Err("matching.top_k must be > 0".to_string());
        }
        if self.max_candidates < self.top_k {
            return Err(format!(
                "matching.max_candidates ({}) cannot be smaller than matching.top_k ({})",
                self.max_candidates, self.top_k
            ));
        }
        if !(self.acceptance_threshold > 0.0 && self.acceptance_threshold <= 2.0) {
            return Err(format!(
                "matching.acceptance_threshold must be in (0, 2] (got {})",
                self.acceptance_threshold
            ));
        }
        Ok(())
    }

    /// Keep candidates strictly under the threshold, closest first, at most `top_k`.
    #[must_use]
    pub fn select(&self, mut candidates: Vec<Candidate>) -> Vec<Candidate> {
        candidates.retain(|c| c.distance.is_finite() && c.distance < self.acceptance_threshold);
        candidates.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        candidates.truncate(self.top_k);
        candidates
    }
}

/// Maps cosine distance to a 0–100 score: 0 → 100, 0.4 → 60.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn certainty_score(distance: f32) -> u8 {
    (100.0 * (1.0 - distance)).round().clamp(0.0, 100.0) as u8
}
