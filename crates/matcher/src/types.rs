use serde::{Deserialize, Serialize};
use trace_catalog::RequirementId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedMatch {
    pub requirement_id: RequirementId,
    pub requirement_text: String,
    pub certainty_score: u8,
    pub distance: f32,
}

/// Why a result looks the way it does. Only `Matched` carries matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MatchOutcome {
    Matched,
    /// Nothing came in under the acceptance threshold
    NoQualifyingMatch,
    EmbeddingFailed { reason: String },
    IndexUnavailable { reason: String },
    /// Active index belongs to another corpus; the analyzer rebuilds and retries
    StaleCorpus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub change_description: String,
    pub declared_requirement_id: Option<RequirementId>,
    /// At most `top_k` entries, highest certainty first; never padded
    pub ranked_matches: Vec<RankedMatch>,
    pub outcome: MatchOutcome,
}

impl MatchResult {
    #[must_use]
    pub fn is_matched(&self) -> bool {
        self.outcome == MatchOutcome::Matched
    }
}
