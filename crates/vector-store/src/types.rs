use serde::{Deserialize, Serialize};
use trace_catalog::{Requirement, RequirementId};

/// A requirement together with its embedding, as held by the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementRecord {
    pub id: RequirementId,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub test_scripts: Vec<String>,
    pub embedding: Vec<f32>,
}

impl RequirementRecord {
    pub fn new(requirement: Requirement, embedding: Vec<f32>) -> Self {
        Self {
            id: requirement.id,
            text: requirement.text,
            test_scripts: requirement.test_scripts,
            embedding,
        }
    }
}

/// One nearest-neighbour hit, smaller distance is closer.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: RequirementId,
    pub text: String,
    /// Cosine distance in `[0, 2]`
    pub distance: f32,
}

/// What `build` did with the corpus it was given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BuildOutcome {
    /// Active snapshot already holds this corpus
    Reused { indexed: usize },
    /// A fresh snapshot replaced the active one
    Rebuilt { indexed: usize, skipped: usize },
}

impl BuildOutcome {
    #[must_use]
    pub const fn indexed(&self) -> usize {
        match self {
            Self::Reused { indexed } | Self::Rebuilt { indexed, .. } => *indexed,
        }
    }

    #[must_use]
    pub const fn skipped(&self) -> usize {
        match self {
            Self::Reused { .. } => 0,
            Self::Rebuilt { skipped, .. } => *skipped,
        }
    }
}
