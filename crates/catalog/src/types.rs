use crate::requirement_id::RequirementId;
use serde::{Deserialize, Serialize};

/// One parsed trace-matrix entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    /// Canonical identifier (unique within a corpus)
    pub id: RequirementId,

    /// Description paragraphs joined with a single space
    pub text: String,

    /// Test-script references found in the record body; never part of `text`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub test_scripts: Vec<String>,
}

impl Requirement {
    pub fn new(id: RequirementId, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            test_scripts: Vec::new(),
        }
    }
}

/// One proposed system change taken from the operational-testing block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeUnit {
    /// Change title, verbatim, without the trailing colon
    pub description: String,

    /// Requirement the change author named; not checked against the catalog
    pub declared_requirement_id: Option<RequirementId>,
}

impl ChangeUnit {
    pub fn new(description: impl Into<String>, declared: Option<RequirementId>) -> Self {
        Self {
            description: description.into(),
            declared_requirement_id: declared,
        }
    }
}
