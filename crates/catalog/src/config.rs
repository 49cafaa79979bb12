use serde::{Deserialize, Serialize};

/// Requirement id prefixes recognised in the trace matrix.
pub const DEFAULT_PREFIXES: &[&str] = &["BR", "FR", "UR-REG", "FS-REG"];

/// Paragraphs starting with this marker (case-insensitive) are test-script references.
pub const DEFAULT_TEST_SCRIPT_MARKER: &str = "test script";

const DEFAULT_SECTION_START: &str =
    "performed to validate the following Medium and low risk functional requirements:";
const DEFAULT_SECTION_END: &str = "Purpose and Scope";

/// Configuration for requirement parsing and change segmentation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Closed set of identifier prefixes (case-sensitive)
    pub prefixes: Vec<String>,

    /// Marker that flags a paragraph as a test-script reference
    pub test_script_marker: String,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            prefixes: DEFAULT_PREFIXES.iter().map(ToString::to_string).collect(),
            test_script_marker: DEFAULT_TEST_SCRIPT_MARKER.to_string(),
        }
    }
}

impl ParserConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.prefixes.is_empty() {
            return Err("prefixes must not be empty".to_string());
        }

        for prefix in &self.prefixes {
            if prefix.trim().is_empty() {
                return Err("prefixes must not contain blank entries".to_string());
            }
            if prefix.chars().any(char::is_whitespace) {
                return Err(format!("prefix '{prefix}' must not contain whitespace"));
            }
            if prefix.ends_with('-') {
                return Err(format!("prefix '{prefix}' must not end with '-'"));
            }
        }

        if self.test_script_marker.trim().is_empty() {
            return Err("test_script_marker must not be empty".to_string());
        }

        Ok(())
    }

    /// Canonical text of every setting that changes which records a catalog
    /// parses into. Two configs with equal scopes parse any catalog alike.
    #[must_use]
    pub fn corpus_scope(&self) -> String {
        format!(
            "prefixes={};test_script_marker={}",
            self.prefixes.join(","),
            self.test_script_marker.to_lowercase()
        )
    }
}

/// Anchor phrases that bracket the operational-testing section of a test plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SectionAnchors {
    pub start: String,
    pub end: String,
}

impl Default for SectionAnchors {
    fn default() -> Self {
        Self {
            start: DEFAULT_SECTION_START.to_string(),
            end: DEFAULT_SECTION_END.to_string(),
        }
    }
}

impl SectionAnchors {
    pub fn validate(&self) -> Result<(), String> {
        if self.start.is_empty() || self.end.is_empty() {
            return Err("section anchors must not be empty".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        assert!(ParserConfig::default().validate().is_ok());
        assert!(SectionAnchors::default().validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = ParserConfig::default();

        config.prefixes.clear();
        assert!(config.validate().is_err());

        config.prefixes = vec!["BR".to_string(), "UR REG".to_string()];
        assert!(config.validate().is_err());

        config.prefixes = vec!["UR-".to_string()];
        assert!(config.validate().is_err());

        config.prefixes = vec!["SR".to_string()];
        config.test_script_marker = "  ".to_string();
        assert!(config.validate().is_err());

        config.test_script_marker = "TS".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn corpus_scope_tracks_parsing_settings() {
        let base = ParserConfig::default();
        assert_eq!(
            base.corpus_scope(),
            "prefixes=BR,FR,UR-REG,FS-REG;test_script_marker=test script"
        );

        let narrower = ParserConfig {
            prefixes: vec!["BR".to_string(), "NFR".to_string()],
            ..Default::default()
        };
        assert_ne!(base.corpus_scope(), narrower.corpus_scope());

        let marker = ParserConfig {
            test_script_marker: "Test Case".to_string(),
            ..Default::default()
        };
        assert_ne!(base.corpus_scope(), marker.corpus_scope());

        let shouted = ParserConfig {
            test_script_marker: "TEST SCRIPT".to_string(),
            ..Default::default()
        };
        assert_eq!(base.corpus_scope(), shouted.corpus_scope());
    }
}
