use crate::config::ParserConfig;
use crate::error::{CatalogError, Result};
use crate::requirement_id::{IdMatcher, RequirementId};
use crate::types::Requirement;
use std::collections::HashSet;

/// Splits trace-matrix paragraphs into requirement records.
///
/// An identifier paragraph opens a record, and every following paragraph is
/// appended to it until the next identifier. Parsing never fails: paragraphs
/// before the first identifier are ignored, identifiers with no body are
/// dropped, and a repeated identifier keeps its first record.
#[derive(Debug, Clone)]
pub struct RequirementParser {
    ids: IdMatcher,
    test_script_marker: String,
}

struct OpenRecord {
    id: RequirementId,
    lines: Vec<String>,
    test_scripts: Vec<String>,
    duplicate: bool,
}

impl Default for RequirementParser {
    fn default() -> Self {
        Self::new(ParserConfig::default()).expect("default parser config is valid")
    }
}

impl RequirementParser {
    pub fn new(config: ParserConfig) -> Result<Self> {
        config.validate().map_err(CatalogError::invalid_config)?;
        Ok(Self {
            ids: IdMatcher::new(&config.prefixes)?,
            test_script_marker: config.test_script_marker.to_lowercase(),
        })
    }

    /// Parse a document whose lines are paragraphs.
    #[must_use]
    pub fn parse_text(&self, document: &str) -> Vec<Requirement> {
        self.parse_paragraphs(document.lines())
    }

    /// Parse an ordered paragraph sequence.
    #[must_use]
    pub fn parse_paragraphs<I, S>(&self, paragraphs: I) -> Vec<Requirement>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut records = Vec::new();
        let mut seen = HashSet::new();
        let mut open: Option<OpenRecord> = None;

        for paragraph in paragraphs {
            let line = paragraph.as_ref().trim();
            if line.is_empty() {
                continue;
            }

            if let Some((id, rest)) = self.ids.match_line(line) {
                if let Some(record) = open.take() {
                    close_record(record, &mut seen, &mut records);
                }
                let duplicate = seen.contains(&id);
                let mut record = OpenRecord {
                    id,
                    lines: Vec::new(),
                    test_scripts: Vec::new(),
                    duplicate,
                };
                if !rest.is_empty() {
                    self.push_body_line(&mut record, rest);
                }
                open = Some(record);
                continue;
            }

            if let Some(record) = open.as_mut() {
                self.push_body_line(record, line);
            }
        }

        if let Some(record) = open.take() {
            close_record(record, &mut seen, &mut records);
        }

        log::debug!("Parsed {} requirement records", records.len());
        records
    }

    fn push_body_line(&self, record: &mut OpenRecord, line: &str) {
        if self.is_test_script(line) {
            record.test_scripts.push(line.to_string());
        } else {
            record.lines.push(line.to_string());
        }
    }

    fn is_test_script(&self, line: &str) -> bool {
        line.to_lowercase().starts_with(&self.test_script_marker)
    }
}

fn close_record(
    record: OpenRecord,
    seen: &mut HashSet<RequirementId>,
    out: &mut Vec<Requirement>,
) {
    if record.duplicate {
        log::debug!("Ignoring repeated requirement id {}", record.id);
        return;
    }

    let text = record.lines.join(" ").trim().to_string();
    if text.is_empty() {
        log::debug!("Dropping requirement {} with empty description", record.id);
        return;
    }

    seen.insert(record.id.clone());
    out.push(Requirement {
        id: record.id,
        text,
        test_scripts: record.test_scripts,
    });
}
