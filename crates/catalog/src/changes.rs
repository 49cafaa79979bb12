use crate::config::ParserConfig;
use crate::error::{CatalogError, Result};
use crate::requirement_id::IdMatcher;
use crate::types::ChangeUnit;

/// Extracts `(title, declared id)` pairs from an operational-testing block.
///
/// A change is a line ending in `:` immediately followed by a line that starts
/// with a requirement id. The pair must sit on two adjacent lines; anything
/// else is skipped one line at a time.
#[derive(Debug, Clone)]
pub struct ChangeSegmenter {
    ids: IdMatcher,
}

#[derive(Debug)]
enum ScanState {
    SeekingTitle,
    SeekingIdentifier { title: String },
}

enum Step {
    /// Consume the current line.
    Advance,
    /// Re-examine the current line in the new state.
    Retry,
}

impl Default for ChangeSegmenter {
    fn default() -> Self {
        Self::new(&ParserConfig::default()).expect("default parser config is valid")
    }
}

impl ChangeSegmenter {
    pub fn new(config: &ParserConfig) -> Result<Self> {
        config.validate().map_err(CatalogError::invalid_config)?;
        Ok(Self {
            ids: IdMatcher::new(&config.prefixes)?,
        })
    }

    #[must_use]
    pub fn segment(&self, operational_text: &str) -> Vec<ChangeUnit> {
        let lines: Vec<&str> = operational_text.lines().map(str::trim).collect();
        let mut changes = Vec::new();
        let mut state = ScanState::SeekingTitle;
        let mut idx = 0;

        while idx < lines.len() {
            let (next, step) = self.step(state, lines[idx], &mut changes);
            state = next;
            if matches!(step, Step::Advance) {
                idx += 1;
            }
        }

        if let ScanState::SeekingIdentifier { title } = state {
            log::debug!("Change title '{title}' has no identifier line");
        }
        log::debug!("Segmented {} change units", changes.len());
        changes
    }

    fn step(&self, state: ScanState, line: &str, out: &mut Vec<ChangeUnit>) -> (ScanState, Step) {
        match state {
            ScanState::SeekingTitle => match title_of(line) {
                Some(title) => (
                    ScanState::SeekingIdentifier {
                        title: title.to_string(),
                    },
                    Step::Advance,
                ),
                None => (ScanState::SeekingTitle, Step::Advance),
            },
            ScanState::SeekingIdentifier { title } => {
                if let Some((id, _)) = self.ids.match_line(line) {
                    out.push(ChangeUnit::new(title, Some(id)));
                    (ScanState::SeekingTitle, Step::Advance)
                } else if self.ids.starts_with_prefix(line) {
                    out.push(ChangeUnit::new(title, None));
                    (ScanState::SeekingTitle, Step::Advance)
                } else {
                    log::debug!("Dropping change title '{title}': next line is not an identifier");
                    (ScanState::SeekingTitle, Step::Retry)
                }
            }
        }
    }
}

fn title_of(line: &str) -> Option<&str> {
    let title = line.strip_suffix(':')?.trim_end();
    (!title.is_empty()).then_some(title)
}
