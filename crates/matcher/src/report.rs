use crate::analyzer::AnalysisReport;
use crate::types::MatchResult;

const INDENT: &str = "    ";

/// Plain-text report, one block per change separated by a blank line.
#[must_use]
pub fn render_text(results: &[MatchResult]) -> String {
    let mut out = String::new();
    for (pos, result) in results.iter().enumerate() {
        if pos > 0 {
            out.push('\n');
        }
        render_block(&mut out, result);
    }
    out
}

fn render_block(out: &mut String, result: &MatchResult) {
    let chosen = result
        .declared_requirement_id
        .as_ref()
        .map_or_else(|| "None".to_string(), ToString::to_string);

    out.push_str(&format!("Change Description: {}\n", result.change_description));
    out.push_str(&format!("Chosen Requirement: {chosen}\n"));
    out.push_str("AI Chosen Impacted Requirements:\n");
    if result.ranked_matches.is_empty() {
        out.push_str(&format!("{INDENT}No qualifying requirements found.\n"));
        return;
    }
    for ranked in &result.ranked_matches {
        out.push_str(&format!(
            "{INDENT}{} \u{2014} {} - Certainty Score: {}\n",
            ranked.requirement_id, ranked.requirement_text, ranked.certainty_score
        ));
    }
}

pub fn render_json(report: &AnalysisReport) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}
