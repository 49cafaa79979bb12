use crate::config::SectionAnchors;

/// Returns the trimmed text between the first `start` phrase and the next `end`
/// phrase after it, or `None` when either anchor is missing.
#[must_use]
pub fn extract_section<'a>(document: &'a str, anchors: &SectionAnchors) -> Option<&'a str> {
    let start = document.find(anchors.start.as_str())? + anchors.start.len();
    let len = document[start..].find(anchors.end.as_str())?;
    Some(document[start..start + len].trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_between_default_anchors() {
        let doc = "\
1. Introduction
Operational testing will be performed to validate the following Medium and low risk functional requirements:
Add new login retry limit:
BR 4.2

2. Purpose and Scope
The plan covers...
";
        let section = extract_section(doc, &SectionAnchors::default()).unwrap();
        assert_eq!(section, "Add new login retry limit:\nBR 4.2\n\n2.");
    }

    #[test]
    fn missing_anchor_is_not_found() {
        let anchors = SectionAnchors {
            start: "BEGIN".to_string(),
            end: "END".to_string(),
        };
        assert_eq!(extract_section("no anchors here", &anchors), None);
        assert_eq!(extract_section("BEGIN but never closed", &anchors), None);
        assert_eq!(extract_section("END before BEGIN", &anchors), None);
        assert_eq!(extract_section("BEGIN middle END", &anchors), Some("middle"));
    }
}
