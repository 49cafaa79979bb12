//! # Trace Catalog
//!
//! Turns the two raw text inputs of an impact analysis into typed records:
//!
//! - the **trace matrix** (one paragraph per line) becomes a list of [`Requirement`]s
//! - the **operational-testing block** becomes a list of [`ChangeUnit`]s
//!
//! ## Architecture
//!
//! ```text
//! Trace matrix paragraphs
//!     │
//!     ├──> Identifier detection (BR / FR / UR-REG / FS-REG + dotted number)
//!     │      └─> canonical RequirementId
//!     │
//!     └──> Record accumulation
//!            ├─> description lines (space-joined)
//!            └─> test-script references (metadata only)
//!
//! Operational text
//!     │
//!     ├──> Section extraction (between two anchor phrases)
//!     │
//!     └──> Two-state line scanner
//!            SeekingTitle ──"Title:"──> SeekingIdentifier ──"BR 4.2"──> emit
//! ```
//!
//! ## Example
//!
//! ```rust
//! use trace_catalog::{ChangeSegmenter, RequirementParser};
//!
//! let parser = RequirementParser::default();
//! let records = parser.parse_paragraphs([
//!     "BR 1.4",
//!     "System shall log all login attempts.",
//!     "Test Script 12",
//! ]);
//! assert_eq!(records[0].id.to_string(), "BR 1.4");
//! assert_eq!(records[0].text, "System shall log all login attempts.");
//!
//! let changes = ChangeSegmenter::default().segment("Add new login retry limit:\nBR 4.2\n");
//! assert_eq!(changes[0].description, "Add new login retry limit");
//! ```

mod changes;
mod config;
mod error;
mod parser;
mod requirement_id;
mod section;
mod types;

pub use changes::ChangeSegmenter;
pub use config::{ParserConfig, SectionAnchors, DEFAULT_PREFIXES, DEFAULT_TEST_SCRIPT_MARKER};
pub use error::{CatalogError, Result};
pub use parser::RequirementParser;
pub use requirement_id::{IdMatcher, RequirementId};
pub use section::extract_section;
pub use types::{ChangeUnit, Requirement};
