//! # Trace Matcher
//!
//! Change-impact analysis over a trace matrix: for every proposed change,
//! the requirements it most likely touches, each with a certainty score.
//!
//! ## Architecture
//!
//! ```text
//! ImpactAnalyzer
//!     │
//!     ├──> RequirementParser ──> Vec<Requirement> + CorpusFingerprint
//!     │        └─> RequirementIndex::build (no-op for a known corpus)
//!     │
//!     ├──> ChangeSegmenter ──> Vec<ChangeUnit>
//!     │
//!     └──> ChangeMatcher (per change, failures isolated)
//!            embed ─> query 10 ─> keep d < 0.4 ─> top 5 ─> certainty
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use trace_matcher::{render_text, AnalyzerSettings, ImpactAnalyzer};
//! use trace_vector_store::{HnswParams, RequirementIndex, StubEmbedder};
//!
//! # async fn example() -> trace_matcher::Result<()> {
//! let index = Arc::new(RequirementIndex::new("trace-matrix", HnswParams::default())?);
//! let analyzer = ImpactAnalyzer::new(
//!     index,
//!     Arc::new(StubEmbedder::new(256)),
//!     AnalyzerSettings::default(),
//! )?;
//!
//! let catalog = ["BR 1.5", "System shall lock account after 5 failed attempts."];
//! let report = analyzer
//!     .analyze(catalog, "Add new login retry limit:\nBR 4.2\n")
//!     .await?;
//! print!("{}", render_text(&report.results));
//! # Ok(())
//! # }
//! ```

mod analyzer;
mod error;
mod matcher;
mod policy;
mod report;
mod types;

pub use analyzer::{AnalysisNotice, AnalysisReport, AnalyzerSettings, ImpactAnalyzer, IngestReport};
pub use error::{AnalysisError, Result};
pub use matcher::ChangeMatcher;
pub use policy::{certainty_score, MatchPolicy};
pub use report::{render_json, render_text};
pub use types::{MatchOutcome, MatchResult, RankedMatch};
