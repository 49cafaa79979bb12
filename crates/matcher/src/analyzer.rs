use crate::error::{AnalysisError, Result};
use crate::matcher::ChangeMatcher;
use crate::policy::MatchPolicy;
use crate::types::{MatchOutcome, MatchResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use trace_catalog::{
    extract_section, ChangeSegmenter, ChangeUnit, ParserConfig, Requirement, RequirementParser,
    SectionAnchors,
};
use trace_vector_store::{
    BuildOutcome, CorpusFingerprint, EmbeddingProvider, RequirementIndex, VectorStoreError,
};

/// Everything an [`ImpactAnalyzer`] can be tuned with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerSettings {
    pub parser: ParserConfig,
    pub section: SectionAnchors,
    pub matching: MatchPolicy,

    /// Budget for one change-description embedding call
    pub embed_timeout_ms: u64,

    /// Changes matched at once
    pub max_concurrency: usize,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            parser: ParserConfig::default(),
            section: SectionAnchors::default(),
            matching: MatchPolicy::default(),
            embed_timeout_ms: 30_000,
            max_concurrency: 1,
        }
    }
}

impl AnalyzerSettings {
    pub fn validate(&self) -> std::result::Result<(), String> {
        self.parser.validate()?;
        self.section.validate()?;
        self.matching.validate()?;
        if self.embed_timeout_ms == 0 {
            return Err("embed_timeout_ms must be > 0".to_string());
        }
        if self.max_concurrency == 0 {
            return Err("max_concurrency must be > 0".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "notice", rename_all = "snake_case")]
pub enum AnalysisNotice {
    /// The change block held no title/identifier pairs
    NoChangesFound,
    /// Some requirements could not be embedded and are missing from the index
    RequirementsSkipped { count: usize },
    /// The index changed corpus mid-analysis and was rebuilt
    IndexRebuilt { retried: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub corpus: CorpusFingerprint,
    pub requirements: usize,
    pub index: BuildOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub corpus: CorpusFingerprint,
    pub requirements: usize,
    pub index: BuildOutcome,
    pub results: Vec<MatchResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notices: Vec<AnalysisNotice>,
}

impl AnalysisReport {
    #[must_use]
    pub fn matched(&self) -> usize {
        self.results.iter().filter(|r| r.is_matched()).count()
    }
}

struct PreparedCorpus {
    requirements: Vec<Requirement>,
    fingerprint: CorpusFingerprint,
    outcome: BuildOutcome,
}

/// End-to-end pipeline: trace matrix in, per-change ranked requirements out.
pub struct ImpactAnalyzer {
    parser: RequirementParser,
    corpus_scope: String,
    segmenter: ChangeSegmenter,
    anchors: SectionAnchors,
    index: Arc<RequirementIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    policy: MatchPolicy,
    embed_timeout: Duration,
    max_concurrency: usize,
}

impl ImpactAnalyzer {
    pub fn new(
        index: Arc<RequirementIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        settings: AnalyzerSettings,
    ) -> Result<Self> {
        settings.validate().map_err(AnalysisError::InvalidSettings)?;

        let segmenter = ChangeSegmenter::new(&settings.parser)?;
        let corpus_scope = settings.parser.corpus_scope();
        let parser = RequirementParser::new(settings.parser)?;

        Ok(Self {
            parser,
            corpus_scope,
            segmenter,
            anchors: settings.section,
            index,
            embedder,
            policy: settings.matching,
            embed_timeout: Duration::from_millis(settings.embed_timeout_ms),
            max_concurrency: settings.max_concurrency,
        })
    }

    #[must_use]
    pub fn index(&self) -> &Arc<RequirementIndex> {
        &self.index
    }

    /// Parse the trace matrix and make sure the index holds it.
    pub async fn ingest<I, S>(&self, catalog_paragraphs: I) -> Result<IngestReport>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let prepared = self.prepare_corpus(catalog_paragraphs).await?;
        Ok(IngestReport {
            corpus: prepared.fingerprint,
            requirements: prepared.requirements.len(),
            index: prepared.outcome,
        })
    }

    /// Corpus identity of a trace matrix under this analyzer's parser settings.
    pub fn fingerprint<I, S>(&self, catalog_paragraphs: I) -> CorpusFingerprint
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        CorpusFingerprint::scoped(&self.corpus_scope, catalog_paragraphs)
    }

    /// Cut the operational-testing block out of a full document.
    pub fn extract_changes<'a>(&self, document: &'a str) -> Result<&'a str> {
        extract_section(document, &self.anchors).ok_or_else(|| AnalysisError::SectionNotFound {
            start: self.anchors.start.clone(),
            end: self.anchors.end.clone(),
        })
    }

    pub fn segment(&self, operational_text: &str) -> Vec<ChangeUnit> {
        self.segmenter.segment(operational_text)
    }

    /// Like [`analyze`](Self::analyze), taking the change block from a full document.
    pub async fn analyze_document<I, S>(
        &self,
        catalog_paragraphs: I,
        document: &str,
    ) -> Result<AnalysisReport>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if document.trim().is_empty() {
            return Err(AnalysisError::MissingChangeBlock);
        }
        let operational_text = self.extract_changes(document)?;
        self.analyze(catalog_paragraphs, operational_text).await
    }

    /// Index the trace matrix, then rank requirements for every change in
    /// `operational_text`. Results follow change order.
    pub async fn analyze<I, S>(
        &self,
        catalog_paragraphs: I,
        operational_text: &str,
    ) -> Result<AnalysisReport>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if operational_text.trim().is_empty() {
            return Err(AnalysisError::MissingChangeBlock);
        }
        let prepared = self.prepare_corpus(catalog_paragraphs).await?;

        let mut notices = Vec::new();
        if prepared.outcome.skipped() > 0 {
            notices.push(AnalysisNotice::RequirementsSkipped {
                count: prepared.outcome.skipped(),
            });
        }

        let changes = self.segment(operational_text);
        if changes.is_empty() {
            log::info!("No changes found in the operational-testing block");
            notices.push(AnalysisNotice::NoChangesFound);
            return Ok(AnalysisReport {
                corpus: prepared.fingerprint,
                requirements: prepared.requirements.len(),
                index: prepared.outcome,
                results: Vec::new(),
                notices,
            });
        }

        let matcher = ChangeMatcher::new(self.index.clone(), self.embedder.clone(), self.policy)?
            .with_embed_timeout(self.embed_timeout)
            .with_max_concurrency(self.max_concurrency)
            .expecting_corpus(prepared.fingerprint.clone());

        let mut results = matcher.match_all(&changes).await;

        let stale: Vec<usize> = results
            .iter()
            .enumerate()
            .filter(|(_, r)| r.outcome == MatchOutcome::StaleCorpus)
            .map(|(pos, _)| pos)
            .collect();
        if !stale.is_empty() {
            log::warn!(
                "{} changes hit a foreign corpus; rebuilding index for {}",
                stale.len(),
                prepared.fingerprint.short()
            );
            self.build_index(&prepared.requirements, &prepared.fingerprint)
                .await?;
            for &pos in &stale {
                results[pos] = matcher.match_change(&changes[pos]).await;
            }
            notices.push(AnalysisNotice::IndexRebuilt {
                retried: stale.len(),
            });
        }

        let report = AnalysisReport {
            corpus: prepared.fingerprint,
            requirements: prepared.requirements.len(),
            index: prepared.outcome,
            results,
            notices,
        };
        log::info!(
            "Analyzed {} changes against {} requirements: {} matched",
            report.results.len(),
            report.requirements,
            report.matched()
        );
        Ok(report)
    }

    async fn prepare_corpus<I, S>(&self, catalog_paragraphs: I) -> Result<PreparedCorpus>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let paragraphs: Vec<S> = catalog_paragraphs.into_iter().collect();
        if paragraphs.iter().all(|p| p.as_ref().trim().is_empty()) {
            return Err(AnalysisError::MissingCatalog);
        }

        let requirements = self.parser.parse_paragraphs(&paragraphs);
        if requirements.is_empty() {
            return Err(AnalysisError::ParseEmptyResult);
        }
        let fingerprint = self.fingerprint(&paragraphs);
        log::info!(
            "Parsed {} requirements (corpus {})",
            requirements.len(),
            fingerprint.short()
        );

        let outcome = self.build_index(&requirements, &fingerprint).await?;
        Ok(PreparedCorpus {
            requirements,
            fingerprint,
            outcome,
        })
    }

    async fn build_index(
        &self,
        requirements: &[Requirement],
        fingerprint: &CorpusFingerprint,
    ) -> Result<BuildOutcome> {
        self.index
            .build(self.embedder.as_ref(), requirements, fingerprint)
            .await
            .map_err(|err| match err {
                VectorStoreError::EmbeddingError(reason) => AnalysisError::IndexUnavailable(reason),
                other => AnalysisError::Store(other),
            })
    }
}
