//! Specification compliance engine.
//!
//! For every [`Requirement`] the engine retrieves the closest chunks of a
//! document and classifies the best similarity score against a threshold
//! `T`:
//!
//! | Best score | Status |
//! |------------|--------|
//! | `>= T` | [`ComplianceStatus::Compliant`] |
//! | `>= 0.7 × T` | [`ComplianceStatus::Partial`] |
//! | below, or no chunks at all | [`ComplianceStatus::NonCompliant`] |
//! | retrieval failed | [`ComplianceStatus::Unknown`] |
//!
//! A failing requirement, including one whose retrieval panics, becomes an
//! `Unknown` item; it never aborts the run. Requirements are checked
//! concurrently and the resulting items keep requirement order.
//!
//! Long runs can be stopped through a [`CancelSignal`]. A cancelled run
//! returns [`RagError::Cancelled`] and its partial results are dropped.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::config::ComplianceConfig;
use crate::error::{RagError, Result};
use crate::models::{preview, QueryHit};
use crate::specification::{parse_requirements, Requirement, SpecificationInput};

/// Lower bound of the partial band, as a fraction of the threshold.
pub const PARTIAL_RATIO: f32 = 0.7;

/// Source of ranked chunks for a requirement.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, document_name: &str, text: &str, top_k: usize)
        -> Result<Vec<QueryHit>>;

    fn is_indexed(&self, document_name: &str) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComplianceStatus {
    #[serde(rename = "compliant")]
    Compliant,
    #[serde(rename = "partial")]
    Partial,
    #[serde(rename = "non-compliant")]
    NonCompliant,
    #[serde(rename = "unknown")]
    Unknown,
}

impl ComplianceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplianceStatus::Compliant => "compliant",
            ComplianceStatus::Partial => "partial",
            ComplianceStatus::NonCompliant => "non-compliant",
            ComplianceStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ComplianceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub snippet: String,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceItem {
    pub requirement_id: String,
    pub requirement_text: String,
    pub expected_value: Option<String>,
    pub found_value: Option<String>,
    pub status: ComplianceStatus,
    pub evidence: Vec<Evidence>,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub document_name: String,
    pub spec_name: String,
    pub timestamp: DateTime<Utc>,
    pub total_requirements: usize,
    pub compliant_items: usize,
    pub partial_items: usize,
    pub non_compliant_items: usize,
    pub unknown_items: usize,
    pub compliance_percentage: f64,
    pub items: Vec<ComplianceItem>,
    pub summary: String,
}

/// Outcome for one document of a multi-document comparison.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum DocumentComparison {
    Completed(ComparisonResult),
    Failed { error: String },
}

impl DocumentComparison {
    pub fn result(&self) -> Option<&ComparisonResult> {
        match self {
            DocumentComparison::Completed(r) => Some(r),
            DocumentComparison::Failed { .. } => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Cancellation
// ═══════════════════════════════════════════════════════════════════════

/// Requests cancellation of the runs holding the paired [`CancelSignal`].
#[derive(Debug, Clone)]
pub struct CancelHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

/// Observed by a comparison run between requirement completions.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    receiver: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn pair() -> (CancelHandle, CancelSignal) {
        let (sender, receiver) = watch::channel(false);
        (
            CancelHandle {
                sender: Arc::new(sender),
            },
            CancelSignal { receiver },
        )
    }

    /// A signal that never fires.
    pub fn never() -> CancelSignal {
        CancelSignal::pair().1
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once cancellation is requested; pending forever if the
    /// handle is dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        if receiver.wait_for(|c| *c).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Engine
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy)]
pub struct ComplianceOptions {
    /// Chunks retrieved per requirement.
    pub top_k: usize,
    /// Hits kept as evidence per item.
    pub evidence_count: usize,
    /// Maximum characters per evidence snippet.
    pub evidence_chars: usize,
    /// Requirements (or documents) checked at the same time.
    pub concurrency: usize,
}

impl Default for ComplianceOptions {
    fn default() -> Self {
        Self {
            top_k: 5,
            evidence_count: 3,
            evidence_chars: 100,
            concurrency: 4,
        }
    }
}

impl ComplianceOptions {
    pub fn from_config(config: &ComplianceConfig) -> Self {
        Self {
            top_k: config.top_k,
            evidence_count: config.evidence_count,
            evidence_chars: config.evidence_chars,
            concurrency: config.concurrency,
        }
    }
}

pub struct ComplianceEngine {
    retriever: Arc<dyn Retriever>,
    options: ComplianceOptions,
}

impl ComplianceEngine {
    pub fn new(retriever: Arc<dyn Retriever>, options: ComplianceOptions) -> Self {
        Self { retriever, options }
    }

    pub fn options(&self) -> &ComplianceOptions {
        &self.options
    }

    pub async fn compare(
        &self,
        document_name: &str,
        specification: &SpecificationInput,
        spec_name: &str,
        threshold: f32,
        cancel: &CancelSignal,
    ) -> Result<ComparisonResult> {
        let requirements = parse_requirements(specification);
        if requirements.is_empty() {
            tracing::warn!(spec = spec_name, "no requirements found in specification");
        }
        self.compare_requirements(document_name, &requirements, spec_name, threshold, cancel)
            .await
    }

    pub async fn compare_requirements(
        &self,
        document_name: &str,
        requirements: &[Requirement],
        spec_name: &str,
        threshold: f32,
        cancel: &CancelSignal,
    ) -> Result<ComparisonResult> {
        validate_threshold(threshold)?;
        tracing::info!(
            document = document_name,
            spec = spec_name,
            requirements = requirements.len(),
            "comparing document against specification"
        );

        let checks = stream::iter(requirements.iter().cloned())
            .map(|req| async move {
                self.check_requirement(document_name, &req, threshold)
                    .await
            })
            .buffered(self.options.concurrency.max(1));
        let mut checks = std::pin::pin!(checks);

        let mut items = Vec::with_capacity(requirements.len());
        loop {
            if cancel.is_cancelled() {
                return Err(RagError::Cancelled);
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RagError::Cancelled),
                next = checks.next() => match next {
                    Some(item) => items.push(item),
                    None => break,
                },
            }
        }

        let result = aggregate(document_name, spec_name, items);
        tracing::info!(
            document = document_name,
            spec = spec_name,
            compliance = result.compliance_percentage,
            "comparison finished"
        );
        Ok(result)
    }

    /// Compare several documents against one specification. Documents run
    /// concurrently; the map keeps input order. An unindexed document gets
    /// a [`DocumentComparison::Failed`] entry.
    pub async fn compare_multiple(
        &self,
        document_names: &[String],
        specification: &SpecificationInput,
        spec_name: &str,
        threshold: f32,
        cancel: &CancelSignal,
    ) -> Result<IndexMap<String, DocumentComparison>> {
        validate_threshold(threshold)?;
        let requirements = parse_requirements(specification);

        let requirements = &requirements;
        let runs = stream::iter(document_names.iter().cloned())
            .map(|name| async move {
                if !self.retriever.is_indexed(&name) {
                    let error = format!("Document '{}' is not indexed", name);
                    return Ok((name, DocumentComparison::Failed { error }));
                }
                match self
                    .compare_requirements(&name, requirements, spec_name, threshold, cancel)
                    .await
                {
                    Ok(result) => Ok((name, DocumentComparison::Completed(result))),
                    Err(RagError::Cancelled) => Err(RagError::Cancelled),
                    Err(e) => Ok((
                        name,
                        DocumentComparison::Failed {
                            error: e.to_string(),
                        },
                    )),
                }
            })
            .buffered(self.options.concurrency.max(1));
        let mut runs = std::pin::pin!(runs);

        let mut results = IndexMap::with_capacity(document_names.len());
        while let Some(run) = runs.next().await {
            let (name, comparison) = run?;
            results.insert(name, comparison);
        }
        Ok(results)
    }

    async fn check_requirement(
        &self,
        document_name: &str,
        requirement: &Requirement,
        threshold: f32,
    ) -> ComplianceItem {
        let retrieval = AssertUnwindSafe(self.retriever.retrieve(
            document_name,
            &requirement.text,
            self.options.top_k,
        ))
        .catch_unwind()
        .await;

        let hits = match retrieval {
            Ok(Ok(hits)) => hits,
            Ok(Err(e)) => return self.unknown_item(requirement, &e.to_string()),
            Err(panic) => return self.unknown_item(requirement, &panic_message(panic)),
        };

        let Some(best) = hits.first() else {
            return ComplianceItem {
                requirement_id: requirement.id.clone(),
                requirement_text: requirement.text.clone(),
                expected_value: requirement.expected_value.clone(),
                found_value: None,
                status: ComplianceStatus::NonCompliant,
                evidence: Vec::new(),
                notes: "No matching content found".to_string(),
            };
        };

        let best_score = best.similarity_score;
        let evidence = hits
            .iter()
            .take(self.options.evidence_count)
            .map(|h| Evidence {
                snippet: preview(&h.full_content, self.options.evidence_chars),
                score: h.similarity_score,
            })
            .collect();

        ComplianceItem {
            requirement_id: requirement.id.clone(),
            requirement_text: requirement.text.clone(),
            expected_value: requirement.expected_value.clone(),
            found_value: Some(best.content_preview.clone()),
            status: classify(best_score, threshold),
            evidence,
            notes: format!(
                "Best similarity {:.2} against threshold {:.2}",
                best_score, threshold
            ),
        }
    }

    fn unknown_item(&self, requirement: &Requirement, message: &str) -> ComplianceItem {
        tracing::warn!(requirement = %requirement.id, error = message, "requirement check failed");
        ComplianceItem {
            requirement_id: requirement.id.clone(),
            requirement_text: requirement.text.clone(),
            expected_value: requirement.expected_value.clone(),
            found_value: None,
            status: ComplianceStatus::Unknown,
            evidence: Vec::new(),
            notes: format!("Error: {}", message),
        }
    }
}

/// Status for a best similarity score under threshold `threshold`.
pub fn classify(best_score: f32, threshold: f32) -> ComplianceStatus {
    if best_score >= threshold {
        ComplianceStatus::Compliant
    } else if best_score >= threshold * PARTIAL_RATIO {
        ComplianceStatus::Partial
    } else {
        ComplianceStatus::NonCompliant
    }
}

/// `(compliant + 0.5 × partial) / total × 100`, or 0 for an empty run.
pub fn compliance_percentage(compliant: usize, partial: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (compliant as f64 + 0.5 * partial as f64) / total as f64 * 100.0
}

fn validate_threshold(threshold: f32) -> Result<()> {
    if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
        return Err(RagError::unsupported(format!(
            "threshold must be between 0.0 and 1.0, got {}",
            threshold
        )));
    }
    Ok(())
}

fn aggregate(document_name: &str, spec_name: &str, items: Vec<ComplianceItem>) -> ComparisonResult {
    let count = |status: ComplianceStatus| items.iter().filter(|i| i.status == status).count();
    let total = items.len();
    let compliant = count(ComplianceStatus::Compliant);
    let partial = count(ComplianceStatus::Partial);
    let non_compliant = count(ComplianceStatus::NonCompliant);
    let unknown = count(ComplianceStatus::Unknown);
    let percentage = compliance_percentage(compliant, partial, total);

    let summary = format!(
        "Document: {document_name}\n\
         Specification: {spec_name}\n\
         Compliance: {percentage:.1}%\n\
         Compliant: {compliant}/{total} | Partial: {partial}/{total} | \
         Non-Compliant: {non_compliant}/{total} | Unknown: {unknown}/{total}"
    );

    ComparisonResult {
        document_name: document_name.to_string(),
        spec_name: spec_name.to_string(),
        timestamp: Utc::now(),
        total_requirements: total,
        compliant_items: compliant,
        partial_items: partial,
        non_compliant_items: non_compliant,
        unknown_items: unknown,
        compliance_percentage: percentage,
        items,
        summary,
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("retrieval panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("retrieval panicked: {}", s)
    } else {
        "retrieval panicked".to_string()
    }
}
