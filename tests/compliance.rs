use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rag_compliance::compliance::{
    CancelSignal, ComplianceEngine, ComplianceOptions, ComplianceStatus, Retriever,
};
use rag_compliance::config::Config;
use rag_compliance::error::{RagError, Result};
use rag_compliance::models::{ExtractedDocument, FileType, QueryHit};
use rag_compliance::report::{render, ReportFormat};
use rag_compliance::service::RagService;
use rag_compliance::specification::{parse_requirements, SpecificationInput};
use serde_json::json;
use tempfile::TempDir;

/// Returns one hit per requirement with a fixed similarity.
struct FixedScores {
    scores: HashMap<String, f32>,
}

#[async_trait]
impl Retriever for FixedScores {
    async fn retrieve(&self, document_name: &str, text: &str, _top_k: usize) -> Result<Vec<QueryHit>> {
        if document_name != "tender" {
            return Err(RagError::not_indexed(document_name, vec!["tender".into()]));
        }
        Ok(self
            .scores
            .get(text)
            .map(|&score| QueryHit {
                chunk_id: 0,
                similarity_score: score,
                content_preview: format!("preview for {}", text),
                full_content: format!("full content for {}", text),
            })
            .into_iter()
            .collect())
    }

    fn is_indexed(&self, document_name: &str) -> bool {
        document_name == "tender"
    }
}

fn fixed_engine(scores: &[(&str, f32)]) -> ComplianceEngine {
    let scores = scores.iter().map(|(t, s)| (t.to_string(), *s)).collect();
    ComplianceEngine::new(Arc::new(FixedScores { scores }), ComplianceOptions::default())
}

fn list(items: &[&str]) -> SpecificationInput {
    SpecificationInput::List(items.iter().map(|s| s.to_string()).collect())
}

#[tokio::test]
async fn test_threshold_bands() {
    let engine = fixed_engine(&[("exact", 1.0), ("half", 0.5), ("weak", 0.3)]);
    let result = engine
        .compare(
            "tender",
            &list(&["exact", "half", "weak"]),
            "Tender",
            0.7,
            &CancelSignal::never(),
        )
        .await
        .unwrap();

    let statuses: Vec<ComplianceStatus> = result.items.iter().map(|i| i.status).collect();
    assert_eq!(
        statuses,
        vec![
            ComplianceStatus::Compliant,
            ComplianceStatus::Partial,
            ComplianceStatus::NonCompliant
        ]
    );
    assert_eq!(result.compliant_items, 1);
    assert_eq!(result.partial_items, 1);
    assert_eq!(result.non_compliant_items, 1);
    assert!((result.compliance_percentage - 50.0).abs() < 1e-9);
    assert_eq!(result.items[0].found_value.as_deref(), Some("preview for exact"));
}

#[tokio::test]
async fn test_unindexed_document_is_all_unknown() {
    let engine = fixed_engine(&[("exact", 1.0)]);
    let result = engine
        .compare(
            "missing",
            &list(&["exact", "other"]),
            "Tender",
            0.7,
            &CancelSignal::never(),
        )
        .await
        .unwrap();

    assert_eq!(result.total_requirements, 2);
    assert_eq!(result.unknown_items, 2);
    assert!(result
        .items
        .iter()
        .all(|i| i.status == ComplianceStatus::Unknown && i.notes.starts_with("Error:")));
    assert_eq!(result.compliance_percentage, 0.0);
}

#[test]
fn test_flat_list_ids() {
    let reqs = parse_requirements(&list(&["req A", "req B"]));
    let ids: Vec<&str> = reqs.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["REQ_001", "REQ_002"]);
}

async fn indexed_service(dir: &TempDir) -> Arc<RagService> {
    let mut config = Config::offline(dir.path());
    config.chunking.chunk_size = 60;
    config.chunking.chunk_overlap = 0;
    let svc = Arc::new(RagService::new(config).unwrap());
    svc.ingest_extracted(
        "tender",
        Path::new("tender.txt"),
        ExtractedDocument {
            text: "Delivery within ten working days.".to_string(),
            file_type: FileType::Text,
            metadata: Default::default(),
        },
    )
    .await
    .unwrap();
    svc
}

#[tokio::test]
async fn test_self_match_is_compliant_through_service() {
    let dir = TempDir::new().unwrap();
    let svc = indexed_service(&dir).await;

    let spec = SpecificationInput::from_value(json!({
        "requirements": [
            {"id": "DEL-1", "text": "Delivery within ten working days.", "expected": "10 days"},
            {"id": "PAY-1", "text": "zebra quantum marmalade"}
        ]
    }))
    .unwrap();

    let result = svc
        .compliance_engine()
        .compare("tender", &spec, "Tender", 0.7, &CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(result.items[0].requirement_id, "DEL-1");
    assert_eq!(result.items[0].status, ComplianceStatus::Compliant);
    assert_eq!(result.items[0].expected_value.as_deref(), Some("10 days"));
    assert!(!result.items[0].evidence.is_empty());
    assert_eq!(result.items[1].status, ComplianceStatus::NonCompliant);

    let text = render(&result, ReportFormat::Plain).unwrap();
    assert!(text.contains("[DEL-1] COMPLIANT"));
    assert!(text.contains("[PAY-1] NON-COMPLIANT"));
}

#[tokio::test]
async fn test_compare_multiple_through_service() {
    let dir = TempDir::new().unwrap();
    let svc = indexed_service(&dir).await;

    let names = vec!["tender".to_string(), "ghost".to_string()];
    let results = svc
        .compliance_engine()
        .compare_multiple(
            &names,
            &list(&["Delivery within ten working days."]),
            "Tender",
            0.7,
            &CancelSignal::never(),
        )
        .await
        .unwrap();

    let keys: Vec<&String> = results.keys().collect();
    assert_eq!(keys, vec!["tender", "ghost"]);
    assert_eq!(results["tender"].result().unwrap().compliant_items, 1);
    assert!(results["ghost"].result().is_none());
}

#[tokio::test]
async fn test_invalid_threshold_rejected() {
    let engine = fixed_engine(&[]);
    let err = engine
        .compare("tender", &list(&["x"]), "Tender", 1.5, &CancelSignal::never())
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::UnsupportedInput(_)));
}
