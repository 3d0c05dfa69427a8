//! Ingest a documents folder and retrieve from it through the
//! [`Retriever`] boundary the orchestrator uses.

use std::fs;
use tempfile::TempDir;

use rag_router::config::{parse_config, Config};
use rag_router::ingest::ingest;
use rag_router::knowledge::SqliteRetriever;
use rag_router_core::retriever::Retriever;

fn setup(tmp: &TempDir) -> Config {
    let docs = tmp.path().join("docs");
    fs::create_dir_all(&docs).unwrap();
    fs::write(
        docs.join("refunds.md"),
        "# Refund policy\n\nCustomers may request a refund within 30 days of purchase.\n\nRefunds are issued to the original payment method.",
    )
    .unwrap();
    fs::write(
        docs.join("shipping.txt"),
        "Shipping notes.\n\nOrders ship from the Rotterdam warehouse within two business days.",
    )
    .unwrap();

    parse_config(&format!(
        r#"
[db]
path = "{root}/data/ragr.sqlite"

[knowledge]
root = "{root}/docs"

[retrieval]
top_k = 2
"#,
        root = tmp.path().display()
    ))
    .unwrap()
}

#[tokio::test]
async fn test_ingest_then_retrieve() {
    let tmp = TempDir::new().unwrap();
    let cfg = setup(&tmp);

    let report = ingest(&cfg, false).await.unwrap();
    assert_eq!(report.upserted, 2);
    assert!(report.chunks_written >= 2);
    assert_eq!(report.removed, 0);

    let retriever = SqliteRetriever::from_config(&cfg).await.unwrap();
    let text = retriever.retrieve("How do refunds work?", 2).await.unwrap();
    assert!(text.contains("refund within 30 days"), "got: {}", text);

    let hits = retriever.search("Rotterdam warehouse", 2).await.unwrap();
    assert!(!hits.is_empty());
    assert!(hits[0].text.contains("Rotterdam"));
}

#[tokio::test]
async fn test_no_match_is_empty_text() {
    let tmp = TempDir::new().unwrap();
    let cfg = setup(&tmp);
    ingest(&cfg, false).await.unwrap();

    let retriever = SqliteRetriever::from_config(&cfg).await.unwrap();
    assert_eq!(retriever.retrieve("zeppelin", 2).await.unwrap(), "");
    assert_eq!(retriever.retrieve("", 2).await.unwrap(), "");
    assert_eq!(retriever.retrieve("?!'\"-", 2).await.unwrap(), "");
}

#[tokio::test]
async fn test_uninitialised_database_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let cfg = setup(&tmp);

    let retriever = SqliteRetriever::from_config(&cfg).await.unwrap();
    assert!(retriever.retrieve("refund", 2).await.is_err());
    assert!(retriever.retrieve("", 2).await.is_err());
}

#[tokio::test]
async fn test_reingest_skips_unchanged_and_removes_missing() {
    let tmp = TempDir::new().unwrap();
    let cfg = setup(&tmp);
    ingest(&cfg, false).await.unwrap();

    let again = ingest(&cfg, false).await.unwrap();
    assert_eq!(again.upserted, 0);
    assert_eq!(again.unchanged, 2);

    let full = ingest(&cfg, true).await.unwrap();
    assert_eq!(full.upserted, 2);

    fs::remove_file(tmp.path().join("docs/shipping.txt")).unwrap();
    let after_delete = ingest(&cfg, false).await.unwrap();
    assert_eq!(after_delete.removed, 1);

    let retriever = SqliteRetriever::from_config(&cfg).await.unwrap();
    assert_eq!(retriever.retrieve("Rotterdam", 2).await.unwrap(), "");
}

#[tokio::test]
async fn test_changed_document_is_reindexed() {
    let tmp = TempDir::new().unwrap();
    let cfg = setup(&tmp);
    ingest(&cfg, false).await.unwrap();

    fs::write(
        tmp.path().join("docs/refunds.md"),
        "# Refund policy\n\nRefunds are no longer offered on clearance items.",
    )
    .unwrap();
    let report = ingest(&cfg, false).await.unwrap();
    assert_eq!(report.upserted, 1);
    assert_eq!(report.unchanged, 1);

    let retriever = SqliteRetriever::from_config(&cfg).await.unwrap();
    let text = retriever.retrieve("clearance", 2).await.unwrap();
    assert!(text.contains("clearance items"));
    assert_eq!(retriever.retrieve("purchase", 2).await.unwrap(), "");
}

#[tokio::test]
async fn test_missing_folder_is_created() {
    let tmp = TempDir::new().unwrap();
    let cfg = parse_config(&format!(
        r#"
[db]
path = "{root}/ragr.sqlite"

[knowledge]
root = "{root}/not-yet"
"#,
        root = tmp.path().display()
    ))
    .unwrap();

    let report = ingest(&cfg, false).await.unwrap();
    assert!(report.created_root);
    assert_eq!(report.scanned, 0);
    assert!(tmp.path().join("not-yet").is_dir());
}
