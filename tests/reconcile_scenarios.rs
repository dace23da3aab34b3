use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

use marker_reconciler::app::ports::ExtractFeedPort;
use marker_reconciler::app::{ReconcileOptions, ReconcileOutcome, ReconcileUseCase};
use marker_reconciler::domain::{Build, MarkerExtract, MatchStrategyKind, StoredPosition, VersionBatch};
use marker_reconciler::infra::{FileOutputAdapter, InMemoryTransformService, JsonlFeedAdapter, OutputFormat};
use marker_reconciler::pipeline::processing::harmonize::HarmonizerSettings;
use marker_reconciler::pipeline::processing::matching::SignalKind;

/// Feed serving fixed batches in the given order
struct StaticFeed(Vec<VersionBatch>);

#[async_trait]
impl ExtractFeedPort for StaticFeed {
    async fn load(&self) -> marker_reconciler::error::Result<Vec<VersionBatch>> {
        Ok(self.0.clone())
    }
}

fn batch(version: &str, extracts: Vec<MarkerExtract>) -> VersionBatch {
    VersionBatch {
        version: version.to_string(),
        extracts,
        unreadable_lines: 0,
    }
}

fn options(max_concurrent_jobs: usize, timeout: Duration) -> ReconcileOptions {
    ReconcileOptions {
        harmonizer: HarmonizerSettings {
            max_concurrent_jobs,
            timeout,
        },
        project_extract_positions: true,
    }
}

async fn reconcile(
    batches: Vec<VersionBatch>,
    transform: InMemoryTransformService,
    options: ReconcileOptions,
    output: &std::path::Path,
) -> Result<ReconcileOutcome> {
    ReconcileUseCase::new(
        Arc::new(StaticFeed(batches)),
        Arc::new(transform),
        Arc::new(FileOutputAdapter::new(output, OutputFormat::Tsv)),
        options,
    )
    .run()
    .await
}

#[tokio::test]
async fn test_alias_attach_scenario() -> Result<()> {
    let dir = tempdir()?;
    let batches = vec![
        batch(
            "2010",
            vec![MarkerExtract::new("X1", "2010")
                .with_haplogroup("A1")
                .with_position(Build::B36, 100)],
        ),
        batch(
            "2011",
            vec![MarkerExtract::new("X1b", "2011")
                .with_haplogroup("A1b")
                .with_alias("X1")
                .with_position(Build::B37, 500)],
        ),
    ];

    let outcome = reconcile(
        batches,
        InMemoryTransformService::new(),
        ReconcileOptions::default(),
        &dir.path().join("markers.tsv"),
    )
    .await?;

    assert_eq!(outcome.registry.len(), 1);
    let record = outcome.registry.get("X1").expect("X1 registered");
    assert_eq!(record.haplogroup, "A1b");
    assert!(record.aliases.contains("X1b"));
    assert_eq!(record.position(Build::B36), Some(StoredPosition::direct(100)));
    assert_eq!(record.position(Build::B37), Some(StoredPosition::direct(500)));
    assert_eq!(record.provenance.len(), 2);
    assert_eq!(outcome.report.matches_by_strategy.get(&MatchStrategyKind::ExactName), Some(&1));
    Ok(())
}

#[tokio::test]
async fn test_chained_harmonization_scenario() -> Result<()> {
    let dir = tempdir()?;
    let transform = InMemoryTransformService::new()
        .with_mapping(Build::B36, Build::B35, 100, 98)
        .with_mapping(Build::B35, Build::B34, 98, 95)
        .with_mapping(Build::B35, Build::B33, 98, 90);
    let batches = vec![batch(
        "2008",
        vec![MarkerExtract::new("M1", "2008")
            .with_haplogroup("A")
            .with_position(Build::B36, 100)],
    )];

    let outcome = reconcile(
        batches,
        transform.clone(),
        ReconcileOptions::default(),
        &dir.path().join("markers.tsv"),
    )
    .await?;

    let record = outcome.registry.get("M1").expect("M1 registered");
    assert_eq!(record.position(Build::B36), Some(StoredPosition::direct(100)));
    assert_eq!(record.position(Build::B35), Some(StoredPosition::derived(98)));
    assert_eq!(record.position(Build::B34), Some(StoredPosition::derived(95)));
    assert_eq!(record.position(Build::B33), Some(StoredPosition::derived(90)));
    assert_eq!(record.position(Build::B37), None);
    assert_eq!(record.position(Build::B38), None);

    // The second hop only ever sees coordinates produced by the first
    let calls = transform.calls();
    let first_hop = calls
        .iter()
        .position(|c| (c.source, c.target) == (Build::B36, Build::B35))
        .expect("B36->B35 requested");
    let second_hop = calls
        .iter()
        .position(|c| (c.source, c.target) == (Build::B35, Build::B34))
        .expect("B35->B34 requested");
    assert!(first_hop < second_hop);
    assert_eq!(calls[second_hop].loci[0].1, 98);
    Ok(())
}

#[tokio::test]
async fn test_legacy_creation_scenario() -> Result<()> {
    let dir = tempdir()?;
    let batches = vec![
        batch(
            "2010",
            vec![MarkerExtract::new("X1", "2010")
                .with_haplogroup("A1")
                .with_reference_id("rs100")
                .with_position(Build::B36, 100)],
        ),
        batch(
            "2012",
            vec![MarkerExtract::new("Q9", "2012")
                .with_haplogroup("Q1a")
                .with_reference_id("rs200")
                .with_position(Build::B36, 4_000)],
        ),
    ];

    let outcome = reconcile(
        batches,
        InMemoryTransformService::new(),
        ReconcileOptions::default(),
        &dir.path().join("markers.tsv"),
    )
    .await?;

    assert_eq!(outcome.registry.len(), 2);
    let record = outcome.registry.get("Q9").expect("Q9 created");
    assert!(record.is_legacy);
    assert_eq!(record.canonical_id, "Q9");
    assert_eq!(record.provenance[0].matched_by, None);
    assert_eq!(outcome.report.records_created, 2);
    Ok(())
}

#[tokio::test]
async fn test_timeout_leaves_gaps_without_failing() -> Result<()> {
    let dir = tempdir()?;
    let transform = InMemoryTransformService::new()
        .with_mapping(Build::B36, Build::B35, 100, 98)
        .with_delay(Duration::from_millis(300));
    let batches = vec![batch(
        "2008",
        vec![MarkerExtract::new("M1", "2008")
            .with_haplogroup("A")
            .with_position(Build::B36, 100)],
    )];

    let output = dir.path().join("markers.tsv");
    let outcome = reconcile(batches, transform, options(2, Duration::from_millis(20)), &output).await?;

    let record = outcome.registry.get("M1").expect("M1 registered");
    assert_eq!(record.positions.len(), 1);
    assert_eq!(record.position(Build::B35), None);
    let timed_out: usize = outcome.report.hops.values().map(|h| h.timed_out).sum();
    assert!(timed_out > 0);
    assert_eq!(outcome.report.builds[&Build::B35].missing, 1);
    assert!(output.exists());
    Ok(())
}

#[tokio::test]
async fn test_projected_position_matches_legacy_marker() -> Result<()> {
    let dir = tempdir()?;
    let transform = InMemoryTransformService::new().with_mapping(Build::B36, Build::B37, 14_000_000, 15_654_428);
    let batches = vec![
        batch(
            "2010",
            vec![MarkerExtract::new("L21", "2010")
                .with_haplogroup("R1b1a2a1a2c")
                .with_position(Build::B37, 15_654_428)],
        ),
        batch(
            "2013",
            vec![MarkerExtract::new("S145x", "2013")
                .with_haplogroup("R1b1a2a1a2c")
                .with_position(Build::B36, 14_000_000)],
        ),
    ];

    let outcome = reconcile(
        batches,
        transform,
        ReconcileOptions::default(),
        &dir.path().join("markers.tsv"),
    )
    .await?;

    assert_eq!(outcome.registry.len(), 1);
    let record = outcome.registry.get("L21").expect("L21 registered");
    assert!(record.aliases.contains("S145x"));
    assert_eq!(record.position(Build::B36), Some(StoredPosition::direct(14_000_000)));
    assert_eq!(outcome.report.matches_by_strategy.get(&MatchStrategyKind::Position), Some(&1));
    Ok(())
}

#[tokio::test]
async fn test_rejected_extracts_leave_registry_untouched() -> Result<()> {
    let dir = tempdir()?;
    let batches = vec![batch(
        "2010",
        vec![
            MarkerExtract::new("", "2010").with_haplogroup("A"),
            MarkerExtract::new("M2", "2010"),
            MarkerExtract::new("M3", "2010").with_haplogroup("B"),
        ],
    )];

    let outcome = reconcile(
        batches,
        InMemoryTransformService::new(),
        ReconcileOptions::default(),
        &dir.path().join("markers.tsv"),
    )
    .await?;

    assert_eq!(outcome.registry.len(), 1);
    assert_eq!(outcome.report.extracts_rejected, 2);
    assert_eq!(outcome.report.versions[0].rejected, 2);
    Ok(())
}

#[tokio::test]
async fn test_out_of_order_feed_writes_nothing() -> Result<()> {
    let dir = tempdir()?;
    let output = dir.path().join("markers.tsv");
    let batches = vec![
        batch("2013", vec![MarkerExtract::new("M1", "2013").with_haplogroup("A")]),
        batch("2010", vec![MarkerExtract::new("M2", "2010").with_haplogroup("B")]),
    ];

    let result = reconcile(batches, InMemoryTransformService::new(), ReconcileOptions::default(), &output).await;
    assert!(result.is_err());
    assert!(!output.exists());
    Ok(())
}

#[tokio::test]
async fn test_missing_feed_is_fatal_and_writes_nothing() -> Result<()> {
    let dir = tempdir()?;
    let output = dir.path().join("markers.tsv");

    let result = ReconcileUseCase::new(
        Arc::new(JsonlFeedAdapter::new(dir.path().join("no-such-feed"), None)),
        Arc::new(InMemoryTransformService::new()),
        Arc::new(FileOutputAdapter::new(&output, OutputFormat::Tsv)),
        ReconcileOptions::default(),
    )
    .run()
    .await;

    let err = result.err().expect("feed failure aborts the run");
    assert!(format!("{:#}", err).contains("unavailable"));
    assert!(!output.exists());
    Ok(())
}

#[tokio::test]
async fn test_jsonl_feed_end_to_end() -> Result<()> {
    let dir = tempdir()?;
    let feed_dir = dir.path().join("extracts");
    std::fs::create_dir_all(&feed_dir)?;
    std::fs::write(
        feed_dir.join("2009.jsonl"),
        r#"{"name":"M269","haplogroup":"R1b1b2","aliases":["S3"],"positions":{"B36":21622000}}"#,
    )?;
    std::fs::write(
        feed_dir.join("2019-2020.jsonl"),
        "{\"name\":\"M269.1\",\"haplogroup\":\"R1b1a1b (Investigation)\",\"reference_id\":\"rs9786153\"}\n{broken\n",
    )?;

    let output = dir.path().join("markers.jsonl");
    let outcome = ReconcileUseCase::new(
        Arc::new(JsonlFeedAdapter::new(&feed_dir, None)),
        Arc::new(InMemoryTransformService::new()),
        Arc::new(FileOutputAdapter::new(&output, OutputFormat::Jsonl)),
        ReconcileOptions::default(),
    )
    .run()
    .await?;

    let record = outcome.registry.get("M269").expect("M269 registered");
    assert_eq!(record.haplogroup, "R1b1a1b");
    assert!(record.status_tags.contains("investigation"));
    assert!(record.aliases.contains("M269.1"));
    assert_eq!(record.reference_id.as_deref(), Some("rs9786153"));
    assert_eq!(outcome.report.versions[1].unreadable_lines, 1);
    assert_eq!(
        outcome.report.matches_by_strategy.get(&MatchStrategyKind::NormalizedName),
        Some(&1)
    );
    assert_eq!(std::fs::read_to_string(&output)?.lines().count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_reference_id_ambiguity_signal() -> Result<()> {
    let dir = tempdir()?;
    // Two records share a reference id only after both exist with distinct names
    let batches = vec![
        batch(
            "2010",
            vec![MarkerExtract::new("A1", "2010").with_haplogroup("A").with_reference_id("rs1")],
        ),
        batch(
            "2011",
            vec![MarkerExtract::new("B1", "2011").with_haplogroup("B").with_position(Build::B37, 700)],
        ),
        batch(
            "2012",
            vec![
                MarkerExtract::new("B1", "2012").with_haplogroup("B").with_reference_id("rs1"),
                MarkerExtract::new("Z9", "2012").with_haplogroup("C").with_reference_id("rs1"),
            ],
        ),
    ];

    let outcome = reconcile(
        batches,
        InMemoryTransformService::new(),
        ReconcileOptions::default(),
        &dir.path().join("markers.tsv"),
    )
    .await?;

    assert_eq!(outcome.registry.get("B1").and_then(|r| r.reference_id.as_deref()), Some("rs1"));
    let record = outcome.registry.get("Z9").expect("ambiguity degrades to a creation");
    assert!(record.is_legacy);
    assert!(outcome
        .report
        .signals
        .iter()
        .any(|s| s.kind == SignalKind::ReferenceIdAmbiguous && s.extract_name == "Z9"));
    Ok(())
}
