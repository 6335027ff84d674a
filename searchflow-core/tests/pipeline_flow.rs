use std::sync::Arc;

use rust_decimal_macros::dec;
use searchflow_core::memory::{InMemoryRateStore, RecordingSink};
use searchflow_core::{
    ChannelOutcome, ChannelTopics, DecodeReason, Dispatcher, EnrichError, LineFailure, LineStatus, Period, Pipeline,
    RateError, RawLine,
};
use serde_json::Value;

const BACKUP: &str = "searches.backup";
const OUTPUT: &str = "searches.enriched";

const SAMPLE: &str = "1^S123^FR^2024-03-01^10:00^CDG^JFK^2024-03-10^2024-03-20^1A^USD^500.00^50.00^20.00^1^CDG^2024-03-10^08:00^JFK^2024-03-10^14:00^AF^AF^100^Y";

fn march() -> Period {
    Period::new(2024, 3).unwrap()
}

fn pipeline(store: InMemoryRateStore, sink: Arc<RecordingSink>) -> Pipeline {
    let dispatcher = Dispatcher::new(
        sink,
        ChannelTopics {
            backup: BACKUP.to_string(),
            output: OUTPUT.to_string(),
        },
    );
    Pipeline::new(Arc::new(store), dispatcher).with_concurrency(4)
}

fn usd_store() -> InMemoryRateStore {
    InMemoryRateStore::new().with_rate("USD", march(), dec!(0.92))
}

#[tokio::test]
async fn test_sample_line_end_to_end() {
    let sink = Arc::new(RecordingSink::new());
    let report = pipeline(usd_store(), sink.clone())
        .process_batch(vec![RawLine::from(SAMPLE)])
        .await;

    assert!(report.is_clean());
    let line = &report.lines[0];
    assert!(matches!(line.status, LineStatus::Delivered));
    assert_eq!(line.search_id.as_deref(), Some("S123"));
    assert_eq!(line.storage_key.as_deref(), Some("S123.json"));

    let backup = sink.sent_to(BACKUP);
    assert_eq!(backup.len(), 1);
    assert_eq!(backup[0].key, "S123");
    let raw: Value = serde_json::from_str(&backup[0].payload).unwrap();
    assert_eq!(raw["search_date"], "2024-03-01");
    assert_eq!(raw["price"], "500.00");
    assert!(raw.get("price_eur").is_none());

    let output = sink.sent_to(OUTPUT);
    assert_eq!(output.len(), 1);
    let enriched: Value = serde_json::from_str(&output[0].payload).unwrap();
    assert_eq!(enriched["advance_purchase"], "P9D");
    assert_eq!(enriched["stay_duration"], "P10D");
    assert_eq!(enriched["price_eur"], "543.48");
    assert_eq!(enriched["main_airline"], "AF");
    assert_eq!(enriched["search_id"], "S123");
    assert_eq!(enriched["flights"][0]["dep_time"], "08:00:00");
    assert_eq!(enriched["flights"][0]["cabin"], "Y");
}

#[tokio::test]
async fn test_missing_rate_is_backed_up_but_not_enriched() {
    let sink = Arc::new(RecordingSink::new());
    let gbp = SAMPLE.replace("^USD^", "^GBP^");
    let report = pipeline(usd_store(), sink.clone())
        .process_batch(vec![RawLine::from(gbp)])
        .await;

    let line = &report.lines[0];
    assert!(line.is_rate_not_found());
    assert!(line.backup.is_delivered());
    assert!(matches!(line.output, ChannelOutcome::NotAttempted));
    assert_eq!(sink.sent_to(BACKUP).len(), 1);
    assert!(sink.sent_to(OUTPUT).is_empty());
    assert_eq!(report.summary().enrich_failures, 1);
}

#[tokio::test]
async fn test_rate_store_outage_is_backed_up_but_not_enriched() {
    let sink = Arc::new(RecordingSink::new());
    let report = pipeline(InMemoryRateStore::new().failing(), sink.clone())
        .process_batch(vec![RawLine::from(SAMPLE)])
        .await;

    let line = &report.lines[0];
    assert!(matches!(
        line.failure(),
        Some(LineFailure::Rate(RateError::Lookup { .. }))
    ));
    assert!(!line.is_rate_not_found());
    assert!(line.backup.is_delivered());
    assert!(matches!(line.output, ChannelOutcome::NotAttempted));
    assert_eq!(sink.sent_to(BACKUP).len(), 1);
    assert!(sink.sent_to(OUTPUT).is_empty());
    assert_eq!(report.summary().enrich_failures, 1);
}

#[tokio::test]
async fn test_non_string_array_payload_is_a_decode_failure() {
    let sink = Arc::new(RecordingSink::new());
    let lines = vec![RawLine::from_payload(r#"["1", 2]"#), RawLine::from(SAMPLE)];
    let report = pipeline(usd_store(), sink.clone()).process_batch(lines).await;

    let summary = report.summary();
    assert_eq!(summary.decode_failures, 1);
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.output.delivered, 1);

    match report.lines[0].failure() {
        Some(LineFailure::Decode(failure)) => {
            assert_eq!(failure.line, r#"["1", 2]"#);
            assert!(matches!(failure.reason, DecodeReason::InvalidPayload(_)));
        }
        other => panic!("expected a decode failure, got {:?}", other),
    }
    assert_eq!(sink.sent_to(BACKUP).len(), 1);
}

#[tokio::test]
async fn test_zero_leg_record_fails_enrichment() {
    let sink = Arc::new(RecordingSink::new());
    let no_legs = SAMPLE.split('^').take(14).collect::<Vec<_>>().join("^") + "^0";
    let report = pipeline(usd_store(), sink.clone())
        .process_batch(vec![RawLine::from(no_legs)])
        .await;

    assert!(matches!(
        report.lines[0].failure(),
        Some(LineFailure::Enrich(EnrichError::NoLegs { .. }))
    ));
    assert_eq!(sink.sent_to(BACKUP).len(), 1);
    assert!(sink.sent_to(OUTPUT).is_empty());
}

#[tokio::test]
async fn test_euro_search_needs_no_rate() {
    let sink = Arc::new(RecordingSink::new());
    let store = InMemoryRateStore::new();
    let eur = SAMPLE.replace("^USD^", "^EUR^");
    let report = pipeline(store, sink.clone())
        .process_batch(vec![RawLine::from(eur)])
        .await;

    assert!(report.is_clean());
    let enriched: Value = serde_json::from_str(&sink.sent_to(OUTPUT)[0].payload).unwrap();
    assert_eq!(enriched["price_eur"], "500.00");
}

#[tokio::test]
async fn test_bad_lines_do_not_stop_the_batch() {
    let sink = Arc::new(RecordingSink::new());
    let truncated = &SAMPLE[..SAMPLE.rfind('^').unwrap()];
    let second = SAMPLE.replace("S123", "S124");
    let third = SAMPLE.replace("S123", "S125");

    let lines = vec![
        RawLine::from(""),
        RawLine::from(truncated),
        RawLine::from(second.as_str()),
        RawLine::from("single_field"),
        RawLine::from_payload(&serde_json::to_string(&third.split('^').collect::<Vec<_>>()).unwrap()),
    ];
    let report = pipeline(usd_store(), sink.clone()).process_batch(lines).await;

    let indexes: Vec<usize> = report.lines.iter().map(|l| l.index).collect();
    assert_eq!(indexes, vec![0, 1, 2, 3, 4]);

    let summary = report.summary();
    assert_eq!(summary.lines, 5);
    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.decode_failures, 1);
    assert_eq!(summary.backup.delivered, 2);
    assert_eq!(summary.output.delivered, 2);
    assert!(!report.is_clean());

    match report.lines[1].failure() {
        Some(LineFailure::Decode(failure)) => assert_eq!(failure.line, truncated),
        other => panic!("expected a decode failure, got {:?}", other),
    }
    assert_eq!(report.lines[4].search_id.as_deref(), Some("S125"));
}

#[tokio::test]
async fn test_publish_failure_is_isolated_per_line() {
    let sink = Arc::new(RecordingSink::new().rejecting(OUTPUT, "S124").rejecting(BACKUP, "S125"));
    let lines = vec![
        RawLine::from(SAMPLE.replace("S123", "S124")),
        RawLine::from(SAMPLE.replace("S123", "S125")),
        RawLine::from(SAMPLE),
    ];
    let report = pipeline(usd_store(), sink.clone()).process_batch(lines).await;

    assert!(matches!(report.lines[0].status, LineStatus::PublishFailed));
    assert!(report.lines[0].backup.is_delivered());
    assert!(report.lines[0].output.is_failed());

    // A lost backup does not hold back the enriched record.
    assert!(report.lines[1].backup.is_failed());
    assert!(matches!(report.lines[1].status, LineStatus::Delivered));

    assert!(matches!(report.lines[2].status, LineStatus::Delivered));

    let summary = report.summary();
    assert_eq!(summary.backup.delivered, 2);
    assert_eq!(summary.backup.failed, 1);
    assert_eq!(summary.output.delivered, 2);
    assert_eq!(summary.output.failed, 1);
}

#[tokio::test]
async fn test_rates_are_looked_up_once_per_batch() {
    let store = Arc::new(usd_store());
    let sink = Arc::new(RecordingSink::new());
    let dispatcher = Dispatcher::new(
        sink,
        ChannelTopics {
            backup: BACKUP.to_string(),
            output: OUTPUT.to_string(),
        },
    );
    let pipeline = Pipeline::new(store.clone(), dispatcher).with_concurrency(1);

    let lines: Vec<RawLine> = (0..5)
        .map(|i| RawLine::from(SAMPLE.replace("S123", &format!("S{}", i))))
        .collect();
    pipeline.process_batch(lines.clone()).await;
    assert_eq!(store.lookups(), 1);

    // A new batch starts with an empty cache.
    pipeline.process_batch(lines).await;
    assert_eq!(store.lookups(), 2);
}
