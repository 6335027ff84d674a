//! Batch driver: decode, back up, resolve the rate, enrich, publish.
//!
//! Every line is handled on its own. Whatever goes wrong with one line is
//! recorded in its [`LineReport`] and the rest of the batch carries on.

use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::decoder::{self, DecodeFailure, DecodeReason, DELIMITER};
use crate::dispatch::{ChannelName, DeliveryId, Dispatcher, PublishError};
use crate::enricher::{self, EnrichError};
use crate::model::{EnrichedRecord, SearchRecord};
use crate::rates::{RateError, RateResolver, RateStore};

const SEARCH_DATE_INDEX: usize = 3;
const SEARCH_TIME_INDEX: usize = 4;

/// One input message: either a caret line or its fields already split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawLine {
    Text(String),
    Fields(Vec<String>),
    /// A JSON array payload whose elements are not all strings.
    Malformed { payload: String, error: String },
}

impl RawLine {
    /// Accepts a JSON array of strings as pre-split fields, anything else as
    /// a caret line. An array that is not all strings never decodes.
    pub fn from_payload(payload: &str) -> Self {
        if !payload.trim_start().starts_with('[') {
            return RawLine::Text(payload.to_string());
        }
        match serde_json::from_str::<Vec<String>>(payload) {
            Ok(fields) => RawLine::Fields(fields),
            Err(e) => RawLine::Malformed {
                payload: payload.to_string(),
                error: e.to_string(),
            },
        }
    }

    pub fn decode(&self) -> Result<Option<SearchRecord>, DecodeFailure> {
        match self {
            RawLine::Text(line) => decoder::decode(line),
            RawLine::Fields(fields) => decoder::decode_fields(fields),
            RawLine::Malformed { payload, error } => Err(DecodeFailure {
                line: payload.clone(),
                reason: DecodeReason::InvalidPayload(error.clone()),
            }),
        }
    }

    fn field(&self, index: usize) -> Option<&str> {
        match self {
            RawLine::Text(line) => line.split(DELIMITER).nth(index),
            RawLine::Fields(fields) => fields.get(index).map(String::as_str),
            RawLine::Malformed { .. } => None,
        }
    }

    fn search_moment(&self) -> Option<(String, String)> {
        let date = self.field(SEARCH_DATE_INDEX)?;
        let time = self.field(SEARCH_TIME_INDEX)?;
        Some((date.trim().to_string(), time.trim().to_string()))
    }
}

impl From<&str> for RawLine {
    fn from(line: &str) -> Self {
        RawLine::Text(line.to_string())
    }
}

impl From<String> for RawLine {
    fn from(line: String) -> Self {
        RawLine::Text(line)
    }
}

/// Stable sort by the raw search date and time fields. Lines too short to
/// carry them keep their relative order at the front.
pub fn order_by_search_time(lines: &mut [RawLine]) {
    lines.sort_by_cached_key(RawLine::search_moment);
}

// ============================================================================
// Reports
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum LineFailure {
    #[error(transparent)]
    Decode(#[from] DecodeFailure),
    #[error(transparent)]
    Rate(#[from] RateError),
    #[error(transparent)]
    Enrich(#[from] EnrichError),
}

#[derive(Debug)]
pub enum ChannelOutcome {
    NotAttempted,
    Delivered(DeliveryId),
    Failed(PublishError),
}

impl ChannelOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, ChannelOutcome::Delivered(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ChannelOutcome::Failed(_))
    }
}

/// Where the enrichment path of a line ended.
#[derive(Debug)]
pub enum LineStatus {
    /// Empty line, nothing to do.
    Skipped,
    /// Enriched record delivered to the output channel.
    Delivered,
    /// Enriched, but the output channel refused it. See `LineReport::output`.
    PublishFailed,
    Failed(LineFailure),
}

#[derive(Debug)]
pub struct LineReport {
    pub index: usize,
    pub search_id: Option<String>,
    pub storage_key: Option<String>,
    pub backup: ChannelOutcome,
    pub output: ChannelOutcome,
    pub status: LineStatus,
}

impl LineReport {
    fn new(index: usize) -> Self {
        Self {
            index,
            search_id: None,
            storage_key: None,
            backup: ChannelOutcome::NotAttempted,
            output: ChannelOutcome::NotAttempted,
            status: LineStatus::Skipped,
        }
    }

    pub fn failure(&self) -> Option<&LineFailure> {
        match &self.status {
            LineStatus::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    pub fn is_rate_not_found(&self) -> bool {
        matches!(self.failure(), Some(LineFailure::Rate(RateError::NotFound { .. })))
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChannelCounts {
    pub delivered: usize,
    pub failed: usize,
}

impl ChannelCounts {
    fn tally(&mut self, outcome: &ChannelOutcome) {
        match outcome {
            ChannelOutcome::Delivered(_) => self.delivered += 1,
            ChannelOutcome::Failed(_) => self.failed += 1,
            ChannelOutcome::NotAttempted => {}
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub lines: usize,
    pub skipped: usize,
    pub decode_failures: usize,
    /// Records that were decoded but never reached the output channel
    /// because of the rate lookup or enrichment.
    pub enrich_failures: usize,
    pub backup: ChannelCounts,
    pub output: ChannelCounts,
}

#[derive(Debug)]
pub struct BatchReport {
    pub batch_id: Uuid,
    /// Sorted by input position.
    pub lines: Vec<LineReport>,
}

impl BatchReport {
    pub fn summary(&self) -> BatchSummary {
        let mut summary = BatchSummary {
            lines: self.lines.len(),
            ..BatchSummary::default()
        };
        for line in &self.lines {
            summary.backup.tally(&line.backup);
            summary.output.tally(&line.output);
            match &line.status {
                LineStatus::Skipped => summary.skipped += 1,
                LineStatus::Failed(LineFailure::Decode(_)) => summary.decode_failures += 1,
                LineStatus::Failed(LineFailure::Rate(_) | LineFailure::Enrich(_)) => {
                    summary.enrich_failures += 1
                }
                LineStatus::Delivered | LineStatus::PublishFailed => {}
            }
        }
        summary
    }

    /// True when every decoded record reached both channels.
    pub fn is_clean(&self) -> bool {
        self.lines.iter().all(|line| match line.status {
            LineStatus::Skipped => true,
            LineStatus::Delivered => line.backup.is_delivered(),
            LineStatus::PublishFailed | LineStatus::Failed(_) => false,
        })
    }
}

// ============================================================================
// Pipeline
// ============================================================================

pub struct Pipeline {
    rates: Arc<dyn RateStore>,
    dispatcher: Dispatcher,
    concurrency: usize,
}

impl Pipeline {
    pub fn new(rates: Arc<dyn RateStore>, dispatcher: Dispatcher) -> Self {
        Self {
            rates,
            dispatcher,
            concurrency: 1,
        }
    }

    /// Maximum number of lines in flight at once.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub async fn process_batch(&self, lines: Vec<RawLine>) -> BatchReport {
        let batch_id = Uuid::new_v4();
        let span = info_span!("batch", %batch_id, lines = lines.len());

        async {
            // Rates are only cached for the lifetime of one batch.
            let resolver = RateResolver::new(self.rates.clone());

            let mut reports: Vec<LineReport> = stream::iter(lines.iter().enumerate())
                .map(|(index, line)| self.process_line(&resolver, index, line))
                .buffer_unordered(self.concurrency)
                .collect()
                .await;
            reports.sort_by_key(|report| report.index);

            let report = BatchReport {
                batch_id,
                lines: reports,
            };
            let summary = report.summary();
            info!(
                skipped = summary.skipped,
                decode_failures = summary.decode_failures,
                enrich_failures = summary.enrich_failures,
                backup_delivered = summary.backup.delivered,
                backup_failed = summary.backup.failed,
                output_delivered = summary.output.delivered,
                output_failed = summary.output.failed,
                "Batch processed"
            );
            report
        }
        .instrument(span)
        .await
    }

    async fn process_line(&self, resolver: &RateResolver, index: usize, line: &RawLine) -> LineReport {
        let mut report = LineReport::new(index);

        let record = match line.decode() {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!(index, "Skipping empty line");
                return report;
            }
            Err(failure) => {
                warn!(index, line = %failure.line, reason = %failure.reason, "Failed to decode line");
                report.status = LineStatus::Failed(failure.into());
                return report;
            }
        };

        report.search_id = Some(record.search_id.clone());
        report.storage_key = Some(record.storage_key());

        // Back up first so the raw record survives whatever happens next.
        report.backup = match self
            .dispatcher
            .publish(ChannelName::Backup, &record.search_id, &record)
            .await
        {
            Ok(delivery) => ChannelOutcome::Delivered(delivery),
            Err(e) => ChannelOutcome::Failed(e),
        };

        let enriched = match self.enrich(resolver, &record).await {
            Ok(enriched) => enriched,
            Err(failure) => {
                warn!(index, search_id = %record.search_id, error = %failure, "Record not enriched");
                report.status = LineStatus::Failed(failure);
                return report;
            }
        };

        match self
            .dispatcher
            .publish(ChannelName::Output, &record.search_id, &enriched)
            .await
        {
            Ok(delivery) => {
                report.output = ChannelOutcome::Delivered(delivery);
                report.status = LineStatus::Delivered;
            }
            Err(e) => {
                report.output = ChannelOutcome::Failed(e);
                report.status = LineStatus::PublishFailed;
            }
        }

        report
    }

    async fn enrich(&self, resolver: &RateResolver, record: &SearchRecord) -> Result<EnrichedRecord, LineFailure> {
        let rate = resolver.resolve_rate(&record.currency, record.period()).await?;
        Ok(enricher::enrich(record, rate)?)
    }
}
