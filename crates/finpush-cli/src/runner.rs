//! The job runner: one end-to-end cycle per trigger.
//!
//! `Idle → Running → {Completed, Failed}`, terminal per invocation. Report
//! retrieval failure fails the run; dispatch failure does not, it is a
//! reported outcome for the caller to map to an exit code.

use std::collections::HashSet;
use std::sync::Mutex;

use finpush_analysis::{ReportContent, ReportError, ReportSource, compact, sections};
use finpush_common::types::{NotificationMessage, Section};
use finpush_notify::dispatcher::{DispatchResult, Dispatcher, Overall};
use tokio::time::Instant;

use crate::config::DetailLevel;

/// Per-trigger context supplied by the external scheduler or the CLI.
#[derive(Debug, Clone, Default)]
pub struct TriggerContext {
    /// Bounds the whole invocation; in-flight attempts past it are cancelled.
    pub deadline: Option<Instant>,
    /// When set, only report sections whose heading matches are included.
    pub sections: Option<Vec<String>>,
    /// Build the message but skip the dispatcher entirely.
    pub dry_run: bool,
}

/// Result of one completed run. `dispatch` is `None` for dry runs and
/// deduplicated repeats.
#[derive(Debug)]
pub struct RunSummary {
    pub idempotency_key: String,
    pub title: String,
    pub dispatch: Option<DispatchResult>,
    pub deduplicated: bool,
}

pub struct JobRunner {
    dispatcher: Dispatcher,
    detail_level: DetailLevel,
    auto_compact: bool,
    /// Keys that dispatched with `AllSucceeded` in this process.
    sent_keys: Mutex<HashSet<String>>,
}

impl JobRunner {
    pub fn new(dispatcher: Dispatcher, detail_level: DetailLevel, auto_compact: bool) -> Self {
        Self {
            dispatcher,
            detail_level,
            auto_compact,
            sent_keys: Mutex::new(HashSet::new()),
        }
    }

    /// Run one cycle: fetch the report, build exactly one message, dispatch
    /// exactly once.
    ///
    /// # Errors
    ///
    /// Returns the [`ReportError`] when report retrieval fails; no dispatch
    /// is attempted in that case. Dispatch outcomes, partial failure
    /// included, are carried in the `Ok` summary.
    pub async fn run_once(
        &self,
        source: &dyn ReportSource,
        ctx: &TriggerContext,
    ) -> Result<RunSummary, ReportError> {
        tracing::info!(source = source.slug(), dry_run = ctx.dry_run, "run started");

        let report = match source.fetch().await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(
                    source = source.slug(),
                    error = %e,
                    "report retrieval failed, run failed without dispatch"
                );
                return Err(e);
            }
        };

        let message = self.build_message(source.slug(), &report, ctx);

        if ctx.dry_run {
            tracing::info!(
                key = %message.idempotency_key,
                title = %message.title,
                "dry run, dispatch skipped"
            );
            return Ok(RunSummary {
                idempotency_key: message.idempotency_key,
                title: message.title,
                dispatch: None,
                deduplicated: false,
            });
        }

        let already_sent = self
            .sent_keys
            .lock()
            .expect("idempotency set lock")
            .contains(&message.idempotency_key);
        if already_sent {
            tracing::info!(
                key = %message.idempotency_key,
                "report already delivered, dispatch skipped"
            );
            return Ok(RunSummary {
                idempotency_key: message.idempotency_key,
                title: message.title,
                dispatch: None,
                deduplicated: true,
            });
        }

        let result = self.dispatcher.dispatch(&message, ctx.deadline).await;

        match result.overall {
            Overall::AllSucceeded => {
                self.sent_keys
                    .lock()
                    .expect("idempotency set lock")
                    .insert(message.idempotency_key.clone());
                tracing::info!(
                    key = %message.idempotency_key,
                    channels = result.channels.len(),
                    "run completed, all channels delivered"
                );
            }
            Overall::PartialFailure => tracing::warn!(
                key = %message.idempotency_key,
                succeeded = result.succeeded_count(),
                failed = result.failed_count(),
                "run completed with partial failure"
            ),
            Overall::AllFailed => tracing::error!(
                key = %message.idempotency_key,
                channels = result.channels.len(),
                "run completed, every channel failed"
            ),
            Overall::NoChannels => tracing::warn!(
                key = %message.idempotency_key,
                "run completed, no channels configured"
            ),
        }

        Ok(RunSummary {
            idempotency_key: message.idempotency_key,
            title: message.title,
            dispatch: Some(result),
            deduplicated: false,
        })
    }

    fn build_message(
        &self,
        slug: &str,
        report: &ReportContent,
        ctx: &TriggerContext,
    ) -> NotificationMessage {
        let mut markdown = match &ctx.sections {
            Some(wanted) if !wanted.is_empty() => sections::filter(&report.markdown, wanted),
            _ => report.markdown.clone(),
        };

        let force_compact = self.detail_level == DetailLevel::Compact;
        if force_compact
            || (self.auto_compact
                && compact::should_compact(&markdown, compact::COMPACT_THRESHOLD_BYTES))
        {
            let before = markdown.len();
            markdown = compact::compact(&markdown);
            tracing::info!(
                before_bytes = before,
                after_bytes = markdown.len(),
                "report compacted"
            );
        }

        let blocks = vec![
            Section::Text { content: markdown },
            Section::Table {
                rows: vec![
                    ("Report date".to_string(), report.report_date.to_string()),
                    ("Source".to_string(), slug.to_string()),
                ],
            },
        ];

        NotificationMessage {
            title: report.title.clone(),
            sections: blocks,
            severity: report.severity,
            idempotency_key: format!("{slug}-{}", report.report_date),
        }
    }
}
