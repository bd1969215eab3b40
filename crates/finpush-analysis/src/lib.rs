//! The analysis-collaborator boundary.
//!
//! Report content is produced outside this system (AI analysis, market data
//! pipelines); finpush consumes it through the [`ReportSource`] trait and
//! shapes it for dispatch. The shipped [`file::FileReportSource`] reads a
//! rendered markdown report from disk; [`compact`] and [`sections`] carry the
//! shaping utilities applied before a report is turned into a notification.

pub mod compact;
pub mod file;
pub mod sections;

use async_trait::async_trait;
use chrono::NaiveDate;
use finpush_common::types::Severity;

/// One analysis report, ready to be shaped into a notification message.
#[derive(Debug, Clone)]
pub struct ReportContent {
    pub title: String,
    pub report_date: NaiveDate,
    pub markdown: String,
    /// Severity hint for rendering; does not gate dispatch.
    pub severity: Severity,
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("failed to read report: {0}")]
    Io(#[from] std::io::Error),

    #[error("report is empty: {0}")]
    Empty(String),

    #[error("report source unavailable: {0}")]
    Unavailable(String),
}

/// Produces the report for one job-runner cycle.
///
/// A fetch failure fails the whole invocation, since there is nothing useful
/// to send; everything downstream of a successful fetch is dispatch
/// territory.
#[async_trait]
pub trait ReportSource: Send + Sync {
    /// Stable short name for this source; feeds the idempotency key.
    fn slug(&self) -> &str;

    async fn fetch(&self) -> Result<ReportContent, ReportError>;
}
