//! File-backed report source.
//!
//! Reads a rendered markdown report from disk, the hand-off format used by
//! the analysis pipeline. The title comes from the first `#` heading, the
//! report date from a date embedded in the file name (falling back to
//! today), and the slug from the file stem.

use std::path::PathBuf;
use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use finpush_common::types::Severity;
use regex::Regex;

use crate::{ReportContent, ReportError, ReportSource};

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4})[-_]?(\d{2})[-_]?(\d{2})").expect("date pattern is valid")
});

pub struct FileReportSource {
    path: PathBuf,
    slug: String,
    severity: Severity,
}

impl FileReportSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let slug = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("report")
            .to_string();
        Self {
            path,
            slug,
            severity: Severity::Info,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Extract a `YYYY-MM-DD` / `YYYYMMDD` style date embedded in `name`.
    fn date_from_name(name: &str) -> Option<NaiveDate> {
        let caps = DATE_RE.captures(name)?;
        let year = caps[1].parse().ok()?;
        let month = caps[2].parse().ok()?;
        let day = caps[3].parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    }

    fn title_from_markdown(markdown: &str) -> Option<String> {
        markdown
            .lines()
            .find_map(|line| line.strip_prefix("# ").map(|t| t.trim().to_string()))
    }
}

#[async_trait]
impl ReportSource for FileReportSource {
    fn slug(&self) -> &str {
        &self.slug
    }

    async fn fetch(&self) -> Result<ReportContent, ReportError> {
        let markdown = tokio::fs::read_to_string(&self.path).await?;
        if markdown.trim().is_empty() {
            return Err(ReportError::Empty(self.path.display().to_string()));
        }

        let title = Self::title_from_markdown(&markdown).unwrap_or_else(|| self.slug.clone());
        let report_date =
            Self::date_from_name(&self.slug).unwrap_or_else(|| Utc::now().date_naive());

        tracing::info!(
            path = %self.path.display(),
            bytes = markdown.len(),
            report_date = %report_date,
            "report file loaded"
        );

        Ok(ReportContent {
            title,
            report_date,
            markdown,
            severity: self.severity,
        })
    }
}
