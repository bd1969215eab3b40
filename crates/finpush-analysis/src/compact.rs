//! Size-triggered report compaction.
//!
//! Webhook cards have a payload budget; a report that blows past it is
//! compacted before rendering instead of being dropped or split. The
//! transformations are content-agnostic: collapse blank-line runs, drop
//! repeated horizontal rules, and elide long markdown tables down to their
//! first rows.

/// Byte threshold above which a report is compacted before rendering.
pub const COMPACT_THRESHOLD_BYTES: usize = 20_000;

/// Data rows kept per markdown table when compacting.
const TABLE_KEEP_ROWS: usize = 3;

/// Whether `markdown` exceeds `threshold` and should be compacted.
pub fn should_compact(markdown: &str, threshold: usize) -> bool {
    markdown.len() > threshold
}

/// Compact a markdown report. Idempotent: compacting twice yields the same
/// output as compacting once.
pub fn compact(markdown: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut table_run: Vec<String> = Vec::new();

    for line in markdown.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with('|') {
            table_run.push(line.to_string());
            continue;
        }
        flush_table(&mut table_run, &mut out);

        if trimmed.is_empty() {
            if matches!(out.last(), Some(last) if last.trim().is_empty()) {
                continue;
            }
            out.push(String::new());
            continue;
        }

        if trimmed == "---" && matches!(out.last(), Some(last) if last.trim() == "---") {
            continue;
        }

        out.push(line.to_string());
    }
    flush_table(&mut table_run, &mut out);

    let mut result = out.join("\n");
    if markdown.ends_with('\n') && !result.ends_with('\n') {
        result.push('\n');
    }
    result
}

/// Emit a buffered table, eliding rows past the header + first
/// [`TABLE_KEEP_ROWS`] data rows.
fn flush_table(run: &mut Vec<String>, out: &mut Vec<String>) {
    if run.is_empty() {
        return;
    }
    // Header + separator + kept data rows. Eliding a table only one row
    // longer would not shrink it (the marker row replaces the saved row), so
    // the threshold sits one past `keep`; that also keeps elision idempotent.
    let keep = 2 + TABLE_KEEP_ROWS;
    if run.len() <= keep + 1 {
        out.append(run);
        return;
    }
    let omitted = run.len() - keep;
    out.extend(run.drain(..keep));
    out.push(format!("| ... {omitted} rows omitted |"));
    run.clear();
}
