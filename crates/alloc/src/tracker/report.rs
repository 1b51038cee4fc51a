//! Leak, corruption and full tracker reports
//!
//! Every rendering carries, per record, the address, size, allocation id
//! and source location, plus the aggregate totals.
//!
//! ## Formats
//!
//! - [`ReportFormat::Text`] - human-readable summary
//! - [`ReportFormat::Json`] - `serde_json` document
//! - [`ReportFormat::Csv`] - one row per record followed by `metric,value` rows
//! - [`ReportFormat::Html`] - standalone page with escaped tables
//! - [`ReportFormat::Xml`] - flat element tree

use core::fmt::{self, Write as _};
use std::path::Path;

use chrono::{DateTime, Utc};
use hashbrown::HashMap;
use serde::Serialize;

use super::capture::format_call_stack;
use super::record::MemoryAllocationRecord;
use super::stats::{
    AllocationPattern, LocationStats, MemoryStatistics, OptimizationSuggestion,
    ThreadAllocationInfo,
};
use crate::error::{MemoryError, MemoryResult};

/// Output format of a tracker report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
    Csv,
    Html,
    Xml,
}

impl ReportFormat {
    /// Conventional file extension
    pub fn extension(self) -> &'static str {
        match self {
            Self::Text => "txt",
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Html => "html",
            Self::Xml => "xml",
        }
    }

    /// Guesses the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "txt" | "log" => Some(Self::Text),
            "json" => Some(Self::Json),
            "csv" => Some(Self::Csv),
            "html" | "htm" => Some(Self::Html),
            "xml" => Some(Self::Xml),
            _ => None,
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Leaked bytes and count under one grouping key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeakGroup {
    pub key: String,
    pub count: usize,
    pub bytes: usize,
}

fn group_by<F>(records: &[MemoryAllocationRecord], key: F) -> Vec<LeakGroup>
where
    F: Fn(&MemoryAllocationRecord) -> String,
{
    let mut groups: HashMap<String, LeakGroup> = HashMap::new();
    for record in records {
        let key = key(record);
        let group = groups.entry(key.clone()).or_insert_with(|| LeakGroup {
            key,
            count: 0,
            bytes: 0,
        });
        group.count += 1;
        group.bytes += record.size();
    }
    let mut groups: Vec<_> = groups.into_values().collect();
    groups.sort_by(|a, b| b.bytes.cmp(&a.bytes).then_with(|| a.key.cmp(&b.key)));
    groups
}

/// Allocations still registered when leaks were checked
#[derive(Debug, Clone)]
pub struct MemoryLeakReport {
    pub tracker: String,
    pub generated_at: DateTime<Utc>,
    /// Leaked records, oldest allocation first
    pub leaks: Vec<MemoryAllocationRecord>,
}

impl MemoryLeakReport {
    pub fn new(tracker: &str, mut leaks: Vec<MemoryAllocationRecord>) -> Self {
        leaks.sort_by_key(MemoryAllocationRecord::allocation_id);
        for leak in &mut leaks {
            leak.is_leaked = true;
        }
        Self {
            tracker: tracker.to_string(),
            generated_at: Utc::now(),
            leaks,
        }
    }

    pub fn has_leaks(&self) -> bool {
        !self.leaks.is_empty()
    }

    pub fn leak_count(&self) -> usize {
        self.leaks.len()
    }

    pub fn total_bytes(&self) -> usize {
        self.leaks.iter().map(MemoryAllocationRecord::size).sum()
    }

    pub fn by_location(&self) -> Vec<LeakGroup> {
        group_by(&self.leaks, MemoryAllocationRecord::location_key)
    }

    pub fn by_thread(&self) -> Vec<LeakGroup> {
        group_by(&self.leaks, |record| record.thread.to_string())
    }

    pub fn by_allocator(&self) -> Vec<LeakGroup> {
        group_by(&self.leaks, MemoryAllocationRecord::allocator_name)
    }

    /// Converts the report into an error when anything leaked
    pub fn into_result(self) -> MemoryResult<()> {
        if self.has_leaks() {
            Err(MemoryError::leak_detected(self.leak_count(), self.total_bytes()))
        } else {
            Ok(())
        }
    }
}

impl fmt::Display for MemoryLeakReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Memory Leak Report [{}]", self.tracker)?;
        writeln!(f, "Generated: {}", self.generated_at.to_rfc3339())?;
        if !self.has_leaks() {
            return writeln!(f, "No leaks detected");
        }
        writeln!(
            f,
            "{} leak(s), {} bytes",
            self.leak_count(),
            self.total_bytes()
        )?;
        for (title, groups) in [
            ("By location", self.by_location()),
            ("By thread", self.by_thread()),
            ("By allocator", self.by_allocator()),
        ] {
            writeln!(f, "{title}:")?;
            for group in groups {
                writeln!(f, "  {}: {} leak(s), {} bytes", group.key, group.count, group.bytes)?;
            }
        }
        writeln!(f, "Leaks:")?;
        for leak in &self.leaks {
            writeln!(f, "  {leak}")?;
            if !leak.call_stack.is_empty() {
                writeln!(f, "    stack: {}", format_call_stack(&leak.call_stack))?;
            }
        }
        Ok(())
    }
}

/// What a corruption scan found wrong with a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CorruptionKind {
    /// The tracker's own record guards were overwritten
    RecordCanary,
    /// The owning allocator found its block header or guards damaged
    BlockCorrupted,
    /// The owning allocator does not know the address
    UnknownToAllocator,
    /// The owning allocator rejected the pointer for another reason
    AllocatorRejected,
}

impl fmt::Display for CorruptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RecordCanary => "record canary",
            Self::BlockCorrupted => "block corrupted",
            Self::UnknownToAllocator => "unknown to allocator",
            Self::AllocatorRejected => "allocator rejected",
        };
        f.write_str(name)
    }
}

/// One corrupted allocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorruptionFinding {
    pub kind: CorruptionKind,
    pub allocation_id: u64,
    pub address: usize,
    pub size: usize,
    pub location: String,
    pub allocator: String,
    pub details: String,
}

impl CorruptionFinding {
    pub(super) fn new(kind: CorruptionKind, record: &MemoryAllocationRecord, details: String) -> Self {
        Self {
            kind,
            allocation_id: record.allocation_id(),
            address: record.address(),
            size: record.size(),
            location: record.location_key(),
            allocator: record.allocator_name(),
            details,
        }
    }
}

impl fmt::Display for CorruptionFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {:#x} ({} bytes) at {} by {}: {}: {}",
            self.allocation_id,
            self.address,
            self.size,
            self.location,
            self.allocator,
            self.kind,
            self.details
        )
    }
}

/// Result of re-validating every live record
#[derive(Debug, Clone)]
pub struct MemoryCorruptionReport {
    pub tracker: String,
    pub generated_at: DateTime<Utc>,
    /// Records examined by the scan
    pub checked: usize,
    pub findings: Vec<CorruptionFinding>,
}

impl MemoryCorruptionReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    /// Finding counts per kind, most frequent first
    pub fn by_kind(&self) -> Vec<(CorruptionKind, usize)> {
        let mut counts: HashMap<CorruptionKind, usize> = HashMap::new();
        for finding in &self.findings {
            *counts.entry(finding.kind).or_default() += 1;
        }
        let mut counts: Vec<_> = counts.into_iter().collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| (a.0 as u8).cmp(&(b.0 as u8))));
        counts
    }
}

impl fmt::Display for MemoryCorruptionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Memory Corruption Report [{}]", self.tracker)?;
        writeln!(f, "Generated: {}", self.generated_at.to_rfc3339())?;
        writeln!(
            f,
            "{} record(s) checked, {} finding(s)",
            self.checked,
            self.findings.len()
        )?;
        for (kind, count) in self.by_kind() {
            writeln!(f, "  {kind}: {count}")?;
        }
        for finding in &self.findings {
            writeln!(f, "  {finding}")?;
        }
        Ok(())
    }
}

/// Snapshot of everything the tracker knows, ready to render
#[derive(Debug, Clone)]
pub struct TrackerReport {
    pub tracker: String,
    pub generated_at: DateTime<Utc>,
    pub statistics: MemoryStatistics,
    /// Live records in allocation order
    pub records: Vec<MemoryAllocationRecord>,
    pub top_locations: Vec<LocationStats>,
    pub threads: Vec<ThreadAllocationInfo>,
    pub pattern: AllocationPattern,
    pub suggestions: Vec<OptimizationSuggestion>,
}

#[derive(Serialize)]
struct RecordView {
    allocation_id: u64,
    address: String,
    size: usize,
    alignment: usize,
    location: String,
    allocator: String,
    thread_id: u64,
    thread_name: Option<String>,
    allocated_at: String,
    call_stack: Vec<String>,
    corrupted: bool,
}

impl From<&MemoryAllocationRecord> for RecordView {
    fn from(record: &MemoryAllocationRecord) -> Self {
        Self {
            allocation_id: record.allocation_id(),
            address: format!("{:#x}", record.address()),
            size: record.size(),
            alignment: record.block.alignment,
            location: record.location_key(),
            allocator: record.allocator_name(),
            thread_id: record.thread.id,
            thread_name: record.thread.name.clone(),
            allocated_at: record.lifetime_start.to_rfc3339(),
            call_stack: record
                .call_stack
                .iter()
                .map(|ip| format!("{ip:#x}"))
                .collect(),
            corrupted: record.is_corrupted,
        }
    }
}

#[derive(Serialize)]
struct ReportView<'a> {
    tracker: &'a str,
    generated_at: String,
    statistics: &'a MemoryStatistics,
    histogram: Vec<(&'static str, u64)>,
    allocations: Vec<RecordView>,
    top_locations: &'a [LocationStats],
    threads: &'a [ThreadAllocationInfo],
    pattern: &'a AllocationPattern,
    suggestions: &'a [OptimizationSuggestion],
}

impl TrackerReport {
    /// Renders the report in `format`
    pub fn render(&self, format: ReportFormat) -> MemoryResult<String> {
        match format {
            ReportFormat::Text => Ok(self.render_text()),
            ReportFormat::Json => self.render_json(),
            ReportFormat::Csv => Ok(self.render_csv()),
            ReportFormat::Html => Ok(self.render_html()),
            ReportFormat::Xml => Ok(self.render_xml()),
        }
    }

    /// Renders the report and writes it to `path`
    pub fn write_to(&self, path: &Path, format: ReportFormat) -> MemoryResult<()> {
        let rendered = self.render(format)?;
        std::fs::write(path, rendered)
            .map_err(|err| MemoryError::report_failed(path, &err.to_string()))
    }

    fn totals(&self) -> [(&'static str, String); 10] {
        let stats = &self.statistics;
        [
            ("total_allocations", stats.total_allocations.to_string()),
            ("total_deallocations", stats.total_deallocations.to_string()),
            ("total_reallocations", stats.total_reallocations.to_string()),
            ("current_allocations", stats.current_allocations.to_string()),
            ("current_bytes", stats.current_bytes.to_string()),
            ("peak_bytes", stats.peak_bytes.to_string()),
            ("total_bytes_allocated", stats.total_bytes_allocated.to_string()),
            ("double_frees", stats.double_free_detections.to_string()),
            ("invalid_frees", stats.invalid_free_detections.to_string()),
            ("corruptions", stats.corruption_detections.to_string()),
        ]
    }

    fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Memory Tracker Report [{}]", self.tracker);
        let _ = writeln!(out, "=====================");
        let _ = writeln!(out, "Generated: {}", self.generated_at.to_rfc3339());
        let _ = writeln!(out);
        let _ = write!(out, "{}", self.statistics);
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", self.pattern);

        if !self.top_locations.is_empty() {
            let _ = writeln!(out, "\nTop allocating locations:");
            for location in &self.top_locations {
                let _ = writeln!(out, "  {location}");
            }
        }
        if !self.threads.is_empty() {
            let _ = writeln!(out, "\nThreads:");
            for thread in &self.threads {
                let _ = writeln!(out, "  {thread}");
            }
        }
        if !self.suggestions.is_empty() {
            let _ = writeln!(out, "\nSuggestions:");
            for suggestion in &self.suggestions {
                let _ = writeln!(out, "  {suggestion}");
            }
        }

        let _ = writeln!(out, "\nLive allocations ({}):", self.records.len());
        for record in &self.records {
            let _ = writeln!(out, "  {record}");
        }
        out
    }

    fn render_json(&self) -> MemoryResult<String> {
        let view = ReportView {
            tracker: &self.tracker,
            generated_at: self.generated_at.to_rfc3339(),
            statistics: &self.statistics,
            histogram: self.statistics.histogram.buckets().collect(),
            allocations: self.records.iter().map(RecordView::from).collect(),
            top_locations: &self.top_locations,
            threads: &self.threads,
            pattern: &self.pattern,
            suggestions: &self.suggestions,
        };
        serde_json::to_string_pretty(&view)
            .map_err(|err| MemoryError::report_failed(Path::new("<json>"), &err.to_string()))
    }

    fn render_csv(&self) -> String {
        let mut out = String::from(
            "allocation_id,address,size,alignment,location,allocator,thread_id,allocated_at\n",
        );
        for record in &self.records {
            let _ = writeln!(
                out,
                "{},{:#x},{},{},{},{},{},{}",
                record.allocation_id(),
                record.address(),
                record.size(),
                record.block.alignment,
                csv_field(&record.location_key()),
                csv_field(&record.allocator_name()),
                record.thread.id,
                record.lifetime_start.to_rfc3339()
            );
        }
        out.push_str("\nmetric,value\n");
        for (metric, value) in self.totals() {
            let _ = writeln!(out, "{metric},{value}");
        }
        for (label, count) in self.statistics.histogram.buckets() {
            let _ = writeln!(out, "{},{count}", csv_field(&format!("histogram {label}")));
        }
        out
    }

    fn render_html(&self) -> String {
        let mut out = String::new();
        let title = escape_markup(&self.tracker);
        let _ = writeln!(out, "<!DOCTYPE html>");
        let _ = writeln!(out, "<html>\n<head>\n<meta charset=\"utf-8\">");
        let _ = writeln!(out, "<title>Memory Tracker Report: {title}</title>");
        let _ = writeln!(out, "</head>\n<body>");
        let _ = writeln!(out, "<h1>Memory Tracker Report: {title}</h1>");
        let _ = writeln!(
            out,
            "<p>Generated {}</p>",
            escape_markup(&self.generated_at.to_rfc3339())
        );

        let _ = writeln!(out, "<h2>Totals</h2>\n<table>");
        for (metric, value) in self.totals() {
            let _ = writeln!(out, "<tr><th>{metric}</th><td>{value}</td></tr>");
        }
        let _ = writeln!(out, "</table>");

        let _ = writeln!(out, "<h2>Size distribution</h2>\n<table>");
        for (label, count) in self.statistics.histogram.buckets() {
            let _ = writeln!(out, "<tr><th>{label}</th><td>{count}</td></tr>");
        }
        let _ = writeln!(out, "</table>");

        if !self.suggestions.is_empty() {
            let _ = writeln!(out, "<h2>Suggestions</h2>\n<ul>");
            for suggestion in &self.suggestions {
                let _ = writeln!(out, "<li>{}</li>", escape_markup(&suggestion.to_string()));
            }
            let _ = writeln!(out, "</ul>");
        }

        let _ = writeln!(out, "<h2>Live allocations</h2>\n<table>");
        let _ = writeln!(
            out,
            "<tr><th>id</th><th>address</th><th>size</th><th>location</th><th>allocator</th><th>thread</th></tr>"
        );
        for record in &self.records {
            let _ = writeln!(
                out,
                "<tr><td>{}</td><td>{:#x}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                record.allocation_id(),
                record.address(),
                record.size(),
                escape_markup(&record.location_key()),
                escape_markup(&record.allocator_name()),
                escape_markup(&record.thread.to_string())
            );
        }
        let _ = writeln!(out, "</table>\n</body>\n</html>");
        out
    }

    fn render_xml(&self) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        let _ = writeln!(
            out,
            "<memory_report tracker=\"{}\" generated=\"{}\">",
            escape_markup(&self.tracker),
            escape_markup(&self.generated_at.to_rfc3339())
        );
        let _ = writeln!(out, "  <totals>");
        for (metric, value) in self.totals() {
            let _ = writeln!(out, "    <{metric}>{value}</{metric}>");
        }
        let _ = writeln!(out, "  </totals>");
        let _ = writeln!(out, "  <histogram>");
        for (label, count) in self.statistics.histogram.buckets() {
            let _ = writeln!(
                out,
                "    <bucket range=\"{}\" count=\"{count}\"/>",
                escape_markup(label)
            );
        }
        let _ = writeln!(out, "  </histogram>");
        let _ = writeln!(out, "  <allocations count=\"{}\">", self.records.len());
        for record in &self.records {
            let _ = writeln!(
                out,
                "    <allocation id=\"{}\" address=\"{:#x}\" size=\"{}\" alignment=\"{}\" location=\"{}\" allocator=\"{}\" thread=\"{}\"/>",
                record.allocation_id(),
                record.address(),
                record.size(),
                record.block.alignment,
                escape_markup(&record.location_key()),
                escape_markup(&record.allocator_name()),
                record.thread.id
            );
        }
        let _ = writeln!(out, "  </allocations>");
        let _ = writeln!(out, "</memory_report>");
        out
    }
}

/// Quotes a CSV field when it contains a separator, quote or newline
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Escapes text for HTML and XML content and attributes
fn escape_markup(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AllocationFlags, AllocatorTag, SourceLocation};
    use crate::registry::MemoryBlock;
    use crate::tracker::record::ThreadStamp;

    fn record(address: usize, size: usize, allocator: &str) -> MemoryAllocationRecord {
        let block = MemoryBlock::new(
            address,
            size,
            16,
            AllocationFlags::empty(),
            SourceLocation::caller(),
        );
        MemoryAllocationRecord::new(
            block,
            Some(AllocatorTag::new(allocator)),
            ThreadStamp::current(),
            Vec::new(),
        )
    }

    fn report() -> TrackerReport {
        let records = vec![record(0x1000, 64, "pool"), record(0x2000, 128, "stack")];
        let mut statistics = MemoryStatistics::default();
        for r in &records {
            statistics.record_allocation(r.size());
        }
        TrackerReport {
            tracker: "unit <test>".to_string(),
            generated_at: Utc::now(),
            statistics,
            records,
            top_locations: Vec::new(),
            threads: Vec::new(),
            pattern: AllocationPattern::default(),
            suggestions: Vec::new(),
        }
    }

    #[test]
    fn test_leak_report_grouping() {
        let report = MemoryLeakReport::new(
            "tracker",
            vec![
                record(0x1000, 10, "pool"),
                record(0x2000, 30, "pool"),
                record(0x3000, 5, "stack"),
            ],
        );
        assert_eq!(report.leak_count(), 3);
        assert_eq!(report.total_bytes(), 45);
        assert!(report.leaks.iter().all(|leak| leak.is_leaked));

        // every record comes from the same helper line
        assert_eq!(report.by_location().len(), 1);
        assert_eq!(report.by_thread().len(), 1);
        assert_eq!(report.by_allocator().len(), 3);

        let text = report.to_string();
        assert!(text.contains("3 leak(s), 45 bytes"));
        assert!(text.contains("By allocator:"));

        let err = report.into_result().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::LeakDetected);
    }

    #[test]
    fn test_empty_leak_report() {
        let report = MemoryLeakReport::new("tracker", Vec::new());
        assert!(!report.has_leaks());
        assert!(report.to_string().contains("No leaks detected"));
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn test_corruption_report_by_kind() {
        let a = record(0x1000, 8, "pool");
        let report = MemoryCorruptionReport {
            tracker: "tracker".into(),
            generated_at: Utc::now(),
            checked: 3,
            findings: vec![
                CorruptionFinding::new(CorruptionKind::BlockCorrupted, &a, "canary".into()),
                CorruptionFinding::new(CorruptionKind::RecordCanary, &a, "guard".into()),
                CorruptionFinding::new(CorruptionKind::BlockCorrupted, &a, "magic".into()),
            ],
        };
        assert!(!report.is_clean());
        assert_eq!(report.by_kind()[0], (CorruptionKind::BlockCorrupted, 2));
        assert!(report.to_string().contains("3 record(s) checked, 3 finding(s)"));
    }

    #[test]
    fn test_every_format_has_records_and_totals() {
        let report = report();
        for format in [
            ReportFormat::Text,
            ReportFormat::Json,
            ReportFormat::Csv,
            ReportFormat::Html,
            ReportFormat::Xml,
        ] {
            let rendered = report.render(format).unwrap();
            assert!(rendered.contains("0x1000"), "{format}: address");
            assert!(rendered.contains("0x2000"), "{format}: address");
            assert!(rendered.contains("128"), "{format}: size");
            assert!(rendered.contains("report.rs"), "{format}: location");
            let id = report.records[0].allocation_id().to_string();
            assert!(rendered.contains(&id), "{format}: allocation id");
        }
    }

    #[test]
    fn test_json_is_valid() {
        let json = report().render(ReportFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["allocations"].as_array().unwrap().len(), 2);
        assert_eq!(value["statistics"]["total_allocations"], 2);
        assert_eq!(value["allocations"][1]["size"], 128);
    }

    #[test]
    fn test_markup_is_escaped() {
        let report = report();
        let html = report.render(ReportFormat::Html).unwrap();
        assert!(html.contains("unit &lt;test&gt;"));
        let xml = report.render(ReportFormat::Xml).unwrap();
        assert!(xml.contains("tracker=\"unit &lt;test&gt;\""));
    }

    #[test]
    fn test_csv_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");

        let csv = report().render(ReportFormat::Csv).unwrap();
        assert!(csv.starts_with("allocation_id,address,size"));
        assert!(csv.contains("\nmetric,value\n"));
        assert!(csv.contains("total_allocations,2"));
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(ReportFormat::from_path(Path::new("a/b.JSON")), Some(ReportFormat::Json));
        assert_eq!(ReportFormat::from_path(Path::new("r.htm")), Some(ReportFormat::Html));
        assert_eq!(ReportFormat::from_path(Path::new("r.bin")), None);
        assert_eq!(ReportFormat::Xml.extension(), "xml");
    }
}
