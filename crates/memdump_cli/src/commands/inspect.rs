//! Inspect command implementation.

use memdump_core::{DumpReader, DumpSummary, EventRecord, Notification};
use serde::Serialize;
use std::path::Path;

/// Dump file inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// File path.
    pub path: String,
    /// Header and record counts.
    #[serde(flatten)]
    pub summary: DumpSummary,
    /// Listed records (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<Vec<RecordLine>>,
}

/// One listed record.
#[derive(Debug, Serialize)]
pub struct RecordLine {
    /// Timestamp in nanoseconds.
    pub ts: u64,
    /// Thread id.
    pub tid: u64,
    /// Payload length.
    pub payload_len: usize,
    /// Decoded notification, for notification records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<Notification>,
}

impl RecordLine {
    fn from_record(record: &EventRecord) -> Self {
        let notification = if record.is_notification() {
            Notification::from_record(record).ok()
        } else {
            None
        };
        Self {
            ts: record.ts,
            tid: record.tid,
            payload_len: record.payload.len(),
            notification,
        }
    }
}

/// Runs the inspect command.
pub fn run(
    path: &Path,
    list_records: Option<usize>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No dump file found at {:?}", path).into());
    }

    let reader = DumpReader::open(path)?;
    let summary = reader.verify()?;
    let records = match list_records {
        Some(limit) => Some(
            reader
                .records()
                .take(limit)
                .map(|r| r.map(|record| RecordLine::from_record(&record)))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        None => None,
    };

    let result = InspectResult {
        path: path.display().to_string(),
        summary,
        records,
    };

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn print_text_output(result: &InspectResult) {
    let summary = &result.summary;
    println!("Dump File Inspection");
    println!("====================");
    println!();
    println!("Path: {}", result.path);
    println!("Size: {}", format_size(summary.file_size));
    println!();
    println!("Header:");
    println!("  Name:    {}", summary.header.name);
    println!("  Window:  {}", format_window(summary.header.start_ns, summary.header.end_ns));
    if summary.header.filter.is_empty() {
        println!("  Filter:  (none)");
    } else {
        println!("  Filter:  {}", summary.header.filter);
    }
    println!();
    println!("Records:");
    println!("  Events:        {}", summary.events);
    println!("  Notifications: {}", summary.notifications);
    if let (Some(first), Some(last)) = (summary.first_ts, summary.last_ts) {
        println!("  Time span:     {first} .. {last}");
    }

    if let Some(records) = &result.records {
        println!();
        for line in records {
            match &line.notification {
                Some(note) => println!(
                    "  {:>20} tid={:<8} notification {}: {}",
                    line.ts, line.tid, note.id, note.description
                ),
                None => println!(
                    "  {:>20} tid={:<8} event {} bytes",
                    line.ts, line.tid, line.payload_len
                ),
            }
        }
    }
}

fn format_window(start: u64, end: u64) -> String {
    if end == 0 {
        format!("{start} .. (open)")
    } else {
        format!("{start} .. {end}")
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} bytes", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
