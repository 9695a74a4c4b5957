//! Verify command implementation.

use memdump_core::DumpReader;
use std::path::Path;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Number of records checked.
    pub records_checked: usize,
    /// Number of valid records.
    pub valid_records: usize,
    /// Timestamps that went backwards.
    pub out_of_order: usize,
    /// List of errors found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs the verify command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying dump file at {:?}", path);
    println!();

    let reader = match DumpReader::open(path) {
        Ok(reader) => reader,
        Err(e) => {
            println!("✗ Header check failed: {e}");
            return Err("Verification failed".into());
        }
    };
    println!("Header OK (name: {})", reader.header().name);

    let result = verify_records(&reader);
    print_result(&result);

    println!();
    if result.is_ok() {
        println!("✓ Dump verification passed");
        Ok(())
    } else {
        println!("✗ Dump verification failed");
        Err("Verification failed".into())
    }
}

/// Checks every record in the file.
///
/// Out-of-order timestamps are counted but are not errors; a continuous
/// session concatenates segments whose clocks may interleave.
pub fn verify_records(reader: &DumpReader) -> VerifyResult {
    let mut result = VerifyResult::default();
    let mut last_ts = None;

    for record in reader.records() {
        result.records_checked += 1;
        match record {
            Ok(record) => {
                result.valid_records += 1;
                if last_ts.is_some_and(|last| record.ts < last) {
                    result.out_of_order += 1;
                }
                last_ts = Some(record.ts);
            }
            Err(e) => {
                result
                    .errors
                    .push(format!("Record {}: {}", result.records_checked, e));
            }
        }
    }

    result
}

fn print_result(result: &VerifyResult) {
    println!("Records:");
    println!("  Checked:      {}", result.records_checked);
    println!("  Valid:        {}", result.valid_records);
    println!("  Out of order: {}", result.out_of_order);

    if !result.errors.is_empty() {
        println!("  Errors:");
        for error in &result.errors {
            println!("    - {}", error);
        }
    }
}
