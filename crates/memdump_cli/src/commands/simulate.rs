//! Simulate command implementation.
//!
//! Feeds synthetic events through a [`MemoryDumper`], rotating on a fixed
//! cadence, then extracts the last `look_back` events with a job.

use memdump_core::{
    JobRequest, JobStatus, MemdumpConfig, MemdumpStatus, MemoryDumper, StartOutcome,
};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

/// Simulation parameters.
#[derive(Debug, Clone)]
pub struct SimulateOptions {
    /// Directory for dump files.
    pub out_dir: PathBuf,
    /// Total ring buffer size.
    pub buffer_size: u64,
    /// Events to ingest.
    pub events: u64,
    /// Rotation cadence in events.
    pub rotate_every: u64,
    /// Job look-back span in events.
    pub look_back: u64,
    /// Continuous session name.
    pub continuous: Option<String>,
}

/// Simulation result.
#[derive(Debug, Serialize)]
pub struct SimulateResult {
    /// Extraction output file.
    pub output: PathBuf,
    /// Continuous session file, if one was opened.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continuous_output: Option<PathBuf>,
    /// Final job status.
    pub job: JobStatus,
    /// Dumper state after the run.
    pub dumper: MemdumpStatus,
}

/// Runs the simulate command.
pub fn run(options: &SimulateOptions, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = simulate(options)?;

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

/// Drives the dumper and returns what happened.
pub fn simulate(options: &SimulateOptions) -> Result<SimulateResult, Box<dyn std::error::Error>> {
    let config = MemdumpConfig::new()
        .buffer_size(options.buffer_size)
        .dump_dir(&options.out_dir);
    let dumper = MemoryDumper::new(config)?;
    if dumper.is_capture_disabled() {
        return Err("capture could not allocate its segments".into());
    }

    let continuous_output = match &options.continuous {
        Some(name) => match dumper.start_continuous_dump(name, 0)? {
            StartOutcome::Started(path) => Some(path),
            _ => None,
        },
        None => None,
    };

    let rotate_every = options.rotate_every.max(1);
    for ts in 0..options.events {
        let payload = format!("syscall#{ts}");
        dumper.ingest(ts, ts % 4, payload.as_bytes());
        if (ts + 1) % rotate_every == 0 {
            dumper.rotate(ts)?;
        }
    }

    let trigger = options.events.saturating_sub(1);
    let output = options.out_dir.join("simulate.scap");
    let request = JobRequest::new(&output)
        .name("simulate")
        .trigger(trigger)
        .look_back(options.look_back);
    let job = dumper.submit_job(&request, None);
    info!(job = %job.id(), state = ?job.state(), "extraction finished");

    dumper.close(options.events);

    Ok(SimulateResult {
        output,
        continuous_output,
        job: dumper.job_status(&job),
        dumper: dumper.status(),
    })
}

fn print_text_output(result: &SimulateResult) {
    let stats = &result.dumper.stats;
    println!("Simulation");
    println!("==========");
    println!();
    println!("Capture:");
    println!("  Ingested:           {}", stats.events_ingested);
    println!("  Missed:             {}", stats.events_missed);
    println!("  Oversized:          {}", stats.events_oversized);
    println!("  Rotations:          {}", stats.rotations);
    println!("  Deferred rotations: {}", stats.rotations_deferred);
    println!();
    println!("Extraction:");
    println!("  Output:  {}", result.output.display());
    println!("  State:   {:?}", result.job.state);
    println!("  Written: {}", result.job.events_written);
    if let Some(error) = &result.job.error {
        println!("  Error:   {error}");
    }
    if let Some(path) = &result.continuous_output {
        println!();
        println!("Continuous dump:");
        println!("  Output:        {}", path.display());
        println!("  Bytes written: {}", stats.dump_bytes_written);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memdump_core::{DumpReader, JobState};
    use tempfile::tempdir;

    #[test]
    fn simulation_extracts_the_look_back_window() {
        let dir = tempdir().unwrap();
        let options = SimulateOptions {
            out_dir: dir.path().to_path_buf(),
            buffer_size: 3 * 64 * 1024,
            events: 2_000,
            rotate_every: 250,
            look_back: 99,
            continuous: None,
        };

        let result = simulate(&options).unwrap();
        assert_eq!(result.job.state, JobState::DoneOk);
        assert_eq!(result.job.events_written, 100);
        assert!(!result.dumper.dumping);

        let summary = DumpReader::open(&result.output).unwrap().verify().unwrap();
        assert_eq!(summary.first_ts, Some(1_900));
        assert_eq!(summary.last_ts, Some(1_999));
    }

    #[test]
    fn simulation_can_run_a_continuous_session() {
        let dir = tempdir().unwrap();
        let options = SimulateOptions {
            out_dir: dir.path().to_path_buf(),
            buffer_size: 3 * 64 * 1024,
            events: 500,
            rotate_every: 100,
            look_back: 10,
            continuous: Some("sim".into()),
        };

        let result = simulate(&options).unwrap();
        let path = result.continuous_output.unwrap();
        assert!(path.exists());
        assert!(result.dumper.continuous.open_path.is_none());
        assert!(DumpReader::open(&path).unwrap().verify().unwrap().events > 0);
    }
}
