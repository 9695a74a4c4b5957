//! Stress helpers for the memory dumper.
//!
//! These run one producer against concurrent extraction jobs and report
//! what happened.

use crate::fixtures::{record, TestDumper};
use memdump_core::{IngestOutcome, JobRequest, JobState, MAX_SEGMENTS, NOMINAL_SEGMENTS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone, Default)]
pub struct StressTestResult {
    /// Events stored.
    pub ingested: usize,
    /// Events dropped while a rotation was deferred.
    pub missed: usize,
    /// Jobs that finished `DoneOk`.
    pub jobs_ok: usize,
    /// Jobs that finished in any other state.
    pub jobs_failed: usize,
    /// Segment counts outside the allowed range, observed by the producer.
    pub invariant_violations: usize,
    /// Total duration.
    pub duration: Duration,
}

impl StressTestResult {
    /// Events offered to the dumper per second.
    pub fn events_per_second(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            (self.ingested + self.missed) as f64 / secs
        } else {
            0.0
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Ingested: {}", self.ingested);
        println!("Missed: {}", self.missed);
        println!("Jobs ok/failed: {}/{}", self.jobs_ok, self.jobs_failed);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} events/sec", self.events_per_second());
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Events the producer ingests.
    pub events: usize,
    /// Rotate after this many events.
    pub rotate_every: usize,
    /// Concurrent job threads.
    pub job_threads: usize,
    /// Jobs each thread submits.
    pub jobs_per_thread: usize,
    /// Segment capacity in bytes.
    pub segment_capacity: u64,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            events: 20_000,
            rotate_every: 500,
            job_threads: 4,
            jobs_per_thread: 10,
            segment_capacity: 64 * 1024,
        }
    }
}

/// Runs a producer that ingests and rotates while job threads extract.
pub fn stress_ingest_with_jobs(config: &StressConfig) -> StressTestResult {
    let t = TestDumper::new(config.segment_capacity);
    let done = AtomicBool::new(false);
    let start = Instant::now();

    let (producer, job_results) = thread::scope(|s| {
        let producer = s.spawn(|| {
            let mut result = StressTestResult::default();
            for ts in 0..config.events as u64 {
                match t.ingest_record(&record(ts, ts % 4)) {
                    IngestOutcome::Stored => result.ingested += 1,
                    IngestOutcome::Missed => result.missed += 1,
                    IngestOutcome::Dropped | IngestOutcome::Disabled => {}
                }
                if (ts as usize + 1) % config.rotate_every == 0 {
                    let _ = t.rotate(ts);
                    let len = t.status().segments.len();
                    if !(NOMINAL_SEGMENTS..=MAX_SEGMENTS).contains(&len) {
                        result.invariant_violations += 1;
                    }
                }
            }
            done.store(true, Ordering::Release);
            result
        });

        let workers: Vec<_> = (0..config.job_threads)
            .map(|worker| {
                let t = &t;
                let done = &done;
                s.spawn(move || {
                    let mut states = Vec::new();
                    for n in 0..config.jobs_per_thread {
                        if done.load(Ordering::Acquire) {
                            break;
                        }
                        let path = t.output(&format!("stress-{worker}-{n}"));
                        let job = t.submit_job(&JobRequest::new(path).look_back(1_000), None);
                        states.push(job.state());
                        let _ = t.remove_job(&job);
                    }
                    states
                })
            })
            .collect();

        let producer = producer.join().expect("producer panicked");
        let states: Vec<JobState> = workers
            .into_iter()
            .flat_map(|w| w.join().expect("job thread panicked"))
            .collect();
        (producer, states)
    });

    let jobs_ok = job_results.iter().filter(|s| **s == JobState::DoneOk).count();
    StressTestResult {
        jobs_ok,
        jobs_failed: job_results.len() - jobs_ok,
        duration: start.elapsed(),
        ..producer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_stress_run_keeps_invariants() {
        let config = StressConfig {
            events: 2_000,
            rotate_every: 100,
            job_threads: 2,
            jobs_per_thread: 5,
            segment_capacity: 8 * 1024,
        };
        let result = stress_ingest_with_jobs(&config);
        assert_eq!(result.invariant_violations, 0);
        assert_eq!(result.jobs_failed, 0);
        assert_eq!(result.ingested + result.missed, 2_000);
    }
}
