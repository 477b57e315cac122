use std::path::PathBuf;

use chrono::Utc;
use tracing::{error, info, info_span, warn};

use crate::client::Retriever;
use crate::error::{Error, Result};
use crate::ledger::{Ledger, LedgerEntry};
use crate::plan::Job;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverOptions {
    /// Keep going after a year fails (after retries) instead of stopping.
    pub continue_on_error: bool,
    /// Download years even if the ledger already lists them.
    pub force: bool,
}

#[derive(Debug)]
pub enum YearOutcome {
    Downloaded {
        year: i32,
        target: String,
        size_bytes: u64,
        attempts: u32,
    },
    Skipped {
        year: i32,
    },
    Failed {
        year: i32,
        error: Error,
    },
}

impl YearOutcome {
    pub fn year(&self) -> i32 {
        match self {
            YearOutcome::Downloaded { year, .. }
            | YearOutcome::Skipped { year }
            | YearOutcome::Failed { year, .. } => *year,
        }
    }
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<YearOutcome>,
}

impl BatchReport {
    pub fn downloaded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, YearOutcome::Downloaded { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, YearOutcome::Skipped { .. }))
            .count()
    }

    pub fn failed_years(&self) -> Vec<i32> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                YearOutcome::Failed { year, .. } => Some(*year),
                _ => None,
            })
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.failed_years().is_empty()
    }
}

/// Sequential per-year retrieval.
///
/// Jobs run strictly one after another; each blocks in the retriever until
/// its file is written or it fails.
pub struct BatchDriver<'a, R: Retriever> {
    retriever: &'a R,
    policy: RetryPolicy,
    ledger: Option<&'a mut Ledger>,
    opts: DriverOptions,
}

impl<'a, R: Retriever> BatchDriver<'a, R> {
    pub fn new(retriever: &'a R, policy: RetryPolicy) -> Self {
        Self {
            retriever,
            policy,
            ledger: None,
            opts: DriverOptions::default(),
        }
    }

    pub fn with_ledger(mut self, ledger: &'a mut Ledger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn with_options(mut self, opts: DriverOptions) -> Self {
        self.opts = opts;
        self
    }

    /// Run every job.
    ///
    /// Without `continue_on_error`, the first failing year ends the batch and
    /// its error is returned with the year attached. Ledger write failures
    /// always end the batch.
    pub fn run(mut self, jobs: Vec<Job>) -> Result<BatchReport> {
        self.run_with_sleep(jobs, std::thread::sleep)
    }

    pub fn run_with_sleep(
        &mut self,
        jobs: Vec<Job>,
        mut sleep: impl FnMut(std::time::Duration),
    ) -> Result<BatchReport> {
        let total = jobs.len();
        let mut report = BatchReport::default();
        info!(jobs = total, "starting batch");

        for (i, job) in jobs.into_iter().enumerate() {
            let year = job.year;
            let _span = info_span!("year", year).entered();

            if let Some(ledger) = self.ledger.as_deref_mut() {
                let recorded = ledger.get(year).map(|e| PathBuf::from(&e.target));
                if let Some(recorded) = recorded {
                    // An entry only counts if it is for this job's target and the file is still there.
                    let target = job.target();
                    let stale = if recorded != target {
                        Some("recorded for a different target")
                    } else if !target.is_file() {
                        Some("recorded file is missing")
                    } else {
                        None
                    };
                    match stale {
                        None if !self.opts.force => {
                            info!(progress = %format!("{}/{total}", i + 1), "already downloaded, skipping");
                            report.outcomes.push(YearOutcome::Skipped { year });
                            continue;
                        }
                        None => {}
                        Some(reason) => {
                            info!(recorded = %recorded.display(), reason, "ledger entry is stale, retrieving again");
                        }
                    }
                    ledger.forget(year).map_err(|e| e.for_year(year))?;
                }
            }

            info!(progress = %format!("{}/{total}", i + 1), target = %job.target().display(), "retrieving");
            let result = self.policy.run_with_sleep(
                |attempt| {
                    if attempt > 1 {
                        info!(attempt, "retrying");
                    }
                    self.retriever.retrieve(&job.request)
                },
                &mut sleep,
            );

            match result {
                Ok((transfer, attempts)) => {
                    let target = transfer.target.to_string_lossy().into_owned();
                    if let Some(ledger) = self.ledger.as_deref_mut() {
                        ledger
                            .record(
                                year,
                                LedgerEntry {
                                    target: target.clone(),
                                    size_bytes: transfer.size_bytes,
                                    completed_at: Utc::now(),
                                },
                            )
                            .map_err(|e| e.for_year(year))?;
                    }
                    info!(bytes = transfer.size_bytes, attempts, "year complete");
                    report.outcomes.push(YearOutcome::Downloaded {
                        year,
                        target,
                        size_bytes: transfer.size_bytes,
                        attempts,
                    });
                }
                Err(e) if self.opts.continue_on_error => {
                    warn!(error = %e, "year failed, continuing");
                    report.outcomes.push(YearOutcome::Failed { year, error: e });
                }
                Err(e) => {
                    error!(error = %e, "year failed, stopping batch");
                    return Err(e.for_year(year));
                }
            }
        }

        info!(
            downloaded = report.downloaded(),
            skipped = report.skipped(),
            failed = report.failed_years().len(),
            "batch finished"
        );
        Ok(report)
    }
}
