#![forbid(unsafe_code)]

//! Batch retrieval of monthly-mean reanalysis fields from the ECMWF Web API.
//!
//! One request descriptor is built per year of a closed-open year range. Each
//! descriptor is submitted to the service, which queues the job, and the
//! resulting file is downloaded to a per-year target path. Submissions run
//! one at a time, are retried on transient failures, and are recorded in a
//! ledger so an interrupted batch resumes where it stopped.
//!
//! **Planning only (no network)**
//! ```
//! use interim_batch::{build_jobs, RequestTemplate, YearRange};
//!
//! let years = YearRange::new(1980, 2020)?;
//! let jobs = build_jobs(&RequestTemplate::default(), years);
//! assert_eq!(jobs.len(), 40);
//! assert!(jobs[0].request.get_str("date").unwrap().starts_with("19800101/19800201"));
//! # Ok::<(), interim_batch::Error>(())
//! ```
//!
//! **Running a batch**
//! ```no_run
//! use interim_batch::{BatchDriver, Client, Ledger, Settings, build_jobs};
//!
//! let settings = Settings::load(None)?;
//! let client = Client::new(settings.client_options(settings.credentials()?))?;
//! let mut ledger = Ledger::open(settings.ledger_path())?;
//! let jobs = build_jobs(&settings.template()?, settings.year_range()?);
//!
//! let report = BatchDriver::new(&client, settings.retry_policy())
//!     .with_ledger(&mut ledger)
//!     .run(jobs)?;
//! println!("{} downloaded, {} skipped", report.downloaded(), report.skipped());
//! # Ok::<(), interim_batch::Error>(())
//! ```
//!
//! Notes:
//! - Credentials are never compiled in; see [`Settings::credentials`] for where they are read from.
//! - Retrieved files are not inspected; the service is trusted to produce them.

mod area;
mod client;
mod date;
mod driver;
mod error;
mod ledger;
mod plan;
mod request;
mod retry;
mod settings;
mod sources;

pub use crate::area::{BoundingBox, Grid};
pub use crate::client::{Client, ClientOptions, Retriever, Transfer};
pub use crate::date::{monthly_date_field, YearRange};
pub use crate::driver::{BatchDriver, BatchReport, DriverOptions, YearOutcome};
pub use crate::error::{Error, Result};
pub use crate::ledger::{Ledger, LedgerEntry};
pub use crate::plan::{build_jobs, Job, RequestTemplate};
pub use crate::request::{Request, RequestValue};
pub use crate::retry::RetryPolicy;
pub use crate::settings::{
    Credentials, OutputSettings, RequestSettings, RetrySettings, ServiceSettings, Settings,
    YearSettings,
};
