use std::cell::RefCell;
use std::path::PathBuf;

use interim_batch::{
    BatchDriver, DriverOptions, Error, Ledger, Request, RequestTemplate, Result, Retriever,
    RetryPolicy, Transfer, YearRange, build_jobs,
};
use pretty_assertions::assert_eq;

const FIXED_KEYS: [&str; 10] = [
    "class", "dataset", "expver", "grid", "levtype", "param", "stream", "type", "area", "format",
];

fn full_range() -> YearRange {
    YearRange::new(1980, 2020).unwrap()
}

#[test]
fn one_descriptor_per_year() {
    let range = full_range();
    let jobs = build_jobs(&RequestTemplate::default(), range);
    assert_eq!(jobs.len(), (range.end() - range.start()) as usize);
    assert_eq!(jobs.len(), 40);
    let years: Vec<i32> = jobs.iter().map(|j| j.year).collect();
    assert_eq!(years, (1980..2020).collect::<Vec<_>>());
}

#[test]
fn date_field_lists_twelve_month_starts() {
    for job in build_jobs(&RequestTemplate::default(), full_range()) {
        let y = job.year;
        let expected: Vec<String> = (1..=12).map(|m| format!("{y}{m:02}01")).collect();
        assert_eq!(job.request.get_str("date").unwrap(), expected.join("/"));
    }
}

#[test]
fn target_embeds_year_in_both_positions() {
    let mut seen = std::collections::HashSet::new();
    for job in build_jobs(&RequestTemplate::default(), full_range()) {
        let y = job.year;
        let target = job.request.get_str("target").unwrap();
        assert!(target.contains(&format!("{y}-01-01to{y}-12-01")), "{target}");
        assert!(seen.insert(target), "duplicate target for {y}");
    }
}

#[test]
fn only_date_and_target_vary() {
    let jobs = build_jobs(&RequestTemplate::default(), full_range());
    let first = &jobs[0].request;
    for job in &jobs[1..] {
        for key in FIXED_KEYS {
            assert_eq!(job.request.get(key), first.get(key), "{key} differs for {}", job.year);
        }
        assert_ne!(job.request.get("date"), first.get("date"));
        assert_ne!(job.request.get("target"), first.get("target"));
    }
}

#[test]
fn concrete_1980_request() {
    let jobs = build_jobs(&RequestTemplate::default(), full_range());
    let r = &jobs[0].request;
    assert_eq!(
        r.get_str("date").unwrap(),
        "19800101/19800201/19800301/19800401/19800501/19800601/19800701/19800801/19800901/19801001/19801101/19801201"
    );
    assert!(r
        .get_str("target")
        .unwrap()
        .ends_with("interim_1980-01-01to1980-12-01_.nc"));

    let payload = r.to_payload();
    assert_eq!(payload["class"], "ei");
    assert_eq!(payload["dataset"], "interim");
    assert_eq!(payload["expver"], "1");
    assert_eq!(payload["levtype"], "sfc");
    assert_eq!(payload["stream"], "moda");
    assert_eq!(payload["format"], "netcdf");
    assert!(payload.get("target").is_none());
}

/// Fails the first `flaky` attempts of every year with a transient error, then
/// writes the target.
struct FlakyRetriever {
    flaky: u32,
    calls: RefCell<Vec<i32>>,
}

impl Retriever for FlakyRetriever {
    fn retrieve(&self, request: &Request) -> Result<Transfer> {
        let year: i32 = request.get_str("date").unwrap()[..4].parse().unwrap();
        let mut calls = self.calls.borrow_mut();
        calls.push(year);
        let attempts_for_year = calls.iter().filter(|y| **y == year).count() as u32;
        if attempts_for_year <= self.flaky {
            return Err(Error::SizeMismatch {
                expected: 10,
                actual: 4,
            });
        }
        let target = PathBuf::from(request.get_str("target").unwrap());
        std::fs::create_dir_all(target.parent().unwrap())?;
        std::fs::write(&target, [0u8; 10])?;
        Ok(Transfer {
            target,
            href: "https://example.invalid/data".into(),
            size_bytes: 10,
        })
    }
}

#[test]
fn transient_failures_are_retried_and_ledger_resumes() {
    let dir = tempfile::tempdir().unwrap();
    let ledger_path = dir.path().join("ledger.json");
    let template = RequestTemplate {
        output_dir: dir.path().to_path_buf(),
        ..RequestTemplate::default()
    };
    let policy = RetryPolicy {
        max_attempts: 3,
        ..RetryPolicy::default()
    };

    let flaky = FlakyRetriever {
        flaky: 2,
        calls: RefCell::new(Vec::new()),
    };
    let mut ledger = Ledger::open(&ledger_path).unwrap();
    let report = BatchDriver::new(&flaky, policy.clone())
        .with_ledger(&mut ledger)
        .run_with_sleep(build_jobs(&template, YearRange::new(1990, 1992).unwrap()), |_| {})
        .unwrap();
    assert_eq!(report.downloaded(), 2);
    assert_eq!(*flaky.calls.borrow(), vec![1990, 1990, 1990, 1991, 1991, 1991]);

    // A restart over a wider range only touches the new year.
    let steady = FlakyRetriever {
        flaky: 0,
        calls: RefCell::new(Vec::new()),
    };
    let mut ledger = Ledger::open(&ledger_path).unwrap();
    let report = BatchDriver::new(&steady, policy)
        .with_ledger(&mut ledger)
        .with_options(DriverOptions::default())
        .run_with_sleep(build_jobs(&template, YearRange::new(1990, 1993).unwrap()), |_| {})
        .unwrap();
    assert_eq!(report.skipped(), 2);
    assert_eq!(*steady.calls.borrow(), vec![1992]);
    assert_eq!(ledger.len(), 3);
}

#[test]
fn exhausted_retries_stop_the_batch_with_year_context() {
    let flaky = FlakyRetriever {
        flaky: 5,
        calls: RefCell::new(Vec::new()),
    };
    let policy = RetryPolicy {
        max_attempts: 2,
        ..RetryPolicy::default()
    };
    let err = BatchDriver::new(&flaky, policy)
        .run_with_sleep(
            build_jobs(&RequestTemplate::default(), YearRange::new(2000, 2003).unwrap()),
            |_| {},
        )
        .unwrap_err();
    assert!(err.to_string().starts_with("year 2000: "), "{err}");
    assert_eq!(*flaky.calls.borrow(), vec![2000, 2000]);
}
