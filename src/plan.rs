use std::path::{Path, PathBuf};

use crate::area::{BoundingBox, Grid};
use crate::date::{monthly_date_field, YearRange};
use crate::request::Request;

/// Request keywords that stay fixed across every year of a batch.
///
/// Only `date` and `target` depend on the year; everything else is copied
/// verbatim into each descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestTemplate {
    pub class: String,
    pub dataset: String,
    pub expver: String,
    pub grid: Grid,
    pub levtype: String,
    pub params: Vec<String>,
    pub stream: String,
    pub kind: String,
    pub area: BoundingBox,
    pub format: String,
    pub output_dir: PathBuf,
    pub file_prefix: String,
    pub extension: String,
}

impl Default for RequestTemplate {
    /// ERA-Interim monthly means of 10 m wind components over the southern North Sea.
    fn default() -> Self {
        Self {
            class: "ei".to_string(),
            dataset: "interim".to_string(),
            expver: "1".to_string(),
            grid: Grid {
                dlat: 0.125,
                dlon: 0.125,
            },
            levtype: "sfc".to_string(),
            params: vec!["165.128".to_string(), "166.128".to_string()],
            stream: "moda".to_string(),
            kind: "an".to_string(),
            area: BoundingBox {
                north: 55.0,
                west: 0.0,
                south: 50.0,
                east: 10.0,
            },
            format: "netcdf".to_string(),
            output_dir: PathBuf::from("data/era-interim/raw"),
            file_prefix: "interim".to_string(),
            extension: "nc".to_string(),
        }
    }
}

impl RequestTemplate {
    /// `<output_dir>/<prefix>_<Y>-01-01to<Y>-12-01_.<ext>`
    pub fn target_path(&self, year: i32) -> PathBuf {
        self.output_dir.join(format!(
            "{prefix}_{year}-01-01to{year}-12-01_.{ext}",
            prefix = self.file_prefix,
            ext = self.extension
        ))
    }

    /// Build the descriptor for one year. Pure: no I/O, no failure path.
    pub fn descriptor(&self, year: i32) -> Request {
        Request::new()
            .class(&self.class)
            .dataset(&self.dataset)
            .date(monthly_date_field(year))
            .expver(&self.expver)
            .grid(self.grid.to_string())
            .levtype(&self.levtype)
            .param(self.params.as_slice())
            .stream(&self.stream)
            .r#type(&self.kind)
            .area(self.area.to_string())
            .format(&self.format)
            .target(path_string(&self.target_path(year)))
    }
}

/// One year's retrieval job.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub year: i32,
    pub request: Request,
}

impl Job {
    pub fn target(&self) -> PathBuf {
        PathBuf::from(self.request.get_str("target").unwrap_or_default())
    }
}

/// Exactly one job per year in `years`, ascending.
pub fn build_jobs(template: &RequestTemplate, years: YearRange) -> Vec<Job> {
    years
        .into_iter()
        .map(|year| Job {
            year,
            request: template.descriptor(year),
        })
        .collect()
}

fn path_string(p: &Path) -> String {
    p.to_string_lossy().into_owned()
}
