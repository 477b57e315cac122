use chrono::{Datelike, NaiveDate};

use crate::error::{Error, Result};

/// Closed-open range of calendar years, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearRange {
    start: i32,
    end: i32,
}

impl YearRange {
    pub fn new(start: i32, end: i32) -> Result<Self> {
        if end <= start {
            return Err(Error::InvalidRequest(format!(
                "year range end {end} must be greater than start {start}"
            )));
        }
        // chrono's NaiveDate covers roughly +/- 262000 years.
        if NaiveDate::from_ymd_opt(start, 1, 1).is_none()
            || NaiveDate::from_ymd_opt(end - 1, 12, 1).is_none()
        {
            return Err(Error::InvalidRequest(format!(
                "year range {start}..{end} is outside the supported calendar"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> i32 {
        self.start
    }

    pub fn end(&self) -> i32 {
        self.end
    }

    pub fn len(&self) -> usize {
        (self.end - self.start) as usize
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, year: i32) -> bool {
        (self.start..self.end).contains(&year)
    }

    pub fn iter(&self) -> std::ops::Range<i32> {
        self.start..self.end
    }
}

impl IntoIterator for YearRange {
    type Item = i32;
    type IntoIter = std::ops::Range<i32>;

    fn into_iter(self) -> Self::IntoIter {
        self.start..self.end
    }
}

pub fn yyyymmdd(date: &NaiveDate) -> String {
    format!("{:04}{:02}{:02}", date.year(), date.month(), date.day())
}

/// The first day of each month of `year`, January through December.
///
/// Callers go through [`YearRange`], which guarantees the year is representable.
pub fn month_starts(year: i32) -> Vec<NaiveDate> {
    (1..=12)
        .filter_map(|m| NaiveDate::from_ymd_opt(year, m, 1))
        .collect()
}

/// MARS `date` value for a year of monthly means: `Y0101/Y0201/.../Y1201`.
pub fn monthly_date_field(year: i32) -> String {
    month_starts(year)
        .iter()
        .map(yyyymmdd)
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_range_is_closed_open() {
        let r = YearRange::new(1980, 2020).unwrap();
        assert_eq!(r.len(), 40);
        assert!(r.contains(1980));
        assert!(r.contains(2019));
        assert!(!r.contains(2020));
        assert_eq!(r.iter().last(), Some(2019));
    }

    #[test]
    fn year_range_rejects_empty_and_reversed() {
        assert!(YearRange::new(2000, 2000).is_err());
        assert!(YearRange::new(2020, 1980).is_err());
    }

    #[test]
    fn date_field_for_1980() {
        assert_eq!(
            monthly_date_field(1980),
            "19800101/19800201/19800301/19800401/19800501/19800601/\
             19800701/19800801/19800901/19801001/19801101/19801201"
        );
    }

    #[test]
    fn date_field_has_twelve_month_starts_for_every_year() {
        for year in YearRange::new(1980, 2020).unwrap() {
            let field = monthly_date_field(year);
            let parts: Vec<&str> = field.split('/').collect();
            assert_eq!(parts.len(), 12);
            for (i, p) in parts.iter().enumerate() {
                assert_eq!(*p, format!("{year}{:02}01", i + 1));
            }
        }
    }
}
