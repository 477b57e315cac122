use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Geographic sub-area in MARS order: north/west/south/east, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub north: f64,
    pub west: f64,
    pub south: f64,
    pub east: f64,
}

impl BoundingBox {
    pub fn new(north: f64, west: f64, south: f64, east: f64) -> Result<Self> {
        for (name, lat) in [("north", north), ("south", south)] {
            if !(-90.0..=90.0).contains(&lat) {
                return Err(Error::InvalidRequest(format!(
                    "{name} latitude {lat} outside [-90, 90]"
                )));
            }
        }
        if north < south {
            return Err(Error::InvalidRequest(format!(
                "north {north} is below south {south}"
            )));
        }
        if !west.is_finite() || !east.is_finite() {
            return Err(Error::InvalidRequest("longitudes must be finite".into()));
        }
        Ok(Self {
            north,
            west,
            south,
            east,
        })
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}", self.north, self.west, self.south, self.east)
    }
}

impl FromStr for BoundingBox {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let v = parse_slash_floats(s, 4, "area")?;
        Self::new(v[0], v[1], v[2], v[3])
    }
}

/// Output grid spacing in degrees, latitude then longitude.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grid {
    pub dlat: f64,
    pub dlon: f64,
}

impl Grid {
    pub fn new(dlat: f64, dlon: f64) -> Result<Self> {
        if !(dlat > 0.0 && dlon > 0.0) {
            return Err(Error::InvalidRequest(format!(
                "grid spacing must be positive, got {dlat}/{dlon}"
            )));
        }
        Ok(Self { dlat, dlon })
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.dlat, self.dlon)
    }
}

impl FromStr for Grid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let v = parse_slash_floats(s, 2, "grid")?;
        Self::new(v[0], v[1])
    }
}

fn parse_slash_floats(s: &str, n: usize, what: &str) -> Result<Vec<f64>> {
    let parts: Vec<&str> = s.split('/').map(str::trim).collect();
    if parts.len() != n {
        return Err(Error::InvalidRequest(format!(
            "{what} must have {n} slash-separated values, got {s:?}"
        )));
    }
    parts
        .iter()
        .map(|p| {
            p.parse::<f64>()
                .map_err(|_| Error::InvalidRequest(format!("invalid {what} value {p:?} in {s:?}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn north_sea_box_renders_compactly() {
        let b = BoundingBox::new(55.0, 0.0, 50.0, 10.0).unwrap();
        assert_eq!(b.to_string(), "55/0/50/10");
        assert_eq!("55/0/50/10".parse::<BoundingBox>().unwrap(), b);
    }

    #[test]
    fn rejects_inverted_or_out_of_range_latitudes() {
        assert!(BoundingBox::new(50.0, 0.0, 55.0, 10.0).is_err());
        assert!(BoundingBox::new(95.0, 0.0, 50.0, 10.0).is_err());
        assert!("55/0/50".parse::<BoundingBox>().is_err());
        assert!("55/x/50/10".parse::<BoundingBox>().is_err());
    }

    #[test]
    fn grid_parses_and_renders() {
        let g: Grid = "0.125/0.125".parse().unwrap();
        assert_eq!(g.to_string(), "0.125/0.125");
        assert!("0/0.125".parse::<Grid>().is_err());
    }
}
