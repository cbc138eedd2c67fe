//! Load cell range tables
//!
//! Each controller family reports the fitted load cell as a type code in
//! response to `RC`. The code maps to the cell's rated range in Newtons.
//! An unknown code is an error: guessing a range would silently report
//! wrong physical units.

use super::DeviceFamily;
use crate::error::{LoadFrameError, Result};

/// H5K-series load cells: (type code, rated range in N)
pub const H5K_LOAD_CELLS: &[(&str, f64)] = &[
    ("1", 10.0),
    ("2", 25.0),
    ("3", 50.0),
    ("4", 100.0),
    ("5", 250.0),
    ("6", 500.0),
    ("7", 1000.0),
    ("8", 2500.0),
    ("9", 5000.0),
];

/// 1000-series load cells: (type code, rated range in N)
pub const SERIES_1000_LOAD_CELLS: &[(&str, f64)] = &[
    ("1", 500.0),
    ("2", 1000.0),
    ("3", 2500.0),
    ("4", 5000.0),
    ("5", 10000.0),
    ("6", 25000.0),
];

/// The range table for a family
pub fn table(family: DeviceFamily) -> &'static [(&'static str, f64)] {
    match family {
        DeviceFamily::H5k => H5K_LOAD_CELLS,
        DeviceFamily::Series1000 => SERIES_1000_LOAD_CELLS,
    }
}

/// Look up the rated range in Newtons for a reported type code
pub fn lookup(family: DeviceFamily, code: &str) -> Result<f64> {
    let code = code.trim();
    table(family)
        .iter()
        .find(|(known, _)| *known == code)
        .map(|&(_, range)| range)
        .ok_or_else(|| LoadFrameError::RangeLookup {
            family,
            code: code.to_string(),
        })
}
