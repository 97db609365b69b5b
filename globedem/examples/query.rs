//! Query a few well-known summits from an assembled dataset.
//!
//! Run with: cargo run --example query -- /path/to/dataset

use globedem::{DatasetReader, DemError};
use std::env;

fn main() -> Result<(), DemError> {
    let path = env::args().nth(1).unwrap_or_else(|| {
        eprintln!("Usage: cargo run --example query -- /path/to/dataset");
        std::process::exit(1);
    });

    let dataset = DatasetReader::builder(&path).open()?;

    let locations = [
        ("Mount Fuji, Japan", 35.3606, 138.7274),
        ("Mount Everest, Nepal", 27.9881, 86.9250),
        ("Denali, Alaska", 63.0695, -151.0074),
        ("Aconcagua, Argentina", -32.6532, -70.0109),
    ];

    println!("{:<24} {:>8} {:>12}", "Location", "Nearest", "Interpolated");
    println!("{:-<46}", "");

    for (name, lat, lon) in &locations {
        let nearest = match dataset.query(*lat, *lon) {
            Ok(elevation) => format!("{}m", elevation),
            Err(e) if e.is_no_data() => "no data".to_string(),
            Err(e) => return Err(e),
        };
        let interpolated = match dataset.query_interpolated(*lat, *lon) {
            Ok(elevation) => format!("{:.1}m", elevation),
            Err(e) if e.is_no_data() => "no data".to_string(),
            Err(e) => return Err(e),
        };
        println!("{:<24} {:>8} {:>12}", name, nearest, interpolated);
    }

    Ok(())
}
