use anyhow::{Context, Result};
use globedem::DatasetReader;
use serde::Serialize;

#[derive(Serialize)]
struct ElevationResponse {
    lat: f64,
    lon: f64,
    elevation: Option<f64>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    interpolated: bool,
}

pub fn run(dataset: &DatasetReader, lat: f64, lon: f64, interpolate: bool, json: bool) -> Result<()> {
    let result = if interpolate {
        dataset.query_interpolated(lat, lon)
    } else {
        dataset.query(lat, lon).map(f64::from)
    };

    // No data is an answer, not a failure
    let elevation = match result {
        Ok(elevation) => Some(elevation),
        Err(e) if e.is_no_data() => None,
        Err(e) => return Err(e).context("Failed to get elevation"),
    };

    if json {
        let response = ElevationResponse {
            lat,
            lon,
            elevation,
            interpolated: interpolate,
        };
        println!("{}", serde_json::to_string(&response)?);
    } else {
        match elevation {
            None => println!("no data"),
            Some(elev) if interpolate => println!("{:.2}", elev),
            Some(elev) => println!("{}", elev as u16),
        }
    }

    Ok(())
}
