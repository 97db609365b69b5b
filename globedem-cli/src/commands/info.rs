use anyhow::{Context, Result};
use globedem::DatasetReader;

pub fn run(dataset: &DatasetReader) -> Result<()> {
    let info = dataset.info();
    let layout = dataset.layout();

    println!("Dataset: {}", info.path.display());
    println!("File size: {}", format_size(info.size_bytes));
    println!();
    println!(
        "Layout: {}x{} chunks, {}x{} degrees each, from {}N {}E",
        layout.columns(),
        layout.rows(),
        layout.span_lon(),
        layout.span_lat(),
        layout.north(),
        layout.west()
    );
    println!("Tile shape: {} samples", info.shape);
    match info.void_value {
        Some(void) => println!("Void value: {}", void),
        None => println!("Void value: none"),
    }
    if !info.missing.is_empty() {
        println!("Missing chunks: {}", info.missing.join(","));
    }
    println!();

    println!(
        "{:<5} {:>17} {:>19} {:>7} {:>7} {:>10}",
        "Chunk", "Latitude", "Longitude", "Min", "Max", "Void"
    );
    for code in &info.chunks {
        let stats = dataset
            .chunk_stats(code)
            .with_context(|| format!("Failed to scan chunk {}", code))?
            .with_context(|| format!("Chunk {} is not in the dataset", code))?;
        let slot = layout
            .slot_of(code)
            .with_context(|| format!("Unknown chunk {}", code))?;
        let bounds = layout.bounds(slot);

        let void_pct = stats.void_count as f64 / stats.samples as f64 * 100.0;
        println!(
            "{:<5} {:>7.1} .. {:>6.1} {:>8.1} .. {:>6.1} {:>7} {:>7} {:>9.1}%",
            code,
            bounds.south,
            bounds.north,
            bounds.west,
            bounds.east,
            format_elevation(stats.min),
            format_elevation(stats.max),
            void_pct
        );
    }

    Ok(())
}

fn format_elevation(value: Option<u16>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{}m", v))
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
