use anyhow::{Context, Result};
use globedem::{DatasetReader, TileShape};

/// Characters from lowest to highest elevation.
const RAMP: &[u8] = b" .:-=+*#%@";

pub fn run(dataset: &DatasetReader, shape: TileShape) -> Result<()> {
    let image = sample_image(shape, |lat, lon| match dataset.query(lat, lon) {
        Ok(elevation) => Ok(f64::from(elevation)),
        Err(e) if e.is_no_data() => Ok(0.0),
        Err(e) => Err(e),
    })
    .context("Failed to sample dataset")?;

    for line in render(&image) {
        println!("{}", line);
    }
    Ok(())
}

/// Sample `sqrt(max(0, elevation))` on a `shape` grid spanning 89N..89S and
/// one full turn of longitude starting just east of the antimeridian.
fn sample_image<F, E>(shape: TileShape, mut elevation: F) -> std::result::Result<Vec<Vec<f64>>, E>
where
    F: FnMut(f64, f64) -> std::result::Result<f64, E>,
{
    let (width, height) = (shape.width() as f64, shape.height() as f64);
    (0..shape.height())
        .map(|row| {
            let lat = 89.0 - 178.0 * row as f64 / height;
            (0..shape.width())
                .map(|col| {
                    let lon = (181.0 + 359.0 * col as f64 / width) % 360.0;
                    Ok(elevation(lat, lon)?.max(0.0).sqrt())
                })
                .collect()
        })
        .collect()
}

/// Map each value onto the character ramp, scaled by the image maximum.
fn render(image: &[Vec<f64>]) -> Vec<String> {
    let max = image.iter().flatten().copied().fold(0.0, f64::max);
    let top = RAMP.len() - 1;
    image
        .iter()
        .map(|row| {
            row.iter()
                .map(|&value| {
                    let index = if max > 0.0 {
                        ((RAMP.len() as f64 * value / max) as usize).min(top)
                    } else {
                        0
                    };
                    RAMP[index] as char
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_grid() {
        let mut seen = Vec::new();
        let image = sample_image::<_, ()>(TileShape::new(4, 2).unwrap(), |lat, lon| {
            seen.push((lat, lon));
            Ok(-5.0)
        })
        .unwrap();

        assert_eq!(image, vec![vec![0.0; 4]; 2]);
        assert_eq!(seen[0], (89.0, 181.0));
        assert_eq!(seen[3], (89.0, (181.0 + 359.0 * 0.75) % 360.0));
        assert_eq!(seen[4], (0.0, 181.0));
    }

    #[test]
    fn test_render_scale() {
        let lines = render(&[vec![0.0, 1.0, 5.0, 10.0]]);
        assert_eq!(lines, vec![" .+@"]);
    }

    #[test]
    fn test_render_flat_is_blank() {
        let lines = render(&[vec![0.0, 0.0], vec![0.0, 0.0]]);
        assert_eq!(lines, vec!["  ", "  "]);
    }
}
