//! Load-cell calibration: `raw = tare_offset + calibration_factor * grams`.
use serde::Deserialize;

/// Calibration CSV schema.
///
/// Expected headers:
/// raw,grams
///
/// Example:
/// raw,grams
/// 8000,0
/// 48040,100
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct CalibrationRow {
    pub raw: i64,
    pub grams: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    /// Raw counts per gram; negative for a reversed load cell.
    pub calibration_factor: f32,
    /// Raw counts with an empty platform.
    pub tare_offset: i32,
}

impl TryFrom<Vec<CalibrationRow>> for Calibration {
    type Error = eyre::Report;
    fn try_from(rows: Vec<CalibrationRow>) -> eyre::Result<Self> {
        Calibration::from_rows(rows)
    }
}

impl Calibration {
    /// Fit factor and tare from reference rows (known weight vs raw reading).
    ///
    /// Rows must list strictly increasing weights. One refit drops points
    /// further than 2 RMS from the first line.
    pub fn from_rows(rows: Vec<CalibrationRow>) -> eyre::Result<Self> {
        if rows.len() < 2 {
            eyre::bail!("calibration requires at least two rows, got {}", rows.len());
        }
        for (i, pair) in rows.windows(2).enumerate() {
            if !pair[0].grams.is_finite() || !pair[1].grams.is_finite() {
                eyre::bail!("calibration grams must be finite (row {})", i + 2);
            }
            if pair[1].grams <= pair[0].grams {
                eyre::bail!(
                    "calibration grams must be strictly increasing (rows {} and {})",
                    i + 2,
                    i + 3
                );
            }
        }

        let pts: Vec<(f64, f64)> = rows
            .iter()
            .map(|r| (f64::from(r.grams), r.raw as f64))
            .collect();
        let (slope0, icpt0) = fit_line(&pts)?;

        let sumsq: f64 = pts
            .iter()
            .map(|(x, y)| (y - (slope0 * x + icpt0)).powi(2))
            .sum();
        let rms = (sumsq / pts.len() as f64).sqrt();

        let (slope, icpt) = refit_inliers(&pts, slope0, icpt0, rms, 2.0).unwrap_or((slope0, icpt0));

        if !icpt.is_finite() || icpt.abs() > f64::from(i32::MAX) {
            eyre::bail!("calibration produced invalid tare offset");
        }
        Ok(Calibration {
            calibration_factor: slope as f32,
            tare_offset: icpt.round() as i32,
        })
    }
}

/// Ordinary least squares for y = slope * x + intercept.
fn fit_line(pts: &[(f64, f64)]) -> eyre::Result<(f64, f64)> {
    let n = pts.len() as f64;
    let mean_x = pts.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pts.iter().map(|p| p.1).sum::<f64>() / n;
    let mut sxx = 0.0f64;
    let mut sxy = 0.0f64;
    for (x, y) in pts {
        sxx += (x - mean_x) * (x - mean_x);
        sxy += (x - mean_x) * (y - mean_y);
    }
    if !sxx.is_finite() || sxx == 0.0 {
        eyre::bail!("calibration cannot determine slope (degenerate weight variance)");
    }
    let slope = sxy / sxx;
    if !slope.is_finite() {
        eyre::bail!("calibration produced non-finite slope");
    }
    if slope == 0.0 {
        eyre::bail!("calibration produced zero slope (invalid calibration factor)");
    }
    Ok((slope, mean_y - slope * mean_x))
}

/// Refit over points within `k * rms` of the initial line. `None` keeps the
/// initial fit (nothing rejected, too few inliers or a degenerate refit).
fn refit_inliers(pts: &[(f64, f64)], slope: f64, icpt: f64, rms: f64, k: f64) -> Option<(f64, f64)> {
    if !(rms.is_finite() && rms > 0.0) {
        return None;
    }
    let thr = k * rms;
    let inliers: Vec<(f64, f64)> = pts
        .iter()
        .copied()
        .filter(|(x, y)| (y - (slope * x + icpt)).abs() <= thr)
        .collect();
    if inliers.len() == pts.len() || inliers.len() < 2 {
        return None;
    }
    fit_line(&inliers).ok()
}

pub fn load_calibration_csv(path: &std::path::Path) -> eyre::Result<Calibration> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open calibration CSV {:?}: {}", path, e))?;

    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let actual: Vec<&str> = headers.iter().collect();
    if actual != ["raw", "grams"] {
        eyre::bail!(
            "calibration CSV must have headers 'raw,grams', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<CalibrationRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => eyre::bail!("invalid CSV row {}: {}", idx + 2, e),
        }
    }

    Calibration::try_from(rows)
}
