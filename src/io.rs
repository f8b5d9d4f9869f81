use std::io::Write;
use std::path::Path;

use nalgebra as na;
use serde::{Deserialize, Serialize};

use crate::driver::RunSummary;
use crate::types::{Homography, RegistrationError};

/// On-disk form of a 3x3 transform: 9 row-major values.
#[derive(Debug, Serialize, Deserialize)]
struct HomographyRecord {
    rows: usize,
    cols: usize,
    data: [f64; 9],
}

pub fn write_homography_json(path: &Path, h: &Homography) -> Result<(), RegistrationError> {
    let mut data = [0.0f64; 9];
    for r in 0..3 {
        for c in 0..3 {
            data[r * 3 + c] = h[(r, c)];
        }
    }
    let record = HomographyRecord { rows: 3, cols: 3, data };
    let mut file = std::fs::File::create(path)?;
    file.write_all(serde_json::to_string_pretty(&record)?.as_bytes())?;
    Ok(())
}

pub fn read_homography_json(path: &Path) -> Result<Homography, RegistrationError> {
    let contents = std::fs::read_to_string(path)?;
    let record: HomographyRecord = serde_json::from_str(&contents)?;
    if record.rows != 3 || record.cols != 3 {
        return Err(RegistrationError::MissingInput(format!(
            "{}: expected a 3x3 matrix, got {}x{}",
            path.display(),
            record.rows,
            record.cols
        )));
    }
    Ok(na::Matrix3::from_row_slice(&record.data))
}

/// Plain-text run report, one section per outcome bucket.
pub fn write_summary_report(path: &Path, summary: &RunSummary) -> Result<(), RegistrationError> {
    let mut s = String::new();
    s += format!("Frame pairs attempted: {}\n\n", summary.attempted).as_str();
    s += format!("accepted:             {}\n", summary.accepted).as_str();
    s += format!("low confidence:       {}\n", summary.low_confidence).as_str();
    s += format!("missing input:        {}\n", summary.missing_input).as_str();
    s += format!("feature insufficient: {}\n", summary.feature_insufficient).as_str();
    s += format!("match insufficient:   {}\n", summary.match_insufficient).as_str();
    s += format!("estimation failed:    {}\n\n", summary.estimation_failed).as_str();
    if let Some(mean) = summary.mean_inlier_ratio {
        s += format!("mean inlier ratio over accepted pairs: {:.4}\n", mean).as_str();
    }
    if !summary.failed_frames.is_empty() {
        s += "\nfailed frames:\n";
        for f in &summary.failed_frames {
            s += format!("    {}\n", f).as_str();
        }
    }
    let mut file = std::fs::File::create(path)?;
    file.write_all(s.as_bytes())?;
    Ok(())
}

pub fn write_summary_json(path: &Path, summary: &RunSummary) -> Result<(), RegistrationError> {
    let mut file = std::fs::File::create(path)?;
    file.write_all(serde_json::to_string_pretty(summary)?.as_bytes())?;
    Ok(())
}
