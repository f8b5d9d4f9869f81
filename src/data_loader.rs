use std::path::{Path, PathBuf};

use glob::glob;
use image::{DynamicImage, ImageReader};

use crate::types::RegistrationError;

/// One modality-paired frame: a shared frame id with modality-specific
/// filename suffixes, plus the optional label file for the source side.
#[derive(Debug, Clone)]
pub struct FramePair {
    pub frame_id: String,
    pub source_path: PathBuf,
    pub target_path: PathBuf,
    pub label_path: Option<PathBuf>,
}

fn img_filter(rp: glob::GlobResult, suffix: &str) -> Option<PathBuf> {
    if let Ok(p) = rp {
        for ext in &[".png", ".jpg"] {
            if p.as_os_str()
                .to_string_lossy()
                .ends_with(&format!("{suffix}{ext}"))
            {
                return Some(p);
            }
        }
    }
    None
}

/// Resolves the target-side image for a frame id, preferring `.png` over
/// `.jpg`. A path is returned even when neither exists; the load step reports
/// the missing file so the batch driver can count it.
fn resolve_target(target_dir: &Path, frame_id: &str, target_suffix: &str) -> PathBuf {
    let png = target_dir.join(format!("{frame_id}{target_suffix}.png"));
    if png.exists() {
        return png;
    }
    let jpg = target_dir.join(format!("{frame_id}{target_suffix}.jpg"));
    if jpg.exists() { jpg } else { png }
}

/// Discovers modality pairs by globbing the source directory for
/// `*{source_suffix}.png|jpg`, sorted by frame id.
pub fn discover_pairs(
    source_dir: &Path,
    target_dir: &Path,
    label_dir: Option<&Path>,
    source_suffix: &str,
    target_suffix: &str,
) -> Result<Vec<FramePair>, RegistrationError> {
    let pattern = format!("{}/*", source_dir.display());
    let paths =
        glob(&pattern).map_err(|e| RegistrationError::MissingInput(format!("{pattern}: {e}")))?;
    let mut source_paths: Vec<PathBuf> = paths
        .into_iter()
        .filter_map(|rp| img_filter(rp, source_suffix))
        .collect();
    source_paths.sort();

    let pairs = source_paths
        .into_iter()
        .filter_map(|source_path| {
            let stem = source_path.file_stem()?.to_string_lossy().to_string();
            let frame_id = stem.strip_suffix(source_suffix)?.to_string();
            let target_path = resolve_target(target_dir, &frame_id, target_suffix);
            let label_path = label_dir.map(|d| d.join(format!("{frame_id}{source_suffix}.txt")));
            Some(FramePair {
                frame_id,
                source_path,
                target_path,
                label_path,
            })
        })
        .collect();
    Ok(pairs)
}

/// Loads an image, reporting a missing file as [`RegistrationError::MissingInput`].
pub fn load_image(path: &Path) -> Result<DynamicImage, RegistrationError> {
    if !path.exists() {
        return Err(RegistrationError::MissingInput(path.display().to_string()));
    }
    Ok(ImageReader::open(path)?.decode()?)
}
