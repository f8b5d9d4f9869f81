use glam::Vec2;
use nalgebra as na;
use thiserror::Error;

/// Projective transform mapping source pixel coordinates to target pixel
/// coordinates, bottom-right element normalized to 1.
pub type Homography = na::Matrix3<f64>;

/// Salient image location with scale/orientation metadata.
#[derive(Debug, Clone, Copy)]
pub struct Keypoint {
    pub pos: Vec2,
    /// Scale of the pyramid octave the keypoint was detected at, relative to
    /// the original image (1.0 = full resolution).
    pub scale: f32,
    /// Orientation in radians.
    pub angle: f32,
    pub response: f32,
}

/// Descriptors for one image, parallel to its keypoint list.
#[derive(Debug, Clone)]
pub enum DescriptorSet {
    /// Row-major float vectors of dimension `dim` (primary detector).
    Float { dim: usize, data: Vec<f32> },
    /// 256-bit binary descriptors (fallback detector).
    Binary(Vec<[u8; 32]>),
}

impl DescriptorSet {
    pub fn len(&self) -> usize {
        match self {
            DescriptorSet::Float { dim, data } => {
                if *dim == 0 { 0 } else { data.len() / dim }
            }
            DescriptorSet::Binary(d) => d.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The `idx`-th float descriptor. Panics on a binary set.
    pub fn float_row(&self, idx: usize) -> &[f32] {
        match self {
            DescriptorSet::Float { dim, data } => &data[idx * dim..(idx + 1) * dim],
            DescriptorSet::Binary(_) => panic!("float_row on binary descriptor set"),
        }
    }
}

/// Keypoints and descriptors extracted from a single image.
#[derive(Debug, Clone)]
pub struct FeatureSet {
    pub keypoints: Vec<Keypoint>,
    pub descriptors: DescriptorSet,
}

impl FeatureSet {
    pub fn empty_float(dim: usize) -> Self {
        FeatureSet {
            keypoints: Vec::new(),
            descriptors: DescriptorSet::Float { dim, data: Vec::new() },
        }
    }

    pub fn empty_binary() -> Self {
        FeatureSet {
            keypoints: Vec::new(),
            descriptors: DescriptorSet::Binary(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

/// A correspondence between a source and a target keypoint.
#[derive(Debug, Clone, Copy)]
pub struct FeatureMatch {
    pub source_idx: usize,
    pub target_idx: usize,
    pub distance: f32,
}

/// Confidence grade of an estimated transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    /// Inlier ratio passed the gate; eligible for aggregation.
    Accepted,
    /// Matrix returned but inlier ratio below the gate (or forced by a
    /// sparse-match override); excluded from aggregation.
    LowConfidence,
}

/// Outcome of registering one image pair. Estimation failures are reported
/// through [`RegistrationError`], so the matrix here is always present.
#[derive(Debug, Clone)]
pub struct RegistrationResult {
    pub homography: Homography,
    pub inliers: usize,
    pub good_matches: usize,
    pub inlier_ratio: f64,
    pub quality: Quality,
}

/// Normalized bounding box: class id + center (x, y) + extent (w, h), all in
/// [0,1] relative to the owning image's dimensions. Transformed boxes may fall
/// outside [0,1]; no clipping is performed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub class_id: u32,
    pub cx: f64,
    pub cy: f64,
    pub w: f64,
    pub h: f64,
}

/// Error taxonomy for the registration pipeline. All variants except
/// [`RegistrationError::EmptyBatch`] are recoverable at the pair level: the
/// batch driver logs and continues with the next pair.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("missing input: {0}")]
    MissingInput(String),

    #[error(
        "insufficient features: source has {source_count}, target has {target_count} (need at least {required} each)"
    )]
    FeatureInsufficient {
        source_count: usize,
        target_count: usize,
        required: usize,
    },

    #[error("insufficient matches: {found} good matches (need at least {required})")]
    MatchInsufficient { found: usize, required: usize },

    #[error("homography estimation failed: {0}")]
    EstimationFailed(String),

    #[error("empty batch: no frame pairs to process")]
    EmptyBatch,

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl RegistrationError {
    /// Short stable name used for summary bucketing.
    pub fn kind(&self) -> &'static str {
        match self {
            RegistrationError::MissingInput(_) => "missing_input",
            RegistrationError::FeatureInsufficient { .. } => "feature_insufficient",
            RegistrationError::MatchInsufficient { .. } => "match_insufficient",
            RegistrationError::EstimationFailed(_) => "estimation_failed",
            RegistrationError::EmptyBatch => "empty_batch",
            RegistrationError::Image(_) => "image",
            RegistrationError::Io(_) => "io",
            RegistrationError::Json(_) => "json",
        }
    }
}
