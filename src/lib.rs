pub mod config;
pub mod data_loader;
pub mod driver;
pub mod features;
pub mod homography;
pub mod io;
pub mod labels;
pub mod matching;
pub mod types;
pub mod visualization;
