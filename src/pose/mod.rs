//! Pose-to-platform pipeline: keypoint filtering, segment dedup, extraction,
//! and the detector seam the capture worker drives.

pub mod dedup;
pub mod detector;
pub mod extract;
pub mod filter;
pub mod keypoint;

pub use detector::{BlankFrameSource, FrameSource, PoseDetector, PoseQuery, SyntheticDetector};
pub use extract::{PlatformBody, PoseExtractor};
pub use keypoint::Pose;
