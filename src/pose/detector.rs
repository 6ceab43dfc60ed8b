use image::RgbaImage;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use super::keypoint::{Keypoint, KeypointName, Pose};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CaptureError {
    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),
    #[error("pose detector unavailable: {0}")]
    DetectorUnavailable(String),
    #[error("capture worker stopped unexpectedly")]
    WorkerDisconnected,
}

#[derive(Clone, Copy, Debug)]
pub struct PoseQuery {
    pub score_threshold: f32,
    pub max_poses: usize,
}

/// Continuously updating camera feed. Only frames are read here; permissions
/// and device selection belong to whoever builds the source.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<RgbaImage, CaptureError>;
}

/// Black-box keypoint detector returning zero or more people per frame,
/// keypoints in stage pixels.
pub trait PoseDetector: Send {
    fn estimate_poses(&mut self, frame: &RgbaImage, query: PoseQuery) -> Result<Vec<Pose>, CaptureError>;
}

/// Solid frame of the stage size, used when no camera is wired in.
pub struct BlankFrameSource {
    width: u32,
    height: u32,
}

impl BlankFrameSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl FrameSource for BlankFrameSource {
    fn next_frame(&mut self) -> Result<RgbaImage, CaptureError> {
        Ok(RgbaImage::from_pixel(
            self.width,
            self.height,
            image::Rgba([24, 28, 36, 255]),
        ))
    }
}

/// Stand-in detector: one person in a wide stance whose joints wobble a few
/// pixels per frame, with the face scored low the way real models often do.
pub struct SyntheticDetector {
    rng: SmallRng,
    jitter: f32,
}

impl SyntheticDetector {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            jitter: 2.0,
        }
    }

    fn base_joint(name: KeypointName, w: f32, h: f32) -> (f32, f32) {
        let (fx, fy) = match name {
            KeypointName::Nose => (0.50, 0.18),
            KeypointName::LeftEye => (0.49, 0.17),
            KeypointName::RightEye => (0.51, 0.17),
            KeypointName::LeftEar => (0.48, 0.18),
            KeypointName::RightEar => (0.52, 0.18),
            KeypointName::LeftShoulder => (0.44, 0.28),
            KeypointName::RightShoulder => (0.56, 0.28),
            KeypointName::LeftElbow => (0.34, 0.36),
            KeypointName::RightElbow => (0.66, 0.30),
            KeypointName::LeftWrist => (0.24, 0.42),
            KeypointName::RightWrist => (0.76, 0.26),
            KeypointName::LeftHip => (0.46, 0.55),
            KeypointName::RightHip => (0.54, 0.55),
            KeypointName::LeftKnee => (0.38, 0.70),
            KeypointName::RightKnee => (0.62, 0.70),
            KeypointName::LeftAnkle => (0.32, 0.86),
            KeypointName::RightAnkle => (0.68, 0.86),
        };
        (fx * w, fy * h)
    }
}

impl PoseDetector for SyntheticDetector {
    fn estimate_poses(&mut self, frame: &RgbaImage, query: PoseQuery) -> Result<Vec<Pose>, CaptureError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(CaptureError::DetectorUnavailable("empty input frame".to_string()));
        }
        if query.max_poses == 0 {
            return Ok(Vec::new());
        }
        let (w, h) = (frame.width() as f32, frame.height() as f32);
        let keypoints = KeypointName::ALL
            .iter()
            .map(|&name| {
                let (x, y) = Self::base_joint(name, w, h);
                let score = if name.is_face() {
                    self.rng.gen_range(0.1..0.5)
                } else {
                    self.rng.gen_range(0.6..0.95)
                };
                Keypoint::new(
                    name,
                    x + self.rng.gen_range(-self.jitter..=self.jitter),
                    y + self.rng.gen_range(-self.jitter..=self.jitter),
                    score,
                )
            })
            .collect();
        let pose = Pose::new(keypoints);
        if pose.average_score() < query.score_threshold {
            return Ok(Vec::new());
        }
        Ok(vec![pose])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::GameConfig;
    use crate::pose::PoseExtractor;

    #[test]
    fn synthetic_detector_produces_a_full_skeleton() {
        let mut source = BlankFrameSource::new(800, 600);
        let mut detector = SyntheticDetector::new(7);
        let frame = source.next_frame().unwrap();
        let query = PoseQuery {
            score_threshold: 0.3,
            max_poses: 3,
        };
        let poses = detector.estimate_poses(&frame, query).unwrap();
        assert_eq!(poses.len(), 1);
        assert_eq!(poses[0].keypoints.len(), KeypointName::COUNT);

        let segments = PoseExtractor::from_config(&GameConfig::default()).segments(&poses);
        assert_eq!(segments.len(), 12);
    }

    #[test]
    fn empty_frames_are_refused() {
        let frame = BlankFrameSource::new(0, 0).next_frame().unwrap();
        let query = PoseQuery {
            score_threshold: 0.0,
            max_poses: 1,
        };
        assert!(matches!(
            SyntheticDetector::new(1).estimate_poses(&frame, query),
            Err(CaptureError::DetectorUnavailable(_))
        ));
    }

    #[test]
    fn same_seed_same_poses() {
        let frame = BlankFrameSource::new(320, 240).next_frame().unwrap();
        let query = PoseQuery {
            score_threshold: 0.0,
            max_poses: 1,
        };
        let a = SyntheticDetector::new(42).estimate_poses(&frame, query).unwrap();
        let b = SyntheticDetector::new(42).estimate_poses(&frame, query).unwrap();
        assert_eq!(a, b);
    }
}
