use bevy::prelude::*;

use super::keypoint::Pose;
use crate::components::{GameConfig, LineSegment};

/// Thresholds for turning detected poses into raw limb segments.
#[derive(Clone, Copy, Debug)]
pub struct FilterParams {
    pub max_people: usize,
    /// Inclusive: a joint scoring exactly this value is kept.
    pub min_keypoint_score: f32,
    /// Inclusive: a limb exactly this long is kept.
    pub min_segment_length: f32,
    pub stage: Vec2,
}

impl From<&GameConfig> for FilterParams {
    fn from(config: &GameConfig) -> Self {
        Self {
            max_people: config.max_people,
            min_keypoint_score: config.min_keypoint_score,
            min_segment_length: config.min_segment_length,
            stage: config.stage_size(),
        }
    }
}

impl Default for FilterParams {
    fn default() -> Self {
        Self::from(&GameConfig::default())
    }
}

/// Up to `max_people` poses ranked by mean keypoint score, best first.
/// Ties keep detector order.
pub fn select_confident_poses(poses: &[Pose], max_people: usize) -> Vec<&Pose> {
    let mut ranked: Vec<(f32, &Pose)> = poses.iter().map(|p| (p.average_score(), p)).collect();
    ranked.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    ranked.into_iter().take(max_people).map(|(_, p)| p).collect()
}

fn inside_stage(p: Vec2, stage: Vec2) -> bool {
    p.x >= 0.0 && p.y >= 0.0 && p.x <= stage.x && p.y <= stage.y
}

/// Limb segments from the most confident poses, before dedup.
pub fn raw_segments(poses: &[Pose], edges: &[(usize, usize)], params: &FilterParams) -> Vec<LineSegment> {
    let mut out = Vec::new();
    for pose in select_confident_poses(poses, params.max_people) {
        for &(i, j) in edges {
            let (Some(a), Some(b)) = (pose.get(i), pose.get(j)) else {
                continue;
            };
            if a.name.is_face() || b.name.is_face() {
                continue;
            }
            if a.score < params.min_keypoint_score || b.score < params.min_keypoint_score {
                continue;
            }
            let (pa, pb) = (a.position(), b.position());
            if pa.distance(pb) < params.min_segment_length {
                continue;
            }
            if !inside_stage(pa, params.stage) || !inside_stage(pb, params.stage) {
                continue;
            }
            out.push(LineSegment::new(pa, pb));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::keypoint::{Keypoint, KeypointName};

    fn pose_with(points: &[(KeypointName, f32, f32, f32)]) -> Pose {
        let mut keypoints: Vec<Keypoint> = KeypointName::ALL
            .iter()
            .map(|&n| Keypoint::new(n, 0.0, 0.0, 0.0))
            .collect();
        for &(name, x, y, score) in points {
            keypoints[name.index()] = Keypoint::new(name, x, y, score);
        }
        Pose::new(keypoints)
    }

    fn arm(score: f32) -> Pose {
        pose_with(&[
            (KeypointName::LeftElbow, 100.0, 100.0, score),
            (KeypointName::LeftWrist, 160.0, 100.0, score),
        ])
    }

    fn arm_edge() -> Vec<(usize, usize)> {
        vec![(KeypointName::LeftElbow.index(), KeypointName::LeftWrist.index())]
    }

    #[test]
    fn face_edges_are_dropped_even_when_confident() {
        let pose = pose_with(&[
            (KeypointName::Nose, 100.0, 100.0, 1.0),
            (KeypointName::LeftEye, 100.0, 200.0, 1.0),
            (KeypointName::LeftEar, 300.0, 100.0, 1.0),
            (KeypointName::LeftShoulder, 300.0, 300.0, 1.0),
        ]);
        let edges = vec![
            (KeypointName::Nose.index(), KeypointName::LeftEye.index()),
            (KeypointName::LeftEar.index(), KeypointName::LeftShoulder.index()),
        ];
        assert!(raw_segments(&[pose], &edges, &FilterParams::default()).is_empty());
    }

    #[test]
    fn confidence_floor_is_inclusive() {
        let params = FilterParams::default();
        let below = raw_segments(&[arm(params.min_keypoint_score - 1e-4)], &arm_edge(), &params);
        assert!(below.is_empty());
        let at = raw_segments(&[arm(params.min_keypoint_score)], &arm_edge(), &params);
        assert_eq!(at.len(), 1);
    }

    #[test]
    fn short_limbs_are_dropped() {
        let pose = pose_with(&[
            (KeypointName::LeftElbow, 100.0, 100.0, 0.9),
            (KeypointName::LeftWrist, 110.0, 100.0, 0.9),
        ]);
        assert!(raw_segments(&[pose], &arm_edge(), &FilterParams::default()).is_empty());
    }

    #[test]
    fn off_stage_limbs_are_dropped() {
        let pose = pose_with(&[
            (KeypointName::LeftElbow, 780.0, 100.0, 0.9),
            (KeypointName::LeftWrist, 840.0, 100.0, 0.9),
        ]);
        assert!(raw_segments(&[pose], &arm_edge(), &FilterParams::default()).is_empty());
    }

    #[test]
    fn keeps_only_the_most_confident_people() {
        let poses = vec![arm(0.4), arm(0.9), arm(0.6), arm(0.5)];
        let picked = select_confident_poses(&poses, 3);
        let scores: Vec<f32> = picked.iter().map(|p| p.keypoints[KeypointName::LeftElbow.index()].score).collect();
        assert_eq!(scores, vec![0.9, 0.6, 0.5]);
    }

    #[test]
    fn ties_keep_detector_order() {
        let mut first = arm(0.8);
        first.keypoints[KeypointName::LeftElbow.index()].x = 1.0;
        let second = arm(0.8);
        let poses = vec![first, second];
        let picked = select_confident_poses(&poses, 1);
        assert_eq!(picked[0].keypoints[KeypointName::LeftElbow.index()].x, 1.0);
    }
}
