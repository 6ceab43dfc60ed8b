use bevy::prelude::*;

use super::dedup::dedupe_segments;
use super::filter::{raw_segments, FilterParams};
use super::keypoint::{limb_edge_indices, Pose};
use crate::components::{GameConfig, LineSegment, Platform, PlatformKind};

/// Thin static rectangle a physics world builds for one platform segment.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlatformBody {
    pub center: Vec2,
    pub length: f32,
    pub angle: f32,
    pub thickness: f32,
}

impl PlatformBody {
    pub fn from_segment(segment: &LineSegment, thickness: f32) -> Self {
        Self {
            center: segment.midpoint(),
            length: segment.length(),
            angle: segment.angle(),
            thickness,
        }
    }

    pub fn half_extents(&self) -> Vec2 {
        Vec2::new(self.length * 0.5, self.thickness * 0.5)
    }

    /// Point-in-rectangle test in stage space.
    pub fn contains(&self, point: Vec2) -> bool {
        let local = Vec2::from_angle(-self.angle).rotate(point - self.center);
        let half = self.half_extents();
        local.x.abs() <= half.x && local.y.abs() <= half.y
    }
}

/// Filter → pair → dedup for one camera frame.
#[derive(Clone, Debug)]
pub struct PoseExtractor {
    params: FilterParams,
    edges: Vec<(usize, usize)>,
    quantize_step: f32,
    thickness: f32,
}

impl PoseExtractor {
    pub fn from_config(config: &GameConfig) -> Self {
        Self {
            params: FilterParams::from(config),
            edges: limb_edge_indices(),
            quantize_step: config.quantize_step,
            thickness: config.platform_thickness,
        }
    }

    pub fn segments(&self, poses: &[Pose]) -> Vec<LineSegment> {
        let segments = dedupe_segments(raw_segments(poses, &self.edges, &self.params), self.quantize_step);
        debug!(
            "[Posejump extract] {} poses -> {} platform segments",
            poses.len(),
            segments.len()
        );
        segments
    }

    pub fn temporary_platforms(&self, poses: &[Pose]) -> Vec<Platform> {
        self.segments(poses)
            .into_iter()
            .map(|s| Platform::from_segment(s, self.thickness, PlatformKind::Temporary))
            .collect()
    }
}
