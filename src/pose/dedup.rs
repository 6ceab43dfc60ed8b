use std::collections::HashSet;

use crate::components::{LineSegment, Point};

/// Grid cell of a quantized point. Cell `(i, j)` stands for `(i * step, j * step)`.
pub type GridCell = (i32, i32);

/// Order-invariant identity of a segment after quantization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SegmentKey(GridCell, GridCell);

/// Snap a point to the nearest multiple of `step`.
pub fn quantize(p: Point, step: f32) -> GridCell {
    let step = step.max(f32::EPSILON);
    ((p.x / step).round() as i32, (p.y / step).round() as i32)
}

/// `segment_key(a, b) == segment_key(b, a)` for every pair.
pub fn segment_key(a: Point, b: Point, step: f32) -> SegmentKey {
    let qa = quantize(a, step);
    let qb = quantize(b, step);
    if qa <= qb {
        SegmentKey(qa, qb)
    } else {
        SegmentKey(qb, qa)
    }
}

/// Seen-set of quantized segments. Keeps the first segment seen per key.
#[derive(Clone, Debug)]
pub struct SegmentDeduper {
    step: f32,
    seen: HashSet<SegmentKey>,
}

impl SegmentDeduper {
    pub fn new(step: f32) -> Self {
        Self {
            step,
            seen: HashSet::new(),
        }
    }

    /// Returns false when an equivalent segment was already inserted.
    pub fn insert(&mut self, segment: &LineSegment) -> bool {
        self.seen
            .insert(segment_key(segment.start, segment.end, self.step))
    }
}

pub fn dedupe_segments(segments: impl IntoIterator<Item = LineSegment>, step: f32) -> Vec<LineSegment> {
    let mut deduper = SegmentDeduper::new(step);
    segments
        .into_iter()
        .filter(|s| deduper.insert(s))
        .collect()
}
