//! Swept separating-axis tests for the continuous point-mass path.

use glam::{Mat3, Quat, Vec3};

use crate::utils::allocator::EntityId;

const PARALLEL_EPSILON: f32 = 1e-6;

/// Earliest impact between two bodies within a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionPair {
    /// Time of impact from the start of the remaining frame.
    pub time: f32,
    /// Reflection normal for the first body, pointing from the second body toward it.
    pub normal_for_a: Vec3,
    pub bodies: [EntityId; 2],
}

/// Oriented box moving with constant linear velocity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweptBox {
    pub center: Vec3,
    pub axes: [Vec3; 3],
    pub half_extents: Vec3,
    pub velocity: Vec3,
}

/// Time window during which the projections onto one axis overlap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisInterval {
    pub close: f32,
    pub open: f32,
    pub normal_for_a: Vec3,
}

impl SweptBox {
    pub fn new(center: Vec3, rotation: Quat, half_extents: Vec3, velocity: Vec3) -> Self {
        let basis = Mat3::from_quat(rotation);
        Self {
            center,
            axes: [basis.x_axis, basis.y_axis, basis.z_axis],
            half_extents,
            velocity,
        }
    }

    /// Half-length of the box projected onto `axis`.
    pub fn radius_along(&self, axis: Vec3) -> f32 {
        self.axes
            .iter()
            .zip(self.half_extents.to_array())
            .map(|(local, extent)| local.dot(axis).abs() * extent)
            .sum()
    }
}

/// Face normals of both boxes plus the edge-edge cross products.
fn candidate_axes(a: &SweptBox, b: &SweptBox) -> impl Iterator<Item = Vec3> {
    let (axes_a, axes_b) = (a.axes, b.axes);
    let faces = axes_a.into_iter().chain(axes_b);
    let edges = axes_a
        .into_iter()
        .flat_map(move |ea| axes_b.into_iter().map(move |eb| ea.cross(eb)))
        .filter_map(|axis| {
            (axis.length_squared() > PARALLEL_EPSILON).then(|| axis.normalize())
        });
    faces.chain(edges)
}

/// Overlap window of the two projections on `axis`, or `None` when they never meet.
pub fn axis_check(a: &SweptBox, b: &SweptBox, axis: Vec3) -> Option<AxisInterval> {
    let separation = (b.center - a.center).dot(axis);
    let closing = (b.velocity - a.velocity).dot(axis);
    let reach = a.radius_along(axis) + b.radius_along(axis);
    let normal_for_a = if separation >= 0.0 { -axis } else { axis };

    if closing.abs() < PARALLEL_EPSILON {
        if separation.abs() > reach {
            return None;
        }
        return Some(AxisInterval {
            close: f32::NEG_INFINITY,
            open: f32::INFINITY,
            normal_for_a,
        });
    }

    let t1 = (-reach - separation) / closing;
    let t2 = (reach - separation) / closing;
    Some(AxisInterval {
        close: t1.min(t2),
        open: t1.max(t2),
        normal_for_a,
    })
}

/// First time in `[0, horizon]` at which the moving boxes touch while approaching.
pub fn time_of_impact(a: &SweptBox, b: &SweptBox, horizon: f32) -> Option<(f32, Vec3)> {
    let mut latest_close = f32::NEG_INFINITY;
    let mut earliest_open = f32::INFINITY;
    let mut normal_for_a = Vec3::ZERO;

    for axis in candidate_axes(a, b) {
        let interval = axis_check(a, b, axis)?;
        if interval.close > latest_close {
            latest_close = interval.close;
            normal_for_a = interval.normal_for_a;
        }
        earliest_open = earliest_open.min(interval.open);
    }

    if latest_close > earliest_open || !(0.0..=horizon).contains(&latest_close) {
        return None;
    }
    let approaching = (a.velocity - b.velocity).dot(normal_for_a) < 0.0;
    approaching.then_some((latest_close, normal_for_a))
}

/// Static separating-axis overlap test with a small tolerance for resting contact.
pub fn overlaps(a: &SweptBox, b: &SweptBox) -> bool {
    const TOUCH_TOLERANCE: f32 = 1e-4;
    candidate_axes(a, b).all(|axis| {
        let separation = (b.center - a.center).dot(axis).abs();
        separation + TOUCH_TOLERANCE < a.radius_along(axis) + b.radius_along(axis)
    })
}
