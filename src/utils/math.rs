//! Vector helpers on top of `glam` used by collision detection and the impulse solver.

use glam::{Mat3, Quat, Vec3};

const DEGENERATE_SQ: f32 = 1e-12;

/// Cross-product matrix: `skew(a) * b == a.cross(b)`.
pub fn skew(r: Vec3) -> Mat3 {
    Mat3::from_cols(
        Vec3::new(0.0, r.z, -r.y),
        Vec3::new(-r.z, 0.0, r.x),
        Vec3::new(r.y, -r.x, 0.0),
    )
}

/// Unit vector perpendicular to `n`.
///
/// Picks the axis pair with the largest components so the result never degenerates for a
/// non-zero input.
pub fn tangent_vector(n: Vec3) -> Vec3 {
    let t = if n.x.abs() >= 0.577_35 {
        Vec3::new(n.y, -n.x, 0.0)
    } else {
        Vec3::new(0.0, n.z, -n.y)
    };
    t.try_normalize().unwrap_or(Vec3::X)
}

/// Converts angular velocity (radians/sec) into the rotation applied over `dt`.
pub fn angular_velocity_to_quat(angular: Vec3, dt: f32) -> Quat {
    let speed = angular.length();
    if speed <= 1e-6 {
        return Quat::IDENTITY;
    }
    Quat::from_axis_angle(angular / speed, speed * dt)
}

/// Unit normal of triangle `abc`.
///
/// With `outward` the normal is flipped to point away from the origin. Degenerate triangles fall
/// back to a normal of the surviving segment (or point) that faces away from the origin.
pub fn surface_normal(a: Vec3, b: Vec3, c: Vec3, outward: bool) -> Vec3 {
    let normal = (b - a).cross(c - a);
    if normal.length_squared() > DEGENERATE_SQ {
        let mut normal = normal;
        if outward {
            let probe = [a, b, c]
                .into_iter()
                .find(|p| p.length_squared() > DEGENERATE_SQ)
                .unwrap_or(c);
            if normal.dot(probe) < 0.0 {
                normal = -normal;
            }
        }
        return normal.normalize();
    }

    if (a - b).length_squared() < DEGENERATE_SQ && (b - c).length_squared() < DEGENERATE_SQ {
        return a.try_normalize().unwrap_or(Vec3::X);
    }

    let (start, end) = if (a - b).length_squared() > DEGENERATE_SQ {
        (a, b)
    } else if (b - c).length_squared() > DEGENERATE_SQ {
        (b, c)
    } else {
        (c, a)
    };
    segment_normal(start, end)
}

/// Direction perpendicular to segment `start..end` pointing away from the origin.
fn segment_normal(start: Vec3, end: Vec3) -> Vec3 {
    let edge = end - start;
    let normal = edge.cross(start).cross(edge);
    if normal.length_squared() > DEGENERATE_SQ {
        normal.normalize()
    } else {
        tangent_vector(start - end)
    }
}

/// Barycentric coordinates `(u, v, w)` of `p` projected onto the plane of `abc`.
pub fn barycentric(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> (f32, f32, f32) {
    let v0 = b - a;
    let v1 = c - a;
    let v2 = p - a;
    let d00 = v0.dot(v0);
    let d01 = v0.dot(v1);
    let d11 = v1.dot(v1);
    let d20 = v2.dot(v0);
    let d21 = v2.dot(v1);
    let denom = d00 * d11 - d01 * d01;
    if denom.abs() <= f32::EPSILON {
        return (1.0, 0.0, 0.0);
    }
    let v = (d11 * d20 - d01 * d21) / denom;
    let w = (d00 * d21 - d01 * d20) / denom;
    (1.0 - v - w, v, w)
}

/// Closest point to `p` on the (solid) triangle `abc`.
pub fn closest_point_on_triangle(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;
    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a;
    }

    let bp = p - b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        return a + ab * (d1 / (d1 - d3));
    }

    let cp = p - c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        return a + ac * (d2 / (d2 - d6));
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        return b + (c - b) * ((d4 - d3) / ((d4 - d3) + (d5 - d6)));
    }

    let denom = va + vb + vc;
    if denom.abs() <= f32::EPSILON {
        return a;
    }
    a + ab * (vb / denom) + ac * (vc / denom)
}

pub fn sq_dist_point_triangle(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> f32 {
    (closest_point_on_triangle(p, a, b, c) - p).length_squared()
}

/// Squared distance from `p` to the infinite line through `a` and `b`.
pub fn sq_dist_point_line(p: Vec3, a: Vec3, b: Vec3) -> f32 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq <= DEGENERATE_SQ {
        return (p - a).length_squared();
    }
    (p - a).cross(ab).length_squared() / len_sq
}
