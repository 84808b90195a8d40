use glam::Vec3;
use log::warn;

use super::contact::Contact;
use crate::config::{
    EPA_MAX_FACES, EPA_MAX_ITERATIONS, EPA_MAX_LOOSE_EDGES, EPA_TOLERANCE, GJK_MAX_ITERATIONS,
};
use crate::core::collider::Collider;
use crate::utils::math::{barycentric, surface_normal, tangent_vector};

/// Minkowski-difference support point with the shape-space points that produced it.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SupportResult {
    pub global: Vec3,
    pub local_a: Vec3,
    pub local_b: Vec3,
}

impl SupportResult {
    /// Support of `A - B` along `direction`.
    pub fn of(a: &Collider, b: &Collider, direction: Vec3) -> Self {
        let on_a = a.support(direction);
        let on_b = b.support(-direction);
        Self {
            global: on_a.global - on_b.global,
            local_a: on_a.local,
            local_b: on_b.local,
        }
    }
}

/// GJK simplex. Points are kept in insertion order, the newest last.
#[derive(Debug, Clone, Copy, Default)]
pub struct Simplex {
    points: [SupportResult; 4],
    len: usize,
}

impl Simplex {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn points(&self) -> &[SupportResult] {
        &self.points[..self.len]
    }

    fn push(&mut self, point: SupportResult) {
        if self.len < self.points.len() {
            self.points[self.len] = point;
            self.len += 1;
        }
    }

    fn remove(&mut self, index: usize) {
        self.points.copy_within(index + 1..self.len, index);
        self.len -= 1;
    }

    fn last(&self) -> SupportResult {
        self.points[self.len - 1]
    }
}

/// Gilbert-Johnson-Keerthi overlap test on the Minkowski difference.
pub struct GJKAlgorithm;

impl GJKAlgorithm {
    const EPSILON: f32 = 1e-12;

    /// Returns the enclosing tetrahedron when the shapes overlap.
    pub fn intersect(a: &Collider, b: &Collider) -> Option<Simplex> {
        let mut direction = b.center() - a.center();
        if direction.length_squared() < Self::EPSILON {
            direction = Vec3::X;
        }

        let mut simplex = Simplex::default();
        for _ in 0..GJK_MAX_ITERATIONS {
            simplex.push(SupportResult::of(a, b, direction));
            if simplex.last().global.dot(direction) < 0.0 {
                return None;
            }
            if Self::contains_origin(&mut simplex, &mut direction) {
                return Some(simplex);
            }
        }
        None
    }

    fn contains_origin(simplex: &mut Simplex, direction: &mut Vec3) -> bool {
        match simplex.len() {
            1 => {
                let a = simplex.points[0].global;
                *direction = if a.length_squared() < Self::EPSILON {
                    Vec3::X
                } else {
                    -a
                };
                false
            }
            2 => {
                let a = simplex.points[0].global;
                let b = simplex.points[1].global;
                let ab = b - a;
                let ao = -a;
                let towards = ab.cross(ao).cross(ab);
                *direction = if towards.length_squared() >= Self::EPSILON {
                    towards
                } else if ab.length_squared() >= Self::EPSILON {
                    tangent_vector(a - b)
                } else if a.length_squared() < Self::EPSILON {
                    Vec3::X
                } else {
                    -a
                };
                false
            }
            3 => {
                let a = simplex.points[0].global;
                let b = simplex.points[1].global;
                let c = simplex.points[2].global;
                let normal = (b - a).cross(c - a);
                if normal.length_squared() > Self::EPSILON {
                    if normal.dot(-a) < 0.0 {
                        simplex.points.swap(1, 2);
                        *direction = -normal;
                    } else {
                        *direction = normal;
                    }
                } else {
                    *direction = -surface_normal(a, b, c, true);
                }
                false
            }
            4 => {
                let [a, b, c, d] = simplex.points.map(|p| p.global);
                let da = a - d;
                let db = b - d;
                let dc = c - d;
                let d_to_origin = -d;
                let normal_dab = da.cross(db);
                let normal_dac = dc.cross(da);
                let normal_dbc = db.cross(dc);

                if normal_dab.dot(d_to_origin) > 0.0 {
                    simplex.remove(2);
                    *direction = normal_dab;
                } else if normal_dac.dot(d_to_origin) > 0.0 {
                    simplex.points[1] = simplex.points[3];
                    simplex.remove(3);
                    *direction = normal_dac;
                } else if normal_dbc.dot(d_to_origin) > 0.0 {
                    simplex.points[0] = simplex.points[3];
                    simplex.remove(3);
                    *direction = normal_dbc;
                } else {
                    return true;
                }
                false
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Face {
    vertices: [SupportResult; 3],
    normal: Vec3,
}

impl Face {
    fn new(a: SupportResult, b: SupportResult, c: SupportResult) -> Self {
        Self {
            vertices: [a, b, c],
            normal: surface_normal(a.global, b.global, c.global, false),
        }
    }

    fn distance(&self) -> f32 {
        self.vertices[0].global.dot(self.normal)
    }
}

/// Expanding Polytope Algorithm recovering depth, normal and contact points from a GJK simplex.
pub struct EPAAlgorithm;

impl EPAAlgorithm {
    const WINDING_BIAS: f32 = 1e-6;

    pub fn contact(simplex: &Simplex, a: &Collider, b: &Collider) -> Contact {
        let [pa, pb, pc, pd] = simplex.points;
        let mut faces = [Face::default(); EPA_MAX_FACES];
        faces[0] = Face::new(pd, pa, pb);
        faces[1] = Face::new(pd, pb, pc);
        faces[2] = Face::new(pd, pc, pa);
        faces[3] = Face::new(pa, pc, pb);
        let mut face_count = 4;

        let mut closest = 0;
        for _ in 0..EPA_MAX_ITERATIONS {
            closest = Self::closest_face(&faces[..face_count]);
            let face = faces[closest];
            let min_dist = face.distance();
            let p = SupportResult::of(a, b, face.normal);
            let reach = p.global.dot(face.normal);

            if (reach - min_dist).abs() < EPA_TOLERANCE {
                return Self::build_contact(&face, reach, a, b);
            }

            let mut loose_edges = [[SupportResult::default(); 2]; EPA_MAX_LOOSE_EDGES];
            let mut edge_count = 0;

            let mut i = 0;
            while i < face_count {
                if faces[i].normal.dot(p.global - faces[i].vertices[0].global) <= 0.0 {
                    i += 1;
                    continue;
                }

                for j in 0..3 {
                    let edge = [faces[i].vertices[j], faces[i].vertices[(j + 1) % 3]];
                    let shared = loose_edges[..edge_count].iter().position(|loose| {
                        loose[1].global == edge[0].global && loose[0].global == edge[1].global
                    });
                    match shared {
                        Some(k) => {
                            loose_edges[k] = loose_edges[edge_count - 1];
                            edge_count -= 1;
                        }
                        None if edge_count < EPA_MAX_LOOSE_EDGES => {
                            loose_edges[edge_count] = edge;
                            edge_count += 1;
                        }
                        None => {
                            warn!("EPA loose-edge buffer full ({EPA_MAX_LOOSE_EDGES}); polytope left open");
                            break;
                        }
                    }
                }

                faces[i] = faces[face_count - 1];
                face_count -= 1;
            }

            for edge in &loose_edges[..edge_count] {
                if face_count >= EPA_MAX_FACES {
                    warn!("EPA face buffer full ({EPA_MAX_FACES}); skipping re-triangulation");
                    break;
                }
                let mut face = Face::new(edge[0], edge[1], p);
                if face.vertices[0].global.dot(face.normal) + Self::WINDING_BIAS < 0.0 {
                    face.vertices.swap(0, 1);
                    face.normal = -face.normal;
                }
                faces[face_count] = face;
                face_count += 1;
            }

            if face_count == 0 {
                break;
            }
        }

        warn!("EPA did not converge after {EPA_MAX_ITERATIONS} iterations; using closest face");
        let face = faces[closest.min(face_count.saturating_sub(1))];
        Self::build_contact(&face, face.distance(), a, b)
    }

    fn closest_face(faces: &[Face]) -> usize {
        faces
            .iter()
            .enumerate()
            .fold((0, f32::MAX), |best, (i, face)| {
                let dist = face.distance();
                if dist < best.1 {
                    (i, dist)
                } else {
                    best
                }
            })
            .0
    }

    fn build_contact(face: &Face, depth: f32, a: &Collider, b: &Collider) -> Contact {
        let [v0, v1, v2] = face.vertices;
        let (u, v, w) = barycentric(face.normal * depth, v0.global, v1.global, v2.global);
        let local_a = v0.local_a * u + v1.local_a * v + v2.local_a * w;
        let local_b = v0.local_b * u + v1.local_b * v + v2.local_b * w;
        let normal = face.normal;
        let tangent1 = tangent_vector(normal);

        Contact {
            global_position_a: a.local_to_world(local_a),
            global_position_b: b.local_to_world(local_b),
            local_position_a: local_a,
            local_position_b: local_b,
            normal,
            tangent1,
            tangent2: normal.cross(tangent1).normalize(),
            depth,
            enable_warm_start: true,
            collider_a: a.id,
            collider_b: b.id,
            body_a: a.rigidbody_id,
            body_b: b.rigidbody_id,
            ..Contact::default()
        }
    }
}

/// Entry point of the per-pair collision test.
pub struct NarrowPhase;

impl NarrowPhase {
    /// Runs GJK and, on overlap, EPA. Collider world transforms must be current.
    pub fn collide(a: &Collider, b: &Collider) -> Option<Contact> {
        let simplex = GJKAlgorithm::intersect(a, b)?;
        Some(EPAAlgorithm::contact(&simplex, a, b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Transform;

    fn placed(mut collider: Collider, position: Vec3) -> Collider {
        collider.update_transform(&Transform::from_position(position));
        collider
    }

    #[test]
    fn overlapping_boxes_report_unit_normal_and_depth() {
        let a = placed(Collider::cuboid(Vec3::splat(0.5)), Vec3::ZERO);
        let b = placed(Collider::cuboid(Vec3::splat(0.5)), Vec3::new(0.0, 0.8, 0.0));

        let contact = NarrowPhase::collide(&a, &b).expect("boxes overlap");
        assert!((contact.normal.length() - 1.0).abs() < 1e-4);
        assert!(contact.depth > 0.0, "depth was {}", contact.depth);
        assert!((contact.depth - 0.2).abs() < 1e-2, "depth was {}", contact.depth);
        assert!(contact.normal.y > 0.99, "normal was {:?}", contact.normal);
    }

    #[test]
    fn separated_shapes_do_not_collide() {
        let a = placed(Collider::cuboid(Vec3::splat(0.5)), Vec3::ZERO);
        let b = placed(Collider::sphere(0.5), Vec3::new(3.0, 0.0, 0.0));
        assert!(NarrowPhase::collide(&a, &b).is_none());
    }

    #[test]
    fn sphere_on_box_depth_matches_overlap() {
        let ground = placed(Collider::cuboid(Vec3::new(5.0, 0.5, 5.0)), Vec3::ZERO);
        let ball = placed(Collider::sphere(0.5), Vec3::new(0.1, 0.9, -0.2));

        let contact = NarrowPhase::collide(&ground, &ball).expect("sphere rests in the box");
        assert!((contact.depth - 0.1).abs() < 1e-2, "depth was {}", contact.depth);
        assert!(contact.normal.y > 0.99, "normal was {:?}", contact.normal);
    }
}
