use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rigid_articulation::*;

fn placed(mut collider: Collider, position: Vec3, rotation: Quat) -> Collider {
    collider.update_transform(&Transform::from_position_rotation(position, rotation));
    collider
}

fn contact_at(x: f32, z: f32, depth: f32) -> Contact {
    let point = Vec3::new(x, 0.0, z);
    Contact {
        global_position_a: point,
        global_position_b: point,
        local_position_a: point,
        local_position_b: point,
        normal: Vec3::Y,
        depth,
        ..Contact::default()
    }
}

#[test]
fn side_by_side_boxes_push_apart_along_x() {
    let a = placed(Collider::cuboid(Vec3::splat(0.5)), Vec3::ZERO, Quat::IDENTITY);
    let b = placed(Collider::cuboid(Vec3::splat(0.5)), Vec3::new(0.9, 0.0, 0.0), Quat::IDENTITY);

    let contact = NarrowPhase::collide(&a, &b).expect("boxes overlap");
    assert!(contact.normal.x > 0.99, "normal {:?}", contact.normal);
    assert!((contact.depth - 0.1).abs() < 1e-2, "depth {}", contact.depth);
    assert!(contact.tangent1.dot(contact.normal).abs() < 1e-4);
    assert!(contact.tangent2.dot(contact.normal).abs() < 1e-4);
}

#[test]
fn overlapping_spheres_report_center_line_normal() {
    let a = placed(Collider::sphere(1.0), Vec3::ZERO, Quat::IDENTITY);
    let b = placed(Collider::sphere(1.0), Vec3::new(1.5, 0.0, 0.0), Quat::IDENTITY);

    let contact = NarrowPhase::collide(&a, &b).expect("spheres overlap");
    assert!(contact.normal.x > 0.95, "normal {:?}", contact.normal);
    assert!((contact.depth - 0.5).abs() < 0.05, "depth {}", contact.depth);
}

#[test]
fn tilted_box_edge_touches_ground_from_above() {
    let ground = placed(Collider::cuboid(Vec3::new(5.0, 0.5, 5.0)), Vec3::ZERO, Quat::IDENTITY);
    let lowest_edge = 0.5 * std::f32::consts::SQRT_2;
    let tilted = placed(
        Collider::cuboid(Vec3::splat(0.5)),
        Vec3::new(0.0, 0.5 + lowest_edge - 0.05, 0.0),
        Quat::from_rotation_z(std::f32::consts::FRAC_PI_4),
    );

    let contact = NarrowPhase::collide(&ground, &tilted).expect("edge sinks into the ground");
    assert!(contact.normal.y > 0.99, "normal {:?}", contact.normal);
    assert!((contact.depth - 0.05).abs() < 1e-2, "depth {}", contact.depth);
    assert!(contact.global_position_a.x.abs() < 0.1);
}

#[test]
fn distant_colliders_do_not_collide() {
    let a = placed(Collider::cuboid(Vec3::splat(0.5)), Vec3::ZERO, Quat::IDENTITY);
    let b = placed(Collider::sphere(0.5), Vec3::new(0.0, 1.2, 0.0), Quat::IDENTITY);
    assert!(NarrowPhase::collide(&a, &b).is_none());
}

#[test]
fn manifold_reduces_to_four_and_keeps_deepest() {
    let a = placed(Collider::cuboid(Vec3::ONE), Vec3::ZERO, Quat::IDENTITY);
    let b = placed(Collider::cuboid(Vec3::ONE), Vec3::ZERO, Quat::IDENTITY);
    let mut manifold = ContactManifold::new(a.id, b.id);

    let incoming = [
        contact_at(-1.0, -1.0, 0.02),
        contact_at(1.0, -1.0, 0.03),
        contact_at(0.2, 0.1, 0.01),
        contact_at(1.0, 1.0, 0.02),
        contact_at(-1.0, 1.0, 0.04),
        contact_at(0.0, 0.0, 0.25),
    ];
    for contact in incoming {
        manifold.merge_contact(contact, &a, &b);
        assert!(manifold.len() <= 4);
    }

    assert_eq!(manifold.len(), 4);
    assert!(manifold.contacts().iter().any(|c| (c.depth - 0.25).abs() < 1e-6));
    for kept in manifold.contacts() {
        assert!(incoming
            .iter()
            .any(|c| c.global_position_a == kept.global_position_a));
    }
}

/// Contact at `point` on A's surface, with B's anchor `depth` below it along +Y.
fn penetrating_contact(a: &Collider, b: &Collider, point: Vec3, depth: f32) -> Contact {
    let on_b = point - Vec3::Y * depth;
    Contact {
        global_position_a: point,
        global_position_b: on_b,
        local_position_a: a.world_transform().inverse_transform_vector(point - a.center()),
        local_position_b: b.world_transform().inverse_transform_vector(on_b - b.center()),
        normal: Vec3::Y,
        depth,
        ..Contact::default()
    }
}

#[test]
fn cached_deepest_contact_survives_overflow() {
    let mut rng = StdRng::seed_from_u64(23);
    for _ in 0..50 {
        let a = placed(Collider::cuboid(Vec3::ONE), Vec3::new(0.0, -1.0, 0.0), Quat::IDENTITY);
        let b = placed(Collider::cuboid(Vec3::ONE), Vec3::new(0.3, 0.9, -0.2), Quat::IDENTITY);
        let mut manifold = ContactManifold::new(a.id, b.id);

        let deepest_at = Vec3::new(rng.random_range(-1.0..1.0), 0.0, rng.random_range(-1.0..1.0));
        manifold.merge_contact(penetrating_contact(&a, &b, deepest_at, 0.5), &a, &b);
        for _ in 0..6 {
            let point = Vec3::new(rng.random_range(-1.0..1.0), 0.0, rng.random_range(-1.0..1.0));
            let depth = rng.random_range(0.01..0.2);
            manifold.merge_contact(penetrating_contact(&a, &b, point, depth), &a, &b);
            assert!(manifold.len() <= 4);
            assert!(
                manifold
                    .contacts()
                    .iter()
                    .any(|c| c.global_position_a == deepest_at && (c.depth - 0.5).abs() < 1e-5),
                "deepest contact was dropped"
            );
        }
    }
}

#[test]
fn gjk_simplex_encloses_origin_on_overlap() {
    let a = placed(Collider::cuboid(Vec3::splat(0.5)), Vec3::ZERO, Quat::IDENTITY);
    let b = placed(
        Collider::cuboid(Vec3::splat(0.5)),
        Vec3::new(0.3, 0.4, -0.2),
        Quat::from_rotation_y(0.3),
    );

    let simplex = GJKAlgorithm::intersect(&a, &b).expect("boxes overlap");
    assert_eq!(simplex.len(), 4);
    let contact = EPAAlgorithm::contact(&simplex, &a, &b);
    assert!(contact.depth > 0.0);
    assert!((contact.normal.length() - 1.0).abs() < 1e-4);
}

#[test]
fn random_box_pairs_give_unit_normals() {
    let mut rng = StdRng::seed_from_u64(11);
    let a = placed(Collider::cuboid(Vec3::splat(0.5)), Vec3::ZERO, Quat::IDENTITY);
    for _ in 0..200 {
        let offset = Vec3::new(
            rng.random_range(-1.2..1.2),
            rng.random_range(-1.2..1.2),
            rng.random_range(-1.2..1.2),
        );
        let rotation = Quat::from_euler(
            glam::EulerRot::XYZ,
            rng.random_range(-3.0..3.0),
            rng.random_range(-3.0..3.0),
            rng.random_range(-3.0..3.0),
        );
        let b = placed(Collider::cuboid(Vec3::new(0.4, 0.3, 0.2)), offset, rotation);

        if let Some(contact) = NarrowPhase::collide(&a, &b) {
            assert!((contact.normal.length() - 1.0).abs() < 1e-3, "normal {:?}", contact.normal);
            assert!(contact.depth.is_finite());
            assert_eq!(contact.collider_a, a.id);
        }
    }
}
