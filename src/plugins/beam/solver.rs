//! Single-bounce beam tracing: emitter ray, one mirror plane, one capture sphere.

use bevy::prelude::*;

/// Below this, the beam is considered parallel to the mirror plane.
pub const PARALLEL_EPSILON: f32 = 1e-5;
/// Minimum length of the reflected segment, so a mirror touching the sphere still draws.
pub const MIN_CAPTURE_DISTANCE: f32 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeamSegment {
    pub start: Vec3,
    pub end: Vec3,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BeamResult {
    pub hit: bool,
    /// Emitter to mirror, then mirror to capture point when captured.
    pub segments: Vec<BeamSegment>,
    pub hit_point: Option<Vec3>,
}

impl BeamResult {
    fn miss(segments: Vec<BeamSegment>) -> BeamResult {
        BeamResult {
            hit: false,
            segments,
            hit_point: None,
        }
    }
}

/// Trace a beam from `emitter_pos` along `emitter_dir`, reflect it once on the plane through
/// `mirror_point` with normal `mirror_normal`, and test whether the reflected ray enters the
/// capture sphere.
///
/// Degenerate configurations (parallel beam, mirror behind the emitter, reflected ray missing
/// the sphere) are plain misses.
pub fn compute_reflected_beam(
    emitter_pos: Vec3,
    emitter_dir: Vec3,
    mirror_point: Vec3,
    mirror_normal: Vec3,
    capture_center: Vec3,
    capture_radius: f32,
) -> BeamResult {
    let d = emitter_dir.normalize();
    let n = mirror_normal.normalize();

    let denom = d.dot(n);
    if denom.abs() < PARALLEL_EPSILON {
        return BeamResult::miss(Vec::new());
    }
    let t = (mirror_point - emitter_pos).dot(n) / denom;
    if t <= 0. {
        return BeamResult::miss(Vec::new());
    }

    let plane_hit = emitter_pos + d * t;
    let incoming = BeamSegment {
        start: emitter_pos,
        end: plane_hit,
    };

    let r = (d - n * (2. * d.dot(n))).normalize();

    // Ray/sphere test with the reflected ray starting on the mirror.
    let m = plane_hit - capture_center;
    let b = m.dot(r);
    let c = m.length_squared() - capture_radius * capture_radius;
    if c > 0. && b > 0. {
        return BeamResult::miss(vec![incoming]);
    }
    let discriminant = b * b - c;
    if discriminant < 0. {
        return BeamResult::miss(vec![incoming]);
    }

    let t2 = -b - discriminant.sqrt();
    let capture_point = plane_hit + r * t2.max(MIN_CAPTURE_DISTANCE);

    BeamResult {
        hit: true,
        segments: vec![
            incoming,
            BeamSegment {
                start: plane_hit,
                end: capture_point,
            },
        ],
        hit_point: Some(capture_point),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mirror_normal_at(degrees: f32) -> Vec3 {
        Quat::from_rotation_y(degrees.to_radians()).mul_vec3(Vec3::Z)
    }

    fn assert_vec_near(actual: Vec3, expected: Vec3) {
        assert!(
            actual.abs_diff_eq(expected, 1e-3),
            "expected {:?}, got {:?}",
            expected,
            actual
        );
    }

    #[test]
    fn test_identical_inputs_give_identical_results() {
        let run = || {
            compute_reflected_beam(
                Vec3::new(-16., 1.2, 15.5),
                Vec3::new(0.8, 0., -1.),
                Vec3::new(-10., 0., 8.),
                mirror_normal_at(225.),
                Vec3::new(0., 1.5, 0.),
                0.45,
            )
        };
        let a = run();
        let b = run();
        assert_eq!(a.hit, b.hit);
        assert_eq!(a.segments.len(), b.segments.len());
        for (sa, sb) in a.segments.iter().zip(&b.segments) {
            assert_eq!(sa.start.to_array().map(f32::to_bits), sb.start.to_array().map(f32::to_bits));
            assert_eq!(sa.end.to_array().map(f32::to_bits), sb.end.to_array().map(f32::to_bits));
        }
    }

    #[test]
    fn test_antiparallel_mirror_reflects_back() {
        let result = compute_reflected_beam(
            Vec3::ZERO,
            Vec3::X,
            Vec3::new(5., 0., 0.),
            Vec3::NEG_X,
            Vec3::new(2., 0., 0.),
            0.5,
        );
        assert!(result.hit);
        assert_eq!(result.segments.len(), 2);
        let reflected = (result.segments[1].end - result.segments[1].start).normalize();
        assert_vec_near(reflected, Vec3::NEG_X);
        assert_vec_near(result.segments[0].end, Vec3::new(5., 0., 0.));
    }

    #[test]
    fn test_tangent_sphere_counts_as_hit() {
        // Reflected ray runs along y = 0, sphere of radius 1 centered one unit above it.
        let result = compute_reflected_beam(
            Vec3::ZERO,
            Vec3::X,
            Vec3::new(5., 0., 0.),
            Vec3::NEG_X,
            Vec3::new(2., 1., 0.),
            1.,
        );
        assert!(result.hit);
        assert_eq!(result.hit_point, Some(Vec3::new(2., 0., 0.)));
    }

    #[test]
    fn test_mirror_behind_emitter_at_authoring_angle() {
        let result = compute_reflected_beam(
            Vec3::new(-12., 1.2, 8.),
            Vec3::new(0.6, 0., -0.7),
            Vec3::new(-10., 0., 8.),
            mirror_normal_at(25.),
            Vec3::new(0., 1.5, 0.),
            0.45,
        );
        assert!(!result.hit);
        assert!(result.segments.is_empty());
        assert_eq!(result.hit_point, None);
    }

    #[test]
    fn test_aligned_mirror_captures_beam() {
        let result = compute_reflected_beam(
            Vec3::new(-16., 1.2, 15.5),
            Vec3::new(0.8, 0., -1.),
            Vec3::new(-10., 0., 8.),
            mirror_normal_at(225.),
            Vec3::new(0., 1.5, 0.),
            0.45,
        );
        assert!(result.hit);
        assert_eq!(result.segments.len(), 2);
        assert_vec_near(result.segments[0].start, Vec3::new(-16., 1.2, 15.5));
        assert_vec_near(result.segments[0].end, Vec3::new(-10., 1.2, 8.));
        assert_vec_near(result.segments[1].start, Vec3::new(-10., 1.2, 8.));
        let q = result.hit_point.unwrap();
        assert_vec_near(q, Vec3::new(-0.2619, 1.2, 0.2095));
        assert_eq!(result.segments[1].end, q);
    }

    #[test]
    fn test_misaligned_mirror_keeps_first_segment() {
        let result = compute_reflected_beam(
            Vec3::new(-16., 1.2, 15.5),
            Vec3::new(0.8, 0., -1.),
            Vec3::new(-10., 0., 8.),
            mirror_normal_at(165.),
            Vec3::new(0., 1.5, 0.),
            0.45,
        );
        assert!(!result.hit);
        assert_eq!(result.segments.len(), 1);
        assert_vec_near(result.segments[0].end, Vec3::new(-10., 1.2, 8.));
    }

    #[test]
    fn test_parallel_beam_misses() {
        let result = compute_reflected_beam(
            Vec3::ZERO,
            Vec3::X,
            Vec3::new(0., 0., 5.),
            Vec3::Z,
            Vec3::new(0., 0., 10.),
            1.,
        );
        assert!(!result.hit);
        assert!(result.segments.is_empty());
    }

    #[test]
    fn test_reflected_ray_passing_beside_sphere_misses() {
        let result = compute_reflected_beam(
            Vec3::ZERO,
            Vec3::X,
            Vec3::new(5., 0., 0.),
            Vec3::NEG_X,
            Vec3::new(2., 3., 0.),
            1.,
        );
        assert!(!result.hit);
        assert_eq!(result.segments.len(), 1);
    }

    #[test]
    fn test_mirror_on_sphere_surface_uses_minimum_distance() {
        // The plane hit point sits inside the sphere, so the entry parameter is negative.
        let result = compute_reflected_beam(
            Vec3::ZERO,
            Vec3::X,
            Vec3::new(5., 0., 0.),
            Vec3::NEG_X,
            Vec3::new(5., 0., 0.),
            1.,
        );
        assert!(result.hit);
        let q = result.hit_point.unwrap();
        assert_vec_near(q, Vec3::new(5. - MIN_CAPTURE_DISTANCE, 0., 0.));
    }
}
