//! Force laws and the motion integrator.
//!
//! Repulsion is inverse-square with the separation floored at `epsilon`.
//! The spring force grows with the square of the separation, so long edges
//! pull much harder than a Hooke spring would.

use glam::Vec3;

/// Repulsion exerted on a body at `position` by a body at `other`.
///
/// `normalize(position - other) * strength / max(distance, epsilon)^2`.
/// Coincident bodies have no defined direction and yield zero.
#[inline]
pub fn repulsion(position: Vec3, other: Vec3, strength: f32, epsilon: f32) -> Vec3 {
    let difference = position - other;
    let distance = difference.length().max(epsilon);
    difference.normalize_or_zero() * (strength / (distance * distance))
}

/// Spring force along an edge, `(source - target) * k * distance^2`.
///
/// Subtract the result from the source's acceleration and add it to the
/// target's.
#[inline]
pub fn spring(source: Vec3, target: Vec3, k: f32) -> Vec3 {
    let difference = source - target;
    let distance_sq = difference.length_squared();
    difference * (k * distance_sq)
}

/// Advance one body by one time step.
///
/// Damping is applied after the new acceleration is folded into the
/// velocity and before the position moves. The acceleration is consumed.
#[inline]
pub fn integrate(
    position: &mut Vec3,
    velocity: &mut Vec3,
    acceleration: &mut Vec3,
    time_step: f32,
    damping: f32,
) {
    *velocity += *acceleration * time_step;
    *velocity *= damping;
    *position += *velocity * time_step;
    *acceleration = Vec3::ZERO;
}

/// Exact pairwise repulsion on `positions[index]` from every other position.
///
/// O(n) per body, O(n^2) per step. Used to validate the octree estimate.
pub fn exact_repulsion(positions: &[Vec3], index: usize, strength: f32, epsilon: f32) -> Vec3 {
    let position = positions[index];
    positions
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != index)
        .fold(Vec3::ZERO, |acc, (_, &other)| {
            acc + repulsion(position, other, strength, epsilon)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-5;

    #[test]
    fn test_repulsion_inverse_square() {
        let force = repulsion(Vec3::ZERO, Vec3::new(2.0, 0.0, 0.0), 20.0, 0.1);
        assert!((force - Vec3::new(-5.0, 0.0, 0.0)).length() < EPS);
    }

    #[test]
    fn test_repulsion_is_antisymmetric() {
        let a = Vec3::new(0.3, -1.2, 4.0);
        let b = Vec3::new(-2.0, 0.5, 1.0);
        let on_a = repulsion(a, b, 20.0, 0.1);
        let on_b = repulsion(b, a, 20.0, 0.1);
        assert!((on_a + on_b).length() < EPS);
    }

    #[test]
    fn test_repulsion_distance_floor() {
        // Closer than epsilon: magnitude is capped at strength / epsilon^2.
        let force = repulsion(Vec3::ZERO, Vec3::new(0.01, 0.0, 0.0), 20.0, 0.1);
        assert!((force.length() - 2000.0).abs() < 1e-2);
        assert!(force.x < 0.0);
    }

    #[test]
    fn test_repulsion_coincident_is_finite() {
        let p = Vec3::new(1.0, 1.0, 1.0);
        let force = repulsion(p, p, 20.0, 0.1);
        assert!(force.is_finite());
        assert_eq!(force, Vec3::ZERO);
    }

    #[test]
    fn test_spring_scales_with_distance_squared() {
        let force = spring(Vec3::ZERO, Vec3::new(3.0, 0.0, 0.0), 2.0);
        // (0 - 3) * 2 * 9
        assert!((force - Vec3::new(-54.0, 0.0, 0.0)).length() < EPS);

        let short = spring(Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), 2.0);
        assert!((short - Vec3::new(-2.0, 0.0, 0.0)).length() < EPS);
    }

    #[test]
    fn test_integrate_order() {
        let mut position = Vec3::ZERO;
        let mut velocity = Vec3::new(1.0, 0.0, 0.0);
        let mut acceleration = Vec3::new(10.0, 0.0, 0.0);

        integrate(&mut position, &mut velocity, &mut acceleration, 0.1, 0.5);

        // v = (1 + 10 * 0.1) * 0.5 = 1.0; p = 1.0 * 0.1
        assert!((velocity.x - 1.0).abs() < EPS);
        assert!((position.x - 0.1).abs() < EPS);
        assert_eq!(acceleration, Vec3::ZERO);
    }

    #[test]
    fn test_exact_repulsion_skips_self() {
        let positions = [Vec3::ZERO];
        assert_eq!(exact_repulsion(&positions, 0, 20.0, 0.1), Vec3::ZERO);

        let positions = [Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), Vec3::new(-1.0, 0.0, 0.0)];
        assert!(exact_repulsion(&positions, 0, 20.0, 0.1).length() < EPS);
    }
}
