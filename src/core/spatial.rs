use nalgebra::{Point3, Vector3};
use crate::core::domain::{Lattice, Structure};

/// Minimum-image separation vector from `p1` to `p2`.
#[inline]
pub fn min_image_vector(p1: &Point3<f64>, p2: &Point3<f64>, lattice: &Lattice) -> Vector3<f64> {
    // Convert delta to fractional coordinates
    let d_cart = p2 - p1;
    let mut d_frac = lattice.inverse * d_cart;

    // Wrap fractional coordinates to [-0.5, 0.5]
    d_frac.x -= d_frac.x.round();
    d_frac.y -= d_frac.y.round();
    d_frac.z -= d_frac.z.round();

    lattice.vectors * d_frac
}

/// Squared minimum-image distance between two points.
#[inline]
pub fn distance_sq(p1: &Point3<f64>, p2: &Point3<f64>, lattice: &Lattice) -> f64 {
    min_image_vector(p1, p2, lattice).norm_squared()
}

/// Checks a structure for hard collisions.
/// Returns `true` if no pair of sites is closer than `min_distance`.
/// Only exact for cells whose perpendicular heights exceed `2 * min_distance`.
pub fn check_overlap(structure: &Structure, min_distance: f64) -> bool {
    let atoms = &structure.atoms;
    let n = atoms.len();
    let threshold_sq = min_distance * min_distance;

    for i in 0..n {
        for j in (i + 1)..n {
            let dist_sq = distance_sq(&atoms[i].position, &atoms[j].position, &structure.lattice);
            if dist_sq < threshold_sq {
                return false;
            }
        }
    }
    true
}

/// Fractional coordinate wrapped into [0, 1) together with the integer
/// cell offset that was removed from it.
#[inline]
pub fn wrap_fractional(frac: &Point3<f64>) -> (Point3<f64>, [i32; 3]) {
    let mut shift = [0i32; 3];
    let mut wrapped = *frac;
    for k in 0..3 {
        let mut s = frac[k].floor();
        let mut w = frac[k] - s;
        // Rounding can leave exactly 1.0 for values just below an integer
        if w >= 1.0 {
            s += 1.0;
            w = 0.0;
        }
        shift[k] = s as i32;
        wrapped[k] = w;
    }
    (wrapped, shift)
}

/// Number of periodic images per lattice direction needed so that every pair
/// of wrapped sites within `cutoff` is enumerated.
pub fn image_bounds(lattice: &Lattice, cutoff: f64) -> [i32; 3] {
    let heights = lattice.perpendicular_heights();
    // Wrapped fractional differences span (-1, 1), hence the extra image.
    heights.map(|h| (cutoff / h).ceil() as i32 + 1)
}
