//! Periodic neighbor enumeration.
//!
//! Both strategies select candidate `(neighbor, image)` pairs from wrapped
//! fractional coordinates and accept them through [`make_edge`], which works on
//! the stored cartesian positions. Identical acceptance keeps the two edge sets
//! bit-for-bit equal once sorted.

use nalgebra::{Point3, Vector3};

use crate::core::domain::Structure;
use crate::core::spatial::{image_bounds, wrap_fractional};
use crate::graph::crystal_graph::AtomEdge;

/// Self-interaction threshold (Å).
const MIN_DISTANCE: f64 = 1e-8;
/// Upper bound on cell-list bins per lattice direction.
const MAX_BINS_PER_AXIS: usize = 32;

fn make_edge(structure: &Structure, i: usize, j: usize, image: [i32; 3], cutoff: f64) -> Option<AtomEdge> {
    let shift = structure.lattice.vectors
        * Vector3::new(image[0] as f64, image[1] as f64, image[2] as f64);
    let vector = structure.atoms[j].position - structure.atoms[i].position + shift;
    let distance = vector.norm();
    if distance > cutoff || distance < MIN_DISTANCE {
        return None;
    }
    Some(AtomEdge {
        center: i,
        neighbor: j,
        image,
        distance,
        vector,
    })
}

fn wrapped_coords(structure: &Structure) -> Vec<(Point3<f64>, [i32; 3])> {
    structure.frac_coords().iter().map(wrap_fractional).collect()
}

/// Image of `j` relative to the stored positions, given the image relative to wrapped ones.
#[inline]
fn original_image(wrapped_image: [i32; 3], shift_i: [i32; 3], shift_j: [i32; 3]) -> [i32; 3] {
    [
        wrapped_image[0] - shift_j[0] + shift_i[0],
        wrapped_image[1] - shift_j[1] + shift_i[1],
        wrapped_image[2] - shift_j[2] + shift_i[2],
    ]
}

/// Brute force: every atom pair against every image inside the bounding box.
pub fn legacy_edges(structure: &Structure, cutoff: f64) -> Vec<AtomEdge> {
    let n = structure.num_atoms();
    let wrapped = wrapped_coords(structure);
    let [bx, by, bz] = image_bounds(&structure.lattice, cutoff);

    let mut edges = Vec::new();
    for i in 0..n {
        for j in 0..n {
            for a in -bx..=bx {
                for b in -by..=by {
                    for c in -bz..=bz {
                        let image = original_image([a, b, c], wrapped[i].1, wrapped[j].1);
                        if let Some(edge) = make_edge(structure, i, j, image, cutoff) {
                            edges.push(edge);
                        }
                    }
                }
            }
        }
    }
    edges
}

/// Periodic cell list: atoms are binned in fractional space and each atom only
/// visits the bins its cutoff sphere can reach.
pub fn fast_edges(structure: &Structure, cutoff: f64) -> Vec<AtomEdge> {
    let wrapped = wrapped_coords(structure);
    let heights = structure.lattice.perpendicular_heights();

    let nbins: [usize; 3] =
        heights.map(|h| ((h / cutoff).floor() as usize).clamp(1, MAX_BINS_PER_AXIS));
    let mut reach = [0i32; 3];
    for k in 0..3 {
        reach[k] = (cutoff * nbins[k] as f64 / heights[k]).ceil() as i32;
    }

    let bin_of = |u: &Point3<f64>| -> [usize; 3] {
        let mut b = [0usize; 3];
        for k in 0..3 {
            b[k] = ((u[k] * nbins[k] as f64) as usize).min(nbins[k] - 1);
        }
        b
    };
    let flat = |b: [usize; 3]| (b[0] * nbins[1] + b[1]) * nbins[2] + b[2];

    let mut bins: Vec<Vec<usize>> = vec![Vec::new(); nbins[0] * nbins[1] * nbins[2]];
    let atom_bins: Vec<[usize; 3]> = wrapped.iter().map(|(u, _)| bin_of(u)).collect();
    for (j, b) in atom_bins.iter().enumerate() {
        bins[flat(*b)].push(j);
    }

    let mut edges = Vec::new();
    for (i, home) in atom_bins.iter().enumerate() {
        for d0 in -reach[0]..=reach[0] {
            for d1 in -reach[1]..=reach[1] {
                for d2 in -reach[2]..=reach[2] {
                    let target = [home[0] as i32 + d0, home[1] as i32 + d1, home[2] as i32 + d2];
                    let mut bin = [0usize; 3];
                    let mut image = [0i32; 3];
                    for k in 0..3 {
                        let nb = nbins[k] as i32;
                        bin[k] = target[k].rem_euclid(nb) as usize;
                        image[k] = target[k].div_euclid(nb);
                    }
                    for &j in &bins[flat(bin)] {
                        let image = original_image(image, wrapped[i].1, wrapped[j].1);
                        if let Some(edge) = make_edge(structure, i, j, image, cutoff) {
                            edges.push(edge);
                        }
                    }
                }
            }
        }
    }
    edges
}
