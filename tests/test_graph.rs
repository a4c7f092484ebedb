mod common;

use approx::assert_relative_eq;

use crystal_relax::core::domain::{Lattice, Structure};
use crystal_relax::core::error::{ConfigError, Error};
use crystal_relax::graph::{CrystalGraphConverter, GraphAlgorithm, IsolatedAtomPolicy};

use crate::common::{argon, fcc_argon, rattled_argon, simple_cubic, triclinic_argon};

#[test]
fn test_converter_defaults() {
    let converter = CrystalGraphConverter::default();
    assert_eq!(converter.algorithm(), GraphAlgorithm::Fast);
    assert_eq!(converter.atom_graph_cutoff(), 6.0);
    assert_eq!(converter.bond_graph_cutoff(), 3.0);
    assert_eq!(converter.isolated_atom_policy(), IsolatedAtomPolicy::Error);
}

#[test]
fn test_converter_reports_algorithm() {
    for name in ["legacy", "fast"] {
        let converter = CrystalGraphConverter::new(6.0, 3.0, name).unwrap();
        assert_eq!(converter.algorithm(), name);
        assert_eq!(converter.algorithm().to_string(), name);
    }
}

#[test]
fn test_converter_rejects_bad_configuration() {
    assert!(matches!(
        CrystalGraphConverter::new(6.0, 3.0, "quantum"),
        Err(Error::Configuration(ConfigError::UnknownAlgorithm(_)))
    ));
    assert!(matches!(
        CrystalGraphConverter::new(3.0, 6.0, "fast"),
        Err(Error::Configuration(ConfigError::BondCutoffExceedsAtom { .. }))
    ));
    assert!(matches!(
        CrystalGraphConverter::new(-1.0, 0.5, "fast"),
        Err(Error::Configuration(ConfigError::InvalidCutoff { .. }))
    ));
    assert!(matches!(
        CrystalGraphConverter::new(6.0, f64::NAN, "legacy"),
        Err(Error::Configuration(ConfigError::InvalidCutoff { .. }))
    ));
    assert!("strict".parse::<IsolatedAtomPolicy>().is_err());
    assert_eq!("warn".parse::<IsolatedAtomPolicy>().unwrap(), IsolatedAtomPolicy::Warn);
}

#[test]
fn test_simple_cubic_neighbor_shells() {
    // Lattice points within 6 Å of the origin for a = 3.1: |n|^2 <= 3
    let s = simple_cubic(argon(), 3.1);
    let converter = CrystalGraphConverter::new(6.0, 3.2, "fast").unwrap();
    let graph = converter.convert(&s).unwrap();

    assert_eq!(graph.num_edges(), 26);
    assert_eq!(graph.neighbor_counts(), vec![26]);

    // Six nearest neighbors are bonds, giving 6 * 5 ordered bond pairs
    assert_eq!(graph.bonds.len(), 6);
    assert_eq!(graph.coordination_numbers(), vec![6]);
    assert_eq!(graph.bond_graph.len(), 30);
    for angle in &graph.bond_graph {
        assert_ne!(angle.bond_a, angle.bond_b);
        let cos = angle.cos_angle;
        assert!(cos.abs() < 1e-12 || (cos + 1.0).abs() < 1e-12, "unexpected cos {}", cos);
    }
}

#[test]
fn test_edges_are_consistent() {
    let s = rattled_argon(5.4, 11);
    let graph = CrystalGraphConverter::default().convert(&s).unwrap();

    for edge in &graph.atom_graph {
        assert!(edge.distance <= 6.0);
        assert_relative_eq!(edge.vector.norm(), edge.distance, epsilon = 1e-12);

        let shift = s.lattice.vectors
            * nalgebra::Vector3::new(edge.image[0] as f64, edge.image[1] as f64, edge.image[2] as f64);
        let expected = s.atoms[edge.neighbor].position - s.atoms[edge.center].position + shift;
        assert_relative_eq!(edge.vector, expected, epsilon = 1e-10);
    }

    // Every directed edge has its reverse
    for edge in &graph.atom_graph {
        let reverse = [-edge.image[0], -edge.image[1], -edge.image[2]];
        assert!(graph
            .edges_of(edge.neighbor)
            .any(|e| e.neighbor == edge.center && e.image == reverse));
    }
}

#[test]
fn test_edges_sorted() {
    let graph = CrystalGraphConverter::default().convert(&triclinic_argon(2)).unwrap();
    let keys: Vec<_> = graph
        .atom_graph
        .iter()
        .map(|e| (e.center, e.neighbor, e.image))
        .collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
}

#[test]
fn test_legacy_and_fast_agree() {
    let structures = vec![
        fcc_argon(5.4),
        rattled_argon(5.3, 5),
        triclinic_argon(9),
        simple_cubic(argon(), 2.2),
    ];
    let legacy = CrystalGraphConverter::new(6.0, 3.0, "legacy").unwrap();
    let fast = CrystalGraphConverter::new(6.0, 3.0, "fast").unwrap();

    for s in &structures {
        let a = legacy.convert(s).unwrap();
        let b = fast.convert(s).unwrap();
        assert_eq!(a, b, "graphs differ for {}", s.formula());
    }
}

#[test]
fn test_atoms_outside_cell() {
    // Same crystal, one atom stored a full lattice vector away
    let s = fcc_argon(5.4);
    let mut shifted = s.clone();
    shifted.atoms[2].position += s.lattice.vectors.column(0) * 2.0 - s.lattice.vectors.column(2);

    let converter = CrystalGraphConverter::new(6.0, 3.0, "fast").unwrap();
    let a = converter.convert(&s).unwrap();
    let b = converter.convert(&shifted).unwrap();

    assert_eq!(a.num_edges(), b.num_edges());
    assert_eq!(a.neighbor_counts(), b.neighbor_counts());
    for (x, y) in a.atom_graph.iter().zip(&b.atom_graph) {
        assert_relative_eq!(x.distance, y.distance, epsilon = 1e-10);
    }
    assert_eq!(b, CrystalGraphConverter::new(6.0, 3.0, "legacy").unwrap().convert(&shifted).unwrap());
}

#[test]
fn test_isolated_atom_policies() {
    let lonely = Structure::from_fractional(
        vec![argon()],
        Lattice::cubic(20.0).unwrap(),
        &[(0, [0.5, 0.5, 0.5])],
    )
    .unwrap();

    let strict = CrystalGraphConverter::default();
    assert!(matches!(
        strict.convert(&lonely),
        Err(Error::IsolatedAtom { index: 0, .. })
    ));

    for policy in [IsolatedAtomPolicy::Warn, IsolatedAtomPolicy::Ignore] {
        let graph = CrystalGraphConverter::default()
            .on_isolated_atoms(policy)
            .convert(&lonely)
            .unwrap();
        assert_eq!(graph.num_edges(), 0);
        assert!(graph.bond_graph.is_empty());
    }
}
