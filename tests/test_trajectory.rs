mod common;

use approx::assert_relative_eq;

use crystal_relax::core::error::Error;
use crystal_relax::engine::potential::EV_PER_A3_IN_GPA;
use crystal_relax::relax::progress::ProgressLog;
use crystal_relax::relax::{CellFilter, FilterOptions, FilteredStructure, Frame, RelaxOptions, StructOptimizer, Trajectory};
use crystal_relax::solvers::StepReport;

use crate::common::{calculator, fcc_argon, rattled_argon};

fn relaxed_trajectory() -> Trajectory {
    StructOptimizer::new(calculator().model().clone())
        .relax(&rattled_argon(5.5, 12), &RelaxOptions::default())
        .unwrap()
        .trajectory
}

#[test]
fn test_frame_from_snapshot() {
    let calc = calculator();
    let s = fcc_argon(5.6);
    let mut system = FilteredStructure::new(&calc, s.clone(), CellFilter::Frechet, &FilterOptions::default()).unwrap();
    let frame = system.snapshot().unwrap();

    let direct = calc.calculate(&s).unwrap();
    assert_eq!(frame.energy, direct.energy);
    assert_eq!(frame.forces, direct.forces);
    assert_eq!(frame.stress, direct.stress);
    assert_eq!(frame.magmoms, direct.magmoms);
    assert_eq!(frame.atom_positions, s.positions());
    assert_eq!(frame.cell, s.lattice.vectors);
    assert_eq!(frame.atoms, s);
}

#[test]
fn test_append_rejects_inconsistent_frames() {
    let calc = calculator();
    let s = fcc_argon(5.6);
    let mut frame = Frame::new(&s, calc.calculate(&s).unwrap());
    frame.magmoms.pop();

    let mut traj = Trajectory::new();
    assert!(matches!(traj.append(frame), Err(Error::Structure(_))));
    assert!(traj.is_empty());
}

#[test]
fn test_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("traj.json");

    let traj = relaxed_trajectory();
    traj.save(&path).unwrap();
    let loaded = Trajectory::load(&path).unwrap();

    assert_eq!(loaded.len(), traj.len());
    for (a, b) in loaded.frames().iter().zip(traj.frames()) {
        assert_relative_eq!(a.energy, b.energy, max_relative = 1e-12);
        assert_relative_eq!(a.cell, b.cell, max_relative = 1e-12);
        assert_relative_eq!(a.stress, b.stress, epsilon = 1e-14, max_relative = 1e-12);
        assert_eq!(a.atoms.num_atoms(), b.atoms.num_atoms());
        for (fa, fb) in a.forces.iter().zip(&b.forces) {
            assert_relative_eq!(fa, fb, epsilon = 1e-14, max_relative = 1e-12);
        }
    }

    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let keys: Vec<&str> = json.as_object().unwrap().keys().map(|k| k.as_str()).collect();
    let mut expected = Trajectory::ATTRIBUTES.to_vec();
    expected.sort();
    let mut keys_sorted = keys.clone();
    keys_sorted.sort();
    assert_eq!(keys_sorted, expected);
}

#[test]
fn test_load_rejects_misaligned_columns() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("traj.json");

    let traj = relaxed_trajectory();
    let mut json: serde_json::Value = serde_json::to_value(&traj).unwrap();
    json["energies"].as_array_mut().unwrap().pop();
    std::fs::write(&path, json.to_string()).unwrap();

    assert!(matches!(Trajectory::load(&path), Err(Error::Json(_))));
}

#[test]
fn test_summary_csv() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("summary.csv");

    let traj = relaxed_trajectory();
    traj.write_summary_csv(&path).unwrap();

    let mut reader = csv::Reader::from_path(&path).unwrap();
    let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
    assert_eq!(headers, ["step", "energy", "fmax", "volume", "pressure_gpa"]);

    let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), traj.len());

    let first = traj.frames().first().unwrap();
    let volume: f64 = rows[0][3].parse().unwrap();
    let pressure: f64 = rows[0][4].parse().unwrap();
    assert_relative_eq!(volume, first.atoms.volume(), max_relative = 1e-12);
    assert_relative_eq!(pressure, -first.stress.trace() / 3.0 * EV_PER_A3_IN_GPA, max_relative = 1e-12);
    assert_eq!(&rows[rows.len() - 1][0], (traj.len() - 1).to_string().as_str());
}

#[test]
fn test_progress_log_format() {
    let mut log = ProgressLog::new("FIRE", Some(Vec::new()));
    log.log(&StepReport {
        step: 0,
        energy: -2.0158,
        fmax: 0.5696,
    })
    .unwrap();
    log.log(&StepReport {
        step: 1,
        energy: -2.0201,
        fmax: 0.5012,
    })
    .unwrap();

    let text = String::from_utf8(log.into_inner().unwrap()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].contains("Step") && lines[0].contains("Energy") && lines[0].contains("fmax"));
    assert!(lines[1].starts_with("FIRE:"));
    assert!(lines[1].contains("-2.015800"));
    assert!(lines[2].contains("0.501200"));
}

#[test]
fn test_disabled_progress_log() {
    let mut log: ProgressLog<Vec<u8>> = ProgressLog::new("BFGS", None);
    log.log(&StepReport {
        step: 0,
        energy: 0.0,
        fmax: 0.0,
    })
    .unwrap();
    assert!(log.into_inner().is_none());
}

#[test]
fn test_save_path_option() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("relax.json");
    let options = RelaxOptions {
        save_path: Some(path.clone()),
        ..Default::default()
    };
    let result = StructOptimizer::new(calculator().model().clone())
        .relax(&rattled_argon(5.5, 12), &options)
        .unwrap();

    let saved = Trajectory::load(&path).unwrap();
    assert_eq!(saved.len(), result.trajectory.len());
}
