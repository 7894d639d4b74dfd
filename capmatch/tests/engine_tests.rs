//! End-to-end runs of the matching engine

use capmatch::engine::checkpoint::{CHECKPOINT_FILE, MATCHED_PAYLOAD_FILE};
use capmatch::engine::scheduler::{MATCHED_OUTPUT_FILE, UNMATCHED_OUTPUT_FILE};
use capmatch::prelude::*;
use capmatch::CheckpointManager;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn options_for(dir: &Path, batch_size: usize, num_threads: usize) -> MatchOptions {
    MatchOptions {
        batch_size,
        num_threads,
        checkpoint_interval: 2,
        output_dir: dir.to_path_buf(),
        ..Default::default()
    }
}

fn write_input(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn read_tables(dir: &Path) -> (String, String) {
    (
        std::fs::read_to_string(dir.join(MATCHED_OUTPUT_FILE)).expect("matched table"),
        std::fs::read_to_string(dir.join(UNMATCHED_OUTPUT_FILE)).expect("unmatched table"),
    )
}

#[test]
fn test_full_run_classifies_fixture() {
    let dir = tempfile::tempdir().unwrap();
    let engine = MatchEngine::new(options_for(dir.path(), 5, 2)).unwrap();

    let summary = engine
        .process_file(&fixture_path("parts.csv"))
        .expect("run should succeed");

    assert!(summary.is_complete());
    assert_eq!(summary.total_rows, 12);
    assert_eq!(summary.processed_rows, 12);
    assert_eq!(summary.resumed_from, 0);
    assert_eq!(summary.matched_count, 9);
    assert_eq!(summary.unmatched_count, 3);
    assert_eq!(summary.batches, 3);
    assert!(summary.is_reconciled());

    let (matched, unmatched) = read_tables(dir.path());
    assert!(matched.starts_with(
        "manufacturer,part_number,value,description,matched_token,matched_reading,candidate_pf,target_pf\n"
    ));
    assert!(matched.contains(
        "Samsung,CL10B104KB8NNNC,0.1uF,MLCC X7R 0603,104,multiplier,100000,100000"
    ));
    assert!(matched.contains("4R7,decimal_point"));
    assert!(unmatched.starts_with("manufacturer,part_number,value,description\n"));
    assert!(unmatched.contains("CRCW060310K0FKEA"));
    assert!(unmatched.contains("ECA-1VM101"));
    // header + rows
    assert_eq!(matched.lines().count(), 10);
    assert_eq!(unmatched.lines().count(), 4);

    let metadata = CheckpointManager::new(dir.path())
        .read_metadata()
        .unwrap()
        .expect("completed checkpoint");
    assert!(metadata.completed);
    assert_eq!(metadata.processed_rows, 12);
    assert_eq!(metadata.matched_count + metadata.unmatched_count, 12);
}

#[test]
fn test_thread_count_does_not_change_tables() {
    let single = tempfile::tempdir().unwrap();
    let many = tempfile::tempdir().unwrap();

    MatchEngine::new(options_for(single.path(), 1, 1))
        .unwrap()
        .process_file(&fixture_path("parts.csv"))
        .unwrap();
    MatchEngine::new(options_for(many.path(), 2, 8))
        .unwrap()
        .process_file(&fixture_path("parts.csv"))
        .unwrap();

    assert_eq!(read_tables(single.path()), read_tables(many.path()));
}

#[test]
fn test_rerun_after_completion_processes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let engine = MatchEngine::new(options_for(dir.path(), 4, 2)).unwrap();

    engine.process_file(&fixture_path("parts.csv")).unwrap();
    let first = read_tables(dir.path());

    let summary = engine.process_file(&fixture_path("parts.csv")).unwrap();
    assert!(summary.is_complete());
    assert_eq!(summary.resumed_from, 12);
    assert_eq!(summary.batches, 0);
    assert_eq!(read_tables(dir.path()), first);
}

#[test]
fn test_resume_after_stop_matches_uninterrupted_run() {
    let reference = tempfile::tempdir().unwrap();
    MatchEngine::new(options_for(reference.path(), 3, 1))
        .unwrap()
        .process_file(&fixture_path("parts.csv"))
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let engine = MatchEngine::new(options_for(dir.path(), 3, 1)).unwrap();
    let stop = engine.stop_handle();
    let engine = engine.with_progress_callback(move |_, _, batch| {
        if batch == 2 {
            stop.request_stop();
        }
        Ok(())
    });

    let partial = engine.process_file(&fixture_path("parts.csv")).unwrap();
    assert_eq!(partial.status, RunStatus::Stopped);
    assert_eq!(partial.processed_rows, 6);
    assert!(partial.matched_path.is_none());
    assert!(!dir.path().join(MATCHED_OUTPUT_FILE).exists());

    let metadata = CheckpointManager::new(dir.path())
        .read_metadata()
        .unwrap()
        .expect("checkpoint after stop");
    assert_eq!(metadata.processed_rows, 6);
    assert!(!metadata.completed);

    let resumed = MatchEngine::new(options_for(dir.path(), 3, 1))
        .unwrap()
        .process_file(&fixture_path("parts.csv"))
        .unwrap();
    assert!(resumed.is_complete());
    assert_eq!(resumed.resumed_from, 6);
    assert_eq!(resumed.batches, 2);
    assert_eq!(resumed.processed_rows, 12);
    assert!(resumed.is_reconciled());

    assert_eq!(read_tables(dir.path()), read_tables(reference.path()));
}

#[test]
fn test_corrupt_checkpoint_restarts_from_zero() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(CHECKPOINT_FILE), "garbage").unwrap();
    std::fs::write(dir.path().join(MATCHED_PAYLOAD_FILE), "[").unwrap();

    let summary = MatchEngine::new(options_for(dir.path(), 4, 2))
        .unwrap()
        .process_file(&fixture_path("parts.csv"))
        .unwrap();

    assert!(summary.is_complete());
    assert_eq!(summary.resumed_from, 0);
    assert_eq!(summary.processed_rows, 12);
    assert!(summary.is_reconciled());
}

#[test]
fn test_no_resume_ignores_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    MatchEngine::new(options_for(dir.path(), 4, 2))
        .unwrap()
        .process_file(&fixture_path("parts.csv"))
        .unwrap();

    let options = MatchOptions {
        resume: false,
        ..options_for(dir.path(), 4, 2)
    };
    let summary = MatchEngine::new(options)
        .unwrap()
        .process_file(&fixture_path("parts.csv"))
        .unwrap();
    assert_eq!(summary.resumed_from, 0);
    assert_eq!(summary.batches, 3);
}

#[test]
fn test_other_input_of_same_length_is_not_resumed() {
    let inputs = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let first = write_input(
        inputs.path(),
        "a.csv",
        "part_number,value\nCL10B104KB8NNNC,0.1uF\nXYZ,1pF\n",
    );
    let second = write_input(
        inputs.path(),
        "b.csv",
        "part_number,value\nNOPE,5pF\nC1608X5R1A106K080AC,10uF\n",
    );

    MatchEngine::new(options_for(out.path(), 4, 2))
        .unwrap()
        .process_file(&first)
        .unwrap();
    let summary = MatchEngine::new(options_for(out.path(), 4, 2))
        .unwrap()
        .process_file(&second)
        .unwrap();

    assert!(summary.is_complete());
    assert_eq!(summary.resumed_from, 0);
    assert_eq!(summary.batches, 1);
    assert_eq!(summary.matched_count, 1);

    let (matched, unmatched) = read_tables(out.path());
    assert!(matched.contains("C1608X5R1A106K080AC,10uF,106,multiplier"));
    assert!(!matched.contains("CL10B104KB8NNNC"));
    assert!(unmatched.contains("NOPE"));
    assert!(!unmatched.contains("XYZ"));
}

#[test]
fn test_changed_tolerance_reclassifies_from_scratch() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "parts.csv", "part_number,value\nX104,104nF\n");
    let out = dir.path().join("out");

    let strict = MatchEngine::new(options_for(&out, 4, 1))
        .unwrap()
        .process_file(&input)
        .unwrap();
    assert_eq!(strict.matched_count, 0);

    let options = MatchOptions {
        tolerance: 0.05,
        ..options_for(&out, 4, 1)
    };
    let loose = MatchEngine::new(options).unwrap().process_file(&input).unwrap();
    assert_eq!(loose.resumed_from, 0);
    assert_eq!(loose.batches, 1);
    assert_eq!(loose.matched_count, 1);

    let metadata = CheckpointManager::new(&out).read_metadata().unwrap().unwrap();
    assert_eq!(metadata.tolerance, 0.05);
}

#[test]
fn test_changed_value_column_reclassifies_from_scratch() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(
        dir.path(),
        "parts.csv",
        "part_number,value,nominal\nCL10B104KB8NNNC,1pF,0.1uF\n",
    );
    let out = dir.path().join("out");

    let by_value = MatchEngine::new(options_for(&out, 4, 1))
        .unwrap()
        .process_file(&input)
        .unwrap();
    assert_eq!(by_value.matched_count, 0);

    let options = MatchOptions {
        value_column: "nominal".to_string(),
        ..options_for(&out, 4, 1)
    };
    let by_nominal = MatchEngine::new(options).unwrap().process_file(&input).unwrap();
    assert_eq!(by_nominal.resumed_from, 0);
    assert_eq!(by_nominal.matched_count, 1);
}

#[test]
fn test_progress_callback_sees_monotonic_counts() {
    let dir = tempfile::tempdir().unwrap();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let recorder = calls.clone();

    let engine = MatchEngine::new(options_for(dir.path(), 5, 3))
        .unwrap()
        .with_progress_callback(move |processed, total, batch| {
            recorder.lock().unwrap().push((processed, total, batch));
            Ok(())
        });
    engine.process_file(&fixture_path("parts.csv")).unwrap();

    let calls = calls.lock().unwrap();
    assert_eq!(*calls, vec![(5, 12, 1), (10, 12, 2), (12, 12, 3)]);
}

#[test]
fn test_missing_input_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let err = MatchEngine::new(options_for(dir.path(), 4, 2))
        .unwrap()
        .process_file(&fixture_path("does_not_exist.csv"))
        .unwrap_err();
    assert!(matches!(err, MatchError::InputNotFound(_)));
}

#[test]
fn test_unwritable_output_dir_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not_a_dir");
    std::fs::write(&blocker, "file").unwrap();

    let err = MatchEngine::new(options_for(&blocker.join("out"), 4, 2))
        .unwrap()
        .process_file(&fixture_path("parts.csv"))
        .unwrap_err();
    assert!(matches!(err, MatchError::OutputDir { .. }));
}
