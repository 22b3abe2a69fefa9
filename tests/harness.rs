//! End-to-end runs through the harness with real files.

use image::{Rgba, RgbaImage};
use imgtrans::prelude::*;
use std::path::Path;
use std::sync::{Arc, Mutex};

fn write_input(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("input.png");
    let pixels = [
        Rgba([10, 20, 30, 255]),
        Rgba([40, 50, 60, 255]),
        Rgba([70, 80, 90, 255]),
        Rgba([100, 110, 120, 255]),
    ];
    RgbaImage::from_fn(2, 2, |x, y| pixels[(y * 2 + x) as usize])
        .save(&path)
        .unwrap();
    path
}

fn request(transform: Transform, backend: BackendKind, dir: &Path) -> RunRequest {
    RunRequest {
        transform,
        backend,
        input: write_input(dir),
        output: dir.join("output.png"),
    }
}

#[test]
fn test_swap_writes_output() {
    let dir = tempfile::tempdir().unwrap();
    let request = request(Transform::Swap, BackendKind::Sequential, dir.path());

    let report = Harness::new().run(&request).unwrap();
    assert_eq!(report.status, Status::Array);
    assert_eq!((report.width, report.height), (2, 2));
    assert!(report.wall_clock_us >= 0);
    assert_eq!(report.device_us, NOT_MEASURED);

    let output = image::open(&request.output).unwrap().into_rgba8();
    assert_eq!(*output.get_pixel(0, 0), Rgba([10, 30, 20, 255]));
    assert_eq!(*output.get_pixel(1, 0), Rgba([40, 60, 50, 255]));
    assert_eq!(*output.get_pixel(0, 1), Rgba([70, 90, 80, 255]));
    assert_eq!(*output.get_pixel(1, 1), Rgba([100, 120, 110, 255]));
}

#[test]
fn test_library_swap_matches_sequential_file() {
    let dir = tempfile::tempdir().unwrap();
    let sequential = request(Transform::Swap, BackendKind::Sequential, dir.path());
    let mut library = request(Transform::Swap, BackendKind::Library, dir.path());
    library.output = dir.path().join("library.png");

    let mut harness = Harness::new();
    harness.run(&sequential).unwrap();
    let report = harness.run(&library).unwrap();
    assert_eq!(report.status, Status::Image);

    let a = image::open(&sequential.output).unwrap().into_rgba8();
    let b = image::open(&library.output).unwrap().into_rgba8();
    assert_eq!(a, b);
}

#[test]
fn test_unimplemented_does_not_write_output() {
    let dir = tempfile::tempdir().unwrap();
    let request = request(Transform::Emboss, BackendKind::Library, dir.path());

    let err = Harness::new().run(&request).unwrap_err();
    assert!(matches!(
        err,
        ImgtransError::Unimplemented {
            transform: TransformKind::Emboss,
            backend: BackendKind::Library
        }
    ));
    assert_eq!(err.exit_code(), 1);
    assert!(!request.output.exists());
}

#[test]
fn test_unsupported_transform_is_distinct_from_unimplemented() {
    let err = Transform::from_request("sharpen", None).unwrap_err();
    assert!(matches!(err, ImgtransError::UnsupportedTransform(_)));
    assert!(!err.to_string().contains("no result"));
}

#[test]
fn test_invalid_area_is_usage_error() {
    let err = Transform::from_request("blur", Some(4)).unwrap_err();
    assert!(err.is_usage());
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn test_unreadable_input() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("not-an-image.png");
    std::fs::write(&input, b"definitely not a png").unwrap();

    let request = RunRequest {
        transform: Transform::Gray,
        backend: BackendKind::Sequential,
        input,
        output: dir.path().join("output.png"),
    };
    let err = Harness::new().run(&request).unwrap_err();
    assert!(matches!(err, ImgtransError::Decode { .. }));
    assert!(err.to_string().starts_with("Unable to load image"));
}

#[test]
fn test_unwritable_output() {
    let dir = tempfile::tempdir().unwrap();
    let mut request = request(Transform::Gray, BackendKind::Sequential, dir.path());
    request.output = dir.path().join("missing-dir").join("output.png");

    let err = Harness::new().run(&request).unwrap_err();
    assert!(matches!(err, ImgtransError::Encode { .. }));
}

#[test]
fn test_disabled_backend_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let request = request(Transform::Swap, BackendKind::Library, dir.path());

    let mut registry = BackendRegistry::with_builtins();
    registry.set_enabled(BackendKind::Library, false);

    let err = Harness::new().with_registry(registry).run(&request).unwrap_err();
    assert!(matches!(err, ImgtransError::UnsupportedBackend(name) if name == "library"));
}

#[test]
fn test_stages_reported_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let request = request(
        Transform::Blur { area: BlurArea::new(3).unwrap() },
        BackendKind::Sequential,
        dir.path(),
    );

    let updates = Arc::new(Mutex::new(Vec::new()));
    let sink = updates.clone();
    let mut harness = Harness::new().with_progress(Box::new(move |update| {
        sink.lock().unwrap().push(update);
    }));
    harness.run(&request).unwrap();

    let stages: Vec<Stage> = updates
        .lock()
        .unwrap()
        .iter()
        .filter_map(|update| match update {
            StageUpdate::StageCompleted { stage, .. } => Some(*stage),
            _ => None,
        })
        .collect();
    assert_eq!(stages, Stage::ALL.to_vec());
    assert!(matches!(updates.lock().unwrap().last(), Some(StageUpdate::Completed { .. })));
}

#[test]
fn test_failed_run_reports_last_stage() {
    let dir = tempfile::tempdir().unwrap();
    let request = request(Transform::Emboss, BackendKind::Library, dir.path());

    let updates = Arc::new(Mutex::new(Vec::new()));
    let sink = updates.clone();
    let mut harness = Harness::new().with_progress(Box::new(move |update| {
        sink.lock().unwrap().push(update);
    }));
    assert!(harness.run(&request).is_err());

    let updates = updates.lock().unwrap();
    assert!(matches!(
        updates.last(),
        Some(StageUpdate::Error { last_stage: Some(Stage::Invoked), .. })
    ));
}
