mod common;

use band_filter::codec::{BmpCodec, BmpMetadata, ImageCodec};
use band_filter::convolution::convolve_reference;
use band_filter::{BoundaryPolicy, Kernel};
use common::synthetic_image::checkerboard_rgb;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("band_filter_cli_{}_{}", name, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_input(dir: &Path) -> PathBuf {
    let img = checkerboard_rgb(30, 22, 4);
    let mut meta = BmpMetadata::for_dimensions(30, 22).unwrap();
    meta.gap = vec![0x42; 8];
    let path = dir.join("input.bmp");
    fs::write(&path, BmpCodec.encode(&img, &meta).unwrap()).unwrap();
    path
}

fn run_cli(config: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_band_filter"))
        .arg(config)
        .output()
        .unwrap()
}

fn write_config(dir: &Path, body: serde_json::Value) -> PathBuf {
    let path = dir.join("config.json");
    fs::write(&path, serde_json::to_string_pretty(&body).unwrap()).unwrap();
    path
}

#[test]
fn filters_a_bitmap_and_keeps_its_headers() {
    for backend in ["threads", "processes"] {
        let dir = scratch_dir(backend);
        let input = write_input(&dir);
        let output = dir.join("out/output.bmp");
        let report = dir.join("report.json");
        let config = write_config(
            &dir,
            serde_json::json!({
                "input": input,
                "output": output,
                "workers": 3,
                "backend": backend,
                "report_json": report,
            }),
        );

        let result = run_cli(&config);
        assert!(
            result.status.success(),
            "{backend}: {}",
            String::from_utf8_lossy(&result.stderr)
        );

        let (source, source_meta) = BmpCodec.decode(&fs::read(&input).unwrap()).unwrap();
        let (filtered, filtered_meta) = BmpCodec.decode(&fs::read(&output).unwrap()).unwrap();
        assert_eq!(filtered_meta, source_meta);
        let expected = convolve_reference(&source, &Kernel::box_blur(), BoundaryPolicy::ZeroPad).unwrap();
        assert!(filtered.same_pixels(&expected), "{backend}");

        let report: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&report).unwrap()).unwrap();
        assert_eq!(report["workersUsed"], 3);
        assert_eq!(report["backend"], backend);
        assert_eq!(report["bands"].as_array().unwrap().len(), 3);
    }
}

#[test]
fn invalid_configuration_leaves_no_output() {
    let dir = scratch_dir("invalid");
    let input = write_input(&dir);
    let output = dir.join("never.bmp");
    let config = write_config(
        &dir,
        serde_json::json!({
            "input": input,
            "output": output,
            "kernel": { "size": 4, "weights": vec![0.0; 16] },
        }),
    );

    let result = run_cli(&config);
    assert_eq!(result.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&result.stderr).contains("Error: Invalid configuration"));
    assert!(!output.exists());
}

#[test]
fn corrupt_input_is_reported() {
    let dir = scratch_dir("corrupt");
    let input = dir.join("input.bmp");
    fs::write(&input, b"BMnot really a bitmap").unwrap();
    let output = dir.join("out.bmp");
    let config = write_config(&dir, serde_json::json!({ "input": input, "output": output }));

    let result = run_cli(&config);
    assert_eq!(result.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&result.stderr).contains("Error: Invalid image"));
    assert!(!output.exists());
}

#[test]
fn missing_argument_prints_usage() {
    let result = Command::new(env!("CARGO_BIN_EXE_band_filter")).output().unwrap();
    assert_eq!(result.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&result.stderr).contains("Usage"));
}

#[test]
fn unwritable_report_leaves_no_output() {
    let dir = scratch_dir("report");
    let input = write_input(&dir);
    let output = dir.join("out.bmp");
    // The report's parent directory would have to be a regular file.
    let report = input.join("report.json");
    let config = write_config(
        &dir,
        serde_json::json!({ "input": input, "output": output, "report_json": report }),
    );

    let result = run_cli(&config);
    assert_eq!(result.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&result.stderr).contains("Error: I/O error"));
    assert!(!output.exists());
}
