use std::path::Path;
use std::process::{Command, Output};

use anyhow::Result;
use serde_json::json;

fn evalport(args: &[&str]) -> Result<Output> {
    Ok(Command::new(env!("CARGO_BIN_EXE_evalport")).args(args).output()?)
}

fn write_sample(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir.join("Config"))?;
    std::fs::create_dir_all(dir.join("Output/Models"))?;

    std::fs::write(
        dir.join("Config/01_OneHidden.config"),
        "# tiny one hidden layer net\ndeviceId=-1\nlayer=features:4\nlayer=ol.z:2\n",
    )?;

    let model = json!({
        "inputs": [{ "name": "features", "width": 4 }],
        "layers": [
            { "name": "h1", "input": "features", "activation": "sigmoid",
              "weights": [[0.01, -0.02, 0.03, 0.0], [0.0, 0.01, 0.0, -0.01], [0.02, 0.02, 0.02, 0.02]],
              "bias": [0.0, 0.1, -0.1] },
            { "name": "ol.z", "input": "h1",
              "weights": [[1.0, -1.0, 0.5], [-0.5, 0.5, 1.0]],
              "bias": [0.0, 0.0] }
        ]
    });
    std::fs::write(
        dir.join("Output/Models/01_OneHidden"),
        serde_json::to_vec(&model)?,
    )?;
    Ok(())
}

#[test]
fn run_prints_each_output_value() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_sample(dir.path())?;
    let data_dir = dir.path().to_str().expect("utf-8 temp path");

    let out = evalport(&[
        "run", "--data-dir", data_dir, "--input", "features:4", "--output", "ol.z:2",
        "--output", "h1:3", "--seed", "42", "--log", "warn",
    ])?;
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let stdout = String::from_utf8(out.stdout)?;
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines[0], "Output contents:");
    assert_eq!(lines[1], "Output layer: ol.z");
    assert_eq!(lines[4], "Output layer: h1");
    assert_eq!(lines.len(), 8);
    for value in lines[2..4].iter().chain(&lines[5..8]) {
        value.parse::<f32>()?;
    }
    Ok(())
}

#[test]
fn seeded_runs_are_reproducible() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_sample(dir.path())?;
    let data_dir = dir.path().to_str().expect("utf-8 temp path");
    let args = [
        "run", "--data-dir", data_dir, "--input", "features:4", "--output", "ol.z:2", "--seed",
        "3",
    ];

    let a = evalport(&args)?;
    let b = evalport(&args)?;
    assert!(a.status.success());
    assert_eq!(a.stdout, b.stdout);
    Ok(())
}

#[test]
fn errors_are_reported_at_the_boundary() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_sample(dir.path())?;
    let data_dir = dir.path().to_str().expect("utf-8 temp path");

    let out = evalport(&["run", "--data-dir", data_dir, "--model", "missing"])?;
    assert!(!out.status.success());
    let stdout = String::from_utf8(out.stdout)?;
    assert!(stdout.starts_with("Error: "), "{stdout}");
    assert!(stdout.contains("failed to load model"), "{stdout}");

    // Default input width does not match the tiny model.
    let out = evalport(&["run", "--data-dir", data_dir, "--output", "ol.z:2"])?;
    assert!(!out.status.success());
    assert!(String::from_utf8(out.stdout)?.contains("features"));
    Ok(())
}

#[test]
fn inspect_lists_layers() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_sample(dir.path())?;
    let data_dir = dir.path().to_str().expect("utf-8 temp path");

    let out = evalport(&["inspect", "--data-dir", data_dir, "--log", "error"])?;
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let stdout = String::from_utf8(out.stdout)?;
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("input  features"));
    assert!(lines[2].starts_with("output ol.z"));
    Ok(())
}
