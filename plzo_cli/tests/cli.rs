use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

fn sample_text(len: usize) -> Vec<u8> {
    let pattern = b"It was the best of times, it was the worst of times. ";
    (0..len).map(|i| pattern[i % pattern.len()]).collect()
}

#[test]
fn test_cli_compress_inspect_decompress_verify_cycle() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("book1.txt");
    fs::write(&input, sample_text(100_005))?;

    // 1. Compress with default output naming
    let mut cmd = Command::cargo_bin("plzo")?;
    cmd.arg("compress").arg(&input).arg("--workers").arg("6");
    cmd.assert().success();
    let archive = dir.path().join("book1.plzo");
    assert!(archive.exists());

    // 2. Inspect header and chunk table
    let mut cmd = Command::cargo_bin("plzo")?;
    cmd.arg("inspect").arg(&archive).arg("--chunks");
    cmd.assert().success().stdout(
        predicate::str::contains("workers        : 6")
            .and(predicate::str::contains("remainder      : 3 B"))
            .and(predicate::str::contains("WARNING").not()),
    );

    // 3. Decompress with default output naming
    let mut cmd = Command::cargo_bin("plzo")?;
    cmd.arg("decompress").arg(&archive).arg("--backend").arg("rayon");
    cmd.assert().success();
    let restored = dir.path().join("book1_dp");
    assert_eq!(fs::read(&restored)?, fs::read(&input)?);

    // 4. Verify
    let mut cmd = Command::cargo_bin("plzo")?;
    cmd.arg("verify").arg(&input).arg(&restored);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("files are identical"));

    Ok(())
}

#[test]
fn test_cli_rejects_more_workers_than_bytes() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("tiny");
    fs::write(&input, b"abc")?;

    let mut cmd = Command::cargo_bin("plzo")?;
    cmd.arg("compress").arg(&input).arg("-w").arg("8");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("invalid configuration"));
    Ok(())
}

#[test]
fn test_cli_truncated_archive_fails() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("paper2");
    let archive = dir.path().join("paper2.plzo");
    fs::write(&input, sample_text(5000))?;

    Command::cargo_bin("plzo")?
        .args(["compress", "--codec", "zstd"])
        .arg(&input)
        .arg(&archive)
        .assert()
        .success();

    let bytes = fs::read(&archive)?;
    fs::write(&archive, &bytes[..bytes.len() - 10])?;

    Command::cargo_bin("plzo")?
        .args(["decompress", "--codec", "zstd"])
        .arg(&archive)
        .assert()
        .failure()
        .stderr(predicate::str::contains("container format error"));
    Ok(())
}

#[test]
fn test_cli_verify_reports_mismatch() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let a = dir.path().join("a");
    let b = dir.path().join("b");
    fs::write(&a, b"same length one")?;
    fs::write(&b, b"same length two")?;

    Command::cargo_bin("plzo")?
        .arg("verify")
        .arg(&a)
        .arg(&b)
        .assert()
        .failure()
        .stderr(predicate::str::contains("differ at byte offset 12"));
    Ok(())
}

#[test]
fn test_cli_bench_writes_report() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("progc");
    let report = dir.path().join("results_4_threads.txt");
    fs::write(&input, sample_text(20_000))?;

    Command::cargo_bin("plzo")?
        .args(["bench", "-w", "4"])
        .arg(&input)
        .arg("--report")
        .arg(&report)
        .assert()
        .success()
        .stdout(predicate::str::contains("progc").and(predicate::str::contains("parallel")));

    let text = fs::read_to_string(&report)?;
    assert!(text.contains("thread count:"));
    Ok(())
}
