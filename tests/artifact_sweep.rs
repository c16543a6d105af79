//! Artifact retention sweeps on a real directory

use std::fs;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use video_bgremove::{ArtifactSweeper, SweepConfig};

fn config(dir: &std::path::Path, retention: Duration) -> SweepConfig {
    SweepConfig {
        directory: dir.to_path_buf(),
        interval: Duration::from_millis(25),
        retention,
    }
}

#[test]
fn deletes_only_files_older_than_retention() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();

    let old = dir.join("output_video_with_transparency.mov");
    let fresh = dir.join("frame_000001.png");
    fs::write(&old, b"old").unwrap();
    fs::write(&fresh, b"fresh").unwrap();

    let hour_ago = SystemTime::now() - Duration::from_secs(3600);
    fs::File::options()
        .write(true)
        .open(&old)
        .unwrap()
        .set_modified(hour_ago)
        .unwrap();

    let sweeper = ArtifactSweeper::new(config(dir, Duration::from_secs(300))).unwrap();
    let report = sweeper.sweep_once().unwrap();

    assert_eq!(report.scanned, 2);
    assert_eq!(report.deleted, 1);
    assert_eq!(report.failed, 0);
    assert!(!old.exists());
    assert!(fresh.exists());
}

#[test]
fn subdirectories_are_left_alone() {
    let temp_dir = TempDir::new().unwrap();
    let nested = temp_dir.path().join("frames");
    fs::create_dir(&nested).unwrap();
    fs::write(nested.join("frame_000001.png"), b"png").unwrap();

    let sweeper = ArtifactSweeper::new(config(temp_dir.path(), Duration::ZERO)).unwrap();
    let report = sweeper
        .sweep_at(SystemTime::now() + Duration::from_secs(60))
        .unwrap();

    assert_eq!(report.scanned, 0);
    assert!(nested.join("frame_000001.png").exists());
}

#[tokio::test]
async fn scheduled_sweeps_pick_up_new_artifacts() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().join("output");
    let cancel = CancellationToken::new();
    let handle = ArtifactSweeper::new(config(&dir, Duration::from_millis(10)))
        .unwrap()
        .spawn(cancel.clone());

    // First sweep creates the directory
    for _ in 0..100 {
        if dir.is_dir() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(dir.is_dir());

    let artifact = dir.join("result.mov");
    fs::write(&artifact, b"mov").unwrap();
    for _ in 0..200 {
        if !artifact.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!artifact.exists());

    cancel.cancel();
    handle.await.unwrap();
}
