//! Server and client over loopback: record a drive, then replay it with warnings

use app::{build_server, run_client, AppConfig, TraceFiles};
use segmentation::{CurveDirection, SegmentLibrary};
use std::fmt::Write as _;
use std::path::Path;
use tokio::net::TcpListener;

/// Straight for the first second, then a right-hand curve
fn write_can_trace(path: &Path) {
    let mut text = String::from(";$FILEVERSION=1.1\n;   Message Number\n");
    let mut n = 1;
    for step in 0..20 {
        let t = step as f64 * 100.0;
        let curve = step >= 10;

        // raw * 0.5 - 2048
        let steering = if curve { "10 50" } else { "10 00" };
        // raw * 0.01 - 327.68
        let yaw = if curve { "82 58" } else { "80 00" };

        for (offset, id, bytes) in [
            (1.0, "0018", format!("{} 00 00 00 00 00 00", steering)),
            (2.0, "0F7A", "00 FA 00 00 00 00 00 00".to_string()),
            (3.0, "0B41", format!("{} 00 00 80 85 00 00", yaw)),
        ] {
            writeln!(
                text,
                "{:>7}) {:>11.1}  Rx         {}  8  {}",
                n,
                t + offset,
                id,
                bytes
            )
            .unwrap();
            n += 1;
        }
    }
    std::fs::write(path, text).unwrap();
}

fn write_gps_trace(path: &Path) {
    std::fs::write(
        path,
        "48.000000,11.000000;\n48.000900,11.000000;\n48.001800,11.000600;\n",
    )
    .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_record_then_warn_over_loopback() {
    let dir = tempfile::tempdir().unwrap();
    let can_path = dir.path().join("drive.trc");
    let gps_path = dir.path().join("drive.csv");
    let library_path = dir.path().join("segments.json");
    write_can_trace(&can_path);
    write_gps_trace(&gps_path);

    let mut config = AppConfig {
        traces: TraceFiles {
            can: can_path,
            gps: gps_path,
        },
        library_path: Some(library_path.clone()),
        runs: 2,
        ..Default::default()
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    config.client.server_addr = listener.local_addr().unwrap().to_string();

    let server = build_server(&config).unwrap();
    let shutdown = server.shutdown_handle();
    let server_task = tokio::spawn(async move { server.run(listener).await });

    let library = run_client(&config).await.unwrap().unwrap();

    let summary = library.summary();
    assert_eq!(summary.straights, 1);
    assert_eq!(summary.curves, 1);

    let curve = library.curves().next().unwrap();
    assert_eq!(curve.direction, CurveDirection::Right);
    assert!(curve.start_time_ms >= 1000.0);
    assert!((curve.average_speed_kmh - 25.0).abs() < 1e-9);

    // The recording survives on disk for the next invocation
    let saved = SegmentLibrary::load(&library_path).unwrap();
    assert_eq!(saved.len(), library.len());

    shutdown.stop();
    server_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_client_reports_unreachable_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let mut config = AppConfig::default();
    config.client.server_addr = addr;
    config.runs = 1;

    assert!(run_client(&config).await.is_err());
}
