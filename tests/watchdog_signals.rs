use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// SIGTERM (the supervisor shutdown signal) must tear the daemon down and
/// exit 0 the same way ctrl-c does.
#[test]
fn sigterm_stops_services_and_exits_zero() {
    let mut watchdog = Command::new(env!("CARGO_BIN_EXE_watchdog"))
        .env("HELMWATCH_MODEL_DIR", "stub://signal_test")
        .env("HELMWATCH_MODEL", "camera")
        .env("HELMWATCH_DEVICE", "stub://signal_test_camera")
        .env("HELMWATCH_API_PORT", "18640")
        .args(["--source", "webcam", "--no-display"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn watchdog");

    // let the watchdog install its handler and start the daemon
    std::thread::sleep(Duration::from_millis(1500));

    let sent = Command::new("kill")
        .args(["-TERM", &watchdog.id().to_string()])
        .status()
        .expect("send SIGTERM");
    assert!(sent.success());

    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if let Some(status) = watchdog.try_wait().expect("poll watchdog") {
            assert!(status.success(), "watchdog should exit 0 on SIGTERM");
            break;
        }
        if Instant::now() > deadline {
            let _ = watchdog.kill();
            panic!("watchdog did not exit after SIGTERM");
        }
        std::thread::sleep(Duration::from_millis(100));
    }
}
