use anyhow::Result;
use serde_json::Value;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};

use helmwatch::{ApiConfig, ApiHandle, ApiServer, HealthState};

struct TestApi {
    state: HealthState,
    handle: Option<ApiHandle>,
}

impl TestApi {
    fn spawn(cfg: ApiConfig) -> Result<Self> {
        let state = HealthState::new();
        let handle = ApiServer::new(cfg, state.clone()).spawn()?;
        Ok(Self {
            state,
            handle: Some(handle),
        })
    }

    fn on_free_port() -> Result<Self> {
        Self::spawn(ApiConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..ApiConfig::default()
        })
    }

    fn handle(&self) -> &ApiHandle {
        self.handle
            .as_ref()
            .expect("test API handle should be initialized")
    }
}

impl Drop for TestApi {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.stop().expect("failed to stop API server");
        }
    }
}

fn http_get(api: &TestApi, path: &str) -> Result<(String, Value)> {
    let mut stream = TcpStream::connect(api.handle().addr)?;
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
    stream.write_all(request.as_bytes())?;
    let mut response = String::new();
    stream.read_to_string(&mut response)?;
    let mut parts = response.splitn(2, "\r\n\r\n");
    let headers = parts.next().unwrap_or("").to_string();
    let body: Value = serde_json::from_str(parts.next().unwrap_or("{}"))?;
    Ok((headers, body))
}

#[test]
fn health_reports_unavailable_before_model_loads() -> Result<()> {
    let api = TestApi::on_free_port()?;

    let (headers, body) = http_get(&api, "/health")?;
    assert!(headers.contains("503 Service Unavailable"));
    assert_eq!(body["detail"], "model not loaded");

    Ok(())
}

#[test]
fn health_reports_healthy_once_model_loads() -> Result<()> {
    let api = TestApi::on_free_port()?;
    api.state.set_loaded("weights/detection/yolov8n.onnx");

    let (headers, body) = http_get(&api, "/health")?;
    assert!(headers.contains("200 OK"));
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["model"], "weights/detection/yolov8n.onnx");
    assert_eq!(body["loaded"], true);
    assert_eq!(body["Improvement"], false);
    assert!(body["timestamp"].as_f64().unwrap_or(0.0) > 0.0);

    Ok(())
}

#[test]
fn health_timestamps_are_fresh_per_request() -> Result<()> {
    let api = TestApi::on_free_port()?;
    api.state.set_loaded("yolov8n.onnx");

    let (_, first) = http_get(&api, "/health")?;
    std::thread::sleep(std::time::Duration::from_millis(20));
    let (_, second) = http_get(&api, "/health")?;

    let first_ts = first["timestamp"].as_f64().expect("timestamp");
    let second_ts = second["timestamp"].as_f64().expect("timestamp");
    assert!(second_ts > first_ts);

    Ok(())
}

#[test]
fn unknown_path_returns_not_found_with_echo() -> Result<()> {
    let api = TestApi::on_free_port()?;

    let (headers, body) = http_get(&api, "/metrics")?;
    assert!(headers.contains("404 Not Found"));
    assert_eq!(body["error"], "Not Found");
    assert_eq!(body["path"], "/metrics");

    Ok(())
}

#[test]
fn listener_retries_next_port_when_bound() -> Result<()> {
    // Occupy a port, then ask the server to bind it: the listener should
    // land on one of the following ports and still serve requests.
    let blocker = TcpListener::bind("127.0.0.1:0")?;
    let taken = blocker.local_addr()?.port();

    let api = TestApi::spawn(ApiConfig {
        host: "127.0.0.1".to_string(),
        port: taken,
        max_port_retries: 5,
        ..ApiConfig::default()
    })?;

    let bound = api.handle().addr.port();
    assert_ne!(bound, taken);
    assert!(bound > taken && bound <= taken + 5);

    let (headers, _) = http_get(&api, "/health")?;
    assert!(headers.contains("503 Service Unavailable"));

    Ok(())
}

#[test]
fn malformed_request_does_not_wedge_the_listener() -> Result<()> {
    let api = TestApi::on_free_port()?;

    {
        // over the request cap, never a complete request line
        let mut stream = TcpStream::connect(api.handle().addr)?;
        stream.write_all(&[b'A'; 9000])?;
        let mut sink = String::new();
        let _ = stream.read_to_string(&mut sink);
    }

    let (headers, _) = http_get(&api, "/health")?;
    assert!(headers.contains("503 Service Unavailable"));

    Ok(())
}

#[test]
fn non_get_methods_are_rejected() -> Result<()> {
    let api = TestApi::on_free_port()?;

    let mut stream = TcpStream::connect(api.handle().addr)?;
    stream.write_all(b"POST /health HTTP/1.1\r\nHost: localhost\r\n\r\n")?;
    let mut response = String::new();
    stream.read_to_string(&mut response)?;
    assert!(response.contains("405 Method Not Allowed"));

    Ok(())
}
