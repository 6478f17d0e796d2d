//! Health endpoint for liveness/readiness probes.
//!
//! A plain TCP listener on its own thread, deliberately decoupled from the
//! interactive session: it keeps its own best-effort attempt to load the
//! default model so probes do not depend on a user having started a session.
//!
//! `GET /health` answers 200 with a status payload when a model is loaded,
//! 503 with a diagnostic otherwise; every other path is 404.

use serde::Serialize;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::detect::{LoadOptions, ModelCache};
use crate::error::{Error, Result};

const MAX_REQUEST_BYTES: usize = 8192;

/// Shared "is a model loaded" snapshot source.
///
/// Holds the identifying label of the loaded model, if any. Computed into a
/// snapshot on each probe; nothing is stored per request.
#[derive(Clone, Default)]
pub struct HealthState {
    model: Arc<Mutex<Option<String>>>,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_loaded(&self, model_label: &str) {
        let mut guard = self.model.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(model_label.to_string());
    }

    pub fn loaded_model(&self) -> Option<String> {
        self.model
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    /// How many successive ports to try when `port` is already bound.
    pub max_port_retries: u16,
    /// Checkpoint the listener tries to load on its own, best-effort.
    pub default_model: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8502,
            max_port_retries: 10,
            default_model: None,
        }
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| io_error("health listener thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    state: HealthState,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, state: HealthState) -> Self {
        Self { cfg, state }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let listener = bind_with_retry(&self.cfg.host, self.cfg.port, self.cfg.max_port_retries)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let state = self.state.clone();
        let default_model = self.cfg.default_model.clone();
        let join = std::thread::spawn(move || {
            if let Some(path) = default_model {
                // Best-effort load so probes work before any user interaction.
                let mut cache = ModelCache::new();
                match cache.load(&path, LoadOptions::trusted()) {
                    Ok(_) => state.set_loaded(&path.display().to_string()),
                    Err(err) => log::warn!("health listener default model load failed: {}", err),
                }
            }
            if let Err(err) = run_api(listener, state, shutdown_thread) {
                log::error!("health listener stopped: {}", err);
            }
        });

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

/// Bind the configured port, moving to the next one on conflict, with an
/// explicit failure once the retry budget is exhausted.
fn bind_with_retry(host: &str, port: u16, max_retries: u16) -> Result<TcpListener> {
    for offset in 0..=max_retries {
        let Some(candidate) = port.checked_add(offset) else {
            break;
        };
        match TcpListener::bind((host, candidate)) {
            Ok(listener) => {
                if offset > 0 {
                    log::warn!("port {} was busy, listening on {}", port, candidate);
                }
                return Ok(listener);
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => continue,
            Err(err) => {
                return Err(Error::ListenerBind(format!(
                    "cannot bind {}:{}: {}",
                    host, candidate, err
                )))
            }
        }
    }
    Err(Error::ListenerBind(format!(
        "no free port in {}..={}",
        port,
        port.saturating_add(max_retries)
    )))
}

fn run_api(listener: TcpListener, state: HealthState, shutdown: Arc<AtomicBool>) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(err) = handle_connection(stream, &state) {
                    log::warn!("health probe failed: {}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct HealthSnapshot<'a> {
    status: &'static str,
    model: &'a str,
    loaded: bool,
    timestamp: f64,
    #[serde(rename = "Improvement")]
    improvement: bool,
}

fn handle_connection(mut stream: TcpStream, state: &HealthState) -> Result<()> {
    let request = read_request(&mut stream)?;
    if request.method != "GET" {
        write_json_response(&mut stream, 405, r#"{"error":"method_not_allowed"}"#)?;
        return Ok(());
    }

    match request.path.as_str() {
        "/health" => match state.loaded_model() {
            Some(model) => {
                let timestamp = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map_err(|e| io_error(format!("system clock error: {}", e)))?
                    .as_secs_f64();
                let snapshot = HealthSnapshot {
                    status: "healthy",
                    model: &model,
                    loaded: true,
                    timestamp,
                    improvement: false,
                };
                let body = serde_json::to_string(&snapshot)
                    .map_err(|e| io_error(format!("encode snapshot: {}", e)))?;
                write_json_response(&mut stream, 200, &body)?;
            }
            None => {
                write_json_response(&mut stream, 503, r#"{"detail":"model not loaded"}"#)?;
            }
        },
        other => {
            let body = serde_json::json!({ "error": "Not Found", "path": other });
            write_json_response(&mut stream, 404, &body.to_string())?;
        }
    }
    Ok(())
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            return Err(io_error("request too large"));
        }
        if data.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    let text = String::from_utf8_lossy(&data);
    let request_line = text
        .split("\r\n")
        .next()
        .ok_or_else(|| io_error("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| io_error("missing method"))?;
    let raw_path = parts
        .next()
        .ok_or_else(|| io_error("missing path"))?;
    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
    })
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        503 => "HTTP/1.1 503 Service Unavailable",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {len}\r\nCache-Control: no-store\r\n\r\n",
        status_line = status_line,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body.as_bytes())?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
}

/// Per-connection failures are plain I/O problems; `ListenerBind` stays
/// reserved for the bind/shutdown lifecycle.
fn io_error(message: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Error {
    Error::Io(std::io::Error::other(message))
}
