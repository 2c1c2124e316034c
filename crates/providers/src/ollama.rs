//! Local inference through an Ollama daemon on this machine.
//!
//! The model artifact is pulled once per process; later loads only warm it
//! back into memory.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::settings::LocalSettings;
use shared::{HistoryEntry, ProviderError, Role};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use sysinfo::System;
use tokio::sync::mpsc::UnboundedSender;

use crate::backend::{LoadProgress, LocalEngine};

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage>,
    stream: bool,
    keep_alive: &'a str,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
}

#[derive(Debug, Serialize)]
struct PullRequest<'a> {
    name: &'a str,
    stream: bool,
}

/// One NDJSON line of `/api/pull` output
#[derive(Debug, Deserialize)]
struct PullLine {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    total: Option<u64>,
    #[serde(default)]
    completed: Option<u64>,
    #[serde(default)]
    error: Option<String>,
}

/// `/api/generate` with no prompt only loads or evicts the model.
#[derive(Debug, Serialize)]
struct KeepAliveRequest<'a> {
    model: &'a str,
    keep_alive: serde_json::Value,
}

pub struct OllamaEngine {
    http: Client,
    base: String,
    model: String,
    keep_alive: String,
    downloaded: AtomicBool,
    resident: AtomicBool,
}

impl OllamaEngine {
    pub fn new(settings: &LocalSettings) -> Result<Self, ProviderError> {
        let base = std::env::var("OLLAMA_BASE_URL").unwrap_or_else(|_| settings.base_url.clone());
        let model = settings
            .model
            .clone()
            .unwrap_or_else(|| recommended_model().0.to_string());
        // Pulls can run for many minutes, so only the connect phase is bounded.
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
            model,
            keep_alive: settings.keep_alive.clone(),
            downloaded: AtomicBool::new(false),
            resident: AtomicBool::new(false),
        })
    }

    async fn pull(&self, progress: &UnboundedSender<LoadProgress>) -> Result<(), ProviderError> {
        let url = format!("{}/api/pull", self.base);
        let req = PullRequest {
            name: &self.model,
            stream: true,
        };
        let resp = self
            .http
            .post(url)
            .json(&req)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ProviderError::ModelLoad(format!("pull failed: {}", resp.status())));
        }

        // Ollama streams line-delimited JSON. Chunks can end mid-line or
        // mid-character, so only complete lines are decoded.
        let mut stream = resp.bytes_stream();
        let mut buf: Vec<u8> = Vec::new();
        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| ProviderError::Network(e.to_string()))?;
            buf.extend_from_slice(&bytes);

            while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buf.drain(..=pos).collect();
                forward_pull_line(&line, progress)?;
            }
        }
        forward_pull_line(&buf, progress)
    }

    async fn set_keep_alive(&self, keep_alive: serde_json::Value) -> Result<(), ProviderError> {
        let url = format!("{}/api/generate", self.base);
        let req = KeepAliveRequest {
            model: &self.model,
            keep_alive,
        };
        let resp = self
            .http
            .post(url)
            .json(&req)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ProviderError::ModelLoad(format!("ollama error: {}", resp.status())));
        }
        Ok(())
    }
}

fn forward_pull_line(line: &[u8], progress: &UnboundedSender<LoadProgress>) -> Result<(), ProviderError> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim();
    if line.is_empty() {
        return Ok(());
    }
    if let Some(update) = parse_pull_line(line)? {
        let _ = progress.send(update);
    }
    Ok(())
}

fn parse_pull_line(line: &str) -> Result<Option<LoadProgress>, ProviderError> {
    let parsed: PullLine = match serde_json::from_str(line) {
        Ok(p) => p,
        Err(e) => {
            tracing::debug!("skipping unparseable pull line: {}", e);
            return Ok(None);
        }
    };
    if let Some(err) = parsed.error {
        return Err(ProviderError::ModelLoad(err));
    }
    Ok(parsed.status.map(|status| LoadProgress {
        status,
        completed: parsed.completed,
        total: parsed.total,
    }))
}

#[async_trait]
impl LocalEngine for OllamaEngine {
    fn model(&self) -> &str {
        &self.model
    }

    fn is_accelerated(&self) -> bool {
        has_gpu_acceleration()
    }

    async fn load(&self, progress: UnboundedSender<LoadProgress>) -> Result<(), ProviderError> {
        if self.resident.load(Ordering::Acquire) {
            return Ok(());
        }
        if !self.downloaded.load(Ordering::Acquire) {
            tracing::info!(model = %self.model, "pulling local model");
            self.pull(&progress).await?;
            self.downloaded.store(true, Ordering::Release);
        } else {
            tracing::debug!(model = %self.model, "reusing pulled model");
        }
        let _ = progress.send(LoadProgress::status("loading model into memory"));
        self.set_keep_alive(serde_json::Value::String(self.keep_alive.clone()))
            .await?;
        self.resident.store(true, Ordering::Release);
        Ok(())
    }

    async fn generate(&self, history: &[HistoryEntry]) -> Result<String, ProviderError> {
        let messages = history
            .iter()
            .map(|entry| OllamaMessage {
                role: match entry.role {
                    Role::User => "user",
                    Role::Bot => "assistant",
                }
                .to_string(),
                content: entry.content.clone(),
            })
            .collect();
        let url = format!("{}/api/chat", self.base);
        let req = OllamaChatRequest {
            model: &self.model,
            messages,
            stream: false,
            keep_alive: &self.keep_alive,
        };
        let resp = self
            .http
            .post(url)
            .timeout(Duration::from_secs(120))
            .json(&req)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ProviderError::Backend(format!("ollama error: {}", resp.status())));
        }
        let body: OllamaChatResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Backend(format!("unreadable response: {}", e)))?;
        Ok(body.message.content)
    }

    async fn unload(&self) -> Result<(), ProviderError> {
        if !self.resident.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        tracing::info!(model = %self.model, "releasing local model");
        self.set_keep_alive(serde_json::Value::from(0)).await
    }
}

/// How much RAM is available (approximately) for choosing a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RamTier {
    /// < 4 GB
    Tiny,
    /// 4–7 GB
    Low,
    /// 8–15 GB
    Medium,
    /// 16+ GB
    High,
}

fn ram_tier() -> RamTier {
    let mut sys = System::new();
    sys.refresh_memory();
    tier_for_bytes(sys.total_memory())
}

fn tier_for_bytes(bytes: u64) -> RamTier {
    let gb = bytes as f64 / (1024.0 * 1024.0 * 1024.0);
    if gb < 4.0 {
        RamTier::Tiny
    } else if gb < 8.0 {
        RamTier::Low
    } else if gb < 16.0 {
        RamTier::Medium
    } else {
        RamTier::High
    }
}

/// Detect whether this machine has GPU acceleration for LLM inference.
///
/// Apple Silicon uses Metal. Elsewhere we look for CUDA (`nvidia-smi`) or ROCm.
pub fn has_gpu_acceleration() -> bool {
    if cfg!(target_os = "macos") && cfg!(target_arch = "aarch64") {
        return true;
    }

    if cfg!(target_os = "linux") || cfg!(target_os = "windows") {
        let nvidia_cmd = if cfg!(windows) { "nvidia-smi.exe" } else { "nvidia-smi" };
        if probe_command(nvidia_cmd) {
            return true;
        }
        if !cfg!(windows) && probe_command("rocminfo") {
            return true;
        }
    }

    false
}

fn probe_command(cmd: &str) -> bool {
    Command::new(cmd)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Pick the default model tag for this machine's RAM and GPU.
///
/// Returns `(model_tag, human_description)`.
pub fn recommended_model() -> (&'static str, &'static str) {
    model_for(ram_tier(), has_gpu_acceleration())
}

fn model_for(tier: RamTier, gpu: bool) -> (&'static str, &'static str) {
    match (tier, gpu) {
        (RamTier::Tiny, _) => ("tinyllama", "TinyLlama (1.1B), fits on low-RAM devices"),
        (RamTier::Low, _) => ("llama3.2:1b", "Llama 3.2 1B, compact but capable"),
        (RamTier::Medium, _) => ("llama3.2:3b", "Llama 3.2 3B, good balance of speed and quality"),
        (RamTier::High, true) => ("llama3.1:8b", "Llama 3.1 8B, GPU accelerated"),
        // larger models crawl without a GPU
        (RamTier::High, false) => ("llama3.2:3b", "Llama 3.2 3B, capped for CPU-only speed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use shared::ErrorKind;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    const GB: u64 = 1024 * 1024 * 1024;

    #[test]
    fn test_ram_tiers() {
        assert_eq!(tier_for_bytes(2 * GB), RamTier::Tiny);
        assert_eq!(tier_for_bytes(6 * GB), RamTier::Low);
        assert_eq!(tier_for_bytes(8 * GB), RamTier::Medium);
        assert_eq!(tier_for_bytes(32 * GB), RamTier::High);
    }

    #[test]
    fn test_cpu_only_caps_model_size() {
        assert_eq!(model_for(RamTier::High, true).0, "llama3.1:8b");
        assert_eq!(model_for(RamTier::High, false).0, "llama3.2:3b");
        assert_eq!(model_for(RamTier::Tiny, true).0, "tinyllama");
    }

    #[test]
    fn test_parse_pull_line() {
        let p = parse_pull_line(r#"{"status":"downloading","total":100,"completed":40}"#)
            .unwrap()
            .unwrap();
        assert_eq!(p.percent(), Some(40));

        assert!(parse_pull_line("garbage").unwrap().is_none());

        let err = parse_pull_line(r#"{"error":"model not found"}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ModelLoad);
    }

    #[test]
    fn test_configured_model_wins() {
        let settings = LocalSettings {
            model: Some("qwen2.5:0.5b".into()),
            ..LocalSettings::default()
        };
        let engine = OllamaEngine::new(&settings).unwrap();
        assert_eq!(engine.model(), "qwen2.5:0.5b");
    }

    /// Minimal Ollama stand-in: `/api/pull` streams `pull_chunks` with
    /// chunked encoding, `/api/generate` records the `keep_alive` it got.
    struct StubOllama {
        base: String,
        pulls: Arc<AtomicUsize>,
        keep_alives: Arc<Mutex<Vec<serde_json::Value>>>,
    }

    async fn stub_ollama(pull_chunks: Vec<&'static [u8]>) -> StubOllama {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let pulls = Arc::new(AtomicUsize::new(0));
        let keep_alives = Arc::new(Mutex::new(Vec::new()));

        let (p, k) = (pulls.clone(), keep_alives.clone());
        tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(serve(socket, pull_chunks.clone(), p.clone(), k.clone()));
            }
        });
        StubOllama {
            base,
            pulls,
            keep_alives,
        }
    }

    async fn serve(
        mut socket: TcpStream,
        pull_chunks: Vec<&'static [u8]>,
        pulls: Arc<AtomicUsize>,
        keep_alives: Arc<Mutex<Vec<serde_json::Value>>>,
    ) {
        let mut head = Vec::new();
        let mut byte = [0u8; 1];
        while !head.ends_with(b"\r\n\r\n") {
            if socket.read(&mut byte).await.unwrap_or(0) == 0 {
                return;
            }
            head.push(byte[0]);
        }
        let head = String::from_utf8_lossy(&head).to_string();
        let length = head
            .lines()
            .filter_map(|l| l.split_once(':'))
            .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, v)| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        let mut body = vec![0u8; length];
        socket.read_exact(&mut body).await.unwrap();
        let path = head.split_whitespace().nth(1).unwrap_or("").to_string();

        if path == "/api/pull" {
            pulls.fetch_add(1, Ordering::SeqCst);
            socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\nContent-Type: application/x-ndjson\r\n\
                      Transfer-Encoding: chunked\r\nConnection: close\r\n\r\n",
                )
                .await
                .unwrap();
            for chunk in pull_chunks {
                socket
                    .write_all(format!("{:x}\r\n", chunk.len()).as_bytes())
                    .await
                    .unwrap();
                socket.write_all(chunk).await.unwrap();
                socket.write_all(b"\r\n").await.unwrap();
                socket.flush().await.unwrap();
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            socket.write_all(b"0\r\n\r\n").await.unwrap();
        } else {
            let req: serde_json::Value = serde_json::from_slice(&body).unwrap();
            keep_alives.lock().push(req["keep_alive"].clone());
            socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\
                      Content-Length: 2\r\nConnection: close\r\n\r\n{}",
                )
                .await
                .unwrap();
        }
        let _ = socket.shutdown().await;
    }

    fn engine_at(base: &str) -> OllamaEngine {
        let settings = LocalSettings {
            model: Some("tinyllama".into()),
            base_url: base.to_string(),
            ..LocalSettings::default()
        };
        OllamaEngine::new(&settings).unwrap()
    }

    #[tokio::test]
    async fn test_reload_reuses_pulled_model() {
        let stub = stub_ollama(vec![
            b"{\"status\":\"pulling manifest\"}\n{\"status\":\"downlo",
            b"ading\",\"total\":100,\"completed\":50}\n{\"status\":\"verifying \xE2\x9C",
            b"\x93\"}\n{\"status\":\"success\"}",
        ])
        .await;
        let engine = engine_at(&stub.base);

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        engine.load(tx).await.unwrap();
        let mut updates = Vec::new();
        while let Ok(update) = rx.try_recv() {
            updates.push(update);
        }
        let statuses: Vec<&str> = updates.iter().map(|u| u.status.as_str()).collect();
        assert_eq!(
            statuses,
            [
                "pulling manifest",
                "downloading",
                "verifying ✓",
                "success",
                "loading model into memory"
            ]
        );
        assert_eq!(updates[1].percent(), Some(50));

        engine.unload().await.unwrap();
        engine.load(tokio::sync::mpsc::unbounded_channel().0).await.unwrap();

        assert_eq!(stub.pulls.load(Ordering::SeqCst), 1);
        assert_eq!(
            *stub.keep_alives.lock(),
            vec![
                serde_json::json!("30m"),
                serde_json::json!(0),
                serde_json::json!("30m")
            ]
        );
    }

    #[tokio::test]
    async fn test_pull_error_mid_stream() {
        let stub = stub_ollama(vec![
            b"{\"status\":\"pulling manifest\"}\n{\"err",
            b"or\":\"disk full\"}\n{\"status\":\"success\"}\n",
        ])
        .await;
        let engine = engine_at(&stub.base);

        let err = engine
            .load(tokio::sync::mpsc::unbounded_channel().0)
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::ModelLoad("disk full".into()));
        assert!(stub.keep_alives.lock().is_empty());

        // nothing was cached, so the next load pulls again
        assert!(engine.load(tokio::sync::mpsc::unbounded_channel().0).await.is_err());
        assert_eq!(stub.pulls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unload_without_load_is_noop() {
        let settings = LocalSettings {
            model: Some("tinyllama".into()),
            // nothing listens here; unload must not even try
            base_url: "http://127.0.0.1:9".into(),
            ..LocalSettings::default()
        };
        let engine = OllamaEngine::new(&settings).unwrap();
        assert!(engine.unload().await.is_ok());
        assert!(engine.unload().await.is_ok());
    }
}
