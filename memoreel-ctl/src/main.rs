//! # MemoReel Control Server
//!
//! Headless front end for the MemoReel player: line-delimited JSON-RPC 2.0
//! on stdin/stdout. Logs go to stderr so stdout carries protocol only.
//!
//! ## Usage
//! ```bash
//! memoreel-ctl
//!
//! # With debug logging
//! RUST_LOG=memoreel=debug memoreel-ctl
//!
//! # Alternate config file
//! memoreel-ctl --config ./memoreel.json
//! ```
//!
//! Besides responses, the server emits a `player/advanced` notification
//! whenever an image's display time runs out and the playlist moves on.

use anyhow::{Context, Result};
use memoreel_core::config::{default_config_path, PlayerConfig};
use memoreel_core::media::IncomingFile;
use memoreel_core::player::{Advisory, Player, PlayerDeps};
use memoreel_core::storage::StoreError;
use memoreel_core::transport::PlaybackEvent;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "memoreel=info";

// ============================================================================
// JSON-RPC Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

#[derive(Debug, Serialize)]
struct JsonRpcNotification {
    jsonrpc: &'static str,
    method: &'static str,
    params: Value,
}

#[derive(Debug, Error)]
enum RequestError {
    #[error("Method not found: {0}")]
    UnknownMethod(String),
    #[error("Invalid params: {0}")]
    InvalidParams(String),
    #[error("Nothing to save: no finished montage")]
    NoResult,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RequestError {
    fn code(&self) -> i32 {
        match self {
            Self::UnknownMethod(_) => -32601,
            Self::InvalidParams(_) => -32602,
            Self::NoResult => -32000,
            Self::Store(_) | Self::Io(_) => -32603,
        }
    }
}

impl From<RequestError> for JsonRpcError {
    fn from(e: RequestError) -> Self {
        Self {
            code: e.code(),
            message: e.to_string(),
        }
    }
}

fn param<T: serde::de::DeserializeOwned>(params: &Value, name: &str) -> Result<T, RequestError> {
    let value = params.get(name).cloned().unwrap_or(Value::Null);
    serde_json::from_value(value)
        .map_err(|e| RequestError::InvalidParams(format!("{}: {}", name, e)))
}

fn parse_event(params: &Value) -> Result<PlaybackEvent, RequestError> {
    let kind: String = param(params, "event")?;
    let event = match kind.as_str() {
        "started" => PlaybackEvent::Started,
        "paused" => PlaybackEvent::Paused,
        "ended" => PlaybackEvent::EndedNaturally,
        "error" => PlaybackEvent::Errored,
        "position" => PlaybackEvent::PositionChanged(param(params, "value")?),
        "duration" => PlaybackEvent::DurationKnown(param(params, "value")?),
        other => {
            return Err(RequestError::InvalidParams(format!(
                "unknown playback event {:?}",
                other
            )))
        }
    };
    Ok(event)
}

fn advisory_json(advisory: Option<Advisory>) -> Value {
    match advisory {
        Some(a) => {
            let message = a.message();
            json!({ "advisory": a, "message": message })
        }
        None => Value::Null,
    }
}

// ============================================================================
// Server
// ============================================================================

struct ControlServer {
    player: Player,
}

impl ControlServer {
    async fn handle_request(&mut self, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone().unwrap_or(Value::Null);

        match self.dispatch(&request.method, &request.params).await {
            Ok(value) => JsonRpcResponse {
                jsonrpc: "2.0",
                id,
                result: Some(value),
                error: None,
            },
            Err(e) => {
                warn!("{} failed: {}", request.method, e);
                JsonRpcResponse {
                    jsonrpc: "2.0",
                    id,
                    result: None,
                    error: Some(e.into()),
                }
            }
        }
    }

    async fn dispatch(&mut self, method: &str, params: &Value) -> Result<Value, RequestError> {
        match method {
            "initialize" => Ok(json!({
                "serverInfo": {
                    "name": "memoreel-ctl",
                    "version": memoreel_core::VERSION
                }
            })),

            "player/add" => self.add(params).await,
            "player/select" => {
                let index: usize = param(params, "index")?;
                let changed = self.player.select(index);
                Ok(json!({ "changed": changed, "cursor": self.player.cursor() }))
            }
            "player/next" => {
                let changed = self.player.next();
                Ok(json!({ "changed": changed, "cursor": self.player.cursor() }))
            }
            "player/previous" => {
                let changed = self.player.previous();
                Ok(json!({ "changed": changed, "cursor": self.player.cursor() }))
            }
            "player/clear" => {
                let confirm: Option<bool> = param(params, "confirm")?;
                if confirm != Some(true) {
                    return Err(RequestError::InvalidParams(
                        "clearing deletes every stored file; pass \"confirm\": true".into(),
                    ));
                }
                self.player.clear().await?;
                Ok(json!({ "cleared": true }))
            }
            "player/status" => Ok(json!(self.player.status())),

            "player/event" => {
                let event = parse_event(params)?;
                let actions = self.player.handle_playback_event(event);
                Ok(json!({ "backdrop": actions, "cursor": self.player.cursor() }))
            }
            "player/backdrop_event" => {
                let event = parse_event(params)?;
                let actions = self.player.handle_backdrop_event(event);
                Ok(json!({ "backdrop": actions }))
            }
            "player/refused" => {
                self.player.playback_refused();
                Ok(json!(self.player.session()))
            }
            "player/volume" => {
                let volume: f32 = param(params, "volume")?;
                self.player.set_volume(volume);
                Ok(json!(self.player.session()))
            }
            "player/mute" => {
                self.player.toggle_mute();
                Ok(json!(self.player.session()))
            }
            "player/seek" => {
                let position: f64 = param(params, "position")?;
                let actions = self.player.seek(position);
                Ok(json!({ "session": self.player.session(), "backdrop": actions }))
            }
            "player/fullscreen_failed" => {
                let name: String = param(params, "name")?;
                let message: String = param(params, "message")?;
                Ok(advisory_json(Some(self.player.fullscreen_failed(&name, &message))))
            }

            "montage/create" => {
                // Runs in the background; poll montage/status
                drop(self.player.start_montage());
                tokio::task::yield_now().await;
                Ok(json!(self.player.montage().state()))
            }
            "montage/status" => Ok(json!(self.player.montage().state())),
            "montage/reset" => {
                self.player.close_montage();
                Ok(json!(self.player.montage().state()))
            }
            "montage/save" => {
                let path: PathBuf = param(params, "path")?;
                let resource = self
                    .player
                    .montage()
                    .result_resource()
                    .ok_or(RequestError::NoResult)?;
                tokio::fs::write(&path, &resource.data).await?;
                info!("Saved montage to {:?} ({} bytes)", path, resource.data.len());
                Ok(json!({ "path": path, "size": resource.data.len() }))
            }

            "ambient/color" => {
                let color = self.player.ambient_color();
                Ok(json!({ "color": color, "css": color.to_css() }))
            }

            _ => Err(RequestError::UnknownMethod(method.to_string())),
        }
    }

    async fn add(&mut self, params: &Value) -> Result<Value, RequestError> {
        let paths: Vec<PathBuf> = param(params, "paths")?;

        let mut files = Vec::with_capacity(paths.len());
        let mut unreadable = 0;
        for path in &paths {
            match IncomingFile::from_path(path).await {
                Ok(file) => files.push(file),
                Err(e) => {
                    warn!("Skipping {:?}: {}", path, e);
                    unreadable += 1;
                }
            }
        }

        let before = self.player.items().len();
        let mut advisory = self.player.add_files(files);
        let added = self.player.items().len() - before;
        if unreadable > 0 && added > 0 {
            advisory = Some(Advisory::PartiallyAccepted {
                accepted: added,
                total: paths.len(),
            });
        } else if !paths.is_empty() && added == 0 {
            advisory = Some(Advisory::NoValidFiles);
        }

        Ok(json!({ "added": added, "advisory": advisory_json(advisory) }))
    }
}

// ============================================================================
// Main
// ============================================================================

enum Input {
    Line(Option<String>),
    Advanced(bool),
}

fn config_path() -> Result<PathBuf> {
    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        None => Ok(default_config_path()),
        Some("--config") => args.next().map(PathBuf::from).context("--config needs a path"),
        Some(other) => anyhow::bail!("Unknown argument {:?}", other),
    }
}

async fn write_line<T: Serialize>(stdout: &mut tokio::io::Stdout, message: &T) -> Result<()> {
    let json = serde_json::to_string(message)?;
    debug!("Sending: {}", json);
    stdout.write_all(json.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}

/// `RUST_LOG` when set and valid, otherwise `memoreel=info`
fn env_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

#[tokio::main]
async fn main() -> Result<()> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(rust_log.as_deref()))
        .with_writer(std::io::stderr)
        .init();

    info!("MemoReel control server v{} starting...", memoreel_core::VERSION);

    let config_path = config_path()?;
    let config = PlayerConfig::load(&config_path)
        .with_context(|| format!("Loading {:?}", config_path))?;
    let deps = PlayerDeps::from_config(&config).context("Opening storage")?;
    let player = Player::open(deps, &config).await;
    info!("Session restored: {} item(s)", player.items().len());

    let mut server = ControlServer { player };
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    info!("Listening for requests on stdin...");

    loop {
        let input = tokio::select! {
            line = lines.next_line() => Input::Line(line?),
            advanced = server.player.next_auto_advance() => Input::Advanced(advanced),
        };

        let line = match input {
            Input::Line(Some(line)) => line,
            Input::Line(None) => break,
            Input::Advanced(advanced) => {
                if advanced {
                    let notification = JsonRpcNotification {
                        jsonrpc: "2.0",
                        method: "player/advanced",
                        params: json!({ "cursor": server.player.cursor() }),
                    };
                    write_line(&mut stdout, &notification).await?;
                }
                continue;
            }
        };

        if line.trim().is_empty() {
            continue;
        }
        debug!("Received: {}", line);

        let request: JsonRpcRequest = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                error!("Failed to parse request: {}", e);
                continue;
            }
        };

        let response = server.handle_request(request).await;
        write_line(&mut stdout, &response).await?;
    }

    server.player.flush_writes().await;
    info!("stdin closed, shutting down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shown(filter: EnvFilter) -> String {
        filter.to_string().to_lowercase()
    }

    #[test]
    fn test_rust_log_overrides_default_level() {
        assert_eq!(shown(env_filter(Some("memoreel=debug"))), "memoreel=debug");
        assert_eq!(shown(env_filter(Some("warn"))), "warn");
    }

    #[test]
    fn test_default_filter_without_rust_log() {
        assert_eq!(shown(env_filter(None)), DEFAULT_LOG_FILTER);
        assert_eq!(shown(env_filter(Some("memoreel=loud"))), DEFAULT_LOG_FILTER);
    }
}
