//! # Transcoding Engine
//!
//! The montage pipeline drives an engine that owns a private working
//! filesystem and runs ffmpeg-style argument vectors against it:
//!
//! - `write_file` / `read_file` / `file_size` / `unlink` on bare file names
//! - `run(argv)` where every path in `argv` is relative to the working dir
//!
//! Loading is separate (`EngineLoader`) because it is slow and happens once.
//! The bundled implementation shells out to an `ffmpeg` binary with a
//! temporary directory as its filesystem.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tempfile::TempDir;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Engine failed to load: {0}")]
    Load(String),
    #[error("No such file in engine filesystem: {0}")]
    NotFound(String),
    #[error("Invalid engine file name: {0}")]
    InvalidName(String),
    #[error("Engine command failed ({status}): {stderr}")]
    Command { status: String, stderr: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait TranscodeEngine: Send + Sync {
    async fn write_file(&self, name: &str, data: Bytes) -> Result<(), EngineError>;
    async fn read_file(&self, name: &str) -> Result<Bytes, EngineError>;
    /// Size in bytes without reading the contents
    async fn file_size(&self, name: &str) -> Result<u64, EngineError>;
    async fn unlink(&self, name: &str) -> Result<(), EngineError>;
    async fn run(&self, args: &[String]) -> Result<(), EngineError>;
}

#[async_trait]
pub trait EngineLoader: Send + Sync {
    async fn load(&self) -> Result<Box<dyn TranscodeEngine>, EngineError>;
}

// ============================================================================
// ffmpeg process engine
// ============================================================================

/// Flags prepended to every invocation
const BASE_ARGS: &[&str] = &["-hide_banner", "-loglevel", "error", "-nostdin", "-y"];

#[derive(Debug, Clone)]
pub struct FfmpegLoader {
    program: PathBuf,
}

impl FfmpegLoader {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl EngineLoader for FfmpegLoader {
    async fn load(&self) -> Result<Box<dyn TranscodeEngine>, EngineError> {
        let output = Command::new(&self.program)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| EngineError::Load(format!("Failed to start {:?}: {}", self.program, e)))?;

        if !output.status.success() {
            return Err(EngineError::Load(format!(
                "{:?} -version exited with {}",
                self.program, output.status
            )));
        }

        let banner = String::from_utf8_lossy(&output.stdout);
        tracing::info!(
            "Transcoding engine ready: {}",
            banner.lines().next().unwrap_or("ffmpeg")
        );

        let workdir = tempfile::Builder::new().prefix("memoreel-engine-").tempdir()?;
        tracing::debug!("Engine working directory {:?}", workdir.path());

        Ok(Box::new(FfmpegEngine {
            program: self.program.clone(),
            workdir,
        }))
    }
}

pub struct FfmpegEngine {
    program: PathBuf,
    workdir: TempDir,
}

impl FfmpegEngine {
    pub fn workdir(&self) -> &Path {
        self.workdir.path()
    }

    fn path_of(&self, name: &str) -> Result<PathBuf, EngineError> {
        let valid = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\']);
        if !valid {
            return Err(EngineError::InvalidName(name.to_string()));
        }
        Ok(self.workdir.path().join(name))
    }
}

#[async_trait]
impl TranscodeEngine for FfmpegEngine {
    async fn write_file(&self, name: &str, data: Bytes) -> Result<(), EngineError> {
        tokio::fs::write(self.path_of(name)?, &data).await?;
        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<Bytes, EngineError> {
        match tokio::fs::read(self.path_of(name)?).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(EngineError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn file_size(&self, name: &str) -> Result<u64, EngineError> {
        match tokio::fs::metadata(self.path_of(name)?).await {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(EngineError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn unlink(&self, name: &str) -> Result<(), EngineError> {
        match tokio::fs::remove_file(self.path_of(name)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(EngineError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn run(&self, args: &[String]) -> Result<(), EngineError> {
        tracing::debug!("ffmpeg {}", args.join(" "));

        let output = Command::new(&self.program)
            .args(BASE_ARGS)
            .args(args)
            .current_dir(self.workdir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            return Err(EngineError::Command {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}
