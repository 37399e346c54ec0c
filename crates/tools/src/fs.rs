//! Filesystem tools — directory listing and file reading behind a path
//! allowlist.
//!
//! Paths are canonicalized before the check, so symlinks and `..` cannot
//! escape the allowed roots. Callers may widen the allowlist per call with
//! an `allow` argument; the default root is the process working directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ratchet_core::{Capability, Envelope, ErrorCode};
use serde_json::{Map, Value, json};

/// Byte cap applied to file reads before sanitization.
pub const MAX_READ_BYTES: usize = 100_000;

fn default_roots() -> Vec<PathBuf> {
    vec![std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))]
}

/// Canonicalize `raw` and require it to live under one of the roots.
fn resolve_allowed(raw: &str, roots: &[PathBuf], extra: &[PathBuf]) -> Result<PathBuf, Envelope> {
    let resolved = match std::fs::canonicalize(raw) {
        Ok(p) => p,
        Err(e) => return Err(Envelope::error(ErrorCode::NotFound, e.to_string())),
    };
    let permitted = roots.iter().chain(extra).any(|root| {
        std::fs::canonicalize(root)
            .map(|r| resolved.starts_with(&r))
            .unwrap_or(false)
    });
    if permitted {
        Ok(resolved)
    } else {
        Err(Envelope::error(ErrorCode::Forbidden, "path not allowed"))
    }
}

fn extra_roots(args: &Map<String, Value>) -> Vec<PathBuf> {
    args.get("allow")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(PathBuf::from)
                .collect()
        })
        .unwrap_or_default()
}

fn path_arg(args: &Map<String, Value>) -> Result<&str, Envelope> {
    args.get("path")
        .and_then(Value::as_str)
        .ok_or_else(|| Envelope::error(ErrorCode::MissingArgs, "path"))
}

/// `fs.list` — list a directory, optionally recursively.
pub struct FsList {
    roots: Vec<PathBuf>,
}

impl FsList {
    pub fn new() -> Self {
        Self::with_roots(default_roots())
    }

    pub fn with_roots(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }
}

impl Default for FsList {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Capability for FsList {
    async fn invoke(&self, args: Map<String, Value>) -> Envelope {
        let raw = match path_arg(&args) {
            Ok(p) => p,
            Err(env) => return env,
        };
        let path = match resolve_allowed(raw, &self.roots, &extra_roots(&args)) {
            Ok(p) => p,
            Err(env) => return env,
        };
        let recursive = args.get("recursive").and_then(Value::as_bool).unwrap_or(false);

        if recursive {
            let base = path.clone();
            match tokio::task::spawn_blocking(move || walk(&base)).await {
                Ok(Ok(names)) => Envelope::ok(json!(names)),
                Ok(Err(e)) => Envelope::error(ErrorCode::NotFound, e.to_string()),
                Err(e) => Envelope::error(ErrorCode::Internal, e.to_string()),
            }
        } else {
            match list_shallow(&path).await {
                Ok(names) => Envelope::ok(json!(names)),
                Err(e) => Envelope::error(ErrorCode::NotFound, e.to_string()),
            }
        }
    }
}

async fn list_shallow(path: &Path) -> std::io::Result<Vec<String>> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(path).await?;
    while let Some(entry) = entries.next_entry().await? {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

fn walk(base: &Path) -> std::io::Result<Vec<String>> {
    let mut names = Vec::new();
    let mut stack = vec![base.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            let rel = path.strip_prefix(base).unwrap_or(path.as_path());
            names.push(rel.to_string_lossy().into_owned());
            if path.is_dir() {
                stack.push(path);
            }
        }
    }
    names.sort();
    Ok(names)
}

/// `fs.read` — read a file capped at `max_bytes`, sanitized before return.
pub struct FsRead {
    roots: Vec<PathBuf>,
}

impl FsRead {
    pub fn new() -> Self {
        Self::with_roots(default_roots())
    }

    pub fn with_roots(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }
}

impl Default for FsRead {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Capability for FsRead {
    async fn invoke(&self, args: Map<String, Value>) -> Envelope {
        let raw = match path_arg(&args) {
            Ok(p) => p,
            Err(env) => return env,
        };
        let path = match resolve_allowed(raw, &self.roots, &extra_roots(&args)) {
            Ok(p) => p,
            Err(env) => return env,
        };
        let max_bytes = args
            .get("max_bytes")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(MAX_READ_BYTES);

        match tokio::fs::read(&path).await {
            Ok(mut bytes) => {
                bytes.truncate(max_bytes);
                let text = String::from_utf8_lossy(&bytes);
                Envelope::ok(json!(ratchet_security::sanitize(
                    &text,
                    ratchet_security::DEFAULT_CHAR_LIMIT,
                    ratchet_security::DEFAULT_TOKEN_LIMIT,
                )))
            }
            Err(e) => Envelope::error(ErrorCode::NotFound, e.to_string()),
        }
    }
}
