//! Command line and persisted host configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};

/// Default TCP port of the debugger listener.
pub const DEFAULT_DEBUG_PORT: u16 = 8091;

#[derive(Debug, Clone, Parser)]
#[command(name = "atrium")]
#[command(about = "Host for sandboxed grid-layout apps", long_about = None)]
#[command(version)]
pub struct Args {
    /// HTTP timeout for downloads (e.g. 30s, 2m, 500ms)
    #[arg(long, default_value = "30s", value_parser = parse_duration)]
    pub timeout: Duration,

    /// Debugger listener port (0 disables)
    #[arg(long, default_value_t = DEFAULT_DEBUG_PORT)]
    pub debug_port: u16,

    /// Data directory (defaults to ~/.atrium)
    #[arg(long)]
    pub data: Option<PathBuf>,

    /// Stop after this many frames
    #[arg(long)]
    pub frames: Option<u64>,

    /// Save the last frame as a PNG on exit
    #[arg(long)]
    pub screenshot: Option<PathBuf>,

    /// Directory of TTF/OTF font files (fixed-advance faces when absent)
    #[arg(long)]
    pub fonts: Option<PathBuf>,

    /// App rendered into the window
    #[arg(value_name = "APP", default_value = "main")]
    pub app: String,
}

/// Parse `30s`, `2m`, `500ms`, `1h` or a bare number of seconds.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit() && c != '.').unwrap_or(s.len());
    let (num, unit) = s.split_at(split);
    let value: f64 = num.parse().map_err(|_| format!("invalid duration: {s:?}"))?;
    let secs = match unit.trim() {
        "" | "s" => value,
        "ms" => value / 1000.0,
        "m" => value * 60.0,
        "h" => value * 3600.0,
        other => return Err(format!("unknown duration unit {other:?}")),
    };
    if !secs.is_finite() || secs < 0.0 {
        return Err(format!("invalid duration: {s:?}"));
    }
    Ok(Duration::from_secs_f64(secs))
}

/// Resolved host configuration.
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub timeout: Duration,
    pub debug_port: Option<u16>,
    pub data_dir: PathBuf,
    pub frames: Option<u64>,
    pub screenshot: Option<PathBuf>,
    pub fonts: Option<PathBuf>,
    pub app: String,
}

impl HostConfig {
    pub fn from_args(args: Args) -> Result<Self> {
        let data_dir = match args.data {
            Some(dir) => dir,
            None => default_data_dir()?,
        };
        Ok(Self {
            timeout: args.timeout,
            debug_port: (args.debug_port != 0).then_some(args.debug_port),
            data_dir,
            frames: args.frames,
            screenshot: args.screenshot,
            fonts: args.fonts,
            app: args.app,
        })
    }

    /// Configuration rooted at `data_dir` with everything else defaulted.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            timeout: Duration::from_secs(30),
            debug_port: None,
            data_dir: data_dir.into(),
            frames: None,
            screenshot: None,
            fonts: None,
            app: "main".into(),
        }
    }

    pub fn apps_dir(&self) -> PathBuf {
        self.data_dir.join("apps")
    }

    pub fn layout_file(&self) -> PathBuf {
        self.data_dir.join("layouts").join("Root.json")
    }

    pub fn window_file(&self) -> PathBuf {
        self.data_dir.join("window.json")
    }

    pub fn host_db(&self) -> PathBuf {
        self.data_dir.join("host.sqlite")
    }
}

/// `~/.atrium`.
pub fn default_data_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".atrium"))
}

/// Persisted window placement (`window.json`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowGeometry {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowGeometry {
    fn default() -> Self {
        Self { x: 100, y: 100, width: 1280, height: 800 }
    }
}

impl WindowGeometry {
    /// Load, falling back to the default on a missing or unreadable file.
    pub fn load(path: &Path) -> Self {
        match std::fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                tracing::warn!(?path, "ignoring malformed window file: {e}");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {:?}", path))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_with_units() {
        assert_eq!(parse_duration("30s"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
        assert_eq!(parse_duration("500ms"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
        assert_eq!(parse_duration("5"), Ok(Duration::from_secs(5)));
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("3 weeks").is_err());
    }

    #[test]
    fn debug_port_zero_disables() {
        let args = Args::parse_from(["atrium", "--debug-port", "0", "--data", "/tmp/x"]);
        let cfg = HostConfig::from_args(args).unwrap();
        assert_eq!(cfg.debug_port, None);
        assert_eq!(cfg.host_db(), PathBuf::from("/tmp/x/host.sqlite"));

        let args = Args::parse_from(["atrium", "--data", "/tmp/x", "notes"]);
        let cfg = HostConfig::from_args(args).unwrap();
        assert_eq!(cfg.debug_port, Some(DEFAULT_DEBUG_PORT));
        assert_eq!(cfg.app, "notes");
    }

    #[test]
    fn window_geometry_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("window.json");
        assert_eq!(WindowGeometry::load(&path), WindowGeometry::default());
        let geo = WindowGeometry { x: 5, y: 6, width: 640, height: 480 };
        geo.save(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"width\": 640"));
        assert_eq!(WindowGeometry::load(&path), geo);
    }
}
