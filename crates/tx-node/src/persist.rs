//! On-disk configuration document.
//!
//! The desired configuration survives restarts as a pretty-printed JSON file.
//! Writes go through a temporary sibling and a rename, so a crash mid-write
//! leaves the previous document intact.

use crate::error::ConfigError;
use crate::store;
use common::config::{ConfigUpdate, Configuration, FieldRejection};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const CONFIG_PATH_ENV: &str = "CAMERA_TX_CONFIG_PATH";

const APP_DIR: &str = "camera-tx";
const FILE_NAME: &str = "config.json";

/// What was found on disk at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedConfig {
  pub config: Configuration,
  /// Fields in the stored document that failed validation and were replaced by defaults.
  pub rejections: Vec<FieldRejection>,
  /// The document was missing, unreadable or partly invalid and has been rewritten.
  pub rewritten: bool,
}

#[derive(Debug, Clone)]
pub struct ConfigFile {
  path: PathBuf,
}

impl ConfigFile {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  /// Locate the document from the process environment.
  pub fn resolve() -> Self {
    Self::resolve_with(|key| std::env::var(key).ok())
  }

  /// Resolution order: explicit override, `$XDG_CONFIG_HOME/camera-tx`, a
  /// legacy `~/.camera-tx` that already holds a document, `~/.config/camera-tx`,
  /// then the working directory.
  pub fn resolve_with(lookup: impl Fn(&str) -> Option<String>) -> Self {
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(path) = non_empty(CONFIG_PATH_ENV) {
      return Self::new(path);
    }
    if let Some(xdg) = non_empty("XDG_CONFIG_HOME") {
      return Self::new(Path::new(&xdg).join(APP_DIR).join(FILE_NAME));
    }
    if let Some(home) = non_empty("HOME") {
      let legacy = Path::new(&home).join(format!(".{APP_DIR}")).join(FILE_NAME);
      if legacy.is_file() {
        return Self::new(legacy);
      }
      return Self::new(Path::new(&home).join(".config").join(APP_DIR).join(FILE_NAME));
    }
    Self::new(FILE_NAME)
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Read and validate the stored document. A missing or corrupt file is
  /// replaced with defaults; invalid fields fall back to their defaults.
  pub fn load_or_default(&self) -> LoadedConfig {
    let raw = match fs::read(&self.path) {
      Ok(raw) => raw,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        info!(path = %self.path.display(), "no stored configuration, writing defaults");
        return self.reset_to_defaults();
      }
      Err(e) => {
        let err = ConfigError::Read {
          path: self.path.clone(),
          source: e,
        };
        warn!(error = %err, "stored configuration unreadable, using defaults");
        return self.reset_to_defaults();
      }
    };

    let update = match ConfigUpdate::from_json(&raw) {
      Ok(update) => update,
      Err(e) => {
        warn!(path = %self.path.display(), error = %ConfigError::from(e), "stored configuration is corrupt, using defaults");
        return self.reset_to_defaults();
      }
    };

    let (config, rejections) = store::merge(&Configuration::default(), &update);
    let rewritten = !rejections.is_empty();
    for rejection in &rejections {
      warn!(field = %rejection.field, reason = %rejection.reason, "stored value rejected, using default");
    }
    if rewritten {
      self.save_logged(&config);
    }
    info!(path = %self.path.display(), "configuration loaded");
    LoadedConfig {
      config,
      rejections,
      rewritten,
    }
  }

  fn reset_to_defaults(&self) -> LoadedConfig {
    let config = Configuration::default();
    self.save_logged(&config);
    LoadedConfig {
      config,
      rejections: Vec::new(),
      rewritten: true,
    }
  }

  fn save_logged(&self, config: &Configuration) {
    if let Err(e) = self.save(config) {
      warn!(error = %e, "failed to write configuration");
    }
  }

  /// Write the full document atomically.
  pub fn save(&self, config: &Configuration) -> Result<(), ConfigError> {
    let write_err = |source| ConfigError::Write {
      path: self.path.clone(),
      source,
    };

    if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
      let mut builder = fs::DirBuilder::new();
      builder.recursive(true);
      #[cfg(unix)]
      {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
      }
      builder.create(dir).map_err(write_err)?;
    }

    let mut body = serde_json::to_vec_pretty(config)?;
    body.push(b'\n');
    let tmp = self.path.with_extension("json.tmp");
    fs::write(&tmp, &body).map_err(write_err)?;
    fs::rename(&tmp, &self.path).map_err(write_err)?;
    Ok(())
  }
}
