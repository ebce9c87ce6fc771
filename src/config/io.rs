//! Configuration file I/O operations

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;

use super::Config;

impl Config {
    /// Get the global config directory path (~/.tether/)
    pub fn global_config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".tether")
    }

    /// Get the global config file path (~/.tether/config.toml)
    pub fn global_config_path() -> PathBuf {
        Self::global_config_dir().join("config.toml")
    }

    /// Save configuration to a file with atomic write and file locking.
    ///
    /// An exclusive lock serializes concurrent writers, the temp file + rename
    /// keeps the file intact on crash, and the parent directory is created if
    /// needed.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).with_context(|| "Failed to serialize config")?;
        write_locked(path, &content)
    }

    /// Write hand-authored TOML (e.g. a commented template) to `path`.
    ///
    /// The text is parsed first so an invalid template never reaches disk.
    pub fn write_raw(path: &Path, content: &str) -> Result<()> {
        Self::from_toml(content).with_context(|| "Refusing to write invalid config")?;
        write_locked(path, content)
    }

    /// Load configuration from `path`, creating it with defaults when missing.
    pub fn load_or_init(path: &Path) -> Result<Self> {
        if !path.exists() {
            Self::auto_init(path)?;
        }
        Self::from_file(path)
    }

    /// Load global configuration from ~/.tether/config.toml.
    /// If no config exists, auto-creates one with defaults.
    pub fn load() -> Result<Self> {
        Self::load_or_init(&Self::global_config_path())
    }

    /// Auto-initialize a configuration file when none exists.
    ///
    /// The existence check is repeated under the lock so two processes racing
    /// on first start write the file once.
    fn auto_init(path: &Path) -> Result<()> {
        let lock_file = acquire_lock(path)?;

        if path.exists() {
            drop(lock_file);
            return Ok(());
        }

        let content = toml::to_string_pretty(&Self::default())
            .with_context(|| "Failed to serialize default config")?;
        write_atomic(path, &content)?;

        tracing::info!(path = %path.display(), "created default config");
        drop(lock_file);
        Ok(())
    }
}

/// Write `content` to `path` atomically while holding the config lock.
fn write_locked(path: &Path, content: &str) -> Result<()> {
    let lock_file = acquire_lock(path)?;
    write_atomic(path, content)?;
    // Lock is released when lock_file is dropped
    drop(lock_file);
    Ok(())
}

fn acquire_lock(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
    }

    // Separate lock file so the rename below never swaps out the locked inode
    let lock_path = path.with_extension("toml.lock");
    let lock_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&lock_path)
        .with_context(|| format!("Failed to create lock file: {}", lock_path.display()))?;

    lock_file
        .lock_exclusive()
        .with_context(|| "Failed to acquire config lock")?;

    Ok(lock_file)
}

fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let temp_path = path.with_extension("toml.tmp");
    let mut temp_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)
        .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;

    temp_file
        .write_all(content.as_bytes())
        .with_context(|| "Failed to write config content")?;

    temp_file
        .sync_all()
        .with_context(|| "Failed to sync config file")?;

    std::fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename config file: {}", path.display()))?;

    Ok(())
}
