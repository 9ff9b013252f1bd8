//! Env-file loading.
//!
//! - `DEVSCOPE_ENV_FILE=<path>` loads that file.
//! - otherwise `./.env` is loaded when present, unless `DEVSCOPE_DOTENV=0`.
//! - variables already set in the process environment are never overridden.
//! - values are never logged.

use std::path::{Path, PathBuf};

pub fn env_file_path() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("DEVSCOPE_ENV_FILE") {
        let p = p.trim();
        if !p.is_empty() {
            return Some(PathBuf::from(p));
        }
    }
    let autoload = !matches!(
        std::env::var("DEVSCOPE_DOTENV")
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
            .as_str(),
        "0" | "false" | "no" | "off"
    );
    let local = PathBuf::from(".env");
    (autoload && local.is_file()).then_some(local)
}

/// `KEY=VALUE` pairs from `path`, parsed with dotenv rules (comments, `export`, quoting).
/// Lines that fail to parse are skipped.
pub fn read_pairs(path: &Path) -> Vec<(String, String)> {
    let iter = match dotenvy::from_path_iter(path) {
        Ok(iter) => iter,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "env file not readable; skipping");
            return Vec::new();
        }
    };
    iter.filter_map(|item| match item {
        Ok(pair) => Some(pair),
        Err(e) => {
            // The error text can quote the offending line, so only its kind is logged.
            let kind = match e {
                dotenvy::Error::LineParse(..) => "line parse",
                dotenvy::Error::Io(..) => "io",
                _ => "other",
            };
            tracing::warn!(path = %path.display(), kind, "skipping unparsable env file entry");
            None
        }
    })
    .collect()
}

/// Load `path` into the process environment. Returns how many variables were set.
pub fn load(path: &Path) -> usize {
    let mut set = 0;
    for (k, v) in read_pairs(path) {
        // Don't override explicit process env.
        if std::env::var_os(&k).is_none() {
            std::env::set_var(&k, v);
            set += 1;
        }
    }
    set
}
