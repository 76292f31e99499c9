// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::Path;

use anyhow::Context;
use tracing::debug;

use crate::Config;

/// Load configuration from an optional YAML file.
///
/// When `path` is `None` or the file does not exist, built-in defaults are
/// returned.  A present-but-malformed file is an error; silently ignoring a
/// broken config hides operator mistakes.
pub fn load(path: Option<&Path>) -> anyhow::Result<Config> {
    let Some(p) = path else {
        return Ok(Config::default());
    };
    if !p.is_file() {
        debug!(path = %p.display(), "config file absent, using defaults");
        return Ok(Config::default());
    }
    let text =
        std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
    let config: Config =
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", p.display()))?;
    Ok(config)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
