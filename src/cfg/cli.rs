// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Environment variable overriding the configuration file location.
pub const CONFIG_ENV: &str = "GATELINK_CONFIG";

/// Resolves the configuration path: the `GATELINK_CONFIG` environment
/// variable wins, otherwise `rel` is resolved against the working dir.
pub fn resolve_config_path(rel: &str) -> Result<PathBuf> {
    let raw = std::env::var(CONFIG_ENV).unwrap_or_else(|_| rel.to_owned());
    let p = Path::new(&raw);

    let abs = if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()
            .context("cannot get current working dir")?
            .join(p)
    };

    let canon = abs
        .canonicalize()
        .with_context(|| format!("failed to canonicalize path {abs:?}"))?;

    Ok(canon)
}
