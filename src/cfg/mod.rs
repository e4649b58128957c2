//! This module handles configuration, path resolution, and logging.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Configuration path resolution.
pub mod cli;
/// Configuration file parsing and management.
pub mod config;
/// Logger and tracer initialization.
pub mod logger;
