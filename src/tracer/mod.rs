// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Global tracing switch plus thin span helpers over `fastrace`.
//!
//! When the switch is off every helper degrades to a no-op span and no
//! trace block is written to the wire, so the hot path pays one atomic
//! load. The fastrace reporter itself is installed by the logger bootstrap.

use std::sync::atomic::{AtomicBool, Ordering};

use fastrace::{Span, collector::SpanContext};

static ENABLED: AtomicBool = AtomicBool::new(false);

/// Flips the global switch. Called once at component start, before any
/// cluster connection is dialed.
pub fn set_enabled(enabled: bool) {
    ENABLED.store(enabled, Ordering::Release);
}

pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Acquire)
}

/// Opens a client span for an outbound RPC, continuing the local parent
/// when one is set.
pub fn client_span(name: &str) -> Span {
    if !is_enabled() {
        return Span::noop();
    }

    match SpanContext::current_local_parent() {
        Some(parent) => Span::root(name.to_owned(), parent),
        None => Span::root(name.to_owned(), SpanContext::random()),
    }
}

/// Rehydrates a server span under a remote parent carried in the frame's
/// trace block.
pub fn server_span(name: &str, remote: Option<SpanContext>) -> Span {
    if !is_enabled() {
        return Span::noop();
    }

    match remote {
        Some(parent) => Span::root(name.to_owned(), parent),
        None => Span::root(name.to_owned(), SpanContext::random()),
    }
}

/// Span context of an open span, for piggybacking on the wire.
pub fn span_context(span: &Span) -> Option<SpanContext> {
    SpanContext::from_span(span)
}
