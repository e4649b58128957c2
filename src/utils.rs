// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::fmt::Write;

use rand::RngExt;

/// Wall-clock seconds since the unix epoch, for heartbeat stamps.
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Generates a random 16-byte instance id and returns its hexadecimal
/// representation, used when no id is configured.
pub fn random_instance_id() -> String {
    let mut raw = [0u8; 16];
    rand::rng().fill(&mut raw);

    let mut hex = String::with_capacity(32);
    for byte in &raw {
        write!(&mut hex, "{byte:02x}").expect("Writing to String cannot fail");
    }

    hex
}
