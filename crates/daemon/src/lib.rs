// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Waypoint daemon library
//!
//! The wire protocol is public so clients can talk to `wpd`.

pub mod config;
pub mod lifecycle;
pub mod protocol;
pub mod server;
pub mod worker;
