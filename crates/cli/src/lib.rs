// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

pub mod client;
pub mod command;
pub mod config;
pub mod error;
pub mod gateway;
pub mod oauth;
pub mod poll;
pub mod session;
pub mod store;
pub mod test_support;
