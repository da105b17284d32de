// Copyright 2025 Axon OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Diagnostics for the kernel: structured logging over the console.

pub mod log;
