// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

pub mod controller;
pub mod fetch;
pub mod kill;
pub mod privilege;
pub mod probe;
pub mod process;
pub mod settings;
pub mod state;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
