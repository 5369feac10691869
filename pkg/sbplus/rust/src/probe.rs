// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::path::Path;

/// Uncached existence check; downloads change the answer between calls.
pub fn exists(path: &Path) -> bool {
    std::fs::metadata(path).is_ok()
}
