// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

/// Whether this process runs with administrative rights.
/// Platforms without a notion of elevation report `false`.
pub fn is_elevated() -> bool {
    imp::is_elevated()
}

#[cfg(unix)]
mod imp {
    pub fn is_elevated() -> bool {
        nix::unistd::geteuid().is_root()
    }
}

#[cfg(windows)]
mod imp {
    use windows_sys::Win32::UI::Shell::IsUserAnAdmin;

    pub fn is_elevated() -> bool {
        // SAFETY: IsUserAnAdmin takes no arguments and only reads the process token.
        unsafe { IsUserAnAdmin() != 0 }
    }
}

#[cfg(not(any(unix, windows)))]
mod imp {
    pub fn is_elevated() -> bool {
        false
    }
}
