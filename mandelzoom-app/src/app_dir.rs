//! Directory where the executable lives. Preferences and default outputs are
//! stored next to it so a standalone build keeps its data together.

use std::path::PathBuf;

/// Directory containing the running executable. Falls back to current directory if unavailable.
pub fn exe_directory() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

/// Default root for generated grids, images, and frames.
pub fn output_directory() -> PathBuf {
    exe_directory().join("output")
}

/// Default directory for animation frames.
pub fn frames_directory() -> PathBuf {
    output_directory().join("frames")
}

/// Default directory for Julia-per-point images.
pub fn julia_directory() -> PathBuf {
    output_directory().join("julia")
}
