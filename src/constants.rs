// src/constants.rs

use std::path::PathBuf;

use once_cell::sync::Lazy;

pub const APP_NAME: &str = "System Debloater";

pub const STATE_FILE_NAME: &str = "state.json";

/// Tool-owned state directory under ProgramData, outside any user profile so
/// the captured originals survive user-context changes.
pub static STATE_DIR: Lazy<PathBuf> = Lazy::new(|| {
    let program_data =
        std::env::var("ProgramData").unwrap_or_else(|_| r"C:\ProgramData".to_string());
    PathBuf::from(program_data)
        .join("WinTools")
        .join("SystemDebloater")
});

pub static STATE_FILE: Lazy<PathBuf> = Lazy::new(|| STATE_DIR.join(STATE_FILE_NAME));
