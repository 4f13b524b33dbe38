//! Path helpers

use std::path::PathBuf;

/// Expand `~`, `~/...` and relative paths to an absolute path.
///
/// ```text
/// expand_path("~/.insight")   // -> /home/user/.insight
/// expand_path("./reports")    // -> /current/dir/reports
/// expand_path("/etc/insight") // -> /etc/insight
/// ```
pub fn expand_path(path: &str) -> PathBuf {
    let path = path.trim();

    if path.is_empty() {
        return std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    }

    let expanded = if path == "~" {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from(path))
    } else if let Some(rest) = path.strip_prefix("~/") {
        match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => PathBuf::from(path),
        }
    } else {
        PathBuf::from(path)
    };

    if expanded.is_relative() {
        std::env::current_dir()
            .map(|cwd| cwd.join(&expanded))
            .unwrap_or(expanded)
    } else {
        expanded
    }
}

/// Make a caller-controlled string safe to use as one path component.
///
/// Keeps ASCII alphanumerics, `-`, `_`, `.` and `@`; everything else becomes
/// `_`. Dot-only names (`.`, `..`) and empty input become `_`.
pub fn sanitize_path_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        cleaned
    }
}
