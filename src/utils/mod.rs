//! Utility functions and helpers.

pub mod http;
pub mod log;

use std::path::Path;

/// Render a path for log output, relative to `base` when possible.
pub fn display_path(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .display()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_path() {
        let base = Path::new("/srv/notifier");
        assert_eq!(
            display_path(Path::new("/srv/notifier/storage/status.json"), base),
            "storage/status.json"
        );
        assert_eq!(display_path(Path::new("/etc/notifier.toml"), base), "/etc/notifier.toml");
    }
}
