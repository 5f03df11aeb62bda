use std::path::{Path, PathBuf};

use chrono::Local;

pub const DEFAULT_APP_DIR: &str = "fxscope";
const REPORT_PREFIX: &str = "frequency_data_";
const REPORT_EXTENSION: &str = "json";

/// Where default report paths are generated
#[derive(Clone, Debug)]
pub struct OutputLocation {
    /// Parent directory override; the user's documents folder otherwise
    pub directory: Option<PathBuf>,
    pub app_dir_name: String,
}

impl Default for OutputLocation {
    fn default() -> Self {
        Self {
            directory: None,
            app_dir_name: DEFAULT_APP_DIR.to_string(),
        }
    }
}

impl OutputLocation {
    pub fn in_directory(dir: impl Into<PathBuf>) -> Self {
        Self {
            directory: Some(dir.into()),
            ..Self::default()
        }
    }

    pub fn report_dir(&self) -> PathBuf {
        let base = self
            .directory
            .clone()
            .or_else(dirs::document_dir)
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        base.join(&self.app_dir_name)
    }

    /// Fresh timestamped report path that does not name an existing file.
    /// Creates the report directory if it is missing; failure is logged and
    /// the path returned anyway, the save step reports the error properly.
    pub fn default_path(&self) -> PathBuf {
        let dir = self.report_dir();
        if let Err(e) = std::fs::create_dir_all(&dir) {
            log::warn!("Could not create report directory {}: {}", dir.display(), e);
        }
        let stamp = timestamp();
        let mut path = dir.join(default_file_name_for(&stamp, None));
        let mut n = 2;
        while path.exists() {
            path = dir.join(default_file_name_for(&stamp, Some(n)));
            n += 1;
        }
        log::debug!("Default output path set to: {}", path.display());
        path
    }
}

fn timestamp() -> String {
    Local::now().format("%Y-%m-%d_%H-%M-%S").to_string()
}

// Reports started within the same second get a `_N` suffix
fn default_file_name_for(stamp: &str, n: Option<u32>) -> String {
    match n {
        Some(n) => format!("{}{}_{}.{}", REPORT_PREFIX, stamp, n, REPORT_EXTENSION),
        None => format!("{}{}.{}", REPORT_PREFIX, stamp, REPORT_EXTENSION),
    }
}

pub fn default_file_name() -> String {
    default_file_name_for(&timestamp(), None)
}

/// Replace any extension other than `.json` (case-insensitive) with `.json`.
pub fn force_json_extension(path: &Path) -> PathBuf {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(REPORT_EXTENSION));
    if is_json {
        path.to_path_buf()
    } else {
        path.with_extension(REPORT_EXTENSION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_has_timestamp_shape() {
        let name = default_file_name();
        assert!(name.starts_with("frequency_data_"));
        assert!(name.ends_with(".json"));
        // frequency_data_YYYY-MM-DD_HH-MM-SS.json
        assert_eq!(name.len(), "frequency_data_".len() + 19 + ".json".len());
    }

    #[test]
    fn extension_is_forced() {
        assert_eq!(force_json_extension(Path::new("a/b.txt")), PathBuf::from("a/b.json"));
        assert_eq!(force_json_extension(Path::new("a/b")), PathBuf::from("a/b.json"));
        assert_eq!(force_json_extension(Path::new("a/b.JSON")), PathBuf::from("a/b.JSON"));
    }

    #[test]
    fn default_path_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let location = OutputLocation::in_directory(tmp.path());
        let path = location.default_path();
        assert!(path.starts_with(tmp.path().join(DEFAULT_APP_DIR)));
        assert!(tmp.path().join(DEFAULT_APP_DIR).is_dir());
    }

    #[test]
    fn default_path_skips_existing_reports() {
        let tmp = tempfile::tempdir().unwrap();
        let location = OutputLocation::in_directory(tmp.path());
        let first = location.default_path();
        std::fs::write(&first, b"{}").unwrap();
        let second = location.default_path();
        assert_ne!(first, second);
        assert!(!second.exists());
    }

    #[test]
    fn suffixed_name_keeps_prefix_and_extension() {
        assert_eq!(
            default_file_name_for("2024-01-02_03-04-05", Some(3)),
            "frequency_data_2024-01-02_03-04-05_3.json"
        );
    }
}
