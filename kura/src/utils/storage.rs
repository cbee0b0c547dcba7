use std::path::{Path, PathBuf};

use super::KuraEnvVar;

const STORAGE_DIR_NAME: &str = "kura";

/// Directory holding locally stored models.
///
/// * `$KURA_STORAGE_DIR` when set
/// * otherwise `$HOME/.cache/kura/<VERSION>/`
pub fn storage_path() -> PathBuf {
    if let Some(dir) = KuraEnvVar::StorageDir.value() {
        return PathBuf::from(dir);
    }
    let home = KuraEnvVar::Home.value().unwrap_or_else(|| String::from("."));
    PathBuf::from(home)
        .join(".cache")
        .join(STORAGE_DIR_NAME)
        .join(crate::VERSION)
}

/// Whether `source` reads as an `org/name` model id rather than a path.
pub fn is_model_id(source: &str) -> bool {
    let path = Path::new(source);
    match source.split_once('/') {
        Some((org, name)) => {
            !org.is_empty()
                && !name.is_empty()
                && !name.contains('/')
                && !org.starts_with('.')
                && !path.is_absolute()
        },
        None => false,
    }
}

/// Local directory of a model id inside the storage directory.
pub fn model_path(model_id: &str) -> PathBuf {
    storage_path().join(model_id)
}
