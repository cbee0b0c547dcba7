mod error;
mod header;
mod reader;
mod writer;

use std::path::{Path, PathBuf};

pub use error::ArchiveError;
pub use header::{METADATA_KEY, TensorDescriptor, element_count};
pub use reader::{Archive, Validation};
pub use writer::{
    ArchiveEntry, ArchiveWriteError, TensorView, write_archive,
    write_archive_streaming, write_tensors,
};

pub const ARCHIVE_EXTENSION: &str = "safetensors";

pub fn is_archive_path(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == ARCHIVE_EXTENSION)
}

/// Archives directly inside `dir`, sorted by path.
pub fn find_archives(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|path| path.is_file() && is_archive_path(path))
        .collect();
    files.sort();
    Ok(files)
}
