use std::path::{Path, PathBuf};

use log::error;
use walkdir::WalkDir;

/// File name suffixes treated as images. Matching is case-sensitive.
pub const IMAGE_EXTENSIONS: [&str; 3] = [".png", ".jpg", ".jpeg"];

pub fn has_image_extension(path: &Path) -> bool {
    path.file_name().is_some_and(|name| {
        let name = name.as_encoded_bytes();
        IMAGE_EXTENSIONS
            .iter()
            .any(|ext| name.ends_with(ext.as_bytes()))
    })
}

/// Lazily yields every image file below a root directory, in the order the
/// filesystem returns them.
///
/// Directory symlinks are not followed. Entries that cannot be read are logged
/// and skipped so a single bad directory does not end the walk.
pub struct BatchWalker {
    entries: walkdir::IntoIter,
}

impl BatchWalker {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            entries: WalkDir::new(root).min_depth(1).into_iter(),
        }
    }
}

impl Iterator for BatchWalker {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        loop {
            match self.entries.next()? {
                Ok(entry) => {
                    if !entry.file_type().is_dir() && has_image_extension(entry.path()) {
                        return Some(entry.into_path());
                    }
                }
                Err(err) => error!("Skipping unreadable entry: {err}"),
            }
        }
    }
}
