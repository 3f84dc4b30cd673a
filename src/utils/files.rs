use std::{fs, io, path::Path};

/// Copy a file, or a directory tree, to the given destination. Returns the number of files copied.
pub fn copy_all(from: &Path, to: &Path) -> io::Result<usize> {
    if from.is_file() {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(from, to)?;

        return Ok(1);
    }

    fs::create_dir_all(to)?;

    let mut copied = 0;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        copied += copy_all(&entry.path(), &to.join(entry.file_name()))?;
    }

    Ok(copied)
}
