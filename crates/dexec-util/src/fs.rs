use std::path::{Path, PathBuf};

/// File extension of a binary module (assembly).
pub const ASSEMBLY_EXTENSION: &str = "dll";

/// The user's home directory, from `HOME` or `USERPROFILE`.
pub fn home_dir() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home)
}

/// Returns the path to the dexec data directory (`~/.dexec/`).
pub fn dirs_path() -> PathBuf {
    home_dir().join(".dexec")
}

/// Ensure a directory exists, creating it and any parents if needed.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Files directly inside `dir` whose extension matches `ext`
/// case-insensitively. Not recursive. Sorted for stable output.
///
/// A missing directory yields an empty list.
pub fn files_with_extension(dir: &Path, ext: &str) -> std::io::Result<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .extension()
            .is_some_and(|e| e.to_string_lossy().eq_ignore_ascii_case(ext));
        if matches {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Assemblies (`*.dll`) directly inside `dir`.
pub fn assemblies_in(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    files_with_extension(dir, ASSEMBLY_EXTENSION)
}

/// Names of the immediate subdirectories of `dir`. A missing directory yields
/// an empty list.
pub fn subdirectory_names(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .flatten()
        .filter(|e| e.path().is_dir())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}
