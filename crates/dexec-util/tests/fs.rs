use dexec_util::fs::{assemblies_in, ensure_dir, files_with_extension, subdirectory_names};
use tempfile::TempDir;

#[test]
fn test_ensure_dir_creates_nested() {
    let tmp = TempDir::new().unwrap();
    let deep = tmp.path().join("x").join("y").join("z");
    assert!(!deep.exists());
    ensure_dir(&deep).unwrap();
    assert!(deep.is_dir());
}

#[test]
fn test_assemblies_in_is_not_recursive() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("A.dll"), "").unwrap();
    std::fs::write(tmp.path().join("B.DLL"), "").unwrap();
    std::fs::write(tmp.path().join("readme.txt"), "").unwrap();
    std::fs::create_dir(tmp.path().join("sub")).unwrap();
    std::fs::write(tmp.path().join("sub").join("C.dll"), "").unwrap();

    let found = assemblies_in(tmp.path()).unwrap();
    let names: Vec<_> = found
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
        .collect();
    assert_eq!(names, vec!["A.dll", "B.DLL"]);
}

#[test]
fn test_files_with_extension_missing_dir_is_empty() {
    let tmp = TempDir::new().unwrap();
    let found = files_with_extension(&tmp.path().join("nope"), "dll").unwrap();
    assert!(found.is_empty());
}

#[test]
fn test_subdirectory_names_sorted() {
    let tmp = TempDir::new().unwrap();
    std::fs::create_dir(tmp.path().join("9.0.0")).unwrap();
    std::fs::create_dir(tmp.path().join("8.0.1")).unwrap();
    std::fs::write(tmp.path().join("file"), "").unwrap();
    assert_eq!(subdirectory_names(tmp.path()), vec!["8.0.1", "9.0.0"]);
}
