// Shared test helpers for integration tests
#![allow(dead_code)]

use build_matrix::config::BuildMatrix;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

/// Creates a small project tree with an entry that the default `exclude`
/// list keeps out of cell workspaces.
pub fn setup_test_project() -> TempDir {
    let temp_dir = tempdir().expect("Failed to create temporary directory");
    let root = temp_dir.path();
    fs::write(root.join("README.md"), "sample project\n").expect("Failed to write README.md");
    fs::create_dir_all(root.join("src")).expect("Failed to create src directory");
    fs::write(root.join("src").join("app.py"), "print('hello')\n").expect("Failed to write app.py");
    fs::create_dir_all(root.join(".tox").join("py37")).expect("Failed to create .tox directory");
    temp_dir
}

/// Creates an empty directory for marker files written by cell commands.
pub fn marker_dir() -> TempDir {
    tempdir().expect("Failed to create marker directory")
}

/// Quotes a path for use inside a `sh -c` command.
pub fn sh_quote(path: &Path) -> String {
    format!("'{}'", path.display())
}

/// Writes `content` as `BuildMatrix.toml` into `dir`.
pub fn write_config(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("BuildMatrix.toml");
    fs::write(&path, content).expect("Failed to write BuildMatrix.toml");
    path
}

pub fn matrix(content: &str) -> BuildMatrix {
    BuildMatrix::from_toml(content).expect("configuration should be valid")
}

/// Three runtimes by four environment sets, the canonical 12-cell matrix.
pub const TWELVE_CELL_AXES: &str = r#"
[[axes]]
name = "python"
kind = "runtime"
values = ["3.6", "3.7", "3.8"]

[[axes]]
name = "env"
values = ["SET=A", "SET=B", "SET=C", "SET=D"]
"#;

/// Names of the files in `dir`, sorted.
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .expect("Failed to read directory")
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
