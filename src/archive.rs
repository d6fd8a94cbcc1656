//! Directory copy, file enumeration and zip packaging for bundles.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("IO error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("Cannot walk {path}: {source}")]
    Walk {
        path: PathBuf,
        source: walkdir::Error,
    },
    #[error("Zip error in {path}: {source}")]
    Zip {
        path: PathBuf,
        source: zip::result::ZipError,
    },
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> ArchiveError + '_ {
    move |source| ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Every regular file under `root`, as sorted `/`-separated relative paths.
pub fn list_files(root: &Path) -> Result<Vec<String>, ArchiveError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|source| ArchiveError::Walk {
            path: root.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        files.push(rel);
    }
    files.sort();
    Ok(files)
}

/// Copy `src` into `dst` recursively. `dst` is created if missing.
pub fn copy_dir(src: &Path, dst: &Path) -> Result<usize, ArchiveError> {
    let mut copied = 0;
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(|source| ArchiveError::Walk {
            path: src.to_path_buf(),
            source,
        })?;
        let rel = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(io_err(&target))?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(io_err(parent))?;
            }
            fs::copy(entry.path(), &target).map_err(io_err(&target))?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Write `files` (relative to `root`) into a deflate zip at `output`.
pub fn write_zip(
    root: &Path,
    files: &[String],
    output: &Path,
    compression_level: u32,
) -> Result<(), ArchiveError> {
    let file = File::create(output).map_err(io_err(output))?;
    let mut zip = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(i64::from(compression_level)));
    let zip_err = |source| ArchiveError::Zip {
        path: output.to_path_buf(),
        source,
    };

    for name in files {
        let path = root.join(name);
        let content = fs::read(&path).map_err(io_err(&path))?;
        zip.start_file(name.as_str(), options).map_err(zip_err)?;
        zip.write_all(&content).map_err(io_err(output))?;
    }
    zip.finish().map_err(zip_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    fn tree(root: &Path) {
        fs::create_dir_all(root.join(".next/serverless/pages")).unwrap();
        fs::write(root.join("index.js"), "module.exports = {}").unwrap();
        fs::write(root.join(".next/serverless/pages/index.js"), "page").unwrap();
        fs::write(root.join("manifest.json"), "{}").unwrap();
    }

    #[test]
    fn list_files_relative_and_sorted() {
        let tmp = TempDir::new().unwrap();
        tree(tmp.path());
        assert_eq!(
            list_files(tmp.path()).unwrap(),
            vec![".next/serverless/pages/index.js", "index.js", "manifest.json"]
        );
    }

    #[test]
    fn list_files_empty_dir() {
        let tmp = TempDir::new().unwrap();
        assert!(list_files(tmp.path()).unwrap().is_empty());
    }

    #[test]
    fn copy_dir_recreates_tree() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        tree(src.path());
        let target = dst.path().join("bundle");

        let copied = copy_dir(src.path(), &target).unwrap();
        assert_eq!(copied, 3);
        assert_eq!(
            fs::read_to_string(target.join(".next/serverless/pages/index.js")).unwrap(),
            "page"
        );
    }

    #[test]
    fn copy_missing_source_is_error() {
        let dst = TempDir::new().unwrap();
        let result = copy_dir(&dst.path().join("nope"), &dst.path().join("out"));
        assert!(matches!(result, Err(ArchiveError::Walk { .. })));
    }

    #[test]
    fn zip_preserves_paths_and_contents() {
        let tmp = TempDir::new().unwrap();
        tree(tmp.path());
        let files = list_files(tmp.path()).unwrap();
        let out = TempDir::new().unwrap();
        let zip_path = out.path().join("bundle.zip");

        write_zip(tmp.path(), &files, &zip_path, 5).unwrap();

        let mut archive = zip::ZipArchive::new(File::open(&zip_path).unwrap()).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(names, files);

        let mut content = String::new();
        archive
            .by_name(".next/serverless/pages/index.js")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "page");
    }
}
