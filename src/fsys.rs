use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use log::debug;
use walkdir::WalkDir;

use crate::checksum;
use crate::error::{Result, TransferError};

/// One file moving through a transfer.
///
/// On the sending side `path` is the source and `transferred` counts sent
/// bytes; on the receiving side `path` is the destination and
/// `transferred` counts written bytes. The handle stays `None` until
/// [`File::open`] is called and is dropped again with [`File::close`] as
/// soon as the file leaves the active set.
#[derive(Debug)]
pub struct File {
    pub id: u64,
    pub name: String,
    pub path: PathBuf,
    /// Path relative to the transfer root, including the file name.
    /// Empty for a single-file transfer.
    pub relative_path: String,
    pub size: u64,
    /// Hex-encoded partial checksum of the contents.
    pub checksum: String,
    pub transferred: u64,
    handle: Option<fs::File>,
}

impl File {
    /// Gathers metadata and the checksum of an existing file on disk.
    /// The handle is left closed.
    pub fn probe(path: &Path) -> Result<File> {
        let abs_path = fs::canonicalize(path)?;
        let stats = fs::metadata(&abs_path)?;

        if stats.is_dir() {
            return Err(TransferError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a file", abs_path.display()),
            )));
        }

        let name = abs_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut handle = fs::File::open(&abs_path)?;
        let checksum = checksum::partial_checksum(&mut handle)?;
        drop(handle);

        Ok(File {
            id: 0,
            name,
            path: abs_path,
            relative_path: String::new(),
            size: stats.len(),
            checksum,
            transferred: 0,
            handle: None,
        })
    }

    /// Describes a file that does not exist locally yet (receiver side).
    pub fn incoming(id: u64, name: String, size: u64, checksum: String, relative_path: String) -> File {
        File {
            id,
            name,
            path: PathBuf::new(),
            relative_path,
            size,
            checksum,
            transferred: 0,
            handle: None,
        }
    }

    /// Opens the file for read/write, creating it if it does not exist.
    /// Subsequent calls reuse the already open handle.
    pub fn open(&mut self) -> io::Result<&mut fs::File> {
        if self.handle.is_none() {
            let handle = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(&self.path)?;
            self.handle = Some(handle);
        }

        Ok(self.handle.as_mut().unwrap())
    }

    pub fn close(&mut self) {
        self.handle = None;
    }
}

/// A symlink inside an offered directory. Both fields are stored the way
/// they will be recreated: `path` relative to the transfer root, `target`
/// exactly as the link on disk points.
#[derive(Debug, Clone)]
pub struct Symlink {
    pub path: String,
    pub target: String,
}

/// An offered directory tree: every regular file and symlink below the
/// root, with sizes summed recursively.
#[derive(Debug)]
pub struct Directory {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub files: Vec<File>,
    pub symlinks: Vec<Symlink>,
}

impl Directory {
    /// Walks a directory and collects its files and symlinks with paths
    /// relative to `path`. With `recursive` set to false only the direct
    /// children are considered.
    pub fn scan(path: &Path, recursive: bool) -> Result<Directory> {
        let abs_path = fs::canonicalize(path)?;
        let stats = fs::metadata(&abs_path)?;

        if !stats.is_dir() {
            return Err(TransferError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a directory", abs_path.display()),
            )));
        }

        let name = abs_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut directory = Directory {
            name,
            path: abs_path.clone(),
            size: 0,
            files: Vec::new(),
            symlinks: Vec::new(),
        };

        let mut walker = WalkDir::new(&abs_path).min_depth(1).follow_links(false);
        if !recursive {
            walker = walker.max_depth(1);
        }

        for entry in walker {
            let entry = entry.map_err(io::Error::from)?;
            let relative_path = entry
                .path()
                .strip_prefix(&abs_path)
                .expect("walked entries live under the scanned root")
                .to_string_lossy()
                .into_owned();

            if entry.path_is_symlink() {
                let target = fs::read_link(entry.path())?;
                debug!("found symlink {} -> {}", relative_path, target.display());
                directory.symlinks.push(Symlink {
                    path: relative_path,
                    target: target.to_string_lossy().into_owned(),
                });
            } else if entry.file_type().is_file() {
                let mut file = File::probe(entry.path())?;
                file.relative_path = relative_path;
                directory.size += file.size;
                directory.files.push(file);
            }
        }

        Ok(directory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn scratch_dir(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("fsys_{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&path);
        fs::create_dir_all(&path).unwrap();
        path
    }

    fn write_file(path: &Path, contents: &[u8]) {
        fs::File::create(path).unwrap().write_all(contents).unwrap();
    }

    #[test]
    fn test_probe_regular_file() {
        let base = scratch_dir("probe");
        let file_path = base.join("notes.txt");
        write_file(&file_path, b"some file contents");

        let file = File::probe(&file_path).unwrap();
        assert_eq!(file.name, "notes.txt");
        assert_eq!(file.size, 18);
        assert_eq!(file.checksum.len(), 64);
        assert!(file.relative_path.is_empty());
        assert_eq!(file.transferred, 0);

        let _ = fs::remove_dir_all(&base);
    }

    #[test]
    fn test_probe_rejects_directory() {
        let base = scratch_dir("probe_dir");
        assert!(File::probe(&base).is_err());
        let _ = fs::remove_dir_all(&base);
    }

    #[test]
    fn test_scan_collects_files_recursively() {
        let base = scratch_dir("scan");
        write_file(&base.join("a.bin"), &[1u8; 100]);
        fs::create_dir_all(base.join("sub")).unwrap();
        write_file(&base.join("sub/b.bin"), &[2u8; 250]);

        let dir = Directory::scan(&base, true).unwrap();
        assert_eq!(dir.size, 350);
        assert_eq!(dir.files.len(), 2);

        let mut relative: Vec<&str> = dir.files.iter().map(|f| f.relative_path.as_str()).collect();
        relative.sort();
        assert_eq!(relative, vec!["a.bin", "sub/b.bin"]);

        let _ = fs::remove_dir_all(&base);
    }

    #[test]
    fn test_scan_non_recursive_skips_subdirectories() {
        let base = scratch_dir("scan_flat");
        write_file(&base.join("top.bin"), &[1u8; 64]);
        fs::create_dir_all(base.join("sub")).unwrap();
        write_file(&base.join("sub/deep.bin"), &[2u8; 64]);

        let dir = Directory::scan(&base, false).unwrap();
        assert_eq!(dir.files.len(), 1);
        assert_eq!(dir.files[0].relative_path, "top.bin");
        assert_eq!(dir.size, 64);

        let _ = fs::remove_dir_all(&base);
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_records_symlinks() {
        let base = scratch_dir("scan_links");
        write_file(&base.join("target.txt"), b"pointed at");
        fs::create_dir_all(base.join("sub")).unwrap();
        std::os::unix::fs::symlink("../target.txt", base.join("sub/link")).unwrap();

        let dir = Directory::scan(&base, true).unwrap();
        assert_eq!(dir.symlinks.len(), 1);
        assert_eq!(dir.symlinks[0].path, "sub/link");
        assert_eq!(dir.symlinks[0].target, "../target.txt");
        // link itself does not count toward the directory size
        assert_eq!(dir.size, 10);

        let _ = fs::remove_dir_all(&base);
    }

    #[test]
    fn test_open_creates_missing_file() {
        let base = scratch_dir("open");
        let mut file = File::incoming(0, "new.bin".into(), 4, String::new(), String::new());
        file.path = base.join("new.bin");

        file.open().unwrap().write_all(b"data").unwrap();
        file.close();

        assert_eq!(fs::read(base.join("new.bin")).unwrap(), b"data");
        let _ = fs::remove_dir_all(&base);
    }
}
