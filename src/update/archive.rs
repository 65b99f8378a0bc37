use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::error::ExtractError;

const READ_SIZE: usize = 8192;

/// One archive member: its stored name and a reader over its data.
pub struct ArchiveEntry<'a> {
    pub name: String,
    pub data: Box<dyn Read + 'a>,
}

impl ArchiveEntry<'_> {
    /// Directory members are stored with a trailing `/`.
    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/')
    }
}

/// Random access to the members of an opened archive, in stored order.
pub trait ArchiveEntries {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&mut self, index: usize) -> Result<ArchiveEntry<'_>, ExtractError>;
}

/// Opens archive files of one format.
pub trait ArchiveCodec {
    fn open(&self, path: &Path) -> Result<Box<dyn ArchiveEntries>, ExtractError>;
}

/// [`ArchiveCodec`] for zip files.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipCodec;

struct ZipEntries {
    archive: zip::ZipArchive<File>,
}

impl ArchiveCodec for ZipCodec {
    fn open(&self, path: &Path) -> Result<Box<dyn ArchiveEntries>, ExtractError> {
        let f = File::open(path).map_err(|source| ExtractError::ArchiveNotFound {
            path: path.to_path_buf(),
            source,
        })?;
        let archive = zip::ZipArchive::new(f).map_err(|e| ExtractError::CorruptHeader {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(Box::new(ZipEntries { archive }))
    }
}

impl ArchiveEntries for ZipEntries {
    fn len(&self) -> usize {
        self.archive.len()
    }

    fn entry(&mut self, index: usize) -> Result<ArchiveEntry<'_>, ExtractError> {
        let file = self
            .archive
            .by_index(index)
            .map_err(|e| ExtractError::FileInfo {
                index,
                message: e.to_string(),
            })?;
        if file.enclosed_name().is_none() {
            return Err(ExtractError::FileInfo {
                index,
                message: format!("entry escapes the extraction root: {}", file.name()),
            });
        }
        let name = file.name().to_string();
        Ok(ArchiveEntry {
            name,
            data: Box::new(file),
        })
    }
}

/// Result of a successful extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    /// The package's top-level folder (the first member's leading folder), or the
    /// extraction destination itself for a flat package.
    pub root: PathBuf,
    pub entries: usize,
}

/// Unpack every member of `archive` below `dest_root`, in stored order.
///
/// Any failure aborts the extraction; members already written stay on disk.
pub fn extract(
    codec: &dyn ArchiveCodec,
    archive: &Path,
    dest_root: &Path,
) -> Result<Extracted, ExtractError> {
    let mut entries = codec.open(archive)?;
    if entries.is_empty() {
        return Err(ExtractError::EmptyArchive {
            path: archive.to_path_buf(),
        });
    }

    let mut root = dest_root.to_path_buf();
    let count = entries.len();
    for index in 0..count {
        let mut entry = entries.entry(index)?;
        let dest = dest_root.join(entry.name.trim_end_matches('/'));
        if index == 0 {
            root = package_root(dest_root, &entry.name);
        }

        if entry.is_dir() {
            debug!("dir: {}", entry.name);
            create_dir(&dest)?;
            continue;
        }

        debug!("file: {}", entry.name);
        if let Some(parent) = dest.parent() {
            create_dir(parent)?;
        }
        copy_entry(&mut entry.data, &dest)?;
    }

    info!(entries = count, "extracted {}", archive.display());
    Ok(Extracted {
        root,
        entries: count,
    })
}

/// Where the package's files land, judged from the first member.
///
/// A directory member is the root itself. A file member inside a folder
/// means the archive has no explicit directory entries, so its leading
/// folder is the root. Only a top-level file marks a flat package.
fn package_root(dest_root: &Path, first: &str) -> PathBuf {
    let name = first.trim_end_matches('/');
    if first.ends_with('/') {
        return dest_root.join(name);
    }
    match name.split_once('/') {
        Some((top, _)) => dest_root.join(top),
        None => dest_root.to_path_buf(),
    }
}

fn create_dir(dir: &Path) -> Result<(), ExtractError> {
    match fs::create_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists && dir.is_dir() => Ok(()),
        Err(source) => Err(ExtractError::CannotOpenDestination {
            path: dir.to_path_buf(),
            source,
        }),
    }
}

fn copy_entry(data: &mut dyn Read, dest: &Path) -> Result<(), ExtractError> {
    let mut out = File::create(dest).map_err(|source| ExtractError::CannotOpenDestination {
        path: dest.to_path_buf(),
        source,
    })?;

    let mut buf = [0u8; READ_SIZE];
    loop {
        let n = match data.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(source) => {
                return Err(ExtractError::Read {
                    path: dest.to_path_buf(),
                    source,
                });
            }
        };
        out.write_all(&buf[..n])
            .map_err(|source| ExtractError::Write {
                path: dest.to_path_buf(),
                source,
            })?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::{self, Cursor};
    use tempfile::tempdir;
    use zip::write::FileOptions;

    /// Write a zip at `path`; `None` content marks a directory entry.
    pub(crate) fn write_zip(path: &Path, entries: &[(&str, Option<&[u8]>)]) {
        let f = File::create(path).unwrap();
        let mut w = zip::ZipWriter::new(f);
        let opts = FileOptions::default();
        for (name, content) in entries {
            match content {
                None => w.add_directory(*name, opts).unwrap(),
                Some(data) => {
                    w.start_file(*name, opts).unwrap();
                    w.write_all(data).unwrap();
                }
            }
        }
        w.finish().unwrap();
    }

    #[test]
    fn extract_recreates_directory_and_files() {
        let td = tempdir().unwrap();
        let zip_path = td.path().join("pkg.zip");
        let big: Vec<u8> = (0..30_000u32).map(|i| (i % 253) as u8).collect();
        write_zip(
            &zip_path,
            &[
                ("pkg/", None),
                ("pkg/readme.txt", Some(b"hello\n".as_slice())),
                ("pkg/data.bin", Some(big.as_slice())),
            ],
        );
        let out = td.path().join("out");
        fs::create_dir_all(&out).unwrap();

        let got = extract(&ZipCodec, &zip_path, &out).unwrap();

        assert_eq!(got.root, out.join("pkg"));
        assert_eq!(got.entries, 3);
        assert!(out.join("pkg").is_dir());
        assert_eq!(fs::read(out.join("pkg/readme.txt")).unwrap(), b"hello\n");
        assert_eq!(fs::read(out.join("pkg/data.bin")).unwrap(), big);

        let mut names: Vec<_> = walkdir::WalkDir::new(&out)
            .min_depth(1)
            .into_iter()
            .map(|e| e.unwrap().path().strip_prefix(&out).unwrap().to_path_buf())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                PathBuf::from("pkg"),
                PathBuf::from("pkg/data.bin"),
                PathBuf::from("pkg/readme.txt"),
            ]
        );
    }

    #[test]
    fn extract_is_idempotent_for_existing_directories() {
        let td = tempdir().unwrap();
        let zip_path = td.path().join("pkg.zip");
        write_zip(&zip_path, &[("pkg/", None), ("pkg/a", Some(b"1".as_slice()))]);
        let out = td.path().join("out");
        fs::create_dir_all(out.join("pkg")).unwrap();

        extract(&ZipCodec, &zip_path, &out).unwrap();
        extract(&ZipCodec, &zip_path, &out).unwrap();
        assert_eq!(fs::read(out.join("pkg/a")).unwrap(), b"1");
    }

    #[test]
    fn flat_archive_uses_destination_as_root() {
        let td = tempdir().unwrap();
        let zip_path = td.path().join("flat.zip");
        write_zip(&zip_path, &[("app.txt", Some(b"x".as_slice())), ("lib/m.so", Some(b"y".as_slice()))]);
        let out = td.path().join("out");

        let got = extract(&ZipCodec, &zip_path, &out).unwrap();
        assert_eq!(got.root, out);
        assert_eq!(fs::read(out.join("lib/m.so")).unwrap(), b"y");
    }

    #[test]
    fn archive_without_directory_entries_uses_leading_folder_as_root() {
        let td = tempdir().unwrap();
        let zip_path = td.path().join("nodirs.zip");
        write_zip(
            &zip_path,
            &[
                ("fileio-1.1/fileio", Some(b"bin".as_slice())),
                ("fileio-1.1/lang/de.txt", Some(b"Hallo".as_slice())),
            ],
        );
        let out = td.path().join("out");

        let got = extract(&ZipCodec, &zip_path, &out).unwrap();
        assert_eq!(got.root, out.join("fileio-1.1"));
        assert_eq!(fs::read(out.join("fileio-1.1/lang/de.txt")).unwrap(), b"Hallo");
    }

    #[test]
    fn directory_blocked_by_file_cannot_open_destination() {
        let td = tempdir().unwrap();
        let zip_path = td.path().join("pkg.zip");
        write_zip(&zip_path, &[("pkg/", None), ("pkg/a", Some(b"1".as_slice()))]);
        let out = td.path().join("out");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("pkg"), b"a file where a folder belongs").unwrap();

        let err = extract(&ZipCodec, &zip_path, &out).unwrap_err();
        assert!(matches!(err, ExtractError::CannotOpenDestination { .. }));
        assert_eq!(err.path(), Some(out.join("pkg").as_path()));
    }

    #[test]
    fn file_blocked_by_directory_cannot_open_destination() {
        let td = tempdir().unwrap();
        let zip_path = td.path().join("pkg.zip");
        write_zip(&zip_path, &[("pkg/", None), ("pkg/a", Some(b"1".as_slice()))]);
        let out = td.path().join("out");
        fs::create_dir_all(out.join("pkg/a/inner")).unwrap();

        let err = extract(&ZipCodec, &zip_path, &out).unwrap_err();
        assert!(matches!(err, ExtractError::CannotOpenDestination { .. }));
        assert_eq!(err.path(), Some(out.join("pkg/a").as_path()));
    }

    /// Single-member archive with a fixed name.
    struct OneEntryCodec(&'static str);

    struct OneEntry(&'static str);

    impl ArchiveCodec for OneEntryCodec {
        fn open(&self, _path: &Path) -> Result<Box<dyn ArchiveEntries>, ExtractError> {
            Ok(Box::new(OneEntry(self.0)))
        }
    }

    impl ArchiveEntries for OneEntry {
        fn len(&self) -> usize {
            1
        }

        fn entry(&mut self, _index: usize) -> Result<ArchiveEntry<'_>, ExtractError> {
            Ok(ArchiveEntry {
                name: self.0.into(),
                data: Box::new(Cursor::new(b"payload".to_vec())),
            })
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn write_failure_is_write_error() {
        // Every write to /dev/full fails with ENOSPC.
        let dev = Path::new("/dev");
        if !dev.join("full").exists() {
            return;
        }
        let err = extract(&OneEntryCodec("full"), Path::new("x.zip"), dev).unwrap_err();
        assert!(matches!(err, ExtractError::Write { .. }));
        assert_eq!(err.kind(), "write");
    }

    #[test]
    fn missing_archive_is_not_found() {
        let td = tempdir().unwrap();
        let err = extract(&ZipCodec, &td.path().join("nope.zip"), td.path()).unwrap_err();
        assert!(matches!(err, ExtractError::ArchiveNotFound { .. }));
    }

    #[test]
    fn garbage_archive_is_corrupt_header() {
        let td = tempdir().unwrap();
        let p = td.path().join("bad.zip");
        fs::write(&p, b"<html>404: Not Found</html>").unwrap();
        let err = extract(&ZipCodec, &p, td.path()).unwrap_err();
        assert!(matches!(err, ExtractError::CorruptHeader { .. }));
    }

    #[test]
    fn empty_archive_is_rejected() {
        let td = tempdir().unwrap();
        let p = td.path().join("empty.zip");
        write_zip(&p, &[]);
        let err = extract(&ZipCodec, &p, td.path()).unwrap_err();
        assert!(matches!(err, ExtractError::EmptyArchive { .. }));
    }

    #[test]
    fn escaping_entry_is_rejected() {
        let td = tempdir().unwrap();
        let p = td.path().join("evil.zip");
        write_zip(&p, &[("../evil.txt", Some(b"boom".as_slice()))]);
        let out = td.path().join("out");
        let err = extract(&ZipCodec, &p, &out).unwrap_err();
        assert!(matches!(err, ExtractError::FileInfo { index: 0, .. }));
        assert!(!td.path().join("evil.txt").exists());
    }

    struct FailingCodec;

    struct FailingEntries;

    struct FailingRead;

    impl Read for FailingRead {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::InvalidData, "crc mismatch"))
        }
    }

    impl ArchiveCodec for FailingCodec {
        fn open(&self, _path: &Path) -> Result<Box<dyn ArchiveEntries>, ExtractError> {
            Ok(Box::new(FailingEntries))
        }
    }

    impl ArchiveEntries for FailingEntries {
        fn len(&self) -> usize {
            2
        }

        fn entry(&mut self, index: usize) -> Result<ArchiveEntry<'_>, ExtractError> {
            if index == 0 {
                return Ok(ArchiveEntry {
                    name: "ok.txt".into(),
                    data: Box::new(Cursor::new(b"fine".to_vec())),
                });
            }
            Ok(ArchiveEntry {
                name: "bad.txt".into(),
                data: Box::new(FailingRead),
            })
        }
    }

    #[test]
    fn read_failure_aborts_and_keeps_prior_entries() {
        let td = tempdir().unwrap();
        let err = extract(&FailingCodec, Path::new("x.zip"), td.path()).unwrap_err();
        assert!(matches!(err, ExtractError::Read { .. }));
        assert_eq!(fs::read(td.path().join("ok.txt")).unwrap(), b"fine");
    }
}
