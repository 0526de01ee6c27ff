use super::ProvisionError;
use std::fs::{self, File};
use std::io;
use std::path::Path;

pub trait Extractor: Send + Sync {
    /// Unpack `archive` into `target_dir`, which already exists and is empty.
    fn extract(&self, archive: &Path, target_dir: &Path) -> Result<(), ProvisionError>;
}

/// Zip bundles. Unix permission bits stored in the archive are restored;
/// entries that would land outside `target_dir` are skipped.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipExtractor;

impl Extractor for ZipExtractor {
    fn extract(&self, archive_path: &Path, target_dir: &Path) -> Result<(), ProvisionError> {
        let fail = |message: String| ProvisionError::Extract {
            archive: archive_path.to_path_buf(),
            message,
        };

        let file = File::open(archive_path).map_err(|e| ProvisionError::io(archive_path, e))?;
        let mut archive = zip::ZipArchive::new(file).map_err(|e| fail(e.to_string()))?;

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).map_err(|e| fail(e.to_string()))?;
            let outpath = match entry.enclosed_name() {
                Some(path) => target_dir.join(path),
                None => {
                    tracing::warn!("skipping unsafe archive entry {}", entry.name());
                    continue;
                }
            };

            if entry.is_dir() {
                fs::create_dir_all(&outpath).map_err(|e| ProvisionError::io(&outpath, e))?;
                continue;
            }

            if let Some(p) = outpath.parent()
                && !p.exists()
            {
                fs::create_dir_all(p).map_err(|e| ProvisionError::io(p, e))?;
            }
            let mut outfile = File::create(&outpath).map_err(|e| ProvisionError::io(&outpath, e))?;
            io::copy(&mut entry, &mut outfile).map_err(|e| ProvisionError::io(&outpath, e))?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Some(mode) = entry.unix_mode() {
                    fs::set_permissions(&outpath, fs::Permissions::from_mode(mode & 0o7777))
                        .map_err(|e| ProvisionError::io(&outpath, e))?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::FileOptions;

    fn bundle(path: &Path) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let exe = FileOptions::<()>::default().unix_permissions(0o755);
        let plain = FileOptions::<()>::default().unix_permissions(0o644);
        zip.add_directory("sdk/bin/", plain).unwrap();
        zip.start_file("sdk/bin/compile", exe).unwrap();
        zip.write_all(b"#!/bin/sh\n").unwrap();
        zip.start_file("sdk/README", plain).unwrap();
        zip.write_all(b"hello").unwrap();
        zip.start_file("../escape", plain).unwrap();
        zip.write_all(b"nope").unwrap();
        zip.finish().unwrap();
    }

    #[test]
    fn test_extracts_tree_and_skips_escaping_entries() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("sdk.zip");
        bundle(&archive);
        let target = dir.path().join("out");
        fs::create_dir_all(&target).unwrap();

        ZipExtractor.extract(&archive, &target).unwrap();

        assert_eq!(fs::read_to_string(target.join("sdk/README")).unwrap(), "hello");
        assert!(target.join("sdk/bin/compile").is_file());
        assert!(!dir.path().join("escape").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_preserves_executable_bit() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("sdk.zip");
        bundle(&archive);
        let target = dir.path().join("out");
        fs::create_dir_all(&target).unwrap();

        ZipExtractor.extract(&archive, &target).unwrap();

        let mode = fs::metadata(target.join("sdk/bin/compile"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o111, 0o111);
    }

    #[test]
    fn test_garbage_archive_is_extract_error() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("sdk.zip");
        fs::write(&archive, b"not a zip").unwrap();
        let err = ZipExtractor.extract(&archive, dir.path()).unwrap_err();
        assert!(matches!(err, ProvisionError::Extract { .. }));
    }
}
