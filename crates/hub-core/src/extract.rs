use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use hub_domain::{DeployError, PluginDescriptor, DESCRIPTOR_FILE_NAME};
use walkdir::WalkDir;

/// Descriptor located inside an expanded upload.
#[derive(Debug)]
pub struct LocatedPlugin {
    pub descriptor: PluginDescriptor,
    pub descriptor_path: PathBuf,
    /// Directory the canonical repackage starts from: the descriptor's parent.
    pub root: PathBuf,
}

/// Expands a zip upload into `dest`.
pub fn unpack_archive(archive: &Path, dest: &Path) -> Result<(), DeployError> {
    fs::create_dir_all(dest)?;
    expand_zip(archive, dest).map_err(DeployError::Unpack)
}

fn expand_zip(archive: &Path, dest: &Path) -> Result<()> {
    let file =
        File::open(archive).with_context(|| format!("failed to open {}", archive.display()))?;
    let mut zip = zip::ZipArchive::new(file).context("failed to read zip archive")?;
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).context("failed to read zip entry")?;
        let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
            return Err(anyhow!(
                "zip entry {:?} escapes the archive root",
                entry.name()
            ));
        };
        let target = dest.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)
            .with_context(|| format!("failed to create {}", target.display()))?;
        io::copy(&mut entry, &mut out)?;
        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&target, fs::Permissions::from_mode(mode))?;
        }
    }
    Ok(())
}

/// Finds the single plugin descriptor in an expanded upload.
///
/// Descriptors may sit at the top level or one directory down. Zero or
/// multiple descriptors reject the upload.
pub fn locate_plugin(expanded: &Path) -> Result<LocatedPlugin, DeployError> {
    let mut found = Vec::new();
    for entry in WalkDir::new(expanded)
        .min_depth(1)
        .max_depth(2)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|err| DeployError::Unpack(anyhow::Error::new(err)))?;
        if entry.file_type().is_file()
            && entry.file_name() == std::ffi::OsStr::new(DESCRIPTOR_FILE_NAME)
        {
            found.push(entry.into_path());
        }
    }
    if found.len() != 1 {
        return Err(DeployError::BadArchive {
            descriptors: found.len(),
        });
    }

    let descriptor_path = found.remove(0);
    let contents = fs::read_to_string(&descriptor_path)?;
    let descriptor =
        PluginDescriptor::parse(&contents).map_err(|source| DeployError::Descriptor {
            path: descriptor_path.clone(),
            source,
        })?;
    let root = descriptor_path.parent().unwrap_or(expanded).to_path_buf();
    Ok(LocatedPlugin {
        descriptor,
        descriptor_path,
        root,
    })
}

#[cfg(test)]
mod tests {
    use std::fs::{self, File};
    use std::io::Write;
    use std::path::Path;

    use hub_domain::DeployError;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    use super::{locate_plugin, unpack_archive};

    fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let mut zip = ZipWriter::new(File::create(path).expect("create zip"));
        for (name, contents) in entries {
            if let Some(dir) = name.strip_suffix('/') {
                zip.add_directory(dir, FileOptions::default())
                    .expect("add dir");
                continue;
            }
            zip.start_file(*name, FileOptions::default()).expect("entry");
            zip.write_all(contents.as_bytes()).expect("entry bytes");
        }
        zip.finish().expect("finish zip");
    }

    #[test]
    fn finds_a_top_level_descriptor() {
        let dir = tempfile::tempdir().expect("tempdir");
        let archive = dir.path().join("upload.zip");
        write_zip(
            &archive,
            &[("plugin.toml", "id = \"org.example\""), ("lib/code.jar", "jar")],
        );

        let expanded = dir.path().join("expanded");
        unpack_archive(&archive, &expanded).expect("unpacks");
        let located = locate_plugin(&expanded).expect("descriptor found");
        assert_eq!(located.descriptor.id, "org.example");
        assert_eq!(located.root, expanded);
        assert!(expanded.join("lib/code.jar").exists());
    }

    #[test]
    fn finds_a_descriptor_one_directory_down() {
        let dir = tempfile::tempdir().expect("tempdir");
        let archive = dir.path().join("upload.zip");
        write_zip(
            &archive,
            &[
                ("wrapper/", ""),
                ("wrapper/plugin.toml", "id = \"org.example\""),
                ("wrapper/lib/code.jar", "jar"),
            ],
        );

        let expanded = dir.path().join("expanded");
        unpack_archive(&archive, &expanded).expect("unpacks");
        let located = locate_plugin(&expanded).expect("descriptor found");
        assert_eq!(located.root, expanded.join("wrapper"));
    }

    #[test]
    fn descriptor_below_the_depth_limit_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let archive = dir.path().join("upload.zip");
        write_zip(&archive, &[("a/b/plugin.toml", "id = \"org.example\"")]);

        let expanded = dir.path().join("expanded");
        unpack_archive(&archive, &expanded).expect("unpacks");
        let err = locate_plugin(&expanded).expect_err("too deep");
        assert!(matches!(err, DeployError::BadArchive { descriptors: 0 }));
    }

    #[test]
    fn zero_descriptors_reject_the_upload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let archive = dir.path().join("upload.zip");
        write_zip(&archive, &[("readme.txt", "no descriptor here")]);

        let expanded = dir.path().join("expanded");
        unpack_archive(&archive, &expanded).expect("unpacks");
        let err = locate_plugin(&expanded).expect_err("no descriptor");
        assert!(matches!(err, DeployError::BadArchive { descriptors: 0 }));
    }

    #[test]
    fn multiple_descriptors_reject_the_upload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let archive = dir.path().join("upload.zip");
        write_zip(
            &archive,
            &[
                ("plugin.toml", "id = \"org.first\""),
                ("nested/plugin.toml", "id = \"org.second\""),
            ],
        );

        let expanded = dir.path().join("expanded");
        unpack_archive(&archive, &expanded).expect("unpacks");
        let err = locate_plugin(&expanded).expect_err("two descriptors");
        assert!(matches!(err, DeployError::BadArchive { descriptors: 2 }));
    }

    #[test]
    fn malformed_descriptor_reports_its_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let archive = dir.path().join("upload.zip");
        write_zip(&archive, &[("plugin.toml", "version = \"1\"")]);

        let expanded = dir.path().join("expanded");
        unpack_archive(&archive, &expanded).expect("unpacks");
        let err = locate_plugin(&expanded).expect_err("descriptor lacks id");
        match err {
            DeployError::Descriptor { path, .. } => {
                assert!(path.ends_with("plugin.toml"), "unexpected path {path:?}");
            }
            other => panic!("expected Descriptor error, got {other:?}"),
        }
    }

    #[test]
    fn entries_escaping_the_root_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let archive = dir.path().join("upload.zip");
        write_zip(&archive, &[("../escape.txt", "outside")]);

        let expanded = dir.path().join("expanded");
        let err = unpack_archive(&archive, &expanded).expect_err("must refuse traversal");
        assert!(matches!(err, DeployError::Unpack(_)));
        assert!(!dir.path().join("escape.txt").exists());
    }

    #[test]
    fn unix_permissions_survive_expansion() {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let dir = tempfile::tempdir().expect("tempdir");
            let archive = dir.path().join("upload.zip");
            let mut zip = ZipWriter::new(File::create(&archive).expect("create zip"));
            zip.start_file(
                "bin/launcher",
                FileOptions::default().unix_permissions(0o755),
            )
            .expect("entry");
            zip.write_all(b"#!/bin/sh\n").expect("entry bytes");
            zip.finish().expect("finish zip");

            let expanded = dir.path().join("expanded");
            unpack_archive(&archive, &expanded).expect("unpacks");
            let mode = fs::metadata(expanded.join("bin/launcher"))
                .expect("launcher exists")
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }
}
