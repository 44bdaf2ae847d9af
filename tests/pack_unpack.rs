use anyhow::Result;
use jarpack::{
    CompressionLevel, Error, ErrorPolicy, JarConfig, Packer, Unpacker, ZipArchive, ZipWriter,
};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};
use tempfile::TempDir;

/// Build a small tree with nested files, an empty directory and a binary file.
fn sample_tree(root: &Path) -> Result<()> {
    fs::create_dir_all(root.join("META-INF"))?;
    fs::create_dir_all(root.join("com/example/util"))?;
    fs::create_dir_all(root.join("emptyDir"))?;
    fs::write(root.join("META-INF/MANIFEST.MF"), "Manifest-Version: 1.0\n")?;
    fs::write(root.join("com/example/Main.class"), [0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 52])?;
    fs::write(
        root.join("com/example/util/strings.txt"),
        "the quick brown fox ".repeat(500),
    )?;
    fs::write(root.join("empty.txt"), "")?;
    Ok(())
}

/// Relative path (with `/`) to content, for every regular file under `root`.
fn snapshot(root: &Path) -> Result<BTreeMap<String, Vec<u8>>> {
    let mut files = BTreeMap::new();
    for entry in walkdir::WalkDir::new(root).min_depth(1) {
        let entry = entry?;
        if entry.file_type().is_file() {
            let rel = jarpack::pack::entry_name(root, entry.path())?;
            files.insert(rel, fs::read(entry.path())?);
        }
    }
    Ok(files)
}

fn entry_names(archive: &Path) -> Result<Vec<String>> {
    let archive = ZipArchive::open(archive)?;
    Ok(archive.entries().iter().map(|e| e.file_name.clone()).collect())
}

#[test]
fn round_trip_reproduces_tree() -> Result<()> {
    let tmp = TempDir::new()?;
    let src = tmp.path().join("src");
    let out = tmp.path().join("out");
    let jar = tmp.path().join("test.jar");
    sample_tree(&src)?;

    let config = JarConfig::default();
    let packed = jarpack::pack(&src, &jar, &config)?;
    assert_eq!(packed, jar);

    let extracted = jarpack::unpack(&jar, &out, &config)?;
    assert_eq!(extracted.len(), 4);
    assert!(extracted.iter().all(|p| p.is_absolute() && p.starts_with(&out)));
    assert_eq!(snapshot(&src)?, snapshot(&out)?);
    Ok(())
}

#[test]
fn entry_names_are_relative_with_forward_slashes() -> Result<()> {
    let tmp = TempDir::new()?;
    let src = tmp.path().join("src");
    let jar = tmp.path().join("test.jar");
    sample_tree(&src)?;

    jarpack::pack(&src, &jar, &JarConfig::default())?;
    let names = entry_names(&jar)?;

    assert!(names.contains(&"com/example/util/strings.txt".to_string()));
    assert!(names.contains(&"com/example/".to_string()));
    for name in &names {
        assert!(!name.contains('\\'), "{name}");
        assert!(!name.starts_with('/'), "{name}");
        assert!(!name.starts_with("src"), "root must not be an entry: {name}");
    }
    Ok(())
}

#[test]
fn empty_directory_becomes_directory_entry() -> Result<()> {
    let tmp = TempDir::new()?;
    let src = tmp.path().join("src");
    let out = tmp.path().join("out");
    let jar = tmp.path().join("test.jar");
    sample_tree(&src)?;

    jarpack::pack(&src, &jar, &JarConfig::default())?;

    let archive = ZipArchive::open(&jar)?;
    let entry = archive.by_name("emptyDir/").expect("directory entry");
    assert!(entry.is_directory);
    assert_eq!(entry.uncompressed_size, 0);
    assert!(archive.read_to_vec(entry)?.is_empty());

    let extracted = jarpack::unpack(&jar, &out, &JarConfig::default())?;
    assert!(!extracted.iter().any(|p| p.ends_with("emptyDir")));
    assert!(!out.join("emptyDir").is_file());
    Ok(())
}

#[test]
fn compression_level_changes_size_not_content() -> Result<()> {
    let tmp = TempDir::new()?;
    let src = tmp.path().join("src");
    sample_tree(&src)?;
    fs::write(src.join("big.txt"), "lorem ipsum dolor sit amet ".repeat(4000))?;

    let stored = tmp.path().join("stored.jar");
    let best = tmp.path().join("best.jar");
    let store_config = JarConfig {
        compression: CompressionLevel::Store,
        ..JarConfig::default()
    };
    let best_config = JarConfig {
        compression: CompressionLevel::Best,
        ..JarConfig::default()
    };
    jarpack::pack(&src, &stored, &store_config)?;
    jarpack::pack(&src, &best, &best_config)?;

    assert!(fs::metadata(&stored)?.len() > fs::metadata(&best)?.len());

    let out_stored = tmp.path().join("out_stored");
    let out_best = tmp.path().join("out_best");
    jarpack::unpack(&stored, &out_stored, &JarConfig::default())?;
    jarpack::unpack(&best, &out_best, &JarConfig::default())?;
    assert_eq!(snapshot(&out_stored)?, snapshot(&out_best)?);
    assert_eq!(snapshot(&src)?, snapshot(&out_best)?);
    Ok(())
}

#[test]
fn pack_preconditions_create_nothing() -> Result<()> {
    let tmp = TempDir::new()?;
    let jar = tmp.path().join("out.jar");
    let config = JarConfig::default();

    let err = jarpack::pack(&tmp.path().join("missing"), &jar, &config).unwrap_err();
    assert!(err.is_precondition(), "{err}");
    assert!(!jar.exists());

    let file = tmp.path().join("file.txt");
    fs::write(&file, "not a directory")?;
    let err = jarpack::pack(&file, &jar, &config).unwrap_err();
    assert!(err.is_precondition(), "{err}");
    assert!(!jar.exists());

    let err = jarpack::pack(tmp.path(), Path::new(""), &config).unwrap_err();
    assert!(err.is_precondition(), "{err}");
    Ok(())
}

#[test]
fn unpack_preconditions() -> Result<()> {
    let tmp = TempDir::new()?;
    let out = tmp.path().join("out");
    let config = JarConfig::default();

    let err = jarpack::unpack(&tmp.path().join("missing.jar"), &out, &config).unwrap_err();
    assert!(err.is_precondition(), "{err}");

    let err = jarpack::unpack(tmp.path(), &out, &config).unwrap_err();
    assert!(err.is_precondition(), "{err}");
    assert!(!out.exists());
    Ok(())
}

#[test]
fn unpack_creates_intermediate_directories() -> Result<()> {
    let tmp = TempDir::new()?;
    let jar = tmp.path().join("nested.jar");
    let dest = tmp.path().join("deep/dest");

    let mut writer = ZipWriter::new(fs::File::create(&jar)?, CompressionLevel::Default)?;
    writer.start_file("a/b/c.txt", UNIX_EPOCH + Duration::from_secs(1_600_000_000))?;
    writer.write_all(b"nested")?;
    writer.finish()?;

    let extracted = jarpack::unpack(&jar, &dest, &JarConfig::default())?;
    let expected: PathBuf = dest.join("a").join("b").join("c.txt");
    assert_eq!(extracted, vec![expected.clone()]);
    assert_eq!(fs::read(&expected)?, b"nested");
    Ok(())
}

#[test]
fn unpack_overwrites_existing_files() -> Result<()> {
    let tmp = TempDir::new()?;
    let src = tmp.path().join("src");
    let out = tmp.path().join("out");
    let jar = tmp.path().join("test.jar");
    sample_tree(&src)?;
    jarpack::pack(&src, &jar, &JarConfig::default())?;

    fs::create_dir_all(out.join("META-INF"))?;
    fs::write(out.join("META-INF/MANIFEST.MF"), "stale content that is longer than the original")?;

    jarpack::unpack(&jar, &out, &JarConfig::default())?;
    assert_eq!(fs::read_to_string(out.join("META-INF/MANIFEST.MF"))?, "Manifest-Version: 1.0\n");
    Ok(())
}

#[test]
fn timestamps_survive_packing() -> Result<()> {
    let tmp = TempDir::new()?;
    let src = tmp.path().join("src");
    let out = tmp.path().join("out");
    let jar = tmp.path().join("test.jar");
    sample_tree(&src)?;

    let old = UNIX_EPOCH + Duration::from_secs(1_500_000_000);
    fs::File::options()
        .write(true)
        .open(src.join("META-INF/MANIFEST.MF"))?
        .set_modified(old)?;

    jarpack::pack(&src, &jar, &JarConfig::default())?;

    let archive = ZipArchive::open(&jar)?;
    for entry in archive.entries() {
        let path = src.join(entry.file_name.trim_end_matches('/'));
        let expected = fs::metadata(&path)?.modified()?.duration_since(UNIX_EPOCH)?.as_secs();
        let actual = entry
            .last_modified()
            .expect("timestamp")
            .duration_since(UNIX_EPOCH)?
            .as_secs();
        assert_eq!(actual, expected, "{}", entry.file_name);
    }
    drop(archive);

    let config = JarConfig {
        restore_timestamps: true,
        ..JarConfig::default()
    };
    jarpack::unpack(&jar, &out, &config)?;
    assert_eq!(fs::metadata(out.join("META-INF/MANIFEST.MF"))?.modified()?, old);
    Ok(())
}

#[test]
fn sorted_packing_is_deterministic() -> Result<()> {
    let tmp = TempDir::new()?;
    let src = tmp.path().join("src");
    let jar = tmp.path().join("sorted.jar");
    sample_tree(&src)?;

    let config = JarConfig {
        sort_entries: true,
        ..JarConfig::default()
    };
    jarpack::pack(&src, &jar, &config)?;

    assert_eq!(
        entry_names(&jar)?,
        [
            "META-INF/",
            "META-INF/MANIFEST.MF",
            "com/",
            "com/example/",
            "com/example/Main.class",
            "com/example/util/",
            "com/example/util/strings.txt",
            "empty.txt",
            "emptyDir/",
        ]
    );
    Ok(())
}

#[test]
fn archive_inside_source_is_not_packed_into_itself() -> Result<()> {
    let tmp = TempDir::new()?;
    let src = tmp.path().join("src");
    sample_tree(&src)?;
    let jar = src.join("self.jar");

    jarpack::pack(&src, &jar, &JarConfig::default())?;
    assert!(!entry_names(&jar)?.contains(&"self.jar".to_string()));
    Ok(())
}

#[test]
fn unsafe_entry_aborts_by_default_and_is_skipped_when_asked() -> Result<()> {
    let tmp = TempDir::new()?;
    let jar = tmp.path().join("evil.jar");
    let out = tmp.path().join("out");

    let mut writer = ZipWriter::new(fs::File::create(&jar)?, CompressionLevel::Default)?;
    writer.start_file("ok.txt", UNIX_EPOCH)?;
    writer.write_all(b"fine")?;
    writer.start_file("../evil.txt", UNIX_EPOCH)?;
    writer.write_all(b"escape")?;
    writer.finish()?;

    let err = jarpack::unpack(&jar, &out, &JarConfig::default()).unwrap_err();
    assert!(matches!(err.root(), Error::UnsafeEntryName(_)), "{err}");
    assert!(!tmp.path().join("evil.txt").exists());

    let config = JarConfig {
        unpack_errors: ErrorPolicy::Continue,
        ..JarConfig::default()
    };
    let report = Unpacker::new(&jar, &out, &config)?.run()?;
    assert_eq!(report.files, vec![out.join("ok.txt")]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].name.as_deref(), Some("../evil.txt"));
    assert!(!tmp.path().join("evil.txt").exists());
    Ok(())
}

#[test]
fn corrupt_archive_is_fatal() -> Result<()> {
    let tmp = TempDir::new()?;
    let jar = tmp.path().join("garbage.jar");
    fs::write(&jar, b"this is not a zip file at all")?;

    let config = JarConfig {
        unpack_errors: ErrorPolicy::Continue,
        ..JarConfig::default()
    };
    let err = jarpack::unpack(&jar, &tmp.path().join("out"), &config).unwrap_err();
    assert!(matches!(err, Error::InvalidArchive(_)), "{err}");
    Ok(())
}

#[cfg(unix)]
#[test]
fn unreadable_names_follow_pack_policy() -> Result<()> {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let tmp = TempDir::new()?;
    let src = tmp.path().join("src");
    sample_tree(&src)?;
    fs::write(src.join(OsStr::from_bytes(b"bad\xffname")), "x")?;

    let jar = tmp.path().join("continue.jar");
    let config = JarConfig::default();
    let report = Packer::new(&src, &jar, &config)?.run()?;
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.files, 4);
    assert!(entry_names(&jar)?.contains(&"empty.txt".to_string()));

    let jar = tmp.path().join("abort.jar");
    let config = JarConfig {
        pack_errors: ErrorPolicy::Abort,
        ..JarConfig::default()
    };
    let err = Packer::new(&src, &jar, &config)?.run().unwrap_err();
    assert!(matches!(err.root(), Error::InvalidEntryName(_)), "{err}");
    // The writer was still closed, so whatever was packed is readable
    ZipArchive::open(&jar)?;
    Ok(())
}

#[cfg(target_os = "linux")]
#[test]
fn file_failing_mid_read_is_left_out() -> Result<()> {
    let tmp = TempDir::new()?;
    let src = tmp.path().join("src");
    fs::create_dir(&src)?;
    fs::write(src.join("ok.txt"), "still here")?;
    // Opens fine, every read fails with EIO
    std::os::unix::fs::symlink("/proc/self/mem", src.join("broken.bin"))?;

    let jar = tmp.path().join("out.jar");
    let config = JarConfig {
        sort_entries: true,
        ..JarConfig::default()
    };
    let report = Packer::new(&src, &jar, &config)?.run()?;
    assert_eq!(report.files, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].name.as_deref(), Some("broken.bin"));
    assert_eq!(entry_names(&jar)?, ["ok.txt"]);

    let files = jarpack::unpack(&jar, &tmp.path().join("out"), &config)?;
    assert_eq!(files.len(), 1);
    assert_eq!(fs::read(&files[0])?, b"still here");
    Ok(())
}

#[cfg(target_os = "linux")]
#[test]
fn close_failure_is_logged_not_raised() -> Result<()> {
    let tmp = TempDir::new()?;
    let src = tmp.path().join("src");
    fs::create_dir_all(src.join("empty"))?;

    // Buffered header writes succeed; the final flush hits ENOSPC
    let config = JarConfig::default();
    let report = Packer::new(&src, Path::new("/dev/full"), &config)?.run()?;
    assert_eq!(report.directories, 1);
    assert!(report.failures.is_empty());
    Ok(())
}

#[cfg(target_os = "linux")]
#[test]
fn close_failure_does_not_mask_walk_error() -> Result<()> {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let tmp = TempDir::new()?;
    let src = tmp.path().join("src");
    fs::create_dir(&src)?;
    fs::write(src.join(OsStr::from_bytes(b"bad\xffname")), "x")?;

    let config = JarConfig {
        pack_errors: ErrorPolicy::Abort,
        ..JarConfig::default()
    };
    let err = Packer::new(&src, Path::new("/dev/full"), &config)?
        .run()
        .unwrap_err();
    assert!(matches!(err.root(), Error::InvalidEntryName(_)), "{err}");
    Ok(())
}
