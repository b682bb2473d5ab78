use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

use dirzip::{archive_directory, DirZipError, StreamingZipReader, StreamingZipWriter};

fn write_tree(root: &Path, files: &[(&str, &[u8])]) {
    for (name, data) in files {
        let path = root.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, data).unwrap();
    }
}

/// Every entry of the archive, name -> decompressed bytes
fn read_all(zip: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut reader = StreamingZipReader::open(zip).unwrap();
    let entries = reader.entries().to_vec();
    entries
        .iter()
        .map(|e| (e.name.clone(), reader.read_entry(e).unwrap()))
        .collect()
}

#[test]
fn files_are_stored_under_relative_paths() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("lf-windows");
    write_tree(&src, &[("a.txt", b"hello"), ("sub/b.txt", b"world")]);
    let out = dir.path().join("lf-windows-portable.zip");

    let summary = archive_directory(&src, &out).unwrap();
    assert_eq!(summary.entries, 2);
    assert_eq!(summary.destination, out);

    let contents = read_all(&out);
    assert_eq!(contents.len(), 2);
    assert_eq!(contents["a.txt"], b"hello");
    assert_eq!(contents["sub/b.txt"], b"world");
}

#[test]
fn one_entry_per_file_and_none_for_directories() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("src");
    write_tree(
        &src,
        &[
            ("root.bin", &[0u8, 1, 2, 3]),
            ("x/y/z/deep.txt", b"deep"),
            ("x/sibling.txt", b"sibling"),
            ("x/y/empty.txt", b""),
        ],
    );
    fs::create_dir_all(src.join("only/dirs/here")).unwrap();
    let out = dir.path().join("out.zip");

    archive_directory(&src, &out).unwrap();

    let reader = StreamingZipReader::open(&out).unwrap();
    let mut names: Vec<_> = reader.entries().iter().map(|e| e.name.clone()).collect();
    names.sort();
    assert_eq!(
        names,
        ["root.bin", "x/sibling.txt", "x/y/empty.txt", "x/y/z/deep.txt"]
    );
    assert!(reader.entries().iter().all(|e| !e.is_directory()));
    assert!(reader.entries().iter().all(|e| e.compression_method == 8));
}

#[test]
fn contents_round_trip_byte_for_byte() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("src");

    let binary: Vec<u8> = (0..200_000u32).map(|i| (i * 7 % 251) as u8).collect();
    let text = "The quick brown fox jumps over the lazy dog. ".repeat(10_000);
    write_tree(
        &src,
        &[("bin/data.bin", &binary), ("docs/readme.md", text.as_bytes())],
    );
    let out = dir.path().join("out.zip");

    archive_directory(&src, &out).unwrap();

    let contents = read_all(&out);
    assert_eq!(contents["bin/data.bin"], binary);
    assert_eq!(contents["docs/readme.md"], text.as_bytes());

    // Repetitive text should actually shrink
    let reader = StreamingZipReader::open(&out).unwrap();
    let readme = reader.find_entry("docs/readme.md").unwrap();
    assert!(readme.compressed_size < readme.uncompressed_size / 10);
    assert_eq!(readme.crc32, crc32fast::hash(text.as_bytes()));
}

#[test]
fn stale_archive_is_replaced_not_merged() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("out.zip");

    let mut stale = StreamingZipWriter::new(&out).unwrap();
    stale.start_entry("old.txt").unwrap();
    stale.write_data(b"from a previous run").unwrap();
    stale.finish().unwrap();

    let src = dir.path().join("src");
    write_tree(&src, &[("new.txt", b"fresh")]);

    archive_directory(&src, &out).unwrap();

    let contents = read_all(&out);
    assert!(!contents.contains_key("old.txt"));
    assert_eq!(contents.keys().collect::<Vec<_>>(), ["new.txt"]);
}

#[test]
fn non_zip_file_at_output_is_replaced() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("out.zip");
    fs::write(&out, b"not a zip at all").unwrap();

    let src = dir.path().join("src");
    write_tree(&src, &[("a.txt", b"a")]);

    archive_directory(&src, &out).unwrap();
    assert_eq!(read_all(&out).len(), 1);
}

#[test]
fn missing_source_fails_without_output() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("out.zip");

    let err = archive_directory(dir.path().join("does-not-exist"), &out).unwrap_err();

    assert!(matches!(err, DirZipError::SourceNotFound(_)));
    assert!(!out.exists());
}

#[test]
fn missing_source_leaves_existing_output_alone() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("out.zip");
    fs::write(&out, b"previous").unwrap();

    assert!(archive_directory(dir.path().join("does-not-exist"), &out).is_err());
    assert_eq!(fs::read(&out).unwrap(), b"previous");
}

#[test]
fn file_as_source_is_rejected() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("file.txt");
    fs::write(&file, b"x").unwrap();
    let out = dir.path().join("out.zip");

    let err = archive_directory(&file, &out).unwrap_err();
    assert!(matches!(err, DirZipError::SourceNotDirectory(_)));
    assert!(!out.exists());
}

#[test]
fn empty_directory_gives_valid_empty_archive() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("empty");
    fs::create_dir(&src).unwrap();
    let out = dir.path().join("empty.zip");

    let summary = archive_directory(&src, &out).unwrap();

    assert_eq!(summary.entries, 0);
    assert_eq!(summary.total_bytes, 0);
    let reader = StreamingZipReader::open(&out).unwrap();
    assert!(reader.entries().is_empty());
}

#[test]
fn missing_output_parent_is_reported_before_writing() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("src");
    write_tree(&src, &[("a.txt", b"a")]);
    let out = dir.path().join("missing").join("out.zip");

    let err = archive_directory(&src, &out).unwrap_err();
    assert!(matches!(err, DirZipError::OutputParentMissing(_)));
    assert!(!out.exists());
}

#[test]
fn repeated_runs_produce_the_same_entries() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("src");
    write_tree(
        &src,
        &[
            ("a.txt", b"alpha"),
            ("b/c.txt", b"charlie"),
            ("b/d/e.txt", b"echo"),
        ],
    );
    let out = dir.path().join("out.zip");

    archive_directory(&src, &out).unwrap();
    let first = read_all(&out);
    archive_directory(&src, &out).unwrap();
    let second = read_all(&out);

    assert_eq!(first, second);
}

#[test]
fn unicode_names_survive() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("src");
    write_tree(&src, &[("données/résumé.txt", "ça marche".as_bytes())]);
    let out = dir.path().join("out.zip");

    archive_directory(&src, &out).unwrap();

    let contents = read_all(&out);
    assert_eq!(contents["données/résumé.txt"], "ça marche".as_bytes());
}

#[cfg(unix)]
#[test]
fn failure_mid_walk_removes_partial_archive() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("src");
    write_tree(&src, &[("ok.txt", b"fine")]);
    std::os::unix::fs::symlink(dir.path().join("vanished.txt"), src.join("dangling.txt"))
        .unwrap();
    let out = dir.path().join("out.zip");

    let err = archive_directory(&src, &out).unwrap_err();

    match err {
        DirZipError::IoAt { path, .. } => assert!(path.ends_with("dangling.txt")),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!out.exists());
}

// `/proc/self/mem` opens fine but fails on the first read, which makes it a
// source that breaks while its entry is already being written.
#[cfg(target_os = "linux")]
#[test]
fn read_error_inside_an_entry_is_reported_against_the_file() {
    use dirzip::{ArchiveOptions, Archiver, Progress};

    let dir = tempdir().unwrap();
    let src = dir.path().join("src");
    write_tree(&src, &[("a.txt", b"written first")]);
    fs::create_dir_all(src.join("sub")).unwrap();
    std::os::unix::fs::symlink("/proc/self/mem", src.join("sub/unreadable.bin")).unwrap();
    let out = dir.path().join("out.zip");

    let mut started = Vec::new();
    let err = Archiver::new(ArchiveOptions::new(&src, &out))
        .on_progress(|event| {
            if let Progress::Entry { name, .. } = event {
                started.push(name.to_string());
            }
        })
        .run()
        .unwrap_err();

    assert_eq!(started, ["a.txt", "sub/unreadable.bin"]);
    match err {
        DirZipError::IoAt { path, .. } => assert!(path.ends_with("sub/unreadable.bin")),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!out.exists());
}
