use std::fs;
use std::process::Command;
use tempfile::tempdir;

// Archives a small tree and runs `unzip -t` on the result.
// If `unzip` is not present on the system, the test is skipped.

#[test]
fn unzip_compatibility() {
    let check = Command::new("unzip").arg("-v").output();
    if check.is_err() {
        eprintln!("skipping test: `unzip` not found");
        return;
    }

    let dir = tempdir().unwrap();
    let src = dir.path().join("release");
    fs::create_dir_all(src.join("lib/plugins")).unwrap();
    fs::write(src.join("hello.txt"), b"hello from test").unwrap();
    fs::write(src.join("lib/plugins/big.bin"), vec![0u8; 1024 * 1024]).unwrap();
    fs::write(src.join("lib/empty.dat"), b"").unwrap();

    let zip_path = dir.path().join("compat.zip");
    dirzip::archive_directory(&src, &zip_path).unwrap();

    let output = Command::new("unzip")
        .arg("-t")
        .arg(&zip_path)
        .output()
        .expect("failed to run unzip");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(
        output.status.success(),
        "unzip reported failure: {} {}",
        stdout,
        stderr
    );
    assert!(stdout.contains("lib/plugins/big.bin"), "{}", stdout);
}
