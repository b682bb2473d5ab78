use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use dirzip::{archive_directory, StreamingZipWriter};
use std::fs;
use std::path::Path;
use tempfile::{tempdir, NamedTempFile};

fn generate_compressible_data(size: usize) -> Vec<u8> {
    let pattern = b"The quick brown fox jumps over the lazy dog. ";
    let mut data = Vec::with_capacity(size);
    while data.len() < size {
        data.extend_from_slice(pattern);
    }
    data.truncate(size);
    data
}

fn generate_random_data(size: usize) -> Vec<u8> {
    // Pseudo-random data that doesn't compress well
    let mut data = Vec::with_capacity(size);
    let mut state = 0x12345678u32;
    for _ in 0..size {
        state = state.wrapping_mul(1103515245).wrapping_add(12345);
        data.push((state >> 16) as u8);
    }
    data
}

/// `dirs` subdirectories with `files_per_dir` files of `file_size` bytes each
fn build_tree(root: &Path, dirs: usize, files_per_dir: usize, file_size: usize) {
    let data = generate_compressible_data(file_size);
    for d in 0..dirs {
        let dir = root.join(format!("dir_{d}"));
        fs::create_dir_all(&dir).unwrap();
        for f in 0..files_per_dir {
            fs::write(dir.join(format!("file_{f}.txt")), &data).unwrap();
        }
    }
}

fn bench_write_entry(c: &mut Criterion) {
    for size in [100 * 1024, 1024 * 1024, 10 * 1024 * 1024] {
        let mut group = c.benchmark_group(format!("write_entry_{}", format_size(size)));
        group.throughput(Throughput::Bytes(size as u64));

        for (label, data) in [
            ("compressible", generate_compressible_data(size)),
            ("random", generate_random_data(size)),
        ] {
            group.bench_with_input(BenchmarkId::new(label, size), &data, |b, data| {
                b.iter(|| {
                    let temp = NamedTempFile::new().unwrap();
                    let mut writer = StreamingZipWriter::new(temp.path()).unwrap();
                    writer.start_entry("test.bin").unwrap();
                    writer.write_data(black_box(data)).unwrap();
                    writer.finish().unwrap();
                });
            });
        }

        group.finish();
    }
}

fn bench_archive_tree(c: &mut Criterion) {
    let mut group = c.benchmark_group("archive_directory");

    let shapes = [(10, 10, 10 * 1024), (4, 250, 1024), (2, 2, 4 << 20)];
    for (dirs, files_per_dir, file_size) in shapes {
        let src = tempdir().unwrap();
        build_tree(src.path(), dirs, files_per_dir, file_size);
        let total = dirs * files_per_dir * file_size;
        group.throughput(Throughput::Bytes(total as u64));

        let label = format!("{}x{}", dirs * files_per_dir, format_size(file_size));
        group.bench_function(label, |b| {
            let out = tempdir().unwrap();
            let output = out.path().join("tree.zip");
            b.iter(|| archive_directory(black_box(src.path()), &output).unwrap());
        });
    }

    group.finish();
}

fn format_size(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{}B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{}KB", bytes / 1024)
    } else {
        format!("{}MB", bytes / (1024 * 1024))
    }
}

criterion_group!(benches, bench_write_entry, bench_archive_tree);
criterion_main!(benches);
