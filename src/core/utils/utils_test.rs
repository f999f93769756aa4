use super::*;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs;
use std::io::{Read, Write};
use std::path::PathBuf;

fn create_temp_file(dir: &Path, name: &str, content: &[u8]) -> io::Result<PathBuf> {
    let path = dir.join(name);
    fs::write(&path, content)?;
    Ok(path)
}

// --- hash_64 Tests ---

#[test]
fn test_hash_64_deterministic_and_spreading() {
    assert_eq!(hash_64(12345), hash_64(12345));
    assert_ne!(hash_64(1), hash_64(2));
    // Neighbouring keys should not land in neighbouring buckets.
    let buckets: std::collections::HashSet<u64> = (0..64u64).map(|k| hash_64(k) % 1024).collect();
    assert!(buckets.len() > 48);
}

// --- xopen / xzopen Tests ---

#[test]
fn test_xopen_plain_file() -> io::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = create_temp_file(dir.path(), "plain.fa", b">s\nACGT\n")?;
    let mut text = String::new();
    xopen(&path)?.read_to_string(&mut text)?;
    assert_eq!(text, ">s\nACGT\n");
    Ok(())
}

#[test]
fn test_xzopen_detects_gzip_by_magic() -> io::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(b">s\nACGT\n")?;
    let compressed = encoder.finish()?;
    // Deliberately no .gz extension.
    let path = create_temp_file(dir.path(), "reads.fa", &compressed)?;

    let mut text = String::new();
    xzopen(&path)?.read_to_string(&mut text)?;
    assert_eq!(text, ">s\nACGT\n");
    Ok(())
}

#[test]
fn test_xzopen_concatenated_members() -> io::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut data = Vec::new();
    for part in [&b">a\nAC\n"[..], &b">b\nGT\n"[..]] {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(part)?;
        data.extend(encoder.finish()?);
    }
    let path = create_temp_file(dir.path(), "multi.fa.gz", &data)?;

    let mut text = String::new();
    xzopen(&path)?.read_to_string(&mut text)?;
    assert_eq!(text, ">a\nAC\n>b\nGT\n");
    Ok(())
}

#[test]
fn test_xopen_missing_file() {
    assert!(xopen(Path::new("/nonexistent/path/ref.fa")).is_err());
}
