use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{self, BufRead, BufReader, stdin};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

#[cfg(test)]
#[path = "utils_test.rs"]
mod utils_test;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// 64-bit integer mixer used for bucket selection and merge decisions.
pub fn hash_64(key: u64) -> u64 {
    let mut key = key;
    key = key.wrapping_add(!key.wrapping_shl(32));
    key ^= key.wrapping_shr(22);
    key = key.wrapping_add(!key.wrapping_shl(13));
    key ^= key.wrapping_shr(8);
    key = key.wrapping_add(key.wrapping_shl(3));
    key ^= key.wrapping_shr(15);
    key = key.wrapping_add(!key.wrapping_shl(27));
    key ^= key.wrapping_shr(31);
    key
}

/// Wall-clock seconds, used for elapsed-time logging.
pub fn realtime() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Open a file (or `-` for stdin) as a buffered reader.
pub fn xopen(path: &Path) -> io::Result<Box<dyn BufRead + Send>> {
    if path.to_str() == Some("-") {
        return Ok(Box::new(BufReader::new(stdin())));
    }
    let file = File::open(path)?;
    Ok(Box::new(BufReader::new(file)))
}

/// Like [`xopen`], transparently decompressing gzip and bgzip input.
///
/// Detection uses the gzip magic bytes rather than the file extension.
/// BGZF is a series of gzip members, so `MultiGzDecoder` reads it too.
pub fn xzopen(path: &Path) -> io::Result<Box<dyn BufRead + Send>> {
    let mut input = xopen(path)?;
    let is_gzip = input.fill_buf()?.starts_with(&GZIP_MAGIC);
    if is_gzip {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(input))))
    } else {
        Ok(input)
    }
}
