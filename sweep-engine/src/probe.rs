// Filesystem Probe
// Existence checks and line counts, transparently decompressing gzip inputs

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

use flate2::read::MultiGzDecoder;

const READ_BUF: usize = 1 << 16;

/// Read-only view of the filesystem used to validate inputs and outputs
pub trait FsProbe: Send + Sync {
    /// Whether anything exists at `path`
    fn exists(&self, path: &Path) -> bool;

    /// Whether `path` is a regular file (after following links)
    fn is_file(&self, path: &Path) -> bool;

    /// Number of newline-terminated lines, as `wc -l` reports it
    fn line_count(&self, path: &Path) -> io::Result<u64>;
}

/// Probe backed by the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl LocalFs {
    pub fn new() -> Self {
        Self
    }
}

impl FsProbe for LocalFs {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn line_count(&self, path: &Path) -> io::Result<u64> {
        let mut reader = open_source(path)?;
        let mut count = 0u64;
        loop {
            let buf = reader.fill_buf()?;
            if buf.is_empty() {
                break;
            }
            count += buf.iter().filter(|&&b| b == b'\n').count() as u64;
            let len = buf.len();
            reader.consume(len);
        }
        Ok(count)
    }
}

/// Whether a path names a gzip-compressed file
pub fn is_gzipped(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

/// Open a reads file for buffered reading, decompressing `.gz` files
pub fn open_source(path: &Path) -> io::Result<Box<dyn BufRead + Send>> {
    let file = File::open(path)?;
    let inner: Box<dyn Read + Send> = if is_gzipped(path) {
        Box::new(MultiGzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(Box::new(BufReader::with_capacity(READ_BUF, inner)))
}
