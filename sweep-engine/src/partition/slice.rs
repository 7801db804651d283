// FASTQ Slicing
// Range slices and head-then-split chunking of 4-line FASTQ records

use crate::probe::open_source;

use std::fs::File;
use std::io::{self, BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Lines per FASTQ record
pub const LINES_PER_READ: u64 = 4;

const ALPHABET: &[u8; 26] = b"abcdefghijklmnopqrstuvwxyz";

/// Width of the split suffix
pub const SUFFIX_LEN: usize = 3;

/// Number of distinct suffixes of `SUFFIX_LEN` letters
pub const MAX_SLICES: u32 = 26 * 26 * 26;

/// Base-26 suffix for slice `index`, left-padded with `a` to three letters
/// (`0 -> aaa`, `1 -> aab`, `26 -> aba`).
pub fn slice_label(index: u32) -> String {
    let mut digits = Vec::with_capacity(SUFFIX_LEN);
    let mut i = index;
    while i > 0 {
        digits.push(ALPHABET[(i % 26) as usize]);
        i /= 26;
    }
    while digits.len() < SUFFIX_LEN {
        digits.push(b'a');
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

/// Path of slice `index` for files named `<prefix><suffix>` in `dir`
pub fn slice_path(dir: &Path, prefix: &str, index: u32) -> PathBuf {
    dir.join(format!("{}{}", prefix, slice_label(index)))
}

/// Copy reads `[begin, end)` of `src` into `dst`; returns the lines written.
/// Stops reading as soon as the range has been copied.
pub fn range_slice(src: &Path, dst: &Path, begin: u64, end: u64) -> io::Result<u64> {
    let first = begin * LINES_PER_READ;
    let last = end * LINES_PER_READ;

    let mut reader = open_source(src)?;
    let mut writer = BufWriter::new(File::create(dst)?);
    let mut line = Vec::new();
    let mut lineno = 0u64;
    let mut written = 0u64;

    while lineno < last {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        if lineno >= first {
            writer.write_all(&line)?;
            written += 1;
        }
        lineno += 1;
    }
    writer.flush()?;
    Ok(written)
}

/// Take the first `reads_per_slice * slices` reads of `src` and write them to
/// consecutive files of `reads_per_slice` reads each, named with
/// [`slice_path`]. As with `head | split`, a short input yields a short last
/// file and no files past it. Returns the files created.
pub fn split_slices(
    src: &Path,
    dir: &Path,
    prefix: &str,
    reads_per_slice: u64,
    slices: u32,
) -> io::Result<Vec<PathBuf>> {
    let lines_per_slice = reads_per_slice * LINES_PER_READ;
    let total_lines = lines_per_slice * u64::from(slices);

    let mut reader = open_source(src)?;
    let mut created = Vec::new();
    let mut writer: Option<BufWriter<File>> = None;
    let mut line = Vec::new();

    for lineno in 0..total_lines {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        if lineno % lines_per_slice == 0 {
            if let Some(mut done) = writer.take() {
                done.flush()?;
            }
            let index = (lineno / lines_per_slice) as u32;
            let path = slice_path(dir, prefix, index);
            writer = Some(BufWriter::new(File::create(&path)?));
            created.push(path);
        }
        if let Some(out) = writer.as_mut() {
            out.write_all(&line)?;
        }
    }
    if let Some(mut done) = writer.take() {
        done.flush()?;
    }
    Ok(created)
}
