//! Reads a single line out of a source file, honouring an inline PEP-263
//! encoding declaration (spec §4.7).
//!
//! Grounded on the teacher's `utils.rs`, which reads source files to embed
//! snippets in flamegraphs/console output and already treats any IO failure
//! as "no source available" rather than a hard error; this module adds the
//! PEP-263 encoding sniff the teacher's own snippet reader doesn't need
//! (py-spy always assumes UTF-8) using `encoding_rs`, the crate the pack's
//! other web/text-processing examples reach for non-UTF-8 decoding.
use std::fs;

use lazy_static::lazy_static;
use regex::Regex;

/// Sentinel returned whenever the real source line can't be produced, per
/// spec §4.8 ("IO-failure on source" -- swallowed, never propagated).
pub const UNAVAILABLE: &str = "<source code is not available>";

lazy_static! {
    static ref CODING_DECLARATION: Regex =
        Regex::new(r#"coding[:=][ \t]*([-_.a-zA-Z0-9]+)"#).unwrap();
}

/// Returns the `n`th (1-indexed) line of `path`, stripped of its trailing
/// newline, decoded per the file's own PEP-263 declaration if present.
/// Returns [`UNAVAILABLE`] on any IO failure, a missing line, or an
/// unrecognised encoding label.
pub fn read_line(path: &str, n: usize) -> String {
    match read_line_inner(path, n) {
        Some(line) => line,
        None => UNAVAILABLE.to_owned(),
    }
}

fn read_line_inner(path: &str, n: usize) -> Option<String> {
    if n == 0 {
        return None;
    }
    let raw = fs::read(path).ok()?;
    let encoding = detect_encoding(&raw);
    let (text, _, had_errors) = encoding.decode(&raw);
    if had_errors {
        // Fall back to lossy UTF-8 rather than failing outright; a
        // mis-declared encoding shouldn't sink the whole command.
        let text = String::from_utf8_lossy(&raw);
        return text.lines().nth(n - 1).map(|l| l.to_owned());
    }
    text.lines().nth(n - 1).map(|l| l.to_owned())
}

/// Searches the first two lines of `raw` (read as UTF-8, the only encoding
/// a magic comment can be authored in before its own declaration takes
/// effect) for the PEP-263 coding comment.
fn detect_encoding(raw: &[u8]) -> &'static encoding_rs::Encoding {
    let text = String::from_utf8_lossy(raw);
    for line in text.lines().take(2) {
        if let Some(captures) = CODING_DECLARATION.captures(line) {
            let label = &captures[1];
            if let Some(encoding) = encoding_rs::Encoding::for_label(label.as_bytes()) {
                return encoding;
            }
        }
    }
    encoding_rs::UTF_8
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &[u8]) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("cpython_lldb_source_reader_test_{}", std::process::id()));
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(contents).unwrap();
        path
    }

    #[test]
    fn test_missing_file_is_unavailable() {
        assert_eq!(read_line("/no/such/file.py", 1), UNAVAILABLE);
    }

    #[test]
    fn test_reads_nth_line() {
        let path = write_temp(b"first\nsecond\nthird\n");
        assert_eq!(read_line(path.to_str().unwrap(), 2), "second");
        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_line_past_end_is_unavailable() {
        let path = write_temp(b"only one line\n");
        assert_eq!(read_line(path.to_str().unwrap(), 5), UNAVAILABLE);
        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_detects_coding_declaration() {
        let raw = b"# -*- coding: latin-1 -*-\nimport os\n";
        let encoding = detect_encoding(raw);
        assert_eq!(encoding.name(), "windows-1252");
    }

    #[test]
    fn test_defaults_to_utf8() {
        let raw = b"import os\nprint(1)\n";
        let encoding = detect_encoding(raw);
        assert_eq!(encoding, encoding_rs::UTF_8);
    }
}
