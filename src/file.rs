use crate::clean::Language;
use crate::error::{Error, Result};
use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Encodings tried in order when a file is not valid UTF-8.
pub const DEFAULT_ENCODING_FALLBACKS: &[&str] = &["gbk", "windows-1252"];

/// A discovered source file with its raw and cleaned text.
///
/// Immutable once constructed; the pipeline owns it for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    absolute_path: PathBuf,
    relative_path: PathBuf,
    language: Language,
    raw: String,
    cleaned: String,
}

impl SourceFile {
    /// Creates a source file from already-read and already-cleaned text.
    #[must_use]
    pub fn new(
        absolute_path: PathBuf,
        relative_path: PathBuf,
        language: Language,
        raw: String,
        cleaned: String,
    ) -> Self {
        Self {
            absolute_path,
            relative_path,
            language,
            raw,
            cleaned,
        }
    }

    /// Absolute path on disk.
    #[must_use]
    pub fn absolute_path(&self) -> &Path {
        &self.absolute_path
    }

    /// Path relative to the scan root.
    #[must_use]
    pub fn relative_path(&self) -> &Path {
        &self.relative_path
    }

    /// Relative path with `/` separators on every platform.
    #[must_use]
    pub fn label(&self) -> String {
        self.relative_path
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// File name without directories.
    #[must_use]
    pub fn file_name(&self) -> String {
        self.relative_path
            .file_name()
            .map_or_else(|| self.label(), |name| name.to_string_lossy().into_owned())
    }

    /// Detected language.
    #[must_use]
    pub const fn language(&self) -> Language {
        self.language
    }

    /// Text as read from disk.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Text after cleaning.
    #[must_use]
    pub fn cleaned(&self) -> &str {
        &self.cleaned
    }

    /// Returns true if cleaning left nothing.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.cleaned.trim().is_empty()
    }

    /// Number of cleaned lines.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.cleaned.lines().count()
    }
}

/// Compares two relative paths component by component.
///
/// This visits directories in name order and files within a directory in
/// name order, independent of the platform separator.
pub(crate) fn compare_paths(a: &Path, b: &Path) -> std::cmp::Ordering {
    fn key(path: &Path) -> Vec<&std::ffi::OsStr> {
        path.components()
            .filter(|c| !matches!(c, Component::CurDir))
            .map(Component::as_os_str)
            .collect()
    }
    key(a).cmp(&key(b))
}

/// Ordered, duplicate-free collection of source files for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Corpus {
    files: Vec<SourceFile>,
}

impl Corpus {
    /// Builds a corpus in deterministic order, dropping duplicate paths.
    ///
    /// The input order does not matter, so files read concurrently can be
    /// passed straight in.
    #[must_use]
    pub fn from_files(mut files: Vec<SourceFile>) -> Self {
        files.sort_by(|a, b| compare_paths(&a.relative_path, &b.relative_path));
        files.dedup_by(|a, b| a.relative_path == b.relative_path);
        Self { files }
    }

    /// Files in discovery order.
    #[must_use]
    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    /// Iterates over files in discovery order.
    pub fn iter(&self) -> std::slice::Iter<'_, SourceFile> {
        self.files.iter()
    }

    /// Returns the file at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&SourceFile> {
        self.files.get(index)
    }

    /// Number of files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns true if no file was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Total raw bytes across all files.
    #[must_use]
    pub fn raw_bytes(&self) -> usize {
        self.files.iter().map(|f| f.raw.len()).sum()
    }

    /// Total cleaned bytes across all files.
    #[must_use]
    pub fn cleaned_bytes(&self) -> usize {
        self.files.iter().map(|f| f.cleaned.len()).sum()
    }

    /// Total cleaned lines across all files.
    #[must_use]
    pub fn cleaned_lines(&self) -> usize {
        self.files.iter().map(SourceFile::line_count).sum()
    }
}

impl<'a> IntoIterator for &'a Corpus {
    type Item = &'a SourceFile;
    type IntoIter = std::slice::Iter<'a, SourceFile>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.iter()
    }
}

/// Determines if a file is likely binary by looking for NUL bytes.
///
/// Only the first 8KB are inspected.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub(crate) fn is_likely_binary(path: &Path) -> Result<bool> {
    const BUFFER_SIZE: usize = 8192;

    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let mut reader = BufReader::with_capacity(BUFFER_SIZE, file);
    let mut buffer = [0u8; BUFFER_SIZE];

    let bytes_read = reader.read(&mut buffer).map_err(|e| Error::io(path, e))?;

    Ok(memchr::memchr(0, &buffer[..bytes_read]).is_some())
}

/// Looks up an encoding by its WHATWG label. `utf-8-sig` and `latin-1`
/// are accepted as well.
#[must_use]
pub fn encoding_for_label(label: &str) -> Option<&'static Encoding> {
    match label.trim().to_ascii_lowercase().as_str() {
        "utf-8-sig" | "utf8-sig" => Some(UTF_8),
        "latin-1" => Some(WINDOWS_1252),
        other => Encoding::for_label(other.as_bytes()),
    }
}

/// Reads a text file, stripping a UTF-8 byte-order mark.
///
/// Invalid UTF-8 is decoded with each of `fallbacks` in turn; the first
/// encoding that decodes every byte wins.
///
/// # Errors
///
/// Returns an error if the file cannot be read or no encoding decodes it.
pub(crate) fn read_text(path: &Path, fallbacks: &[&'static Encoding]) -> Result<String> {
    let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(&bytes);

    if let Ok(text) = std::str::from_utf8(bytes) {
        return Ok(text.to_string());
    }

    for encoding in fallbacks {
        if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(bytes) {
            tracing::debug!("Decoding {} as {}", path.display(), encoding.name());
            return Ok(text.into_owned());
        }
    }

    Err(Error::invalid_utf8(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    fn source(rel: &str, cleaned: &str) -> SourceFile {
        SourceFile::new(
            PathBuf::from("/root").join(rel),
            PathBuf::from(rel),
            Language::from_path(Path::new(rel)),
            cleaned.to_string(),
            cleaned.to_string(),
        )
    }

    #[test]
    fn test_source_file_accessors() {
        let file = source("src/app.js", "a;\nb;");
        assert_eq!(file.label(), "src/app.js");
        assert_eq!(file.file_name(), "app.js");
        assert_eq!(file.language(), Language::JavaScript);
        assert_eq!(file.line_count(), 2);
        assert!(!file.is_blank());
    }

    #[test]
    fn test_corpus_orders_by_components() {
        let corpus = Corpus::from_files(vec![
            source("b.js", "b"),
            source("a-b/z.js", "z"),
            source("a/y.js", "y"),
            source("a.js", "a"),
            source("a/b/x.js", "x"),
        ]);

        let labels: Vec<String> = corpus.iter().map(SourceFile::label).collect();
        assert_eq!(labels, ["a/b/x.js", "a/y.js", "a-b/z.js", "a.js", "b.js"]);
    }

    #[test]
    fn test_corpus_drops_duplicates() {
        let corpus = Corpus::from_files(vec![source("a.js", "one"), source("a.js", "one")]);
        assert_eq!(corpus.len(), 1);
    }

    #[test]
    fn test_corpus_totals() {
        let corpus = Corpus::from_files(vec![source("a.js", "ab\ncd"), source("b.js", "e")]);
        assert_eq!(corpus.cleaned_lines(), 3);
        assert_eq!(corpus.cleaned_bytes(), 6);
        assert!(!corpus.is_empty());
    }

    #[test]
    fn test_is_likely_binary() {
        let temp = assert_fs::TempDir::new().unwrap();
        let text = temp.child("a.js");
        text.write_str("let a = 1;").unwrap();
        let binary = temp.child("b.js");
        binary.write_binary(&[0x61, 0x00, 0x62]).unwrap();
        let empty = temp.child("c.js");
        empty.touch().unwrap();

        assert!(!is_likely_binary(text.path()).unwrap());
        assert!(is_likely_binary(binary.path()).unwrap());
        assert!(!is_likely_binary(empty.path()).unwrap());
    }

    fn default_fallbacks() -> Vec<&'static Encoding> {
        DEFAULT_ENCODING_FALLBACKS
            .iter()
            .map(|label| encoding_for_label(label).unwrap())
            .collect()
    }

    #[test]
    fn test_encoding_labels() {
        assert_eq!(encoding_for_label("GBK"), Some(encoding_rs::GBK));
        assert_eq!(encoding_for_label("utf-8-sig"), Some(UTF_8));
        assert_eq!(encoding_for_label("latin-1"), Some(WINDOWS_1252));
        assert_eq!(encoding_for_label("iso-8859-1"), Some(WINDOWS_1252));
        assert_eq!(encoding_for_label("klingon"), None);
    }

    #[test]
    fn test_read_text_strips_bom() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("a.js");
        file.write_binary(b"\xEF\xBB\xBFlet a;").unwrap();

        assert_eq!(read_text(file.path(), &[]).unwrap(), "let a;");
    }

    #[test]
    fn test_read_text_gbk_fallback() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("hello.js");
        file.write_binary(b"alert(\"\xc4\xe3\xba\xc3\");").unwrap();

        assert_eq!(
            read_text(file.path(), &default_fallbacks()).unwrap(),
            "alert(\"\u{4f60}\u{597d}\");"
        );
    }

    #[test]
    fn test_read_text_single_byte_fallback() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("a.css");
        file.write_binary(b"p { content: \"caf\xE9\"; }").unwrap();

        // Not valid GBK either: 0xE9 is followed by an ASCII quote
        assert_eq!(
            read_text(file.path(), &default_fallbacks()).unwrap(),
            "p { content: \"caf\u{e9}\"; }"
        );
        let err = read_text(file.path(), &[]).unwrap_err();
        assert!(matches!(err, Error::InvalidUtf8 { .. }));
    }

    #[test]
    fn test_read_text_missing_file() {
        let err = read_text(Path::new("/definitely/not/here.js"), &default_fallbacks()).unwrap_err();
        assert!(err.is_io());
    }
}
