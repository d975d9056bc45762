use crate::{
    clean::{ContentCleaner, Language},
    config::Config,
    diagnostics::{Diagnostics, Warning},
    error::{Error, Result},
    file::{Corpus, SourceFile, compare_paths, encoding_for_label, is_likely_binary, read_text},
    filter::FileFilter,
};
use encoding_rs::Encoding;
use ignore::{DirEntry, WalkBuilder, WalkState};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};
use tracing::{debug, trace};

/// Statistics collected during scanning.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanStats {
    /// Files that passed the path filter
    pub matched_files: usize,

    /// Files read into the corpus
    pub text_files: usize,

    /// Files skipped as binary
    pub binary_files: usize,

    /// Files skipped because they could not be read or decoded
    pub unreadable_files: usize,

    /// Directory walk errors
    pub walk_errors: usize,
}

/// Result of a scan: the corpus plus what was skipped along the way.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    /// Files in deterministic order
    pub corpus: Corpus,
    /// Skipped files and the empty-corpus condition
    pub diagnostics: Diagnostics,
    /// Counters
    pub stats: ScanStats,
}

/// Why a single entry did not make it into the corpus.
enum Skip {
    Binary,
    Unreadable(String),
}

/// Walks the root directory and builds the corpus.
///
/// Reads run in parallel; the result is re-sorted afterwards, so the corpus
/// order never depends on thread scheduling.
pub struct Scanner {
    root_dir: PathBuf,
    respect_gitignore: bool,
    encodings: Vec<&'static Encoding>,
    filter: FileFilter,
    cleaner: ContentCleaner,
}

impl Scanner {
    /// Creates a new scanner from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a filter pattern or an encoding label is invalid.
    pub fn new(config: &Config) -> Result<Self> {
        let encodings = config
            .encoding_fallbacks
            .iter()
            .map(|label| {
                encoding_for_label(label)
                    .ok_or_else(|| Error::config(format!("unknown encoding '{label}'")))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            root_dir: config.root_dir.clone(),
            respect_gitignore: config.respect_gitignore,
            encodings,
            filter: FileFilter::new(&config.file_filter_config)?,
            cleaner: ContentCleaner::new(config.clean),
        })
    }

    /// Scans the root directory.
    ///
    /// Unreadable, undecodable and binary files are skipped with a warning.
    /// An empty result is not an error; it carries an empty-corpus warning.
    ///
    /// # Errors
    ///
    /// Returns a scan error if the root is missing, not a directory, or
    /// cannot be listed.
    pub fn scan(&self) -> Result<ScanOutcome> {
        self.check_root()?;

        let files = Arc::new(Mutex::new(Vec::new()));
        let skipped = Arc::new(Mutex::new(Vec::new()));
        let walk_errors = Arc::new(Mutex::new(Vec::new()));

        debug!("Starting parallel scan of {}", self.root_dir.display());

        let walker = self.walk_builder().build_parallel();
        walker.run(|| {
            let files = Arc::clone(&files);
            let skipped = Arc::clone(&skipped);
            let walk_errors = Arc::clone(&walk_errors);

            Box::new(move |result| {
                match result {
                    Ok(entry) if entry.file_type().is_some_and(|ft| ft.is_file()) => {
                        let relative = self.relative_path(entry.path());
                        if !self.filter.should_process(&relative) {
                            return WalkState::Continue;
                        }

                        match self.read_entry(&entry, relative.clone()) {
                            Ok(file) => lock(&files).push(file),
                            Err(skip) => lock(&skipped).push((relative, skip)),
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        let path = error_path(&e)
                            .map_or_else(|| self.root_dir.clone(), |p| self.relative_path(p));
                        lock(&walk_errors).push((path, e.to_string()));
                    }
                }
                WalkState::Continue
            })
        });

        let files = take(files);
        let mut skipped = take(skipped);
        let mut walk_errors = take(walk_errors);

        // Parallel order is arbitrary; report in path order
        skipped.sort_by(|a, b| compare_paths(&a.0, &b.0));
        walk_errors.sort_by(|a, b| compare_paths(&a.0, &b.0));

        let mut stats = ScanStats {
            matched_files: files.len() + skipped.len(),
            text_files: files.len(),
            walk_errors: walk_errors.len(),
            ..ScanStats::default()
        };

        let mut diagnostics = Diagnostics::new();
        for (path, reason) in walk_errors {
            diagnostics.push(Warning::FileRead { path, reason });
        }
        for (path, skip) in skipped {
            let reason = match skip {
                Skip::Binary => {
                    stats.binary_files += 1;
                    "binary content (NUL byte in the first 8 KiB)".to_string()
                }
                Skip::Unreadable(reason) => {
                    stats.unreadable_files += 1;
                    reason
                }
            };
            diagnostics.push(Warning::FileRead { path, reason });
        }

        let corpus = Corpus::from_files(files);

        debug!(
            "Scan complete: {} matched, {} read, {} binary, {} unreadable, {} walk errors",
            stats.matched_files,
            stats.text_files,
            stats.binary_files,
            stats.unreadable_files,
            stats.walk_errors
        );

        if corpus.is_empty() {
            diagnostics.push(Warning::EmptyCorpus {
                root: self.root_dir.clone(),
            });
        }

        Ok(ScanOutcome {
            corpus,
            diagnostics,
            stats,
        })
    }

    fn check_root(&self) -> Result<()> {
        let metadata = fs::metadata(&self.root_dir)
            .map_err(|e| Error::scan(&self.root_dir, e.to_string()))?;

        if !metadata.is_dir() {
            return Err(Error::scan(&self.root_dir, "not a directory"));
        }

        // Listing fails on unreadable directories even when metadata succeeds
        fs::read_dir(&self.root_dir).map_err(|e| Error::scan(&self.root_dir, e.to_string()))?;
        Ok(())
    }

    fn walk_builder(&self) -> WalkBuilder {
        let mut builder = WalkBuilder::new(&self.root_dir);
        builder
            .git_ignore(self.respect_gitignore)
            .git_global(self.respect_gitignore)
            .git_exclude(self.respect_gitignore)
            .require_git(false)
            .parents(self.respect_gitignore)
            .ignore(false)
            .hidden(true)
            .follow_links(false)
            .skip_stdout(true)
            .threads(num_cpus::get());

        let root = self.root_dir.clone();
        let filter = self.filter.clone();
        builder.filter_entry(move |entry| {
            if entry.depth() == 0 || !entry.file_type().is_some_and(|ft| ft.is_dir()) {
                return true;
            }
            let relative = pathdiff::diff_paths(entry.path(), &root)
                .unwrap_or_else(|| entry.path().to_path_buf());
            let excluded = filter.is_excluded_directory(&relative);
            if excluded {
                trace!("Pruning directory: {}", relative.display());
            }
            !excluded
        });

        builder
    }

    fn relative_path(&self, path: &Path) -> PathBuf {
        pathdiff::diff_paths(path, &self.root_dir).unwrap_or_else(|| path.to_path_buf())
    }

    /// Reads and cleans one file.
    fn read_entry(&self, entry: &DirEntry, relative_path: PathBuf) -> std::result::Result<SourceFile, Skip> {
        let path = entry.path();
        trace!("Processing file: {}", path.display());

        match is_likely_binary(path) {
            Ok(true) => {
                debug!("Skipping binary file: {}", relative_path.display());
                return Err(Skip::Binary);
            }
            Ok(false) => {}
            Err(e) => return Err(Skip::Unreadable(e.to_string())),
        }

        let raw = read_text(path, &self.encodings).map_err(|e| Skip::Unreadable(e.to_string()))?;
        let language = Language::from_path(path);
        let cleaned = self.cleaner.clean(&raw, language);

        Ok(SourceFile::new(
            path.to_path_buf(),
            relative_path,
            language,
            raw,
            cleaned,
        ))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn take<T>(shared: Arc<Mutex<Vec<T>>>) -> Vec<T> {
    match Arc::try_unwrap(shared) {
        Ok(mutex) => mutex.into_inner().unwrap_or_else(PoisonError::into_inner),
        Err(arc) => std::mem::take(&mut *lock(&arc)),
    }
}

/// Path carried by a walk error, if any.
fn error_path(err: &ignore::Error) -> Option<&Path> {
    match err {
        ignore::Error::WithPath { path, .. } => Some(path),
        ignore::Error::Loop { child, .. } => Some(child),
        ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } => {
            error_path(err)
        }
        ignore::Error::Partial(errors) => errors.iter().find_map(error_path),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    fn scan(root: &Path) -> ScanOutcome {
        let config = Config::builder().root_dir(root).build().unwrap();
        Scanner::new(&config).unwrap().scan().unwrap()
    }

    fn labels(outcome: &ScanOutcome) -> Vec<String> {
        outcome.corpus.iter().map(SourceFile::label).collect()
    }

    #[test]
    fn test_scanner_finds_allowed_files() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("index.html").write_str("<p>hi</p>").unwrap();
        temp.child("app.JS").write_str("run();").unwrap();
        temp.child("README.md").write_str("# readme").unwrap();
        temp.child("Cargo.toml").write_str("[package]").unwrap();

        let outcome = scan(temp.path());

        assert_eq!(labels(&outcome), ["app.JS", "index.html"]);
        assert!(outcome.diagnostics.is_empty());
        assert_eq!(outcome.stats.text_files, 2);
    }

    #[test]
    fn test_scanner_orders_deterministically() {
        let temp = assert_fs::TempDir::new().unwrap();
        for path in ["z.js", "src/b.ts", "src/a.ts", "src/lib/c.py", "a.css", "web/x.html"] {
            temp.child(path).write_str("x = 1;").unwrap();
        }

        let first = labels(&scan(temp.path()));
        let second = labels(&scan(temp.path()));

        assert_eq!(
            first,
            ["a.css", "src/a.ts", "src/b.ts", "src/lib/c.py", "web/x.html", "z.js"]
        );
        assert_eq!(first, second);
    }

    #[test]
    fn test_scanner_prunes_excluded_directories() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("src/main.js").write_str("main();").unwrap();
        temp.child("node_modules/pkg/index.js").write_str("lib();").unwrap();
        temp.child("web/dist/bundle.js").write_str("b();").unwrap();

        assert_eq!(labels(&scan(temp.path())), ["src/main.js"]);
    }

    #[test]
    fn test_scanner_respects_gitignore() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child(".gitignore").write_str("ignored.js\n").unwrap();
        temp.child("included.js").write_str("a();").unwrap();
        temp.child("ignored.js").write_str("b();").unwrap();

        assert_eq!(labels(&scan(temp.path())), ["included.js"]);

        let config = Config::builder()
            .root_dir(temp.path())
            .respect_gitignore(false)
            .build()
            .unwrap();
        let outcome = Scanner::new(&config).unwrap().scan().unwrap();
        assert_eq!(labels(&outcome), ["ignored.js", "included.js"]);
    }

    #[test]
    fn test_scanner_skips_hidden_entries() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child(".hidden/secret.js").write_str("s();").unwrap();
        temp.child(".eslintrc.js").write_str("module.exports = {};").unwrap();
        temp.child("shown.js").write_str("v();").unwrap();

        assert_eq!(labels(&scan(temp.path())), ["shown.js"]);
    }

    #[test]
    fn test_scanner_skips_binary_with_warning() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("text.js").write_str("ok();").unwrap();
        temp.child("blob.js").write_binary(&[0x63, 0x00, 0x01, 0x02]).unwrap();

        let outcome = scan(temp.path());

        assert_eq!(labels(&outcome), ["text.js"]);
        assert_eq!(outcome.stats.binary_files, 1);
        assert_eq!(outcome.diagnostics.skipped_files(), 1);
        assert!(matches!(
            &outcome.diagnostics.warnings()[0],
            Warning::FileRead { path, .. } if path == Path::new("blob.js")
        ));
    }

    #[test]
    fn test_scanner_decodes_gbk_sources() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("greet.js")
            .write_binary(b"// \xd7\xa2\xca\xcd\nvar s = \"\xc4\xe3\xba\xc3\";\n")
            .unwrap();

        let outcome = scan(temp.path());

        assert_eq!(outcome.corpus.len(), 1);
        assert_eq!(outcome.corpus.files()[0].cleaned(), "var s = \"\u{4f60}\u{597d}\";");
        assert!(outcome.diagnostics.is_empty());
    }

    #[test]
    fn test_scanner_encoding_order_is_configurable() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("hello.js").write_binary(b"s = \"\xc4\xe3\";").unwrap();

        let config = Config::builder()
            .root_dir(temp.path())
            .encoding_fallbacks(["latin-1"])
            .build()
            .unwrap();
        let outcome = Scanner::new(&config).unwrap().scan().unwrap();

        assert_eq!(outcome.corpus.files()[0].cleaned(), "s = \"\u{c4}\u{e3}\";");
    }

    #[test]
    fn test_scanner_single_byte_fallback() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("legacy.css").write_binary(b"a { content: \"\xE9\"; }").unwrap();

        let outcome = scan(temp.path());
        assert_eq!(outcome.corpus.len(), 1);
        assert!(outcome.corpus.files()[0].cleaned().contains('\u{e9}'));

        let config = Config::builder()
            .root_dir(temp.path())
            .encoding_fallbacks(Vec::<String>::new())
            .build()
            .unwrap();
        let outcome = Scanner::new(&config).unwrap().scan().unwrap();
        assert!(outcome.corpus.is_empty());
        assert_eq!(outcome.stats.unreadable_files, 1);
        assert_eq!(outcome.diagnostics.skipped_files(), 1);
        assert!(outcome.diagnostics.has_empty_corpus());
    }

    #[test]
    fn test_scanner_cleans_content() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("a.py")
            .write_str("# comment\n\nx = 1  # trailing\n\n\ny = 2\n")
            .unwrap();

        let outcome = scan(temp.path());
        let file = &outcome.corpus.files()[0];
        assert_eq!(file.cleaned(), "x = 1\ny = 2");
        assert!(file.raw().starts_with("# comment"));
        assert_eq!(file.language(), Language::Python);
    }

    #[test]
    fn test_scanner_empty_directory() {
        let temp = assert_fs::TempDir::new().unwrap();

        let outcome = scan(temp.path());

        assert!(outcome.corpus.is_empty());
        assert!(outcome.diagnostics.has_empty_corpus());
    }

    #[test]
    fn test_scanner_missing_root() {
        let temp = assert_fs::TempDir::new().unwrap();
        let config = Config::builder().root_dir(temp.path()).build().unwrap();
        let scanner = Scanner::new(&config).unwrap();
        temp.close().unwrap();

        let err = scanner.scan().unwrap_err();
        assert!(err.is_scan());
    }

    #[test]
    fn test_scanner_root_is_a_file() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("main.js");
        file.write_str("x();").unwrap();
        let config = Config::builder().root_dir(temp.path()).build().unwrap();
        let mut scanner = Scanner::new(&config).unwrap();
        scanner.root_dir = file.path().to_path_buf();

        assert!(scanner.scan().unwrap_err().is_scan());
    }

    #[cfg(unix)]
    #[test]
    fn test_scanner_unlistable_root() {
        use std::os::unix::fs::PermissionsExt;

        let temp = assert_fs::TempDir::new().unwrap();
        let root = temp.child("locked");
        root.child("a.js").write_str("a();").unwrap();
        let config = Config::builder().root_dir(root.path()).build().unwrap();
        let scanner = Scanner::new(&config).unwrap();

        fs::set_permissions(root.path(), fs::Permissions::from_mode(0o000)).unwrap();
        // The superuser can list it anyway
        let listable = fs::read_dir(root.path()).is_ok();
        let result = scanner.scan();
        fs::set_permissions(root.path(), fs::Permissions::from_mode(0o755)).unwrap();

        if listable {
            return;
        }
        let err = result.unwrap_err();
        assert!(err.is_scan());
        assert!(fs::metadata(root.path()).unwrap().is_dir());
    }

    #[test]
    fn test_error_path_unwraps_nesting() {
        let inner = ignore::Error::WithPath {
            path: PathBuf::from("a/b"),
            err: Box::new(ignore::Error::Io(std::io::Error::other("denied"))),
        };
        let outer = ignore::Error::WithDepth {
            depth: 2,
            err: Box::new(inner),
        };
        assert_eq!(error_path(&outer), Some(Path::new("a/b")));
    }
}
