//! Comment and blank-line removal.
//!
//! Every supported language is a [`Language`] variant with a static
//! [`CommentSyntax`]. A single literal-aware scanner splits text into code,
//! literal and comment segments, so a comment marker inside a string literal
//! is never treated as a comment.

use serde::Serialize;
use std::borrow::Cow;
use std::path::Path;

/// Files with at most this many lines...
const MINIFIED_MAX_LINES: usize = 10;
/// ...and more than this many characters are treated as minified.
const MINIFIED_MIN_CHARS: usize = 2_000;

/// A string-literal delimiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringDelimiter {
    /// Opening and closing quote
    pub quote: &'static str,
    /// Whether the literal may span lines
    pub multiline: bool,
    /// Whether a backslash escapes the next character
    pub escapes: bool,
}

impl StringDelimiter {
    const fn single_line(quote: &'static str) -> Self {
        Self {
            quote,
            multiline: false,
            escapes: true,
        }
    }

    const fn multi_line(quote: &'static str) -> Self {
        Self {
            quote,
            multiline: true,
            escapes: true,
        }
    }
}

/// Comment and literal markers of one language.
///
/// Longer delimiters must precede their prefixes (`"""` before `"`).
#[derive(Debug, Clone, Copy)]
pub struct CommentSyntax {
    /// Markers that comment out the rest of the line
    pub line: &'static [&'static str],
    /// Opening and closing block-comment markers
    pub block: &'static [(&'static str, &'static str)],
    /// String-literal delimiters
    pub strings: &'static [StringDelimiter],
}

const HTML_SYNTAX: CommentSyntax = CommentSyntax {
    line: &[],
    block: &[("<!--", "-->")],
    strings: &[],
};

const CSS_SYNTAX: CommentSyntax = CommentSyntax {
    line: &[],
    block: &[("/*", "*/")],
    strings: &[
        StringDelimiter::single_line("\""),
        StringDelimiter::single_line("'"),
    ],
};

const SCRIPT_SYNTAX: CommentSyntax = CommentSyntax {
    line: &["//"],
    block: &[("/*", "*/")],
    strings: &[
        StringDelimiter::multi_line("`"),
        StringDelimiter::single_line("\""),
        StringDelimiter::single_line("'"),
    ],
};

const PYTHON_SYNTAX: CommentSyntax = CommentSyntax {
    line: &["#"],
    block: &[],
    strings: &[
        StringDelimiter::multi_line("\"\"\""),
        StringDelimiter::multi_line("'''"),
        StringDelimiter::single_line("\""),
        StringDelimiter::single_line("'"),
    ],
};

const JAVA_SYNTAX: CommentSyntax = CommentSyntax {
    line: &["//"],
    block: &[("/*", "*/")],
    strings: &[
        StringDelimiter::multi_line("\"\"\""),
        StringDelimiter::single_line("\""),
        StringDelimiter::single_line("'"),
    ],
};

const C_FAMILY_SYNTAX: CommentSyntax = CommentSyntax {
    line: &["//"],
    block: &[("/*", "*/")],
    strings: &[
        StringDelimiter::single_line("\""),
        StringDelimiter::single_line("'"),
    ],
};

const PLAIN_SYNTAX: CommentSyntax = CommentSyntax {
    line: &[],
    block: &[],
    strings: &[],
};

/// Source language, detected from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// HTML and XHTML
    Html,
    /// CSS
    Css,
    /// JavaScript, including JSX and module variants
    JavaScript,
    /// TypeScript, including TSX
    TypeScript,
    /// Python
    Python,
    /// Java and Kotlin
    Java,
    /// C, C++, C#, Go, Rust, Swift, SCSS, Less
    CFamily,
    /// No known comment syntax
    Plain,
}

impl Language {
    /// Detects the language from an extension (case-insensitive, no leading dot).
    #[must_use]
    pub fn from_extension(extension: &str) -> Self {
        match extension.to_ascii_lowercase().as_str() {
            "html" | "htm" | "xhtml" => Self::Html,
            "css" => Self::Css,
            "js" | "mjs" | "cjs" | "jsx" => Self::JavaScript,
            "ts" | "tsx" | "mts" | "cts" => Self::TypeScript,
            "py" | "pyw" => Self::Python,
            "java" | "kt" | "kts" => Self::Java,
            "c" | "h" | "cc" | "cpp" | "cxx" | "hpp" | "hh" | "cs" | "go" | "rs" | "swift"
            | "scss" | "less" => Self::CFamily,
            _ => Self::Plain,
        }
    }

    /// Detects the language from a path's extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map_or(Self::Plain, Self::from_extension)
    }

    /// Returns the comment syntax of this language.
    #[must_use]
    pub const fn syntax(self) -> &'static CommentSyntax {
        match self {
            Self::Html => &HTML_SYNTAX,
            Self::Css => &CSS_SYNTAX,
            Self::JavaScript | Self::TypeScript => &SCRIPT_SYNTAX,
            Self::Python => &PYTHON_SYNTAX,
            Self::Java => &JAVA_SYNTAX,
            Self::CFamily => &C_FAMILY_SYNTAX,
            Self::Plain => &PLAIN_SYNTAX,
        }
    }

    /// Short display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Css => "css",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Python => "python",
            Self::Java => "java",
            Self::CFamily => "c-family",
            Self::Plain => "plain",
        }
    }
}

/// Removes comments from source text.
pub trait CommentStripper {
    /// Returns `text` with every comment removed and literals left intact.
    fn strip_comments(&self, text: &str) -> String;
}

impl CommentStripper for Language {
    fn strip_comments(&self, text: &str) -> String {
        let segments = segments(text, self.syntax());
        let mut out = String::with_capacity(text.len());

        for (index, &(kind, segment)) in segments.iter().enumerate() {
            if kind != SegmentKind::Comment {
                out.push_str(segment);
                continue;
            }

            let newlines = segment.matches('\n').count();
            if newlines > 0 {
                // Keep following code on its own line
                out.extend(std::iter::repeat_n('\n', newlines));
                continue;
            }

            // Inline block comment between two tokens: keep them apart
            let prev_solid = out.chars().next_back().is_some_and(|c| !c.is_whitespace());
            let next_solid = segments
                .get(index + 1)
                .and_then(|(_, next)| next.chars().next())
                .is_some_and(|c| !c.is_whitespace());
            if prev_solid && next_solid {
                out.push(' ');
            }
        }

        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmentKind {
    Code,
    Literal,
    Comment,
}

/// Splits text into code, literal and comment segments.
///
/// Concatenating every segment yields the input again.
fn segments<'a>(text: &'a str, syntax: &CommentSyntax) -> Vec<(SegmentKind, &'a str)> {
    let mut out = Vec::new();
    let mut code_start = 0;
    let mut i = 0;

    while i < text.len() {
        let rest = &text[i..];

        let matched = if let Some(delim) = syntax.strings.iter().find(|d| rest.starts_with(d.quote)) {
            Some((SegmentKind::Literal, literal_len(rest, delim)))
        } else if let Some((open, close)) = syntax.block.iter().find(|(open, _)| rest.starts_with(open)) {
            let len = rest[open.len()..]
                .find(close)
                .map_or(rest.len(), |pos| open.len() + pos + close.len());
            Some((SegmentKind::Comment, len))
        } else if syntax.line.iter().any(|marker| rest.starts_with(marker)) {
            Some((SegmentKind::Comment, rest.find('\n').unwrap_or(rest.len())))
        } else {
            None
        };

        match matched {
            Some((kind, len)) => {
                if code_start < i {
                    out.push((SegmentKind::Code, &text[code_start..i]));
                }
                out.push((kind, &text[i..i + len]));
                i += len;
                code_start = i;
            }
            None => i += rest.chars().next().map_or(1, char::len_utf8),
        }
    }

    if code_start < text.len() {
        out.push((SegmentKind::Code, &text[code_start..]));
    }
    out
}

/// Byte length of the literal starting at `rest`, quotes included.
///
/// Unterminated single-line literals end before the newline; unterminated
/// multi-line literals run to the end of the text.
fn literal_len(rest: &str, delim: &StringDelimiter) -> usize {
    let open = delim.quote.len();
    let body = &rest[open..];
    let mut escaped = false;

    for (idx, ch) in body.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if delim.escapes && ch == '\\' {
            escaped = true;
            continue;
        }
        if ch == '\n' && !delim.multiline {
            return open + idx;
        }
        if body[idx..].starts_with(delim.quote) {
            return open + idx + delim.quote.len();
        }
    }

    rest.len()
}

/// Splits minified code after each `;` outside literals and comments.
fn reflow_statements(text: &str, language: Language) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 16);
    for (kind, segment) in segments(text, language.syntax()) {
        if kind == SegmentKind::Code {
            out.push_str(&segment.replace(';', ";\n"));
        } else {
            out.push_str(segment);
        }
    }
    out
}

/// Configuration for content cleaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanConfig {
    /// Remove line and block comments
    pub strip_comments: bool,

    /// Remove lines that contain only whitespace
    pub strip_blank_lines: bool,

    /// Split minified files into one statement per line
    pub reflow_minified: bool,
}

impl Default for CleanConfig {
    fn default() -> Self {
        Self {
            strip_comments: true,
            strip_blank_lines: true,
            reflow_minified: true,
        }
    }
}

impl CleanConfig {
    /// A configuration that passes raw text through unchanged.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            strip_comments: false,
            strip_blank_lines: false,
            reflow_minified: false,
        }
    }

    /// Returns true if cleaning leaves text untouched.
    #[must_use]
    pub const fn is_disabled(&self) -> bool {
        !self.strip_comments && !self.strip_blank_lines
    }
}

/// Cleans raw source text according to a [`CleanConfig`].
#[derive(Debug, Clone)]
pub struct ContentCleaner {
    config: CleanConfig,
}

impl ContentCleaner {
    /// Creates a new cleaner.
    #[must_use]
    pub const fn new(config: CleanConfig) -> Self {
        Self { config }
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn config(&self) -> &CleanConfig {
        &self.config
    }

    /// Cleans `text` written in `language`.
    ///
    /// Cleaning is idempotent: `clean(clean(x)) == clean(x)`.
    #[must_use]
    pub fn clean(&self, text: &str, language: Language) -> String {
        if self.config.is_disabled() {
            return text.to_string();
        }

        // Escapes and line comments only understand `\n`.
        let text = normalize_line_endings(text);
        let stripped = if self.config.strip_comments {
            language.strip_comments(&text)
        } else {
            text.into_owned()
        };

        let reflowed;
        let mut lines: Vec<&str> = stripped.lines().map(str::trim_end).collect();

        if self.config.reflow_minified && is_minified(&lines) {
            reflowed = reflow_statements(&lines.join("\n"), language);
            lines = reflowed
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .collect();
        }

        if self.config.strip_blank_lines {
            lines.retain(|line| !line.is_empty());
        }

        while lines.last().is_some_and(|line| line.is_empty()) {
            lines.pop();
        }

        lines.join("\n")
    }
}

fn normalize_line_endings(text: &str) -> Cow<'_, str> {
    if text.contains('\r') {
        Cow::Owned(text.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(text)
    }
}

/// Blank lines do not count, so the verdict is the same before and after
/// blank-line removal.
fn is_minified(lines: &[&str]) -> bool {
    let mut count = 0;
    let mut chars = 0;
    for line in lines.iter().filter(|line| !line.trim().is_empty()) {
        count += 1;
        chars += line.chars().count();
    }
    count <= MINIFIED_MAX_LINES && chars > MINIFIED_MIN_CHARS
}
