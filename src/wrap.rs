//! Physical-line wrapping.
//!
//! Both the line estimator and the renderers go through [`wrap_line`], so
//! the estimate counts exactly the lines that get written.

use std::borrow::Cow;

/// How logical lines are broken into physical lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapOptions {
    /// Maximum characters per physical line; 0 disables wrapping
    pub width: usize,
    /// Prefix of continuation lines
    pub indent: String,
    /// Spaces per tab stop
    pub tab_width: usize,
}

impl Default for WrapOptions {
    fn default() -> Self {
        Self {
            width: 85,
            indent: "  ".to_string(),
            tab_width: 4,
        }
    }
}

impl WrapOptions {
    /// Options that never wrap and only expand tabs.
    #[must_use]
    pub fn unwrapped() -> Self {
        Self {
            width: 0,
            ..Self::default()
        }
    }
}

/// Expands tabs to the next tab stop.
#[must_use]
pub fn expand_tabs(line: &str, tab_width: usize) -> Cow<'_, str> {
    if !line.contains('\t') || tab_width == 0 {
        return Cow::Borrowed(line);
    }

    let mut out = String::with_capacity(line.len() + tab_width * 2);
    let mut column = 0;
    for ch in line.chars() {
        if ch == '\t' {
            let pad = tab_width - column % tab_width;
            out.extend(std::iter::repeat_n(' ', pad));
            column += pad;
        } else {
            out.push(ch);
            column += 1;
        }
    }
    Cow::Owned(out)
}

/// Splits text into alternating runs of whitespace and non-whitespace.
fn runs(line: &str) -> impl Iterator<Item = &str> {
    let mut rest = line;
    std::iter::from_fn(move || {
        let first = rest.chars().next()?;
        let space = first.is_whitespace();
        let end = rest
            .char_indices()
            .find(|&(_, c)| c.is_whitespace() != space)
            .map_or(rest.len(), |(idx, _)| idx);
        let (run, tail) = rest.split_at(end);
        rest = tail;
        Some(run)
    })
}

struct LineBuilder<'a> {
    out: Vec<String>,
    current: String,
    len: usize,
    has_content: bool,
    indent: &'a str,
    indent_len: usize,
}

impl<'a> LineBuilder<'a> {
    fn new(indent: &'a str) -> Self {
        Self {
            out: Vec::new(),
            current: String::new(),
            len: 0,
            has_content: false,
            indent,
            indent_len: indent.chars().count(),
        }
    }

    fn push(&mut self, text: &str, len: usize) {
        self.current.push_str(text);
        self.len += len;
        self.has_content |= !text.trim().is_empty();
    }

    fn flush(&mut self) {
        let line = std::mem::take(&mut self.current);
        self.out.push(line.trim_end().to_string());
        self.current.push_str(self.indent);
        self.len = self.indent_len;
        self.has_content = false;
    }

    fn finish(mut self) -> Vec<String> {
        if self.has_content || self.out.is_empty() {
            self.out.push(self.current.trim_end().to_string());
        }
        self.out
    }
}

/// Wraps one logical line into physical lines.
///
/// Words longer than the width are broken. Whitespace at a break is dropped,
/// and continuation lines start with the configured indent. An empty line
/// yields one empty physical line.
#[must_use]
pub fn wrap_line(line: &str, options: &WrapOptions) -> Vec<String> {
    let line = expand_tabs(line, options.tab_width);
    let width = options.width;

    if width == 0 || line.chars().count() <= width {
        return vec![line.into_owned()];
    }

    let indent = if options.indent.chars().count() < width {
        options.indent.as_str()
    } else {
        ""
    };
    let mut builder = LineBuilder::new(indent);

    for run in runs(&line) {
        let run_len = run.chars().count();

        if builder.len + run_len <= width {
            builder.push(run, run_len);
            continue;
        }

        if run.starts_with(char::is_whitespace) {
            builder.flush();
            continue;
        }

        if builder.has_content {
            builder.flush();
        }

        let mut rest = run;
        while !rest.is_empty() {
            let available = width - builder.len;
            if available == 0 {
                builder.flush();
                continue;
            }
            let split = rest
                .char_indices()
                .nth(available)
                .map_or(rest.len(), |(idx, _)| idx);
            let (head, tail) = rest.split_at(split);
            builder.push(head, head.chars().count());
            rest = tail;
            if !rest.is_empty() {
                builder.flush();
            }
        }
    }

    builder.finish()
}

/// Number of physical lines `line` occupies.
#[must_use]
pub fn physical_lines(line: &str, options: &WrapOptions) -> usize {
    if options.width == 0 {
        return 1;
    }
    let expanded = expand_tabs(line, options.tab_width);
    if expanded.chars().count() <= options.width {
        return 1;
    }
    wrap_line(&expanded, options).len()
}
