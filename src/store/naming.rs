//! Filename sanitising and collision-free name generation.

use std::io;
use std::path::{Path, PathBuf};

/// Maximum length, in characters, of a directory name derived from a title.
pub const MAX_NODE_DIRNAME_LEN: usize = 40;

/// Options for generating a name that does not collide with existing ones.
#[derive(Debug, Clone)]
pub struct NewFilename<'a> {
    /// Base name, before any number or extension.
    pub base: &'a str,
    /// Extension appended after the number, including its dot.
    pub ext: &'a str,
    /// Separator between base name and number.
    pub sep: &'a str,
    /// First number tried once the bare name is taken.
    pub number: u32,
    /// Always append a number, even if the bare name is free.
    pub use_number: bool,
    /// Sanitise `base` with [`valid_filename`] first.
    pub ensure_valid: bool,
}

impl<'a> NewFilename<'a> {
    pub fn new(base: &'a str) -> Self {
        Self {
            base,
            ext: "",
            sep: " ",
            number: 2,
            use_number: false,
            ensure_valid: true,
        }
    }

    pub fn ext(mut self, ext: &'a str) -> Self {
        self.ext = ext;
        self
    }

    pub fn sep(mut self, sep: &'a str) -> Self {
        self.sep = sep;
        self
    }

    pub fn number(mut self, number: u32) -> Self {
        self.number = number;
        self
    }

    pub fn use_number(mut self, use_number: bool) -> Self {
        self.use_number = use_number;
        self
    }

    pub fn ensure_valid(mut self, ensure_valid: bool) -> Self {
        self.ensure_valid = ensure_valid;
        self
    }
}

/// Result of a unique-name search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueName {
    pub name: String,
    /// The number appended, if any.
    pub number: Option<u32>,
}

/// Turn a free-form title into a name that is safe as a directory entry.
///
/// Slashes become `-`, shell-hostile characters are dropped, surrounding
/// whitespace and dots are trimmed, and the quoting prefix `__` is never
/// left at the front.
pub fn valid_filename(title: &str, default: &str) -> String {
    let mut name: String = title
        .chars()
        .filter_map(|c| match c {
            '/' | '\\' => Some('-'),
            '*' | '"' | '\'' | '?' | '<' | '>' | '|' | ':' => None,
            '\t' => Some(' '),
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect();

    name = name.chars().take(MAX_NODE_DIRNAME_LEN).collect();
    // Trimming can expose another prefix and stripping a prefix can expose
    // more dots or spaces; repeat until neither applies.
    loop {
        let trimmed = name.trim_matches(|c| c == ' ' || c == '.');
        let stripped = trimmed.strip_prefix("__").unwrap_or(trimmed);
        if stripped.len() == name.len() {
            break;
        }
        name = stripped.to_string();
    }

    if name.is_empty() {
        default.to_string()
    } else {
        name
    }
}

/// Find the first candidate name for which `exists` is false.
///
/// Candidates are `base + ext`, then `base + sep + n + ext` for increasing
/// `n` starting at `opts.number`.
pub fn unique_name<F>(opts: &NewFilename<'_>, exists: F) -> io::Result<UniqueName>
where
    F: Fn(&str) -> io::Result<bool>,
{
    let base = if opts.ensure_valid {
        valid_filename(opts.base, "untitled")
    } else {
        opts.base.to_string()
    };

    if !opts.use_number {
        let candidate = format!("{}{}", base, opts.ext);
        if !exists(&candidate)? {
            return Ok(UniqueName {
                name: candidate,
                number: None,
            });
        }
    }

    let mut n = opts.number;
    loop {
        let candidate = format!("{}{}{}{}", base, opts.sep, n, opts.ext);
        if !exists(&candidate)? {
            return Ok(UniqueName {
                name: candidate,
                number: Some(n),
            });
        }
        n = n.checked_add(1).ok_or_else(|| {
            io::Error::new(io::ErrorKind::Other, "exhausted unique filename numbers")
        })?;
    }
}

/// Unique path inside `dir`, judged by what is on disk (dangling links count).
pub fn unique_path(dir: &Path, opts: &NewFilename<'_>) -> io::Result<PathBuf> {
    let found = unique_name(opts, |candidate| {
        Ok(dir.join(candidate).symlink_metadata().is_ok())
    })?;
    Ok(dir.join(found.name))
}
