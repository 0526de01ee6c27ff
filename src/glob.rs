//! Ant-style path patterns.
//!
//! Patterns are matched against `/`-separated paths relative to a package
//! root:
//!
//! - `**/` matches zero or more whole directories
//! - `*` matches within a single path segment
//! - `?` matches one character other than `/`
//! - a trailing `/` is shorthand for `/**`

use crate::error::BuildError;
use regex::Regex;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct GlobSet {
    compiled: Vec<Regex>,
}

impl GlobSet {
    pub fn new<I, S>(patterns: I) -> Result<Self, BuildError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut compiled = Vec::new();
        for pattern in patterns {
            let pattern = pattern.as_ref().trim();
            if pattern.is_empty() {
                continue;
            }
            let re = Regex::new(&translate(pattern)).map_err(|e| {
                BuildError::config(format!("invalid path pattern '{}': {}", pattern, e))
            })?;
            compiled.push(re);
        }
        Ok(Self { compiled })
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }

    pub fn is_match(&self, relative: &str) -> bool {
        self.compiled.iter().any(|re| re.is_match(relative))
    }
}

/// Render `path` with `/` separators regardless of platform.
pub fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn translate(pattern: &str) -> String {
    let mut normalized = pattern.replace('\\', "/");
    while let Some(rest) = normalized.strip_prefix("./") {
        normalized = rest.to_string();
    }
    if normalized.ends_with('/') {
        normalized.push_str("**");
    }

    let chars: Vec<char> = normalized.chars().collect();
    let mut re = String::with_capacity(chars.len() * 2 + 2);
    re.push('^');

    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                let segment_start = i == 0 || chars[i - 1] == '/';
                if segment_start && chars.get(i + 2) == Some(&'/') {
                    re.push_str("(?:[^/]*/)*");
                    i += 3;
                } else {
                    re.push_str(".*");
                    i += 2;
                }
            }
            '*' => {
                re.push_str("[^/]*");
                i += 1;
            }
            '?' => {
                re.push_str("[^/]");
                i += 1;
            }
            c => {
                let mut buf = [0u8; 4];
                re.push_str(&regex::escape(c.encode_utf8(&mut buf)));
                i += 1;
            }
        }
    }

    re.push('$');
    re
}
