//! Domain blacklist.
//!
//! Runtime-loaded, exact-match set of lowercase domain names. Populated once
//! at startup and never mutated afterward, so lookups need no locking.

use std::fs;
use std::io;
use std::path::Path;

use rustc_hash::FxHashSet;

/// A set of blacklisted domains, matched exactly (not by suffix) against a
/// query's fully-qualified name.
pub struct Blacklist {
    domains: FxHashSet<String>,
}

impl Blacklist {
    /// An empty blacklist — every query is allowed through.
    pub fn empty() -> Self {
        Self {
            domains: FxHashSet::default(),
        }
    }

    /// Load a newline-delimited list of domains. Blank lines and `#`
    /// comments are skipped; a trailing dot is stripped so `example.com.`
    /// and `example.com` are the same entry.
    pub fn load_file(path: &Path) -> io::Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(Self::from_lines(contents.lines()))
    }

    fn from_lines<'a>(lines: impl Iterator<Item = &'a str>) -> Self {
        let domains = lines
            .filter_map(|line| {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    return None;
                }
                Some(normalize(line))
            })
            .collect();
        Self { domains }
    }

    /// Exact-match, case-insensitive (the query name arrives already
    /// lowercased from [`crate::dns::parse_qname`]; this normalizes the
    /// blacklist side too, so a caller passing a mixed-case name still
    /// works).
    #[inline]
    pub fn is_blacklisted(&self, domain: &str) -> bool {
        self.domains.contains(domain.trim_end_matches('.'))
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}

fn normalize(domain: &str) -> String {
    domain.trim_end_matches('.').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(entries: &[&str]) -> Blacklist {
        Blacklist::from_lines(entries.iter().copied())
    }

    #[test]
    fn exact_match_only_no_subdomain_match() {
        let bl = list(&["example.com"]);
        assert!(bl.is_blacklisted("example.com"));
        assert!(!bl.is_blacklisted("www.example.com"));
    }

    #[test]
    fn case_insensitive_and_trailing_dot_tolerant() {
        let bl = list(&["example.com"]);
        assert!(bl.is_blacklisted("Example.COM"));
        assert!(bl.is_blacklisted("EXAMPLE.com"));
        assert!(bl.is_blacklisted("example.com."));
    }

    #[test]
    fn skips_blank_lines_and_comments() {
        let bl = list(&["", "# comment", "example.com", "  "]);
        assert_eq!(bl.len(), 1);
    }

    #[test]
    fn empty_blacklist_blocks_nothing() {
        let bl = Blacklist::empty();
        assert!(!bl.is_blacklisted("example.com"));
    }
}
