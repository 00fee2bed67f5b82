//! Pure link classification for directory listings.
//!
//! Rules are evaluated in order and the first match wins:
//!
//! | # | Condition                                              | Result    |
//! |---|--------------------------------------------------------|-----------|
//! | 1 | empty, fragment-only, query-only, non-http scheme      | ignore    |
//! | 2 | outside the root, ancestor of the page, carries query  | ignore    |
//! | 3 | path ends with `/`                                     | directory |
//! | 4 | recognized suffix or compound file pattern             | file      |
//! | 5 | bare name without any `.` (incl. one-letter shards)    | directory |
//! | 6 | anything else                                          | ignore    |

use regex::Regex;

use crate::error::{AppError, Result};
use crate::models::{LinkKind, Location, SourceConfig};

/// Decides whether an href names a file, a directory, or nothing of interest.
#[derive(Debug, Clone)]
pub struct LinkClassifier {
    root: Location,
    suffixes: Vec<String>,
    patterns: Vec<Regex>,
}

impl LinkClassifier {
    pub fn new(root: Location, suffixes: &[String], patterns: &[String]) -> Result<Self> {
        let suffixes = suffixes
            .iter()
            .map(|s| s.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| AppError::config(format!("file pattern {p:?}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            root: root.into_directory(),
            suffixes,
            patterns,
        })
    }

    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        let root = Location::parse(&config.root_url)?;
        Self::new(root, &config.file_suffixes, &config.file_patterns)
    }

    pub fn root(&self) -> &Location {
        &self.root
    }

    /// Classify `href` as found on the listing at `page`.
    pub fn classify(&self, href: &str, page: &Location) -> LinkKind {
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') || href.starts_with('?') {
            return LinkKind::Ignore;
        }
        let lower = href.to_ascii_lowercase();
        if lower.starts_with("mailto:") || lower.starts_with("javascript:") {
            return LinkKind::Ignore;
        }

        let Ok(target) = page.join(href) else {
            return LinkKind::Ignore;
        };
        if !matches!(target.url().scheme(), "http" | "https") || target.url().query().is_some() {
            return LinkKind::Ignore;
        }
        if !self.root.is_ancestor_of(&target) || target == *page || target.is_ancestor_of(page) {
            return LinkKind::Ignore;
        }

        if target.path().ends_with('/') {
            return LinkKind::Directory(target);
        }

        let Some(name) = target.file_name().map(str::to_string) else {
            return LinkKind::Ignore;
        };
        if self.is_data_file(&name) {
            return LinkKind::File(target);
        }
        if !name.contains('.') {
            return LinkKind::Directory(target.into_directory());
        }
        LinkKind::Ignore
    }

    fn is_data_file(&self, name: &str) -> bool {
        let lower = name.to_ascii_lowercase();
        let suffix_match = lower.rsplit_once('.').is_some_and(|(stem, ext)| {
            !stem.is_empty() && self.suffixes.iter().any(|s| s == ext)
        });
        suffix_match || self.patterns.iter().any(|p| p.is_match(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT: &str = "https://download.bls.gov/pub/time.series/pr/";

    fn classifier(suffixes: &[&str]) -> LinkClassifier {
        let suffixes: Vec<String> = suffixes.iter().map(|s| s.to_string()).collect();
        let patterns = vec![r"^[A-Za-z0-9_-]+\.data\.\d+\.[A-Za-z0-9_]+$".to_string()];
        LinkClassifier::new(Location::parse(ROOT).unwrap(), &suffixes, &patterns).unwrap()
    }

    fn kind(result: &LinkKind) -> &'static str {
        match result {
            LinkKind::Ignore => "ignore",
            LinkKind::Directory(_) => "directory",
            LinkKind::File(_) => "file",
        }
    }

    #[test]
    fn test_listing_anchor_table() {
        let classifier = classifier(&["data", "series"]);
        let page = Location::parse(ROOT).unwrap();

        let hrefs = ["../", "a/", "pr.data.0.Current", "pr.series", "notes.pdf"];
        let kinds: Vec<_> = hrefs
            .iter()
            .map(|href| kind(&classifier.classify(href, &page)))
            .collect();

        assert_eq!(kinds, ["ignore", "directory", "file", "file", "ignore"]);
    }

    #[test]
    fn test_ignores_noise() {
        let classifier = classifier(&["txt"]);
        let page = Location::parse(ROOT).unwrap();

        for href in [
            "",
            "#top",
            "?C=N;O=D",
            "mailto:data@bls.gov",
            "/pub/",
            "/pub/time.series/pr/",
            "./",
            "https://www.bls.gov/pr/notes.txt",
            "ftp://download.bls.gov/pub/time.series/pr/x.txt",
        ] {
            assert_eq!(classifier.classify(href, &page), LinkKind::Ignore, "{href}");
        }
    }

    #[test]
    fn test_absolute_links_inside_root() {
        let classifier = classifier(&["txt"]);
        let page = Location::parse(ROOT).unwrap();

        let result = classifier.classify("/pub/time.series/pr/pr.txt", &page);
        assert_eq!(
            result,
            LinkKind::File(Location::parse(&format!("{ROOT}pr.txt")).unwrap())
        );
    }

    #[test]
    fn test_bare_names_become_directories() {
        let classifier = classifier(&["txt"]);
        let page = Location::parse(ROOT).unwrap();

        assert_eq!(
            classifier.classify("Current", &page),
            LinkKind::Directory(Location::parse(&format!("{ROOT}Current/")).unwrap())
        );
        assert_eq!(
            classifier.classify("b", &page),
            LinkKind::Directory(Location::parse(&format!("{ROOT}b/")).unwrap())
        );
    }

    #[test]
    fn test_suffix_is_case_insensitive() {
        let classifier = classifier(&["CSV"]);
        let page = Location::parse(ROOT).unwrap();
        assert!(matches!(classifier.classify("Table.Csv", &page), LinkKind::File(_)));
        assert_eq!(classifier.classify(".csv", &page), LinkKind::Ignore);
    }

    #[test]
    fn test_parent_of_nested_page_is_ignored() {
        let classifier = classifier(&["txt"]);
        let page = Location::parse(&format!("{ROOT}a/b/")).unwrap();
        assert_eq!(classifier.classify("../", &page), LinkKind::Ignore);
        assert_eq!(classifier.classify("../../", &page), LinkKind::Ignore);
        assert!(matches!(classifier.classify("../c/", &page), LinkKind::Directory(_)));
    }
}
