//! Crawl-side data model: locations, directory tasks and discovered files.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Result;

/// Absolute URL of a remote directory or file, fragment stripped.
///
/// Two locations are the same node iff their URL strings are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Location(Url);

impl Location {
    pub fn parse(input: &str) -> Result<Self> {
        Ok(Self::from_url(Url::parse(input)?))
    }

    pub fn from_url(mut url: Url) -> Self {
        url.set_fragment(None);
        Self(url)
    }

    /// Resolve an href found on this location's listing page.
    pub fn join(&self, href: &str) -> Result<Self> {
        Ok(Self::from_url(self.0.join(href)?))
    }

    /// Same location with a trailing slash, so relative links resolve inside it.
    pub fn into_directory(mut self) -> Self {
        if !self.0.path().ends_with('/') {
            let path = format!("{}/", self.0.path());
            self.0.set_path(&path);
        }
        self
    }

    pub fn url(&self) -> &Url {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn path(&self) -> &str {
        self.0.path()
    }

    /// Last non-empty path segment.
    pub fn file_name(&self) -> Option<&str> {
        self.0
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
    }

    /// True when `self` is a directory that contains `other` at any depth.
    pub fn is_ancestor_of(&self, other: &Location) -> bool {
        same_origin(&self.0, &other.0)
            && self.path().ends_with('/')
            && other.path().len() > self.path().len()
            && other.path().starts_with(self.path())
    }

    /// Path of `self` relative to the directory `base`, if beneath it.
    pub fn relative_to(&self, base: &Location) -> Option<&str> {
        if !same_origin(&self.0, &base.0) {
            return None;
        }
        self.path()
            .strip_prefix(base.path())
            .filter(|rest| !rest.is_empty())
    }
}

fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.host_str() == b.host_str()
        && a.port_or_known_default() == b.port_or_known_default()
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directory waiting to be listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryTask {
    pub location: Location,
    /// Root is depth 0
    pub depth: u32,
}

impl DirectoryTask {
    pub fn root(location: Location) -> Self {
        Self { location, depth: 0 }
    }

    pub fn child(&self, location: Location) -> Self {
        Self {
            location,
            depth: self.depth + 1,
        }
    }
}

/// A data file discovered during the crawl.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub source: Location,
    pub destination_key: String,
    /// Depth of the directory whose listing named this file
    pub depth: u32,
}

/// Classification of one href on a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkKind {
    Ignore,
    Directory(Location),
    File(Location),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragment_is_stripped() {
        let a = Location::parse("https://example.com/pub/pr/#top").unwrap();
        let b = Location::parse("https://example.com/pub/pr/").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_ancestry() {
        let root = Location::parse("https://example.com/pub/pr/").unwrap();
        let child = root.join("a/b.txt").unwrap();
        let parent = root.join("../").unwrap();

        assert!(root.is_ancestor_of(&child));
        assert!(parent.is_ancestor_of(&root));
        assert!(!root.is_ancestor_of(&root));
        assert_eq!(child.relative_to(&root), Some("a/b.txt"));
        assert_eq!(parent.relative_to(&root), None);
        assert_eq!(child.file_name(), Some("b.txt"));
    }
}
