// src/utils/url.rs

//! Destination key helpers.

use crate::models::Location;

/// Map a source location beneath `root` to its object-store key.
///
/// The key is `{prefix}/{path relative to root}`, kept percent-encoded as it
/// appears in the URL, so distinct locations never share a key.
///
/// # Examples
/// ```
/// use tsmirror::models::Location;
/// use tsmirror::utils::url::destination_key;
///
/// let root = Location::parse("https://download.bls.gov/pub/time.series/pr/").unwrap();
/// let file = root.join("pr.data.0.Current").unwrap();
/// assert_eq!(
///     destination_key("bls-data", &root, &file).as_deref(),
///     Some("bls-data/pr.data.0.Current")
/// );
/// ```
pub fn destination_key(prefix: &str, root: &Location, location: &Location) -> Option<String> {
    let relative = location.relative_to(root)?;
    let prefix = prefix.trim_matches('/');
    Some(join_key(prefix, relative))
}

/// Join two key fragments with exactly one slash.
pub fn join_key(prefix: &str, rest: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let rest = rest.trim_start_matches('/');
    match (prefix.is_empty(), rest.is_empty()) {
        (true, _) => rest.to_string(),
        (_, true) => prefix.to_string(),
        _ => format!("{prefix}/{rest}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_key() {
        let root = Location::parse("https://example.com/pub/time.series/").unwrap();
        let file = root.join("pr/a/pr.series").unwrap();
        assert_eq!(
            destination_key("/bls-data/", &root, &file).as_deref(),
            Some("bls-data/pr/a/pr.series")
        );
    }

    #[test]
    fn test_outside_root_has_no_key() {
        let root = Location::parse("https://example.com/pub/time.series/").unwrap();
        let other = Location::parse("https://example.com/pub/other.txt").unwrap();
        assert_eq!(destination_key("bls-data", &root, &other), None);
    }

    #[test]
    fn test_join_key() {
        assert_eq!(join_key("a/", "/b"), "a/b");
        assert_eq!(join_key("", "b"), "b");
        assert_eq!(join_key("a", ""), "a");
    }
}
