use std::cmp::Ordering;
use std::collections::HashMap;

use anyhow::anyhow;
use once_cell::sync::OnceCell;
use regex::Regex;

use crate::uri::inclusion::{self, PatternInclusion};
use crate::uri::segment::Segment;
use crate::uri::UriError;

/// A compiled URI pattern: the anchored regex built from a parameterized
/// builder, the ordered capture labels, and (for path patterns) the
/// segment list driving the inclusion oracle.
#[derive(Debug, Clone)]
pub struct UriPattern {
    raw: String,
    regex_source: String,
    labels: Vec<Option<String>>,
    segments: Option<Vec<Segment>>,
    regex: OnceCell<Regex>,
}

impl UriPattern {
    pub(crate) fn new(
        raw: String,
        regex_source: String,
        labels: Vec<Option<String>>,
        segments: Option<Vec<Segment>>,
    ) -> Result<Self, UriError> {
        Ok(Self {
            raw,
            regex_source,
            labels,
            segments,
            regex: OnceCell::new(),
        })
    }

    /// Return the raw value the pattern was built from.
    pub fn raw_value(&self) -> &str {
        &self.raw
    }

    /// Return the regex source of the pattern.
    pub fn regex_source(&self) -> &str {
        &self.regex_source
    }

    /// Return the capture labels, one per group, None for unnamed
    /// parameters.
    pub fn group_names(&self) -> &[Option<String>] {
        &self.labels
    }

    fn regex(&self) -> Result<&Regex, UriError> {
        // compilation is idempotent; racing threads converge on one value
        self.regex.get_or_try_init(|| {
            Regex::new(&self.regex_source)
                .map_err(|err| UriError::InvalidUri(anyhow!("Invalid pattern regex: {}", err)))
        })
    }

    /// Test an input URI against the pattern.
    pub fn is_match(&self, uri: &str) -> Result<bool, UriError> {
        Ok(self.regex()?.is_match(uri))
    }

    /// Apply the pattern to an input URI and return the matcher.
    pub fn matcher(&self, uri: &str) -> Result<UriMatcher, UriError> {
        let regex = self.regex()?;
        let mut values: Vec<Option<String>> = vec![None; self.labels.len()];
        let matched = match regex.captures(uri) {
            Some(captures) => {
                for (i, value) in values.iter_mut().enumerate() {
                    *value = captures.get(i + 1).map(|m| m.as_str().to_string());
                }
                true
            }
            None => false,
        };
        Ok(UriMatcher {
            matched,
            pattern_raw: self.raw.clone(),
            labels: self.labels.clone(),
            values,
        })
    }

    /// Decide whether every URI matched by `other` is matched by `self`.
    ///
    /// Defined only when both patterns were built as path patterns and
    /// retain their segment lists; otherwise the verdict is
    /// [`PatternInclusion::Indeterminate`]. An indeterminate verdict must
    /// never be used as a disjointness proof.
    pub fn includes(&self, other: &UriPattern) -> PatternInclusion {
        match (&self.segments, &other.segments) {
            (Some(left), Some(right)) => inclusion::includes(left, right),
            _ => PatternInclusion::Indeterminate,
        }
    }
}

/// The result of applying a [`UriPattern`] to an input URI.
///
/// Matchers order "matching first, then by raw pattern value", the order
/// route candidates are tried in.
#[derive(Debug, Clone)]
pub struct UriMatcher {
    matched: bool,
    pattern_raw: String,
    labels: Vec<Option<String>>,
    values: Vec<Option<String>>,
}

impl UriMatcher {
    /// Whether the input matched the pattern.
    pub fn matches(&self) -> bool {
        self.matched
    }

    /// Return the raw value of the originating pattern.
    pub fn pattern_raw_value(&self) -> &str {
        &self.pattern_raw
    }

    /// Return the capture of a named parameter.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .zip(&self.values)
            .find(|(label, _)| label.as_deref() == Some(name))
            .and_then(|(_, value)| value.as_deref())
    }

    /// Return all named parameter captures.
    pub fn parameters(&self) -> HashMap<&str, &str> {
        let mut map = HashMap::new();
        for (label, value) in self.labels.iter().zip(&self.values) {
            if let (Some(label), Some(value)) = (label.as_deref(), value.as_deref()) {
                map.insert(label, value);
            }
        }
        map
    }

    /// Return all captures in group order, including unnamed parameters.
    pub fn captures(&self) -> &[Option<String>] {
        &self.values
    }
}

impl PartialEq for UriMatcher {
    fn eq(&self, other: &Self) -> bool {
        self.matched == other.matched && self.pattern_raw == other.pattern_raw
    }
}

impl Eq for UriMatcher {}

impl PartialOrd for UriMatcher {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for UriMatcher {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.matched, other.matched) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => self.pattern_raw.cmp(&other.pattern_raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::uri::{UriBuilder, UriOptions};

    fn pattern(path: &str) -> crate::uri::UriPattern {
        let mut builder = UriBuilder::new(UriOptions::new().path_pattern());
        builder.path(path, false).unwrap();
        builder.build_pattern(false).unwrap()
    }

    #[test]
    fn test_path_pattern_matching() -> anyhow::Result<()> {
        let pattern = pattern("/static/**/*.png");
        assert!(pattern.is_match("/static/path/to/image.png")?);
        assert!(pattern.is_match("/static/image.png")?);
        assert!(!pattern.is_match("/static/image.jpg")?);
        assert!(!pattern.is_match("/other/image.png")?);
        Ok(())
    }

    #[test]
    fn test_named_parameter_captures() -> anyhow::Result<()> {
        let mut builder = UriBuilder::new(UriOptions::new().parameterized());
        builder
            .scheme("{scheme}")?
            .host("localhost")?
            .path("/static/{custom_path}", false)?;
        let pattern = builder.build_pattern(false)?;

        let matcher = pattern.matcher("https://localhost/static/resource1")?;
        assert!(matcher.matches());
        assert_eq!(matcher.parameter("scheme"), Some("https"));
        assert_eq!(matcher.parameter("custom_path"), Some("resource1"));
        Ok(())
    }

    #[test]
    fn test_custom_pattern_bounds_matching() -> anyhow::Result<()> {
        let pattern = pattern("/items/{id:[0-9]+}");
        assert!(pattern.matcher("/items/42")?.matches());
        assert!(!pattern.matcher("/items/none")?.matches());
        Ok(())
    }

    #[test]
    fn test_match_trailing_slash() -> anyhow::Result<()> {
        let mut builder = UriBuilder::new(UriOptions::new().path_pattern());
        builder.path("/a/b", false)?;
        let pattern = builder.build_pattern(true)?;
        assert!(pattern.is_match("/a/b")?);
        assert!(pattern.is_match("/a/b/")?);
        Ok(())
    }

    #[test]
    fn test_question_mark_operator() -> anyhow::Result<()> {
        let pattern = pattern("/a/b?d");
        assert!(pattern.is_match("/a/bcd")?);
        assert!(!pattern.is_match("/a/bccd")?);
        assert!(!pattern.is_match("/a/b/d")?);
        Ok(())
    }

    #[test]
    fn test_matcher_ordering() -> anyhow::Result<()> {
        // matching first, then by raw pattern value
        let star = pattern("/a/*").matcher("/a/b")?;
        let exact = pattern("/a/b").matcher("/a/b")?;
        let miss = pattern("/x/*").matcher("/a/b")?;

        let mut matchers = vec![miss.clone(), exact.clone(), star.clone()];
        matchers.sort();
        assert_eq!(matchers, vec![star, exact, miss]);
        Ok(())
    }

    #[test]
    fn test_unnamed_captures_keep_position() -> anyhow::Result<()> {
        let pattern = pattern("/static/**/{name}.png");
        let matcher = pattern.matcher("/static/a/b/img.png")?;
        assert!(matcher.matches());
        assert_eq!(pattern.group_names().len(), 2);
        assert_eq!(pattern.group_names()[0], None);
        assert_eq!(matcher.parameter("name"), Some("img"));
        Ok(())
    }
}
