use crate::uri::component::{Component, ComponentKind, ValueSupply};
use crate::uri::scanner::{self, ComponentPart, ParamPattern};
use crate::uri::{UriError, UriOptions};

/// The shape of a path segment, driving normalization, pattern compilation
/// and the inclusion oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SegmentKind {
    /// No parameters at all.
    Static,
    /// Only wildcard parameters and no static text (e.g. `*` or `{x}`).
    Wildcard,
    /// Any other parameterized form.
    Custom,
    /// A standalone `**`: matches zero or more whole segments.
    Directories,
}

/// One piece of a segment as seen by the inclusion oracle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum InclusionPart {
    Static(String),
    /// `[^/]` - exactly one character.
    Any,
    /// `[^/]*` - zero or more characters.
    Wild,
    Custom(String),
}

/// A path segment component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Segment {
    component: Component,
    kind: SegmentKind,
}

impl Segment {
    /// Scan one segment out of `raw`, stopping before the first `/`.
    /// Returns the segment and the number of bytes consumed.
    pub(crate) fn scan(raw: &str, options: UriOptions) -> Result<(Self, usize), UriError> {
        let result =
            scanner::scan_component(raw, ComponentKind::Segment, options, Some(&|b| b == b'/'))?;
        let consumed = result.consumed;
        let segment = Self::from_scan(&raw[..consumed], result.parts, result.directories);
        Ok((segment, consumed))
    }

    /// Scan a complete raw value as a single segment.
    pub(crate) fn new(raw: &str, options: UriOptions) -> Result<Self, UriError> {
        let result = scanner::scan_component(raw, ComponentKind::Segment, options, None)?;
        Ok(Self::from_scan(raw, result.parts, result.directories))
    }

    fn from_scan(raw: &str, parts: Vec<ComponentPart>, directories: bool) -> Self {
        let kind = if directories {
            SegmentKind::Directories
        } else if !parts
            .iter()
            .any(|p| matches!(p, ComponentPart::Parameter(_)))
        {
            SegmentKind::Static
        } else if parts.iter().all(|p| match p {
            ComponentPart::Parameter(param) => param.pattern() == &ParamPattern::Wildcard,
            ComponentPart::Static(_) => false,
        }) {
            SegmentKind::Wildcard
        } else {
            SegmentKind::Custom
        };
        Self {
            component: Component::from_parts(ComponentKind::Segment, raw.to_string(), parts),
            kind,
        }
    }

    pub(crate) fn kind(&self) -> SegmentKind {
        self.kind
    }

    pub(crate) fn raw(&self) -> &str {
        self.component.raw_value()
    }

    pub(crate) fn is_directories(&self) -> bool {
        self.kind == SegmentKind::Directories
    }

    pub(crate) fn is_parameterized(&self) -> bool {
        self.component.is_parameterized()
    }

    pub(crate) fn parameter_count(&self) -> usize {
        self.component.parameter_count()
    }

    pub(crate) fn render(
        &self,
        supply: &mut ValueSupply<'_>,
        escape_slash: bool,
    ) -> Result<String, UriError> {
        self.component.render(supply, escape_slash)
    }

    /// Emit the segment's regex fragment. A directories segment compiles to
    /// a group that consumes its own joining slashes; `preceded` tells it
    /// whether another segment comes before it in the path.
    pub(crate) fn regex_fragment(
        &self,
        labels: &mut Vec<Option<String>>,
        preceded: bool,
    ) -> String {
        if self.is_directories() {
            labels.push(None);
            if preceded {
                "((?:/[^/]*)*)".to_string()
            } else {
                "([^/]*(?:/[^/]*)*)".to_string()
            }
        } else {
            self.component.regex_fragment(labels)
        }
    }

    /// Decompose the segment for the part-wise inclusion compare.
    pub(crate) fn inclusion_parts(&self) -> Vec<InclusionPart> {
        self.component
            .parts()
            .iter()
            .map(|part| match part {
                ComponentPart::Static(val) => InclusionPart::Static(val.clone()),
                ComponentPart::Parameter(param) => match param.pattern() {
                    ParamPattern::Wildcard => InclusionPart::Wild,
                    ParamPattern::AnyChar => InclusionPart::Any,
                    ParamPattern::Custom(val) => InclusionPart::Custom(val.clone()),
                    // handled at segment level
                    ParamPattern::Directories => InclusionPart::Wild,
                },
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern_options() -> UriOptions {
        UriOptions::new().path_pattern()
    }

    #[test]
    fn test_segment_kinds() -> anyhow::Result<()> {
        assert_eq!(
            Segment::new("static", pattern_options())?.kind(),
            SegmentKind::Static
        );
        assert_eq!(
            Segment::new("*", pattern_options())?.kind(),
            SegmentKind::Wildcard
        );
        assert_eq!(
            Segment::new("{x}", pattern_options())?.kind(),
            SegmentKind::Wildcard
        );
        assert_eq!(
            Segment::new("*.png", pattern_options())?.kind(),
            SegmentKind::Custom
        );
        assert_eq!(
            Segment::new("{id:[0-9]+}", pattern_options())?.kind(),
            SegmentKind::Custom
        );
        assert_eq!(
            Segment::new("**", pattern_options())?.kind(),
            SegmentKind::Directories
        );
        Ok(())
    }

    #[test]
    fn test_segment_scan_stops_at_slash() -> anyhow::Result<()> {
        let (segment, consumed) = Segment::scan("foo/bar", pattern_options())?;
        assert_eq!(segment.raw(), "foo");
        assert_eq!(consumed, 3);
        Ok(())
    }

    #[test]
    fn test_directories_regex_fragment() -> anyhow::Result<()> {
        let segment = Segment::new("**", pattern_options())?;
        let mut labels = Vec::new();
        assert_eq!(segment.regex_fragment(&mut labels, true), "((?:/[^/]*)*)");
        assert_eq!(labels, vec![None]);
        Ok(())
    }
}
