use anyhow::bail;

use crate::uri::component::ComponentKind;
use crate::uri::{UriError, UriOptions};

/// A parameter reference found in a component raw value.
///
/// Parameters are written `{name}` or `{name:pattern}`; the path-pattern
/// operators `?`, `*` and `**` produce synthetic unnamed parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriParameter {
    offset: usize,
    len: usize,
    name: Option<String>,
    pattern: ParamPattern,
}

impl UriParameter {
    pub(crate) fn new(offset: usize, len: usize, name: Option<String>, pattern: ParamPattern) -> Self {
        Self {
            offset,
            len,
            name,
            pattern,
        }
    }

    /// Byte offset of the parameter reference in the component raw value.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Byte length of the parameter reference in the component raw value.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Parameter name, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn pattern(&self) -> &ParamPattern {
        &self.pattern
    }
}

/// The matching pattern a parameter declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamPattern {
    /// `[^/]*` - the default; also produced by the `*` operator.
    Wildcard,
    /// `[^/]` - produced by the `?` operator.
    AnyChar,
    /// `.*` spanning whole segments - produced by the `**` operator.
    Directories,
    /// Any explicitly declared pattern.
    Custom(String),
}

impl ParamPattern {
    /// Return the regex source of the pattern.
    pub fn as_regex(&self) -> &str {
        match self {
            Self::Wildcard => "[^/]*",
            Self::AnyChar => "[^/]",
            Self::Directories => ".*",
            Self::Custom(val) => val,
        }
    }

    fn classify(pattern: String) -> Self {
        match pattern.as_str() {
            "[^/]*" => Self::Wildcard,
            "[^/]" => Self::AnyChar,
            _ => Self::Custom(pattern),
        }
    }
}

/// One piece of a scanned component value: literal text with escapes
/// resolved, or a parameter reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ComponentPart {
    Static(String),
    Parameter(UriParameter),
}

#[derive(Debug)]
pub(crate) struct ScanResult {
    pub parts: Vec<ComponentPart>,
    /// Bytes consumed; shorter than the input when the break predicate hit.
    pub consumed: usize,
    /// The component was a standalone `**` path-pattern operator.
    pub directories: bool,
}

enum State {
    Default,
    Name,
    Pattern,
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_part(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Scan a component raw value, collecting parameters and validating literal
/// characters against the component's allowed set.
///
/// # Arguments
///
/// * `raw` - the raw component value
/// * `kind` - the component variant whose character rules apply
/// * `options` - the builder options
/// * `break_predicate` - stop scanning before the first matching byte
pub(crate) fn scan_component(
    raw: &str,
    kind: ComponentKind,
    options: UriOptions,
    break_predicate: Option<&dyn Fn(u8) -> bool>,
) -> Result<ScanResult, UriError> {
    (|| -> anyhow::Result<ScanResult> {
        let mut parts: Vec<ComponentPart> = Vec::new();
        let mut statik = String::new();
        let mut name = String::new();
        let mut pattern = String::new();
        let mut depth = 0usize;
        let mut escaped = false;
        let mut state = State::Default;
        let mut param_offset = 0usize;
        let mut directories = false;
        let mut consumed = raw.len();

        let path_pattern = options.is_path_pattern() && kind == ComponentKind::Segment;

        for (i, c) in raw.char_indices() {
            match state {
                State::Default => {
                    if escaped {
                        statik.push(c);
                        escaped = false;
                        continue;
                    }
                    if let Some(pred) = break_predicate {
                        if c.is_ascii() && pred(c as u8) {
                            consumed = i;
                            break;
                        }
                    }
                    if directories {
                        bail!("'**' must stand alone in its segment: {}", raw);
                    }
                    match c {
                        '\\' if options.is_parameterized() => {
                            escaped = true;
                        }
                        '{' if options.is_parameterized() => {
                            if !statik.is_empty() {
                                parts.push(ComponentPart::Static(std::mem::take(&mut statik)));
                            }
                            param_offset = i;
                            name.clear();
                            state = State::Name;
                        }
                        '}' if options.is_parameterized() => {
                            bail!("Unmatched '}}' in {}: {}", kind, raw);
                        }
                        '?' if path_pattern => {
                            if !statik.is_empty() {
                                parts.push(ComponentPart::Static(std::mem::take(&mut statik)));
                            }
                            parts.push(ComponentPart::Parameter(UriParameter::new(
                                i,
                                1,
                                None,
                                ParamPattern::AnyChar,
                            )));
                        }
                        '*' if path_pattern => {
                            if statik.is_empty() {
                                if let Some(ComponentPart::Parameter(prev)) = parts.last() {
                                    if prev.pattern == ParamPattern::Wildcard
                                        && prev.name.is_none()
                                        && prev.offset + prev.len == i
                                    {
                                        if prev.offset == 0 && parts.len() == 1 {
                                            parts.pop();
                                            parts.push(ComponentPart::Parameter(
                                                UriParameter::new(
                                                    i - 1,
                                                    2,
                                                    None,
                                                    ParamPattern::Directories,
                                                ),
                                            ));
                                            directories = true;
                                            continue;
                                        }
                                        bail!("'**' must stand alone in its segment: {}", raw);
                                    }
                                }
                            }
                            if !statik.is_empty() {
                                parts.push(ComponentPart::Static(std::mem::take(&mut statik)));
                            }
                            parts.push(ComponentPart::Parameter(UriParameter::new(
                                i,
                                1,
                                None,
                                ParamPattern::Wildcard,
                            )));
                        }
                        _ => {
                            if !kind.is_valid_raw_char(c) {
                                bail!("Invalid character '{}' in {}: {}", c, kind, raw);
                            }
                            statik.push(c);
                        }
                    }
                }
                State::Name => match c {
                    '}' => {
                        let param_name = if name.is_empty() {
                            None
                        } else {
                            Some(std::mem::take(&mut name))
                        };
                        parts.push(ComponentPart::Parameter(UriParameter::new(
                            param_offset,
                            i + 1 - param_offset,
                            param_name,
                            ParamPattern::Wildcard,
                        )));
                        state = State::Default;
                    }
                    ':' => {
                        pattern.clear();
                        depth = 0;
                        state = State::Pattern;
                    }
                    _ => {
                        if name.is_empty() {
                            if !is_name_start(c) {
                                bail!("Invalid parameter name character '{}': {}", c, raw);
                            }
                        } else if !is_name_part(c) {
                            bail!("Invalid parameter name character '{}': {}", c, raw);
                        }
                        name.push(c);
                    }
                },
                State::Pattern => {
                    if escaped {
                        pattern.push(c);
                        escaped = false;
                        continue;
                    }
                    match c {
                        '\\' => {
                            pattern.push('\\');
                            escaped = true;
                        }
                        '{' => {
                            depth += 1;
                            pattern.push(c);
                        }
                        '}' if depth == 0 => {
                            let param_name = if name.is_empty() {
                                None
                            } else {
                                Some(std::mem::take(&mut name))
                            };
                            parts.push(ComponentPart::Parameter(UriParameter::new(
                                param_offset,
                                i + 1 - param_offset,
                                param_name,
                                ParamPattern::classify(std::mem::take(&mut pattern)),
                            )));
                            state = State::Default;
                        }
                        '}' => {
                            depth -= 1;
                            pattern.push(c);
                        }
                        _ => {
                            pattern.push(c);
                        }
                    }
                }
            }
        }

        if escaped {
            bail!("Trailing escape character: {}", raw);
        }
        match state {
            State::Default => {}
            State::Name | State::Pattern => bail!("Unterminated parameter: {}", raw),
        }
        if !statik.is_empty() {
            parts.push(ComponentPart::Static(statik));
        }

        Ok(ScanResult {
            parts,
            consumed,
            directories,
        })
    })()
    .map_err(UriError::InvalidUri)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> UriOptions {
        UriOptions::new().parameterized()
    }

    fn pattern_options() -> UriOptions {
        UriOptions::new().path_pattern()
    }

    fn scan(raw: &str, options: UriOptions) -> Result<ScanResult, UriError> {
        scan_component(raw, ComponentKind::Segment, options, None)
    }

    #[test]
    fn test_scan_static() -> anyhow::Result<()> {
        let result = scan("static", options())?;
        assert_eq!(
            result.parts,
            vec![ComponentPart::Static("static".to_string())]
        );
        assert_eq!(result.consumed, 6);
        assert!(!result.directories);
        Ok(())
    }

    #[test]
    fn test_scan_named_parameter() -> anyhow::Result<()> {
        let result = scan("{custom_path}", options())?;
        assert_eq!(
            result.parts,
            vec![ComponentPart::Parameter(UriParameter::new(
                0,
                13,
                Some("custom_path".to_string()),
                ParamPattern::Wildcard,
            ))]
        );
        Ok(())
    }

    #[test]
    fn test_scan_custom_pattern() -> anyhow::Result<()> {
        let result = scan("{id:[0-9]+}", options())?;
        assert_eq!(
            result.parts,
            vec![ComponentPart::Parameter(UriParameter::new(
                0,
                11,
                Some("id".to_string()),
                ParamPattern::Custom("[0-9]+".to_string()),
            ))]
        );
        Ok(())
    }

    #[test]
    fn test_scan_nested_braces_in_pattern() -> anyhow::Result<()> {
        let result = scan("{id:[0-9]{2}}", options())?;
        match &result.parts[0] {
            ComponentPart::Parameter(p) => {
                assert_eq!(p.pattern(), &ParamPattern::Custom("[0-9]{2}".to_string()));
            }
            part => panic!("unexpected part: {:?}", part),
        }
        Ok(())
    }

    #[test]
    fn test_scan_mixed_parts() -> anyhow::Result<()> {
        let result = scan("a{x}b", options())?;
        assert_eq!(result.parts.len(), 3);
        assert_eq!(result.parts[0], ComponentPart::Static("a".to_string()));
        assert_eq!(result.parts[2], ComponentPart::Static("b".to_string()));
        Ok(())
    }

    #[test]
    fn test_scan_escaped_brace() -> anyhow::Result<()> {
        let result = scan("a\\{b", options())?;
        assert_eq!(result.parts, vec![ComponentPart::Static("a{b".to_string())]);
        Ok(())
    }

    #[test]
    fn test_scan_invalid_name() {
        assert!(scan("{1x}", options()).is_err());
        assert!(scan("{x-y}", options()).is_err());
    }

    #[test]
    fn test_scan_unterminated_parameter() {
        assert!(scan("{x", options()).is_err());
        assert!(scan("{x:[0-9]", options()).is_err());
    }

    #[test]
    fn test_scan_question_mark_operator() -> anyhow::Result<()> {
        let result = scan("a?c", pattern_options())?;
        assert_eq!(
            result.parts[1],
            ComponentPart::Parameter(UriParameter::new(1, 1, None, ParamPattern::AnyChar))
        );
        Ok(())
    }

    #[test]
    fn test_scan_wildcard_operator() -> anyhow::Result<()> {
        let result = scan("*.png", pattern_options())?;
        assert_eq!(
            result.parts[0],
            ComponentPart::Parameter(UriParameter::new(0, 1, None, ParamPattern::Wildcard))
        );
        assert_eq!(result.parts[1], ComponentPart::Static(".png".to_string()));
        Ok(())
    }

    #[test]
    fn test_scan_directories_operator() -> anyhow::Result<()> {
        let result = scan("**", pattern_options())?;
        assert!(result.directories);
        assert_eq!(
            result.parts,
            vec![ComponentPart::Parameter(UriParameter::new(
                0,
                2,
                None,
                ParamPattern::Directories,
            ))]
        );
        Ok(())
    }

    #[test]
    fn test_scan_directories_must_be_alone() {
        assert!(scan("**a", pattern_options()).is_err());
        assert!(scan("a**", pattern_options()).is_err());
        assert!(scan("***", pattern_options()).is_err());
    }

    #[test]
    fn test_scan_break_predicate() -> anyhow::Result<()> {
        let result = scan_component(
            "foo/bar",
            ComponentKind::Segment,
            pattern_options(),
            Some(&|b| b == b'/'),
        )?;
        assert_eq!(result.consumed, 3);
        assert_eq!(result.parts, vec![ComponentPart::Static("foo".to_string())]);
        Ok(())
    }

    #[test]
    fn test_scan_invalid_character() {
        assert!(scan("a b", options()).is_err());
        assert!(scan("a{x}#", options()).is_err());
    }
}
