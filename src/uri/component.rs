use std::collections::HashMap;
use std::fmt;

use anyhow::anyhow;
use regex::Regex;

use crate::uri::scanner::{self, ComponentPart, UriParameter};
use crate::uri::{UriError, UriOptions};

/// The component variants of a URI, each with its own character rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ComponentKind {
    Scheme,
    UserInfo,
    Host,
    Port,
    Segment,
    Query,
    QueryParamName,
    QueryParamValue,
    Fragment,
}

impl ComponentKind {
    /// Test whether a byte may appear unescaped in a rendered value of this
    /// component.
    pub(crate) fn allows_unescaped(&self, b: u8, escape_slash: bool) -> bool {
        match self {
            Self::Port => b.is_ascii_digit(),
            _ => {
                if b.is_ascii_alphanumeric() {
                    return true;
                }
                let extra: &[u8] = match self {
                    Self::Scheme => b"+-.",
                    Self::UserInfo => b"-._~!$&'()*+,;=:",
                    Self::Host => b"-._~!$&'()*+,;=:[]",
                    Self::Segment => {
                        if escape_slash {
                            b"-._~!$&'()*+,;=:@"
                        } else {
                            b"-._~!$&'()*+,;=:@/"
                        }
                    }
                    Self::Query | Self::Fragment => b"-._~!$&'()*+,;=:@/?",
                    Self::QueryParamName | Self::QueryParamValue => b"-._~!$'()*+,;:@/?",
                    Self::Port => unreachable!(),
                };
                extra.contains(&b)
            }
        }
    }

    /// Test whether a character is acceptable in the raw (template) form of
    /// this component. Non-ASCII characters are accepted and escaped at
    /// render time; `%` is accepted for pre-encoded sequences.
    pub(crate) fn is_valid_raw_char(&self, c: char) -> bool {
        if !c.is_ascii() {
            return !matches!(self, Self::Port);
        }
        let b = c as u8;
        match self {
            Self::Port => b.is_ascii_digit(),
            _ => b == b'%' || self.allows_unescaped(b, true),
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Scheme => "scheme",
            Self::UserInfo => "user info",
            Self::Host => "host",
            Self::Port => "port",
            Self::Segment => "path segment",
            Self::Query => "query",
            Self::QueryParamName => "query parameter name",
            Self::QueryParamValue => "query parameter value",
            Self::Fragment => "fragment",
        };
        fmt.write_str(name)
    }
}

fn push_escaped(out: &mut String, b: u8) {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    out.push('%');
    out.push(HEX[(b >> 4) as usize] as char);
    out.push(HEX[(b & 0x0f) as usize] as char);
}

/// Percent-encode a substituted parameter value. `%` is always escaped.
pub(crate) fn encode_value(kind: ComponentKind, value: &str, escape_slash: bool) -> String {
    let mut out = String::with_capacity(value.len());
    for &b in value.as_bytes() {
        if b < 0x80 && b != b'%' && kind.allows_unescaped(b, escape_slash) {
            out.push(b as char);
        } else {
            push_escaped(&mut out, b);
        }
    }
    out
}

/// Percent-encode static template text, leaving valid pre-encoded `%XX`
/// triplets untouched.
pub(crate) fn encode_static(kind: ComponentKind, value: &str, escape_slash: bool) -> String {
    let bytes = value.as_bytes();
    let mut out = String::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            out.push_str(&value[i..i + 3]);
            i += 3;
            continue;
        }
        if b < 0x80 && b != b'%' && kind.allows_unescaped(b, escape_slash) {
            out.push(b as char);
        } else {
            push_escaped(&mut out, b);
        }
        i += 1;
    }
    out
}

/// Source of substitution values during rendering. Positional values are
/// consumed in component order; named values are looked up per parameter.
pub(crate) enum ValueSupply<'a> {
    Positional { values: &'a [&'a str], index: usize },
    Named(&'a HashMap<String, String>),
}

impl<'a> ValueSupply<'a> {
    pub(crate) fn positional(values: &'a [&'a str]) -> Self {
        Self::Positional { values, index: 0 }
    }

    pub(crate) fn named(values: &'a HashMap<String, String>) -> Self {
        Self::Named(values)
    }

    fn take(&mut self, parameter: &UriParameter) -> Result<&'a str, UriError> {
        let display_name = parameter.name().unwrap_or("<unnamed>");
        match self {
            Self::Positional { values, index } => {
                let values: &'a [&'a str] = *values;
                match values.get(*index).copied() {
                    Some(val) => {
                        *index += 1;
                        Ok(val)
                    }
                    None => Err(UriError::MissingParameterValue(display_name.to_string())),
                }
            }
            Self::Named(map) => {
                let map: &'a HashMap<String, String> = *map;
                match parameter.name() {
                    Some(name) => match map.get(name) {
                        Some(val) => Ok(val.as_str()),
                        None => Err(UriError::MissingParameterValue(name.to_string())),
                    },
                    None => Err(UriError::MissingParameterValue(display_name.to_string())),
                }
            }
        }
    }
}

/// A URI component: raw value plus the ordered parameters scanned out of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Component {
    kind: ComponentKind,
    raw: String,
    parts: Vec<ComponentPart>,
}

impl Component {
    /// Scan a full raw value into a component of the given kind.
    pub(crate) fn scan(
        kind: ComponentKind,
        raw: &str,
        options: UriOptions,
    ) -> Result<Self, UriError> {
        let result = scanner::scan_component(raw, kind, options, None)?;
        Ok(Self {
            kind,
            raw: raw.to_string(),
            parts: result.parts,
        })
    }

    pub(crate) fn from_parts(kind: ComponentKind, raw: String, parts: Vec<ComponentPart>) -> Self {
        Self { kind, raw, parts }
    }

    pub(crate) fn kind(&self) -> ComponentKind {
        self.kind
    }

    pub(crate) fn raw_value(&self) -> &str {
        &self.raw
    }

    pub(crate) fn parts(&self) -> &[ComponentPart] {
        &self.parts
    }

    pub(crate) fn is_parameterized(&self) -> bool {
        self.parts
            .iter()
            .any(|p| matches!(p, ComponentPart::Parameter(_)))
    }

    pub(crate) fn parameter_count(&self) -> usize {
        self.parts
            .iter()
            .filter(|p| matches!(p, ComponentPart::Parameter(_)))
            .count()
    }

    /// Render the component, substituting parameter values and
    /// percent-encoding per the component's character rules.
    pub(crate) fn render(
        &self,
        supply: &mut ValueSupply<'_>,
        escape_slash: bool,
    ) -> Result<String, UriError> {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                ComponentPart::Static(val) => {
                    out.push_str(&encode_static(self.kind, val, escape_slash));
                }
                ComponentPart::Parameter(param) => {
                    let value = supply.take(param)?;
                    if let crate::uri::ParamPattern::Custom(pattern) = param.pattern() {
                        let regex = Regex::new(&format!("^(?:{})$", pattern)).map_err(|err| {
                            UriError::InvalidUri(anyhow!(
                                "Invalid parameter pattern {}: {}",
                                pattern,
                                err
                            ))
                        })?;
                        if !regex.is_match(value) {
                            return Err(UriError::ParameterValueMismatch {
                                name: param.name().unwrap_or("<unnamed>").to_string(),
                                value: value.to_string(),
                            });
                        }
                    }
                    if self.kind == ComponentKind::Port && !value.bytes().all(|b| b.is_ascii_digit())
                    {
                        return Err(UriError::InvalidUri(anyhow!("Invalid port: {}", value)));
                    }
                    out.push_str(&encode_value(self.kind, value, escape_slash));
                }
            }
        }
        Ok(out)
    }

    /// Emit the regex fragment of the component, recording one label per
    /// capturing group (None for unnamed parameters).
    pub(crate) fn regex_fragment(&self, labels: &mut Vec<Option<String>>) -> String {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                ComponentPart::Static(val) => out.push_str(&regex::escape(val)),
                ComponentPart::Parameter(param) => {
                    labels.push(param.name().map(|s| s.to_string()));
                    match param.name() {
                        Some(name) => {
                            out.push_str("(?P<");
                            out.push_str(name);
                            out.push('>');
                            out.push_str(param.pattern().as_regex());
                            out.push(')');
                        }
                        None => {
                            out.push('(');
                            out.push_str(param.pattern().as_regex());
                            out.push(')');
                        }
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_value_escapes_reserved() {
        assert_eq!(
            encode_value(ComponentKind::Segment, "a b/c", true),
            "a%20b%2Fc"
        );
        assert_eq!(encode_value(ComponentKind::Segment, "a/c", false), "a/c");
    }

    #[test]
    fn test_encode_value_utf8() {
        assert_eq!(
            encode_value(ComponentKind::Segment, "caf\u{e9}", true),
            "caf%C3%A9"
        );
    }

    #[test]
    fn test_encode_static_preserves_triplets() {
        assert_eq!(
            encode_static(ComponentKind::Segment, "a%20b c", true),
            "a%20b%20c"
        );
    }

    #[test]
    fn test_query_parameter_escapes_separators() {
        assert_eq!(
            encode_value(ComponentKind::QueryParamValue, "a=b&c", true),
            "a%3Db%26c"
        );
    }

    #[test]
    fn test_render_positional() -> anyhow::Result<()> {
        let options = UriOptions::new().parameterized();
        let component = Component::scan(ComponentKind::Segment, "{a}-{b}", options)?;
        let mut supply = ValueSupply::positional(&["x", "y"]);
        assert_eq!(component.render(&mut supply, true)?, "x-y");
        Ok(())
    }

    #[test]
    fn test_render_missing_value() -> anyhow::Result<()> {
        let options = UriOptions::new().parameterized();
        let component = Component::scan(ComponentKind::Segment, "{a}-{b}", options)?;
        let mut supply = ValueSupply::positional(&["x"]);
        match component.render(&mut supply, true) {
            Err(UriError::MissingParameterValue(name)) => assert_eq!(name, "b"),
            other => panic!("unexpected result: {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_render_pattern_mismatch() -> anyhow::Result<()> {
        let options = UriOptions::new().parameterized();
        let component = Component::scan(ComponentKind::Segment, "{id:[0-9]+}", options)?;
        let mut supply = ValueSupply::positional(&["abc"]);
        match component.render(&mut supply, true) {
            Err(UriError::ParameterValueMismatch { name, .. }) => assert_eq!(name, "id"),
            other => panic!("unexpected result: {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_regex_fragment() -> anyhow::Result<()> {
        let options = UriOptions::new().parameterized();
        let component = Component::scan(ComponentKind::Segment, "a.{id:[0-9]+}", options)?;
        let mut labels = Vec::new();
        let fragment = component.regex_fragment(&mut labels);
        assert_eq!(fragment, "a\\.(?P<id>[0-9]+)");
        assert_eq!(labels, vec![Some("id".to_string())]);
        Ok(())
    }
}
