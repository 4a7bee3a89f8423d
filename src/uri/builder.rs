use std::collections::HashMap;

use anyhow::anyhow;

use crate::uri::component::{Component, ComponentKind, ValueSupply};
use crate::uri::pattern::UriPattern;
use crate::uri::segment::Segment;
use crate::uri::{RequestTargetForm, UriError, UriOptions};

/// A mutable bag of URI components assembled into a rendered URI, a raw
/// URI, or a [`UriPattern`].
#[derive(Debug, Clone)]
pub struct UriBuilder {
    options: UriOptions,
    scheme: Option<Component>,
    user_info: Option<Component>,
    host: Option<Component>,
    port: Option<Component>,
    segments: Vec<Segment>,
    query: Option<Component>,
    query_params: Vec<(Component, Component)>,
    fragment: Option<Component>,
}

impl UriBuilder {
    /// Return an empty builder.
    pub fn new(options: UriOptions) -> Self {
        Self {
            options,
            scheme: None,
            user_info: None,
            host: None,
            port: None,
            segments: Vec::new(),
            query: None,
            query_params: Vec::new(),
            fragment: None,
        }
    }

    /// Parse a raw URI of the given request-target form into a builder.
    ///
    /// # Arguments
    ///
    /// * `raw` - the raw URI
    /// * `form` - the accepted request-target form
    /// * `options` - the builder options
    pub fn parse(
        raw: &str,
        form: RequestTargetForm,
        options: UriOptions,
    ) -> Result<Self, UriError> {
        if form == RequestTargetForm::Origin && options.is_path_pattern() {
            return Err(UriError::IncompatibleBuilderOption(
                "path patterns cannot be used with the origin request-target form".to_string(),
            ));
        }

        let parameterized = options.is_parameterized();
        let mut builder = Self::new(options);
        let mut rest = raw;

        let fragment = match form {
            RequestTargetForm::Origin => {
                if find_top_level(rest, b'#', parameterized).is_some() {
                    return Err(UriError::InvalidUri(anyhow!(
                        "A fragment is not allowed in the origin request-target form: {}",
                        raw
                    )));
                }
                None
            }
            RequestTargetForm::OriginExtended | RequestTargetForm::AbsoluteUri => {
                match find_top_level(rest, b'#', parameterized) {
                    Some(pos) => {
                        let fragment = &rest[pos + 1..];
                        rest = &rest[..pos];
                        Some(fragment)
                    }
                    None => None,
                }
            }
        };

        let query = match find_top_level(rest, b'?', parameterized) {
            Some(pos) => {
                let query = &rest[pos + 1..];
                rest = &rest[..pos];
                Some(query)
            }
            None => None,
        };

        match form {
            RequestTargetForm::Origin | RequestTargetForm::OriginExtended => {
                if !rest.starts_with('/') {
                    return Err(UriError::InvalidUri(anyhow!(
                        "An origin request-target must start with '/': {}",
                        raw
                    )));
                }
            }
            RequestTargetForm::AbsoluteUri => {
                if let Some(pos) = find_top_level(rest, b':', parameterized) {
                    let slash = find_top_level(rest, b'/', parameterized).unwrap_or(usize::MAX);
                    if pos > 0 && pos < slash {
                        builder.scheme(&rest[..pos])?;
                        rest = &rest[pos + 1..];
                    }
                }
                if let Some(authority) = rest.strip_prefix("//") {
                    let end = find_top_level(authority, b'/', parameterized)
                        .unwrap_or_else(|| authority.len());
                    builder.parse_authority(&authority[..end], parameterized)?;
                    rest = &authority[end..];
                }
            }
        }

        if !rest.is_empty() {
            builder.path(rest, false)?;
        }
        if let Some(query) = query {
            builder.query(query)?;
        }
        if let Some(fragment) = fragment {
            builder.fragment(fragment)?;
        }
        Ok(builder)
    }

    fn parse_authority(&mut self, authority: &str, parameterized: bool) -> Result<(), UriError> {
        let (user_info, host_port) = match find_top_level(authority, b'@', parameterized) {
            Some(pos) => (Some(&authority[..pos]), &authority[pos + 1..]),
            None => (None, authority),
        };
        if let Some(user_info) = user_info {
            self.user_info(user_info)?;
        }
        if let Some(rem) = host_port.strip_prefix('[') {
            let end = rem.find(']').ok_or_else(|| {
                UriError::InvalidUri(anyhow!("Unclosed IPv6 host: {}", host_port))
            })?;
            self.host(&host_port[..end + 2])?;
            let after = &rem[end + 1..];
            if let Some(port) = after.strip_prefix(':') {
                self.port(port)?;
            } else if !after.is_empty() {
                return Err(UriError::InvalidUri(anyhow!(
                    "Invalid authority: {}",
                    authority
                )));
            }
        } else {
            match find_top_level(host_port, b':', parameterized) {
                Some(pos) => {
                    self.host(&host_port[..pos])?;
                    self.port(&host_port[pos + 1..])?;
                }
                None => {
                    self.host(host_port)?;
                }
            }
        }
        Ok(())
    }

    pub fn options(&self) -> UriOptions {
        self.options
    }

    /// Set the scheme component.
    pub fn scheme(&mut self, raw: &str) -> Result<&mut Self, UriError> {
        self.scheme = Some(Component::scan(ComponentKind::Scheme, raw, self.options)?);
        Ok(self)
    }

    /// Set the user info component.
    pub fn user_info(&mut self, raw: &str) -> Result<&mut Self, UriError> {
        self.user_info = Some(Component::scan(ComponentKind::UserInfo, raw, self.options)?);
        Ok(self)
    }

    /// Set the host component.
    pub fn host(&mut self, raw: &str) -> Result<&mut Self, UriError> {
        self.host = Some(Component::scan(ComponentKind::Host, raw, self.options)?);
        Ok(self)
    }

    /// Set the port component. Accepts a number or a raw (possibly
    /// parameterized) string.
    pub fn port(&mut self, value: impl ToString) -> Result<&mut Self, UriError> {
        let raw = value.to_string();
        self.port = Some(Component::scan(ComponentKind::Port, &raw, self.options)?);
        Ok(self)
    }

    /// Append a path, splitting it into segments.
    ///
    /// A leading `/` yields an initial empty segment; a trailing `/` yields
    /// a final empty segment unless `ignore_trailing_slash` is set.
    pub fn path(&mut self, raw: &str, ignore_trailing_slash: bool) -> Result<&mut Self, UriError> {
        if raw.is_empty() {
            return Ok(self);
        }
        let mut pieces: Vec<Segment> = Vec::new();
        let mut rest = raw;
        loop {
            let (segment, consumed) = Segment::scan(rest, self.options)?;
            let at_end = consumed == rest.len();
            pieces.push(segment);
            if at_end {
                break;
            }
            rest = &rest[consumed + 1..];
            if rest.is_empty() {
                pieces.push(Segment::new("", self.options)?);
                break;
            }
        }
        if ignore_trailing_slash && pieces.len() > 1 {
            if let Some(last) = pieces.last() {
                if last.raw().is_empty() {
                    pieces.pop();
                }
            }
        }
        for piece in pieces {
            self.append_segment(piece)?;
        }
        Ok(self)
    }

    /// Append a single path segment.
    pub fn segment(&mut self, raw: &str) -> Result<&mut Self, UriError> {
        let segment = Segment::new(raw, self.options)?;
        self.append_segment(segment)?;
        Ok(self)
    }

    /// Remove all path segments.
    pub fn clear_path(&mut self) -> &mut Self {
        self.segments.clear();
        self
    }

    /// Set the raw query component. Clears any query parameters.
    pub fn query(&mut self, raw: &str) -> Result<&mut Self, UriError> {
        self.query = Some(Component::scan(ComponentKind::Query, raw, self.options)?);
        self.query_params.clear();
        Ok(self)
    }

    /// Append a query parameter. Clears any raw query component.
    pub fn query_parameter(&mut self, name: &str, value: &str) -> Result<&mut Self, UriError> {
        let name = Component::scan(ComponentKind::QueryParamName, name, self.options)?;
        let value = Component::scan(ComponentKind::QueryParamValue, value, self.options)?;
        self.query_params.push((name, value));
        self.query = None;
        Ok(self)
    }

    /// Remove the query component and all query parameters.
    pub fn clear_query(&mut self) -> &mut Self {
        self.query = None;
        self.query_params.clear();
        self
    }

    /// Set the fragment component.
    pub fn fragment(&mut self, raw: &str) -> Result<&mut Self, UriError> {
        self.fragment = Some(Component::scan(ComponentKind::Fragment, raw, self.options)?);
        Ok(self)
    }

    fn append_segment(&mut self, segment: Segment) -> Result<(), UriError> {
        if segment.is_directories() {
            if let Some(prev) = self.segments.last() {
                if prev.is_directories() {
                    return Err(UriError::InvalidUri(anyhow!(
                        "Invalid path: consecutive '**' segments"
                    )));
                }
            }
            self.segments.push(segment);
        } else if self.options.is_normalized() && !segment.is_parameterized() {
            match segment.raw() {
                "." => {}
                ".." => match self.segments.last() {
                    Some(prev) if prev.raw() == ".." => self.segments.push(segment),
                    Some(prev) if prev.raw().is_empty() && self.segments.len() == 1 => {}
                    Some(_) => {
                        self.segments.pop();
                    }
                    None => self.segments.push(segment),
                },
                _ => self.segments.push(segment),
            }
        } else {
            self.segments.push(segment);
        }
        Ok(())
    }

    /// Return the number of parameter values the builder consumes when
    /// rendering positionally.
    pub fn parameter_count(&self) -> usize {
        let mut count = 0;
        for component in [&self.scheme, &self.user_info, &self.host, &self.port]
            .iter()
            .filter_map(|c| c.as_ref())
        {
            count += component.parameter_count();
        }
        for segment in &self.segments {
            count += segment.parameter_count();
        }
        if let Some(query) = &self.query {
            count += query.parameter_count();
        }
        for (name, value) in &self.query_params {
            count += name.parameter_count() + value.parameter_count();
        }
        if let Some(fragment) = &self.fragment {
            count += fragment.parameter_count();
        }
        count
    }

    /// Render the URI with positional parameter values, escaping `/` in
    /// substituted values.
    pub fn build(&self, values: &[&str]) -> Result<String, UriError> {
        self.build_string(values, true)
    }

    /// Render the URI with positional parameter values.
    ///
    /// # Arguments
    ///
    /// * `values` - positional parameter values, consumed in component order
    /// * `escape_slash` - percent-escape `/` in substituted segment values
    pub fn build_string(&self, values: &[&str], escape_slash: bool) -> Result<String, UriError> {
        self.render(&mut ValueSupply::positional(values), escape_slash)
    }

    /// Render the URI with named parameter values, escaping `/` in
    /// substituted values.
    pub fn build_from_map(&self, values: &HashMap<String, String>) -> Result<String, UriError> {
        self.build_string_from_map(values, true)
    }

    /// Render the URI with named parameter values.
    pub fn build_string_from_map(
        &self,
        values: &HashMap<String, String>,
        escape_slash: bool,
    ) -> Result<String, UriError> {
        self.render(&mut ValueSupply::named(values), escape_slash)
    }

    fn render(
        &self,
        supply: &mut ValueSupply<'_>,
        escape_slash: bool,
    ) -> Result<String, UriError> {
        let mut out = String::new();
        if let Some(scheme) = &self.scheme {
            out.push_str(&scheme.render(supply, escape_slash)?);
            out.push(':');
        }
        if let Some(host) = &self.host {
            out.push_str("//");
            if let Some(user_info) = &self.user_info {
                out.push_str(&user_info.render(supply, escape_slash)?);
                out.push('@');
            }
            out.push_str(&host.render(supply, escape_slash)?);
            if let Some(port) = &self.port {
                out.push(':');
                out.push_str(&port.render(supply, escape_slash)?);
            }
        }

        let mut rendered: Vec<String> = Vec::with_capacity(self.segments.len());
        for segment in &self.segments {
            rendered.push(segment.render(supply, escape_slash)?);
        }
        // substitution may have produced new `.` / `..` segments
        if self.options.is_normalized() {
            rendered = renormalize(rendered);
        }
        if rendered.len() == 1 && rendered[0].is_empty() {
            out.push('/');
        } else if !rendered.is_empty() {
            let path = rendered.join("/");
            if (self.scheme.is_some() || self.host.is_some()) && !path.starts_with('/') {
                out.push('/');
            }
            out.push_str(&path);
        }

        if let Some(query) = &self.query {
            out.push('?');
            out.push_str(&query.render(supply, escape_slash)?);
        } else if !self.query_params.is_empty() {
            out.push('?');
            for (i, (name, value)) in self.query_params.iter().enumerate() {
                if i > 0 {
                    out.push('&');
                }
                out.push_str(&name.render(supply, escape_slash)?);
                out.push('=');
                out.push_str(&value.render(supply, escape_slash)?);
            }
        }
        if let Some(fragment) = &self.fragment {
            out.push('#');
            out.push_str(&fragment.render(supply, escape_slash)?);
        }
        Ok(out)
    }

    /// Return the raw URI without substituting parameters.
    pub fn build_raw(&self) -> String {
        let mut out = String::new();
        if let Some(scheme) = &self.scheme {
            out.push_str(scheme.raw_value());
            out.push(':');
        }
        if let Some(host) = &self.host {
            out.push_str("//");
            if let Some(user_info) = &self.user_info {
                out.push_str(user_info.raw_value());
                out.push('@');
            }
            out.push_str(host.raw_value());
            if let Some(port) = &self.port {
                out.push(':');
                out.push_str(port.raw_value());
            }
        }
        if self.segments.len() == 1 && self.segments[0].raw().is_empty() {
            out.push('/');
        } else if !self.segments.is_empty() {
            let path = self
                .segments
                .iter()
                .map(|s| s.raw())
                .collect::<Vec<_>>()
                .join("/");
            if (self.scheme.is_some() || self.host.is_some()) && !path.starts_with('/') {
                out.push('/');
            }
            out.push_str(&path);
        }
        if let Some(query) = &self.query {
            out.push('?');
            out.push_str(query.raw_value());
        } else if !self.query_params.is_empty() {
            out.push('?');
            for (i, (name, value)) in self.query_params.iter().enumerate() {
                if i > 0 {
                    out.push('&');
                }
                out.push_str(name.raw_value());
                out.push('=');
                out.push_str(value.raw_value());
            }
        }
        if let Some(fragment) = &self.fragment {
            out.push('#');
            out.push_str(fragment.raw_value());
        }
        out
    }

    /// Compile the builder into a [`UriPattern`].
    ///
    /// # Arguments
    ///
    /// * `match_trailing_slash` - also match URIs with a trailing `/`
    pub fn build_pattern(&self, match_trailing_slash: bool) -> Result<UriPattern, UriError> {
        let mut labels: Vec<Option<String>> = Vec::new();
        let mut src = String::from("^");
        if let Some(scheme) = &self.scheme {
            src.push_str(&scheme.regex_fragment(&mut labels));
            src.push_str(&regex::escape(":"));
        }
        if let Some(host) = &self.host {
            src.push_str(&regex::escape("//"));
            if let Some(user_info) = &self.user_info {
                src.push_str(&user_info.regex_fragment(&mut labels));
                src.push_str(&regex::escape("@"));
            }
            src.push_str(&host.regex_fragment(&mut labels));
            if let Some(port) = &self.port {
                src.push_str(&regex::escape(":"));
                src.push_str(&port.regex_fragment(&mut labels));
            }
        }

        let authority_like = self.scheme.is_some() || self.host.is_some();
        if self.segments.len() == 1 && self.segments[0].raw().is_empty() {
            src.push('/');
        } else {
            for (idx, segment) in self.segments.iter().enumerate() {
                if segment.is_directories() {
                    src.push_str(&segment.regex_fragment(&mut labels, idx > 0));
                } else {
                    if idx > 0 {
                        src.push('/');
                    } else if authority_like && !segment.raw().is_empty() {
                        src.push('/');
                    }
                    src.push_str(&segment.regex_fragment(&mut labels, idx > 0));
                }
            }
        }
        if match_trailing_slash && !self.segments.is_empty() {
            src.push_str("/?");
        }

        if let Some(query) = &self.query {
            src.push_str(&regex::escape("?"));
            src.push_str(&query.regex_fragment(&mut labels));
        } else if !self.query_params.is_empty() {
            src.push_str(&regex::escape("?"));
            for (i, (name, value)) in self.query_params.iter().enumerate() {
                if i > 0 {
                    src.push_str(&regex::escape("&"));
                }
                src.push_str(&name.regex_fragment(&mut labels));
                src.push_str(&regex::escape("="));
                src.push_str(&value.regex_fragment(&mut labels));
            }
        }
        if let Some(fragment) = &self.fragment {
            src.push_str(&regex::escape("#"));
            src.push_str(&fragment.regex_fragment(&mut labels));
        }
        src.push('$');

        let segments = if self.options.is_path_pattern() {
            Some(self.segments.clone())
        } else {
            None
        };
        UriPattern::new(self.build_raw(), src, labels, segments)
    }
}

fn renormalize(segments: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(segments.len());
    for segment in segments {
        match segment.as_str() {
            "." => {}
            ".." => match out.last() {
                Some(prev) if prev == ".." => out.push(segment),
                Some(prev) if prev.is_empty() && out.len() == 1 => {}
                Some(_) => {
                    out.pop();
                }
                None => out.push(segment),
            },
            _ => out.push(segment),
        }
    }
    out
}

/// Find the first occurrence of an ASCII byte outside `{}` parameter
/// references.
fn find_top_level(input: &str, target: u8, parameterized: bool) -> Option<usize> {
    let bytes = input.as_bytes();
    let mut depth = 0usize;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if parameterized => escaped = true,
            b'{' if parameterized => depth += 1,
            b'}' if parameterized && depth > 0 => depth -= 1,
            _ if depth == 0 && b == target => return Some(i),
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_normalized() -> anyhow::Result<()> {
        let mut builder = UriBuilder::new(UriOptions::new().normalized());
        builder
            .scheme("http")?
            .host("localhost")?
            .path("/foo/../123", false)?;
        assert_eq!(builder.build(&[])?, "http://localhost/123");
        Ok(())
    }

    #[test]
    fn test_normalization_keeps_leading_dot_dot() -> anyhow::Result<()> {
        let mut builder = UriBuilder::new(UriOptions::new().normalized());
        builder.path("../../a", false)?;
        assert_eq!(builder.build(&[])?, "../../a");
        Ok(())
    }

    #[test]
    fn test_normalization_preserves_root() -> anyhow::Result<()> {
        let mut builder = UriBuilder::new(UriOptions::new().normalized());
        builder.path("/..", false)?;
        assert_eq!(builder.build(&[])?, "/");
        Ok(())
    }

    #[test]
    fn test_build_with_named_parameters() -> anyhow::Result<()> {
        let mut builder = UriBuilder::new(UriOptions::new().parameterized());
        builder
            .scheme("{scheme}")?
            .host("localhost")?
            .path("/static/{custom_path}", false)?;
        let mut values = HashMap::new();
        values.insert("scheme".to_string(), "https".to_string());
        values.insert("custom_path".to_string(), "resource1".to_string());
        assert_eq!(
            builder.build_from_map(&values)?,
            "https://localhost/static/resource1"
        );
        Ok(())
    }

    #[test]
    fn test_build_with_positional_parameters() -> anyhow::Result<()> {
        let mut builder = UriBuilder::new(UriOptions::new().parameterized());
        builder
            .scheme("http")?
            .host("{host}")?
            .path("/a/{x}/{y}", false)?;
        assert_eq!(
            builder.build(&["localhost", "b", "c"])?,
            "http://localhost/a/b/c"
        );
        Ok(())
    }

    #[test]
    fn test_build_missing_value_is_strict() -> anyhow::Result<()> {
        let mut builder = UriBuilder::new(UriOptions::new().parameterized());
        builder.path("/a/{x}/{y}", false)?;
        match builder.build(&["b"]) {
            Err(UriError::MissingParameterValue(name)) => assert_eq!(name, "y"),
            other => panic!("unexpected result: {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_build_escapes_slash_in_values() -> anyhow::Result<()> {
        let mut builder = UriBuilder::new(UriOptions::new().parameterized());
        builder.path("/a/{x}", false)?;
        assert_eq!(builder.build(&["b/c"])?, "/a/b%2Fc");
        assert_eq!(builder.build_string(&["b/c"], false)?, "/a/b/c");
        Ok(())
    }

    #[test]
    fn test_substituted_dots_renormalize() -> anyhow::Result<()> {
        let mut builder = UriBuilder::new(UriOptions::new().normalized().parameterized());
        builder.path("/a/{x}", false)?;
        assert_eq!(builder.build_string(&[".."], false)?, "/");
        Ok(())
    }

    #[test]
    fn test_root_path_renders_slash() -> anyhow::Result<()> {
        let mut builder = UriBuilder::new(UriOptions::new());
        builder.host("localhost")?.path("/", true)?;
        assert_eq!(builder.build(&[])?, "//localhost/");
        Ok(())
    }

    #[test]
    fn test_trailing_slash_handling() -> anyhow::Result<()> {
        let mut builder = UriBuilder::new(UriOptions::new());
        builder.path("/a/b/", false)?;
        assert_eq!(builder.build(&[])?, "/a/b/");

        let mut builder = UriBuilder::new(UriOptions::new());
        builder.path("/a/b/", true)?;
        assert_eq!(builder.build(&[])?, "/a/b");
        Ok(())
    }

    #[test]
    fn test_query_and_query_parameters_are_exclusive() -> anyhow::Result<()> {
        let mut builder = UriBuilder::new(UriOptions::new());
        builder.query("a=b")?;
        builder.query_parameter("c", "d")?;
        assert_eq!(builder.build(&[])?, "?c=d");
        builder.query("e=f")?;
        assert_eq!(builder.build(&[])?, "?e=f");
        Ok(())
    }

    #[test]
    fn test_query_parameter_value_escaping() -> anyhow::Result<()> {
        let mut builder = UriBuilder::new(UriOptions::new().parameterized());
        builder.path("/s", false)?.query_parameter("q", "{v}")?;
        assert_eq!(builder.build(&["a=b&c"])?, "/s?q=a%3Db%26c");
        Ok(())
    }

    #[test]
    fn test_fragment() -> anyhow::Result<()> {
        let mut builder = UriBuilder::new(UriOptions::new());
        builder.host("example.com")?.path("/a", false)?;
        builder.fragment("top")?;
        assert_eq!(builder.build(&[])?, "//example.com/a#top");
        Ok(())
    }

    #[test]
    fn test_consecutive_directories_rejected() -> anyhow::Result<()> {
        let mut builder = UriBuilder::new(UriOptions::new().path_pattern());
        assert!(builder.path("/a/**/**/b", false).is_err());
        Ok(())
    }

    #[test]
    fn test_port() -> anyhow::Result<()> {
        let mut builder = UriBuilder::new(UriOptions::new());
        builder.host("localhost")?.port(8080)?.path("/a", false)?;
        assert_eq!(builder.build(&[])?, "//localhost:8080/a");
        assert!(UriBuilder::new(UriOptions::new()).port("80a").is_err());
        Ok(())
    }

    #[test]
    fn test_parse_absolute_uri() -> anyhow::Result<()> {
        let builder = UriBuilder::parse(
            "http://user@localhost:8080/a/b?x=y#frag",
            RequestTargetForm::AbsoluteUri,
            UriOptions::new(),
        )?;
        assert_eq!(builder.build(&[])?, "http://user@localhost:8080/a/b?x=y#frag");
        Ok(())
    }

    #[test]
    fn test_parse_origin_form() -> anyhow::Result<()> {
        let builder =
            UriBuilder::parse("/a/b?x=y", RequestTargetForm::Origin, UriOptions::new())?;
        assert_eq!(builder.build(&[])?, "/a/b?x=y");

        assert!(UriBuilder::parse(
            "/a#frag",
            RequestTargetForm::Origin,
            UriOptions::new()
        )
        .is_err());
        assert!(UriBuilder::parse("a/b", RequestTargetForm::Origin, UriOptions::new()).is_err());
        Ok(())
    }

    #[test]
    fn test_parse_origin_form_rejects_path_pattern() {
        match UriBuilder::parse(
            "/a/*",
            RequestTargetForm::Origin,
            UriOptions::new().path_pattern(),
        ) {
            Err(UriError::IncompatibleBuilderOption(_)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_parse_ipv6_host() -> anyhow::Result<()> {
        let builder = UriBuilder::parse(
            "http://[::1]:8080/a",
            RequestTargetForm::AbsoluteUri,
            UriOptions::new(),
        )?;
        assert_eq!(builder.build(&[])?, "http://[::1]:8080/a");
        Ok(())
    }

    #[test]
    fn test_build_raw_preserves_parameters() -> anyhow::Result<()> {
        let mut builder = UriBuilder::new(UriOptions::new().parameterized());
        builder
            .scheme("http")?
            .host("localhost")?
            .path("/a/{x:[0-9]+}", false)?;
        assert_eq!(builder.build_raw(), "http://localhost/a/{x:[0-9]+}");
        Ok(())
    }

    #[test]
    fn test_idempotent_normalization() -> anyhow::Result<()> {
        for path in &["/foo/../123", "/a/./b/../c", "a/b/../../c", "/.."] {
            let mut builder = UriBuilder::new(UriOptions::new().normalized());
            builder.path(path, false)?;
            let once = builder.build(&[])?;

            let mut builder = UriBuilder::new(UriOptions::new().normalized());
            builder.path(&once, false)?;
            assert_eq!(builder.build(&[])?, once);
        }
        Ok(())
    }

    #[test]
    fn test_clear_path_and_query() -> anyhow::Result<()> {
        let mut builder = UriBuilder::new(UriOptions::new());
        builder.path("/a/b", false)?.query("x=y")?;
        builder.clear_path().clear_query();
        assert_eq!(builder.build(&[])?, "");
        Ok(())
    }
}
