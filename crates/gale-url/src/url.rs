//! Absolute URL decomposition
//!
//! Splits a URL string into scheme, host, port, path and raw query. Every
//! component is optional: a component missing from the input is `None`,
//! never an empty string, so callers can tell "not given" apart from
//! "given but empty" (`http://h/?` has `Some("")` as its query).
//!
//! Malformed input never panics and never errors. It degrades to a [`Url`]
//! with every component absent.

use std::fmt;

/// Highest value a port component may carry
const MAX_PORT: u32 = u16::MAX as u32;

/// Decomposed URL
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Url {
    scheme: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    path: Option<String>,
    query: Option<String>,
}

impl Url {
    /// Parse a URL, yielding an all-absent value when the input is malformed
    ///
    /// # Example
    /// ```
    /// use gale_url::Url;
    ///
    /// let url = Url::parse("https://example.com:8443/search?q=rust");
    /// assert_eq!(url.scheme(), Some("https"));
    /// assert_eq!(url.host(), Some("example.com"));
    /// assert_eq!(url.port(), Some(8443));
    /// assert_eq!(url.path(), Some("/search"));
    /// assert_eq!(url.query(), Some("q=rust"));
    ///
    /// assert!(Url::parse("http://bad host/").is_empty());
    /// ```
    pub fn parse(input: &str) -> Self {
        Self::try_parse(input).unwrap_or_default()
    }

    fn try_parse(input: &str) -> Option<Self> {
        if !input.bytes().all(is_uri_byte) {
            return None;
        }

        // The fragment never reaches the wire
        let input = match input.split_once('#') {
            Some((before, _)) => before,
            None => input,
        };

        let mut url = Url::default();
        let mut rest = input;

        if let Some((scheme, after)) = split_scheme(rest)? {
            url.scheme = Some(scheme.to_string());
            rest = after;
        }

        let (hier, query) = match rest.split_once('?') {
            Some((hier, query)) => (hier, Some(query)),
            None => (rest, None),
        };

        let path = if let Some(after_slashes) = hier.strip_prefix("//") {
            let end = after_slashes.find('/').unwrap_or(after_slashes.len());
            let (authority, path) = after_slashes.split_at(end);
            let (host, port) = parse_authority(authority)?;
            url.host = Some(host);
            url.port = port;
            path
        } else {
            hier
        };

        if path.contains(['[', ']']) {
            return None;
        }
        if let Some(query) = query {
            if query.contains(['[', ']']) {
                return None;
            }
            url.query = Some(query.to_string());
        }
        if !path.is_empty() {
            url.path = Some(path.to_string());
        }

        Some(url)
    }

    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    /// Host without IPv6 brackets
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Raw query string, without the leading `?`
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// True when nothing could be extracted
    pub fn is_empty(&self) -> bool {
        *self == Url::default()
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(scheme) = &self.scheme {
            write!(f, "{}:", scheme)?;
        }
        if let Some(host) = &self.host {
            if host.contains(':') {
                write!(f, "//[{}]", host)?;
            } else {
                write!(f, "//{}", host)?;
            }
            if let Some(port) = self.port {
                write!(f, ":{}", port)?;
            }
        }
        if let Some(path) = &self.path {
            f.write_str(path)?;
        }
        if let Some(query) = &self.query {
            write!(f, "?{}", query)?;
        }
        Ok(())
    }
}

/// Split off `scheme:` when present.
///
/// Returns `None` for a malformed scheme, `Some(None)` for a scheme-less
/// reference.
fn split_scheme(input: &str) -> Option<Option<(&str, &str)>> {
    let first_delim = input.find(['/', '?']).unwrap_or(input.len());
    let colon = match input[..first_delim].find(':') {
        Some(colon) => colon,
        None => return Some(None),
    };

    let scheme = &input[..colon];
    let mut bytes = scheme.bytes();
    let valid = match bytes.next() {
        Some(first) if first.is_ascii_alphabetic() => {
            bytes.all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.'))
        }
        _ => false,
    };

    // A colon in the first segment of a relative reference is not allowed either
    if !valid {
        return None;
    }
    Some(Some((scheme, &input[colon + 1..])))
}

/// Parse `[userinfo@]host[:port]`; userinfo is accepted and dropped
fn parse_authority(authority: &str) -> Option<(String, Option<u16>)> {
    let host_port = match authority.rsplit_once('@') {
        Some((_, host_port)) => host_port,
        None => authority,
    };

    let (host, port) = if let Some(bracketed) = host_port.strip_prefix('[') {
        let close = bracketed.find(']')?;
        let literal = &bracketed[..close];
        if literal.is_empty() || !literal.bytes().all(|b| b.is_ascii_hexdigit() || b == b':' || b == b'.') {
            return None;
        }
        let after = &bracketed[close + 1..];
        let port = match after {
            "" => None,
            _ => Some(after.strip_prefix(':')?),
        };
        (literal, port)
    } else {
        let (host, port) = match host_port.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (host_port, None),
        };
        if !host.bytes().all(is_reg_name_byte) {
            return None;
        }
        (host, port)
    };

    let port = match port {
        None | Some("") => None,
        Some(digits) => Some(parse_port(digits)?),
    };

    Some((host.to_string(), port))
}

fn parse_port(digits: &str) -> Option<u16> {
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let significant = digits.trim_start_matches('0');
    if significant.is_empty() {
        return if digits.is_empty() { None } else { Some(0) };
    }
    if significant.len() > 5 {
        return None;
    }
    let value: u32 = significant.parse().ok()?;
    if value > MAX_PORT {
        return None;
    }
    Some(value as u16)
}

fn is_reg_name_byte(b: u8) -> bool {
    is_unreserved(b) || is_sub_delim(b) || b == b'%'
}

fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~')
}

fn is_sub_delim(b: u8) -> bool {
    matches!(b, b'!' | b'$' | b'&' | b'\'' | b'(' | b')' | b'*' | b'+' | b',' | b';' | b'=')
}

fn is_uri_byte(b: u8) -> bool {
    is_unreserved(b)
        || is_sub_delim(b)
        || matches!(b, b':' | b'/' | b'?' | b'#' | b'[' | b']' | b'@' | b'%')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_url() {
        let url = Url::parse("http://www.example.com:8080/path/to?query=value&x=1");
        assert_eq!(url.scheme(), Some("http"));
        assert_eq!(url.host(), Some("www.example.com"));
        assert_eq!(url.port(), Some(8080));
        assert_eq!(url.path(), Some("/path/to"));
        assert_eq!(url.query(), Some("query=value&x=1"));
    }

    #[test]
    fn test_absent_components() {
        let url = Url::parse("https://example.com");
        assert_eq!(url.scheme(), Some("https"));
        assert_eq!(url.host(), Some("example.com"));
        assert_eq!(url.port(), None);
        assert_eq!(url.path(), None);
        assert_eq!(url.query(), None);
    }

    #[test]
    fn test_empty_query_is_present() {
        let url = Url::parse("http://h/?");
        assert_eq!(url.path(), Some("/"));
        assert_eq!(url.query(), Some(""));
    }

    #[test]
    fn test_empty_port_is_absent() {
        let url = Url::parse("http://h:/x");
        assert_eq!(url.host(), Some("h"));
        assert_eq!(url.port(), None);
    }

    #[test]
    fn test_fragment_dropped() {
        let url = Url::parse("http://h/a?b=c#frag");
        assert_eq!(url.path(), Some("/a"));
        assert_eq!(url.query(), Some("b=c"));
    }

    #[test]
    fn test_userinfo_dropped() {
        let url = Url::parse("http://user:pw@h:81/");
        assert_eq!(url.host(), Some("h"));
        assert_eq!(url.port(), Some(81));
    }

    #[test]
    fn test_ipv6_literal() {
        let url = Url::parse("http://[::1]:9000/x");
        assert_eq!(url.host(), Some("::1"));
        assert_eq!(url.port(), Some(9000));
        assert_eq!(url.to_string(), "http://[::1]:9000/x");
    }

    #[test]
    fn test_relative_reference() {
        let url = Url::parse("/only/path?k=v");
        assert_eq!(url.scheme(), None);
        assert_eq!(url.host(), None);
        assert_eq!(url.path(), Some("/only/path"));
        assert_eq!(url.query(), Some("k=v"));
    }

    #[test]
    fn test_port_bounds() {
        assert_eq!(Url::parse("http://h:0/").port(), Some(0));
        assert_eq!(Url::parse("http://h:65535/").port(), Some(65535));
        assert!(Url::parse("http://h:65536/").is_empty());
        assert!(Url::parse("http://h:100000/").is_empty());
        assert_eq!(Url::parse("http://h:000080/x").port(), Some(80));
        assert_eq!(Url::parse("http://h:00000000065535/").port(), Some(65535));
        assert!(Url::parse("http://h:0000065536/").is_empty());
        assert_eq!(Url::parse("http://h:0000000/").port(), Some(0));
    }

    #[test]
    fn test_malformed_yields_nothing() {
        for input in [
            "http://exa mple.com/",
            "http://h:abc/",
            "1http://h/",
            "http://[::1/",
            "http://h/pa[th",
            "http://h/\u{e9}",
            "http://h/\"quoted\"",
        ] {
            let url = Url::parse(input);
            assert!(url.is_empty(), "{} should not parse", input);
        }
    }

    #[test]
    fn test_reconstruct_is_idempotent() {
        for input in [
            "http://www.example.com:80/",
            "https://example.com/a/b?c=d&e=f",
            "http://127.0.0.1:3001/post",
            "https://h",
            "http://[fe80::1]/x",
            "ftp://files.example.org:2121/pub",
        ] {
            let first = Url::parse(input);
            assert!(!first.is_empty());
            let second = Url::parse(&first.to_string());
            assert_eq!(first, second, "{}", input);
        }
    }
}
