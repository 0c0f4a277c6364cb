// sluice - SIP call-control engine
// Copyright (C) 2026 The sluice developers
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::collections::BTreeMap;
use std::fmt;

use percent_encoding::percent_decode_str;
use smol_str::SmolStr;

/// URI scheme accepted by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Sip,
    Sips,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Sip => "sip",
            Scheme::Sips => "sips",
        }
    }
}

/// Parsed SIP URI (RFC 3261 §19.1).
///
/// `params` and `headers` belong to the URI itself. `ext_opts` and
/// `ext_headers` hold parameters and headers written *outside* the
/// angle brackets of a name-addr form; they describe how a peer wants the
/// URI handled rather than being part of the address. A URI placed in a
/// request line must have both extension slots empty — see
/// [`Uri::strip_extensions`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uri {
    pub scheme: Scheme,
    pub user: Option<SmolStr>,
    pub host: SmolStr,
    pub port: Option<u16>,
    pub params: BTreeMap<SmolStr, Option<SmolStr>>,
    pub headers: BTreeMap<SmolStr, SmolStr>,
    pub ext_opts: BTreeMap<SmolStr, Option<SmolStr>>,
    pub ext_headers: BTreeMap<SmolStr, SmolStr>,
}

impl Uri {
    /// Builds a bare `sip:` URI for the given host.
    pub fn new(host: impl Into<SmolStr>) -> Self {
        Self {
            scheme: Scheme::Sip,
            user: None,
            host: host.into(),
            port: None,
            params: BTreeMap::new(),
            headers: BTreeMap::new(),
            ext_opts: BTreeMap::new(),
            ext_headers: BTreeMap::new(),
        }
    }

    /// Parses one URI, in either plain (`sip:user@host;p=v`) or name-addr
    /// (`"Name" <sip:user@host>;p=v`) form. Display names are discarded.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }
        match input.find('<') {
            Some(open) => {
                let close = input.find('>')?;
                if close < open {
                    return None;
                }
                let mut uri = Self::parse_plain(&input[open + 1..close])?;
                let (ext_opts, ext_headers) = parse_trailer(&input[close + 1..])?;
                uri.ext_opts = ext_opts;
                uri.ext_headers = ext_headers;
                Some(uri)
            }
            None => Self::parse_plain(input),
        }
    }

    fn parse_plain(input: &str) -> Option<Self> {
        let (scheme, rest) = input.split_once(':')?;
        let scheme = if scheme.eq_ignore_ascii_case("sip") {
            Scheme::Sip
        } else if scheme.eq_ignore_ascii_case("sips") {
            Scheme::Sips
        } else {
            return None;
        };

        let (addr, headers_part) = match rest.split_once('?') {
            Some((a, h)) => (a, Some(h)),
            None => (rest, None),
        };

        let mut parts = addr.split(';');
        let base = parts.next()?.trim();
        let mut params = BTreeMap::new();
        for p in parts {
            let p = p.trim();
            if p.is_empty() {
                continue;
            }
            match p.split_once('=') {
                Some((k, v)) => params.insert(
                    SmolStr::new(k.trim().to_ascii_lowercase()),
                    Some(SmolStr::new(v.trim())),
                ),
                None => params.insert(SmolStr::new(p.to_ascii_lowercase()), None),
            };
        }

        let (user, host_port) = match base.rsplit_once('@') {
            Some((u, hp)) => {
                let decoded = percent_decode_str(u.trim()).decode_utf8().ok()?;
                (Some(SmolStr::new(decoded.as_ref())), hp.trim())
            }
            None => (None, base),
        };
        if host_port.is_empty() {
            return None;
        }

        let (host, port) = split_host_port(host_port)?;
        let mut headers = BTreeMap::new();
        if let Some(hs) = headers_part {
            for pair in hs.split('&').filter(|p| !p.is_empty()) {
                let (k, v) = pair.split_once('=')?;
                headers.insert(SmolStr::new(k.trim()), SmolStr::new(v.trim()));
            }
        }

        Some(Self {
            scheme,
            user,
            host: SmolStr::new(host.to_ascii_lowercase()),
            port,
            params,
            headers,
            ext_opts: BTreeMap::new(),
            ext_headers: BTreeMap::new(),
        })
    }

    /// Value of the `transport` URI parameter, if present.
    pub fn transport(&self) -> Option<&str> {
        self.params
            .get("transport")
            .and_then(|v| v.as_deref())
    }

    /// Clears both extension slots, making the URI usable as a Request-URI.
    pub fn strip_extensions(&mut self) {
        self.ext_opts.clear();
        self.ext_headers.clear();
    }

    /// Consuming variant of [`Uri::strip_extensions`].
    pub fn into_request_uri(mut self) -> Self {
        self.strip_extensions();
        self
    }

    /// `true` when both extension slots are empty.
    pub fn is_request_uri(&self) -> bool {
        self.ext_opts.is_empty() && self.ext_headers.is_empty()
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bracketed = !self.ext_opts.is_empty() || !self.ext_headers.is_empty();
        if bracketed {
            f.write_str("<")?;
        }
        write!(f, "{}:", self.scheme.as_str())?;
        if let Some(user) = &self.user {
            write!(f, "{}@", user)?;
        }
        f.write_str(&self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        for (k, v) in &self.params {
            match v {
                Some(v) => write!(f, ";{}={}", k, v)?,
                None => write!(f, ";{}", k)?,
            }
        }
        let mut sep = '?';
        for (k, v) in &self.headers {
            write!(f, "{}{}={}", sep, k, v)?;
            sep = '&';
        }
        if bracketed {
            f.write_str(">")?;
            for (k, v) in &self.ext_opts {
                match v {
                    Some(v) => write!(f, ";{}={}", k, v)?,
                    None => write!(f, ";{}", k)?,
                }
            }
            let mut sep = '?';
            for (k, v) in &self.ext_headers {
                write!(f, "{}{}={}", sep, k, v)?;
                sep = '&';
            }
        }
        Ok(())
    }
}

/// Parses a comma-separated list of URIs.
///
/// Commas inside angle brackets or double quotes do not split. Returns
/// `None` when any element fails to parse, so callers can tell a wholly
/// invalid input apart from an empty one.
pub fn parse_uris(input: &str) -> Option<Vec<Uri>> {
    let mut out = Vec::new();
    for piece in split_uri_list(input) {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        out.push(Uri::parse(piece)?);
    }
    if out.is_empty() {
        return None;
    }
    Some(out)
}

/// Parses `;params` and optional `?headers` following a `>` in name-addr form.
fn parse_trailer(
    input: &str,
) -> Option<(BTreeMap<SmolStr, Option<SmolStr>>, BTreeMap<SmolStr, SmolStr>)> {
    let input = input.trim();
    let (params_part, headers_part) = match input.split_once('?') {
        Some((p, h)) => (p, Some(h)),
        None => (input, None),
    };

    let mut opts = BTreeMap::new();
    for p in params_part.split(';') {
        let p = p.trim();
        if p.is_empty() {
            continue;
        }
        match p.split_once('=') {
            Some((k, v)) => opts.insert(
                SmolStr::new(k.trim().to_ascii_lowercase()),
                Some(SmolStr::new(v.trim())),
            ),
            None => opts.insert(SmolStr::new(p.to_ascii_lowercase()), None),
        };
    }

    let mut headers = BTreeMap::new();
    if let Some(hs) = headers_part {
        for pair in hs.split('&').filter(|p| !p.is_empty()) {
            let (k, v) = pair.split_once('=')?;
            headers.insert(SmolStr::new(k.trim()), SmolStr::new(v.trim()));
        }
    }
    Some((opts, headers))
}

fn split_host_port(input: &str) -> Option<(&str, Option<u16>)> {
    if let Some(rest) = input.strip_prefix('[') {
        // IPv6 literal
        let close = rest.find(']')?;
        let host = &rest[..close];
        match rest[close + 1..].strip_prefix(':') {
            Some(port) => Some((host, Some(port.parse().ok()?))),
            None if rest[close + 1..].is_empty() => Some((host, None)),
            None => None,
        }
    } else {
        match input.rsplit_once(':') {
            Some((host, port)) => Some((host, Some(port.parse().ok()?))),
            None => Some((input, None)),
        }
    }
}

/// Splits on commas that sit outside `<...>` and `"..."`.
fn split_uri_list(input: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut depth = 0usize;
    let mut quoted = false;
    let mut start = 0usize;
    for (i, ch) in input.char_indices() {
        match ch {
            '"' => quoted = !quoted,
            '<' if !quoted => depth += 1,
            '>' if !quoted => depth = depth.saturating_sub(1),
            ',' if !quoted && depth == 0 => {
                pieces.push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    pieces.push(&input[start..]);
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_uri() {
        let uri = Uri::parse("sip:alice@example.com:5070;transport=tcp").unwrap();
        assert_eq!(uri.scheme, Scheme::Sip);
        assert_eq!(uri.user.as_deref(), Some("alice"));
        assert_eq!(uri.host.as_str(), "example.com");
        assert_eq!(uri.port, Some(5070));
        assert_eq!(uri.transport(), Some("tcp"));
        assert!(uri.is_request_uri());
    }

    #[test]
    fn parses_name_addr_with_extension_params() {
        let uri = Uri::parse("\"Bob\" <sips:bob@biloxi.com;lr>;expires=60;q=0.8").unwrap();
        assert_eq!(uri.scheme, Scheme::Sips);
        assert!(uri.params.contains_key("lr"));
        assert_eq!(
            uri.ext_opts.get("expires").and_then(|v| v.as_deref()),
            Some("60")
        );
        assert!(!uri.is_request_uri());
    }

    #[test]
    fn strip_extensions_empties_both_slots() {
        let mut uri = Uri::parse("<sip:a@b.com>;tag=x?Replaces=y").unwrap();
        assert!(!uri.is_request_uri());
        uri.strip_extensions();
        assert!(uri.is_request_uri());
        assert!(uri.ext_headers.is_empty());
    }

    #[test]
    fn rejects_foreign_schemes_and_garbage() {
        assert!(Uri::parse("http://example.com").is_none());
        assert!(Uri::parse("not a uri").is_none());
        assert!(Uri::parse("sip:").is_none());
    }

    #[test]
    fn parses_ipv6_host() {
        let uri = Uri::parse("sip:[2001:db8::1]:5060").unwrap();
        assert_eq!(uri.host.as_str(), "2001:db8::1");
        assert_eq!(uri.port, Some(5060));
    }

    #[test]
    fn uri_list_splits_outside_brackets() {
        let uris = parse_uris("<sip:a@x.com>, sip:b@y.com").unwrap();
        assert_eq!(uris.len(), 2);
        assert_eq!(uris[1].user.as_deref(), Some("b"));
    }

    #[test]
    fn uri_list_fails_as_a_whole() {
        assert!(parse_uris("sip:a@x.com, nonsense").is_none());
        assert!(parse_uris("").is_none());
    }

    #[test]
    fn display_round_trips_plain_form() {
        let text = "sip:alice@example.com:5070;lr;transport=tcp";
        let uri = Uri::parse(text).unwrap();
        let printed = uri.to_string();
        assert_eq!(Uri::parse(&printed).unwrap(), uri);
    }
}
