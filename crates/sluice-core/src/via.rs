// sluice - SIP call-control engine
// Copyright (C) 2026 The sluice developers
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::collections::BTreeMap;
use std::fmt;

use smol_str::SmolStr;

/// Transport protocol carried in a Via header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Udp,
    Tcp,
    Tls,
}

impl TransportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransportKind::Udp => "UDP",
            TransportKind::Tcp => "TCP",
            TransportKind::Tls => "TLS",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        if token.eq_ignore_ascii_case("UDP") {
            Some(TransportKind::Udp)
        } else if token.eq_ignore_ascii_case("TCP") {
            Some(TransportKind::Tcp)
        } else if token.eq_ignore_ascii_case("TLS") {
            Some(TransportKind::Tls)
        } else {
            None
        }
    }

    /// Reliable transports deliver without retransmission (RFC 3261 §17.1.2.2).
    pub fn is_reliable(self) -> bool {
        !matches!(self, TransportKind::Udp)
    }
}

/// One Via header value (RFC 3261 §20.42).
///
/// The stack on a message is ordered top to bottom; the top entry names the
/// hop that expects the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Via {
    pub transport: TransportKind,
    /// `host` or `host:port` as written on the wire.
    pub sent_by: SmolStr,
    pub params: BTreeMap<SmolStr, Option<SmolStr>>,
}

impl Via {
    pub fn new(transport: TransportKind, sent_by: impl Into<SmolStr>) -> Self {
        Self {
            transport,
            sent_by: sent_by.into(),
            params: BTreeMap::new(),
        }
    }

    /// Parses `SIP/2.0/UDP host:port;branch=...;received=...`.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        let rest = input.strip_prefix("SIP/2.0/")?;
        let (proto, rest) = rest.split_once(char::is_whitespace)?;
        let transport = TransportKind::from_token(proto)?;

        let mut parts = rest.trim().split(';');
        let sent_by = parts.next()?.trim();
        if sent_by.is_empty() {
            return None;
        }
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
        Some(Self {
            transport,
            sent_by: SmolStr::new(sent_by),
            params,
        })
    }

    fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(|v| v.as_deref())
    }

    /// The `branch` parameter, which identifies the transaction.
    pub fn branch(&self) -> Option<&str> {
        self.param("branch")
    }

    /// Source IP recorded by the receiving hop (`received` parameter).
    pub fn received(&self) -> Option<&str> {
        self.param("received")
    }

    /// Response port requested by the sender (`rport` parameter, RFC 3581).
    /// A flag-only `rport` yields `None` here; it only asks the receiver to
    /// fill the value in.
    pub fn rport(&self) -> Option<u16> {
        self.param("rport").and_then(|v| v.parse().ok())
    }

    pub fn set_param(&mut self, name: &str, value: Option<&str>) {
        self.params
            .insert(SmolStr::new(name), value.map(SmolStr::new));
    }

    /// Port from the `sent-by` component, if one was written.
    pub fn sent_by_port(&self) -> Option<u16> {
        let s = self.sent_by.as_str();
        let rest = s.strip_prefix('[').map(|r| r.split_once(']'));
        match rest {
            Some(Some((_, after))) => after.strip_prefix(':')?.parse().ok(),
            Some(None) => None,
            None => s.rsplit_once(':')?.1.parse().ok(),
        }
    }
}

impl fmt::Display for Via {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SIP/2.0/{} {}", self.transport.as_str(), self.sent_by)?;
        for (k, v) in &self.params {
            match v {
                Some(v) => write!(f, ";{}={}", k, v)?,
                None => write!(f, ";{}", k)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_via_with_params() {
        let via = Via::parse("SIP/2.0/UDP host.example.com:5060;branch=z9hG4bKabc;rport=4321")
            .unwrap();
        assert_eq!(via.transport, TransportKind::Udp);
        assert_eq!(via.sent_by.as_str(), "host.example.com:5060");
        assert_eq!(via.branch(), Some("z9hG4bKabc"));
        assert_eq!(via.rport(), Some(4321));
        assert_eq!(via.sent_by_port(), Some(5060));
    }

    #[test]
    fn flag_rport_reads_as_none() {
        let via = Via::parse("SIP/2.0/UDP host;rport;branch=z9hG4bKx").unwrap();
        assert_eq!(via.rport(), None);
        assert!(via.params.contains_key("rport"));
    }

    #[test]
    fn rejects_unknown_transport_and_missing_host() {
        assert!(Via::parse("SIP/2.0/CARRIER host").is_none());
        assert!(Via::parse("SIP/2.0/UDP ").is_none());
    }

    #[test]
    fn reliability_split() {
        assert!(!TransportKind::Udp.is_reliable());
        assert!(TransportKind::Tcp.is_reliable());
        assert!(TransportKind::Tls.is_reliable());
    }

    #[test]
    fn display_keeps_params() {
        let via = Via::parse("SIP/2.0/TCP h:5061;branch=z9hG4bKq").unwrap();
        assert_eq!(via.to_string(), "SIP/2.0/TCP h:5061;branch=z9hG4bKq");
    }
}
