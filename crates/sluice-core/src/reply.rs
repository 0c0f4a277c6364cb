// sluice - SIP call-control engine
// Copyright (C) 2026 The sluice developers
// SPDX-License-Identifier: Apache-2.0 OR MIT

use smol_str::SmolStr;

use crate::SipMsg;

/// Option and capability tokens advertised in generated replies.
pub const SUPPORTED: &str = "path, 100rel, timer";
pub const ALLOW: &str = "INVITE, ACK, CANCEL, BYE, OPTIONS, INFO, UPDATE, SUBSCRIBE, NOTIFY, REFER, MESSAGE";
pub const ACCEPT: &str = "application/sdp";

/// Extra fields a reply spec can ask the formatter to add.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyField {
    Supported,
    Accept,
    Allow,
    ReasonPhrase(SmolStr),
}

/// Symbolic description of an outgoing reply.
///
/// Components describe failures with a spec instead of a full message; the
/// formatter turns the spec into a response for the request at hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplySpec {
    /// 200 with the listed extra fields.
    Ok(Vec<ReplyField>),
    /// 400.
    InvalidRequest,
    /// 420 with an `Unsupported` header naming the offending tokens.
    BadExtension(SmolStr),
    /// 421 with a `Require` header naming the missing extension.
    ExtensionRequired(SmolStr),
    /// 480.
    TemporarilyUnavailable,
    /// 483.
    TooManyHops,
}

impl ReplySpec {
    pub fn code(&self) -> u16 {
        match self {
            ReplySpec::Ok(_) => 200,
            ReplySpec::InvalidRequest => 400,
            ReplySpec::BadExtension(_) => 420,
            ReplySpec::ExtensionRequired(_) => 421,
            ReplySpec::TemporarilyUnavailable => 480,
            ReplySpec::TooManyHops => 483,
        }
    }

    fn default_reason(&self) -> &'static str {
        match self {
            ReplySpec::Ok(_) => "OK",
            ReplySpec::InvalidRequest => "Invalid Request",
            ReplySpec::BadExtension(_) => "Bad Extension",
            ReplySpec::ExtensionRequired(_) => "Extension Required",
            ReplySpec::TemporarilyUnavailable => "Temporarily Unavailable",
            ReplySpec::TooManyHops => "Too Many Hops",
        }
    }
}

/// Builds the response a [`ReplySpec`] describes, addressed to `req`.
pub fn build(req: &SipMsg, spec: &ReplySpec) -> SipMsg {
    let mut reason = SmolStr::new(spec.default_reason());
    if let ReplySpec::Ok(fields) = spec {
        for field in fields {
            if let ReplyField::ReasonPhrase(phrase) = field {
                reason = phrase.clone();
            }
        }
    }

    let mut resp = SipMsg::response_to(req, spec.code(), reason);
    match spec {
        ReplySpec::Ok(fields) => {
            for field in fields {
                match field {
                    ReplyField::Supported => resp.headers.push("Supported", SUPPORTED),
                    ReplyField::Accept => resp.headers.push("Accept", ACCEPT),
                    ReplyField::Allow => resp.headers.push("Allow", ALLOW),
                    ReplyField::ReasonPhrase(_) => {}
                }
            }
        }
        ReplySpec::BadExtension(tokens) => {
            resp.headers.push("Unsupported", tokens.clone());
        }
        ReplySpec::ExtensionRequired(ext) => {
            resp.headers.push("Require", ext.clone());
        }
        _ => {}
    }
    resp
}
