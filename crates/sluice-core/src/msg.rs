// sluice - SIP call-control engine
// Copyright (C) 2026 The sluice developers
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use smol_str::SmolStr;

use crate::{Headers, Method, TransportKind, Uri, Via};

/// Engine-local message identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MsgId(pub u64);

impl MsgId {
    /// Allocates the next identifier.
    pub fn fresh() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        MsgId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Identifier of a client or server transaction inside a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransId(pub u64);

impl fmt::Display for TransId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Dialog identifier: Call-ID plus the two tags (RFC 3261 §12).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DialogId(pub SmolStr);

impl fmt::Display for DialogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a message entered the engine.
///
/// `socket` names an existing transport association; clearing it forces the
/// transport layer to open or pick a fresh one for the destination.
/// A message with no origin at all was synthesized locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub transport: TransportKind,
    pub remote: SocketAddr,
    pub socket: Option<u64>,
}

/// Message class: request line or status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MsgKind {
    Req(Method),
    Resp { code: u16, reason: SmolStr },
}

/// From / To value: a URI plus its tag parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameAddr {
    pub uri: Uri,
    pub tag: Option<SmolStr>,
}

impl NameAddr {
    pub fn new(uri: Uri) -> Self {
        Self { uri, tag: None }
    }

    pub fn with_tag(uri: Uri, tag: impl Into<SmolStr>) -> Self {
        Self {
            uri,
            tag: Some(tag.into()),
        }
    }
}

/// CSeq header: sequence number and method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CSeq {
    pub num: u32,
    pub method: Method,
}

/// A SIP message.
///
/// Dedicated fields model the headers the engine routes on; everything else
/// stays in `headers`. Responses keep `ruri` as `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SipMsg {
    pub id: MsgId,
    pub kind: MsgKind,
    pub ruri: Option<Uri>,
    pub from: NameAddr,
    pub to: NameAddr,
    pub call_id: SmolStr,
    pub cseq: CSeq,
    /// Via stack, top (most recent hop) first.
    pub vias: Vec<Via>,
    pub max_forwards: Option<u32>,
    pub headers: Headers,
    pub body: Bytes,
    pub origin: Option<Origin>,
}

impl SipMsg {
    /// Builds a request skeleton. Extension slots of the target URI are
    /// cleared, keeping the Request-URI invariant.
    pub fn request(method: Method, ruri: Uri, from: NameAddr, to: NameAddr) -> Self {
        let cseq_method = method.clone();
        Self {
            id: MsgId::fresh(),
            kind: MsgKind::Req(method),
            ruri: Some(ruri.into_request_uri()),
            from,
            to,
            call_id: SmolStr::default(),
            cseq: CSeq {
                num: 1,
                method: cseq_method,
            },
            vias: Vec::new(),
            max_forwards: Some(70),
            headers: Headers::new(),
            body: Bytes::new(),
            origin: None,
        }
    }

    /// Builds a response to `req` with the given status. The Via stack,
    /// From, To, Call-ID and CSeq are copied from the request; the origin is
    /// left empty, marking the message as locally synthesized.
    pub fn response_to(req: &SipMsg, code: u16, reason: impl Into<SmolStr>) -> Self {
        debug_assert!(req.is_request());
        Self {
            id: MsgId::fresh(),
            kind: MsgKind::Resp {
                code,
                reason: reason.into(),
            },
            ruri: None,
            from: req.from.clone(),
            to: req.to.clone(),
            call_id: req.call_id.clone(),
            cseq: req.cseq.clone(),
            vias: req.vias.clone(),
            max_forwards: None,
            headers: Headers::new(),
            body: Bytes::new(),
            origin: None,
        }
    }

    pub fn is_request(&self) -> bool {
        matches!(self.kind, MsgKind::Req(_))
    }

    /// Status code for responses, `None` for requests.
    pub fn code(&self) -> Option<u16> {
        match &self.kind {
            MsgKind::Resp { code, .. } => Some(*code),
            MsgKind::Req(_) => None,
        }
    }

    /// Request method, or the CSeq method for responses.
    pub fn method(&self) -> &Method {
        match &self.kind {
            MsgKind::Req(m) => m,
            MsgKind::Resp { .. } => &self.cseq.method,
        }
    }

    pub fn from_tag(&self) -> Option<&str> {
        self.from.tag.as_deref()
    }

    pub fn to_tag(&self) -> Option<&str> {
        self.to.tag.as_deref()
    }

    pub fn set_to_tag(&mut self, tag: impl Into<SmolStr>) {
        self.to.tag = Some(tag.into());
    }

    /// `true` when the message was synthesized locally rather than received
    /// from the wire.
    pub fn is_local(&self) -> bool {
        self.origin.is_none()
    }

    pub fn top_via(&self) -> Option<&Via> {
        self.vias.first()
    }

    /// Removes and returns the top Via.
    pub fn pop_via(&mut self) -> Option<Via> {
        if self.vias.is_empty() {
            None
        } else {
            Some(self.vias.remove(0))
        }
    }

    pub fn push_via(&mut self, via: Via) {
        self.vias.insert(0, via);
    }

    /// Dialog identifier, defined once both tags exist.
    pub fn dialog_id(&self) -> Option<DialogId> {
        let from = self.from_tag()?;
        let to = self.to_tag()?;
        Some(DialogId(SmolStr::new(format!(
            "{}:{}:{}",
            self.call_id, from, to
        ))))
    }
}
