// sluice - SIP call-control engine
// Copyright (C) 2026 The sluice developers
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Message model for the sluice SIP call-control engine.
//!
//! This crate holds the passive data types the engine routes on: URIs with
//! their extension slots, ordered headers, Via values, the [`SipMsg`]
//! message record, and the symbolic [`ReplySpec`] replies that components
//! hand back instead of formatting responses themselves.

pub mod headers;
pub mod method;
pub mod msg;
pub mod opts;
pub mod reply;
pub mod uri;
pub mod uri_set;
pub mod via;

pub use headers::{token_list, tokens, Header, Headers};
pub use method::Method;
pub use msg::{CSeq, DialogId, MsgId, MsgKind, NameAddr, Origin, SipMsg, TransId};
pub use opts::{ReqOpts, SendOpts};
pub use reply::{ReplyField, ReplySpec};
pub use uri::{parse_uris, Scheme, Uri};
pub use uri_set::{UriInput, UriSet};
pub use via::{TransportKind, Via};
