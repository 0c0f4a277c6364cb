// sluice - SIP call-control engine
// Copyright (C) 2026 The sluice developers
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Routing decision for proxied requests (RFC 3261 §16).
//!
//! [`route`] turns caller-supplied destinations into either a forked set of
//! client transactions or a stateless relay. The caller's service hook sits
//! in the middle and may rewrite or consume the request.

pub mod stateless;
pub mod targets;
pub mod validate;

use smol_str::SmolStr;
use tracing::debug;

use sluice_core::{tokens, Method, ReplySpec, ReqOpts, UriInput, UriSet};

use sluice_call::{env::HookFlow, CallEnv, Call, Trans};

/// Outcome of a routing decision, consumed by the transaction manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// Spawn child client transactions over `uri_set`.
    Fork { uri_set: UriSet, opts: ReqOpts },
    /// Answer the request with `spec`.
    Reply(ReplySpec),
    /// Handled here (relayed statelessly or consumed by a hook).
    NoReply,
}

/// Decides how to forward the request held by the server transaction `uas`.
///
/// The destination input is normalized, offered to the routing hook,
/// validated, and then classified: ACK forwards without a reply either way;
/// everything else forks statefully unless the options ask for a stateless
/// relay. Requests demanding proxy extensions are refused — this proxy
/// implements none.
pub fn route(
    input: &UriInput,
    opts: ReqOpts,
    uas: &mut Trans,
    call: &mut Call,
    env: &mut dyn CallEnv,
) -> RouteDecision {
    let mut uri_set = targets::normalize(input);
    if uri_set.is_empty() {
        return RouteDecision::Reply(ReplySpec::TemporarilyUnavailable);
    }

    let mut opts = opts;
    match env.hook_route(&mut uri_set, &mut opts, uas, call) {
        HookFlow::Continue => {}
        HookFlow::Reply(spec) => return RouteDecision::Reply(spec),
        HookFlow::Handled => return RouteDecision::NoReply,
    }

    let Some(req) = uas.request.clone() else {
        return RouteDecision::Reply(ReplySpec::InvalidRequest);
    };
    let req = match validate::check(&req, &opts) {
        Ok(req) => req,
        Err(spec) => return RouteDecision::Reply(spec),
    };
    uas.request = Some(req.clone());

    if *req.method() == Method::Ack {
        return if opts.stateless {
            match uri_set.first() {
                Some(uri) => {
                    match stateless::relay_request(&req, uri, &opts, env) {
                        Some(spec) => RouteDecision::Reply(spec),
                        None => RouteDecision::NoReply,
                    }
                }
                None => RouteDecision::Reply(ReplySpec::TemporarilyUnavailable),
            }
        } else {
            RouteDecision::Fork { uri_set, opts }
        };
    }

    let required = tokens(&req.headers, "Proxy-Require");
    if !required.is_empty() {
        let joined = required
            .iter()
            .map(SmolStr::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        debug!("refusing Proxy-Require: {}", joined);
        return RouteDecision::Reply(ReplySpec::BadExtension(SmolStr::new(joined)));
    }

    if opts.stateless {
        match uri_set.first() {
            Some(uri) => match stateless::relay_request(&req, uri, &opts, env) {
                Some(spec) => RouteDecision::Reply(spec),
                None => RouteDecision::NoReply,
            },
            None => RouteDecision::Reply(ReplySpec::TemporarilyUnavailable),
        }
    } else {
        RouteDecision::Fork { uri_set, opts }
    }
}
