// sluice - SIP call-control engine
// Copyright (C) 2026 The sluice developers
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Stateless relay.
//!
//! Requests go out with a Via whose branch is derived deterministically from
//! the message, so the matching response can be returned without any stored
//! state: pop our Via, read the return address from its `received`/`rport`
//! parameters, and hand the message back to the transport.

use std::net::{IpAddr, SocketAddr};

use tracing::{debug, warn};

use sluice_core::{Origin, ReplySpec, ReqOpts, SendOpts, SipMsg, Uri};

use sluice_call::{env::CallEnv, uac};

/// Forwards `req` to `uri` without creating a transaction.
///
/// A builder rejection is surfaced for the caller to answer; transport
/// failures are logged and swallowed — statelessness means nobody is left
/// to retry.
pub fn relay_request(
    req: &SipMsg,
    uri: &Uri,
    opts: &ReqOpts,
    env: &mut dyn CallEnv,
) -> Option<ReplySpec> {
    let prepared = match uac::proxy_make(req, uri, opts) {
        Ok(prepared) => prepared,
        Err(spec) => return Some(spec),
    };
    let send_opts = SendOpts {
        stateless_via: true,
    };
    if let Err(err) = env.send_request(&prepared, send_opts) {
        warn!("stateless forward of {} to {} failed: {}", req.method(), uri, err);
    }
    None
}

/// Returns a response along the Via trail left by a stateless forward.
pub fn relay_response(mut resp: SipMsg, env: &mut dyn CallEnv) {
    let Some(code) = resp.code() else {
        return;
    };
    if code < 101 {
        // 100 Trying is hop-by-hop and never forwarded.
        debug!("not relaying {}", code);
        return;
    }
    if resp.vias.len() < 2 {
        warn!("response {} has no return Via, dropped", code);
        return;
    }

    let Some(ours) = resp.pop_via() else {
        return;
    };
    let Some(next) = resp.top_via().cloned() else {
        return;
    };

    let Some(ip) = ours.received().and_then(|v| v.parse::<IpAddr>().ok()) else {
        warn!("response {} lacks a usable received address, dropped", code);
        return;
    };
    let port = ours
        .rport()
        .or_else(|| next.sent_by_port())
        .unwrap_or(5060);

    // The socket the request arrived on cannot reach the upstream client;
    // clearing it makes the transport route from scratch.
    resp.origin = Some(Origin {
        transport: next.transport,
        remote: SocketAddr::new(ip, port),
        socket: None,
    });

    if let Err(err) = env.send_response(&resp) {
        warn!("stateless return of {} failed: {}", code, err);
    }
}
