// sluice - SIP call-control engine
// Copyright (C) 2026 The sluice developers
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Collaborator contract for the state machine.
//!
//! The machine itself is synchronous and pure over the [`Call`] value;
//! every outside effect goes through [`CallEnv`]. Transport sends return
//! their result synchronously, though actual I/O may complete elsewhere.

use std::fmt;
use std::time::Duration;

use smol_str::SmolStr;

use sluice_core::{DialogId, Method, ReplySpec, ReqOpts, SendOpts, SipMsg, TransId, UriSet};

use crate::{timers::TimerKind, Call, Trans};

/// Transport-layer failure. The transport owns retransmission; the state
/// machine only logs these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError(pub SmolStr);

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport error: {}", self.0)
    }
}

impl std::error::Error for TransportError {}

/// Dialog-subsystem failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogError(pub SmolStr);

impl fmt::Display for DialogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dialog error: {}", self.0)
    }
}

impl std::error::Error for DialogError {}

/// Outcome of a service hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookFlow {
    /// Proceed with the (possibly rewritten) arguments.
    Continue,
    /// Short-circuit with a reply.
    Reply(ReplySpec),
    /// The hook consumed the event; nothing further to do.
    Handled,
}

/// Everything the state machine asks of the outside world.
///
/// One object per call actor; the machine never holds a reference across
/// suspension points because there are none.
pub trait CallEnv {
    // --- transport ---

    /// Builds the wire form and sends a new request. Returns the request as
    /// sent (Via stamped by the transport).
    fn send_request(&mut self, req: &SipMsg, opts: SendOpts) -> Result<SipMsg, TransportError>;

    /// Re-sends a previously prepared message unchanged (retransmissions,
    /// ACKs).
    fn resend_request(&mut self, msg: &SipMsg) -> Result<(), TransportError>;

    /// Sends a response toward the client recorded in its Via stack.
    fn send_response(&mut self, resp: &SipMsg) -> Result<(), TransportError>;

    // --- dialog subsystem ---

    /// Feeds a request/response pair into dialog bookkeeping.
    fn dialog_update(&mut self, req: &SipMsg, resp: &SipMsg, is_proxy: bool, call: &mut Call);

    /// Refreshes authentication state for a dialog on a 2xx.
    fn dialog_auth_update(&mut self, dialog: &DialogId, resp: &SipMsg, call: &mut Call);

    /// Drops a provisional event subscription after a failed
    /// SUBSCRIBE/REFER.
    fn remove_prov_event(&mut self, req: &SipMsg, call: &mut Call);

    /// Runs an in-dialog request (ACK, BYE) through the dialog subsystem.
    fn dialog_invoke(
        &mut self,
        dialog: &DialogId,
        method: Method,
        opts: &ReqOpts,
    ) -> Result<(), DialogError>;

    // --- service hooks ---

    /// Routing hook; may rewrite the destination set, options, transaction
    /// or call, or short-circuit with a reply.
    fn hook_route(
        &mut self,
        uri_set: &mut UriSet,
        opts: &mut ReqOpts,
        uas: &mut Trans,
        call: &mut Call,
    ) -> HookFlow;

    /// Response hook; may rewrite the response before upward delivery.
    fn hook_uac_response(&mut self, resp: &mut SipMsg, trans: &Trans, call: &mut Call) -> HookFlow;

    // --- upward delivery ---

    /// Delivers a response event to the owning application.
    fn reply(&mut self, resp: &SipMsg, trans: &Trans);

    // --- timers and tasks ---

    /// Schedules a timer fire to be delivered back to this call as
    /// `(trans, kind, gen)` after `after`.
    fn schedule_timer(&mut self, trans: TransId, kind: TimerKind, gen: u64, after: Duration);

    /// Spawns the ACK-then-BYE hangup for a surplus forked answer on an
    /// independent task. Must not call back into this call synchronously.
    fn spawn_dialog_hangup(&mut self, dialog: DialogId);
}
