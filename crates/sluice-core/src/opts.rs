// sluice - SIP call-control engine
// Copyright (C) 2026 The sluice developers
// SPDX-License-Identifier: Apache-2.0 OR MIT

/// Per-request processing options.
///
/// Carried from the routing decision into the client transactions it spawns;
/// service hooks may rewrite them in flight.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReqOpts {
    /// Relay without keeping transaction state.
    pub stateless: bool,
    /// Skip dialog bookkeeping for this transaction.
    pub no_dialog: bool,
    /// Acknowledge 2xx INVITE answers automatically.
    pub auto_2xx_ack: bool,
    /// Require the peer to have listed `path` in `Supported`.
    pub path: bool,
    /// Stay on the signaling path via Record-Route.
    pub record_route: bool,
}

/// Options handed to the transport with each send.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendOpts {
    /// Insert a Via whose branch is computed deterministically from the
    /// message, so responses can be matched without stored state.
    pub stateless_via: bool,
}
