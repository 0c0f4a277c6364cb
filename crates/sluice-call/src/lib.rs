// sluice - SIP call-control engine
// Copyright (C) 2026 The sluice developers
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Call aggregate state and the UAC response state machine.
//!
//! A [`Call`] owns every transaction spawned for one Call-ID and is driven
//! as a single cooperative actor: commands arrive in order, each one runs
//! the synchronous state machine in [`uac`], and side effects go through the
//! [`env::CallEnv`] collaborators. The [`manager`] module provides the
//! task-per-call runtime.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use rand::{distributions::Alphanumeric, Rng};
use smol_str::SmolStr;

use sluice_core::{DialogId, Method, MsgId, ReqOpts, SipMsg, TransId, TransportKind};

pub mod env;
pub mod manager;
pub mod timers;
pub mod uac;

pub use env::{CallEnv, DialogError, HookFlow, TransportError};
pub use manager::{spawn_hangup, CallCmd, CallManager, DialogInvoker, TimerSched};
pub use timers::{TimerConfig, TimerKind, TimerTable};

/// Lifecycle of a client transaction.
///
/// The `Invite*` family follows RFC 3261 §17.1.1 extended with the RFC 6026
/// `Accepted` state; the plain family follows §17.1.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransStatus {
    InviteCalling,
    InviteProceeding,
    InviteAccepted,
    InviteCompleted,
    Trying,
    Proceeding,
    Completed,
    Finished,
}

impl TransStatus {
    /// Initial status for a transaction of the given method.
    pub fn initial(method: &Method) -> Self {
        if method.is_invite() {
            TransStatus::InviteCalling
        } else {
            TransStatus::Trying
        }
    }

    pub fn is_finished(self) -> bool {
        matches!(self, TransStatus::Finished)
    }
}

/// Who started a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransFrom {
    /// Direct API caller.
    User,
    /// Child of a forked server transaction.
    Fork(TransId),
}

impl TransFrom {
    pub fn is_fork(self) -> bool {
        matches!(self, TransFrom::Fork(_))
    }
}

/// Cancellation intent for an INVITE transaction.
///
/// `ToCancel` is set before any provisional has arrived; the state machine
/// converts it into an actual CANCEL on the next provisional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CancelState {
    #[default]
    None,
    ToCancel,
    Cancelled,
}

/// One client transaction.
#[derive(Debug, Clone)]
pub struct Trans {
    pub id: TransId,
    pub method: Method,
    pub transport: TransportKind,
    pub from: TransFrom,
    pub opts: ReqOpts,
    pub status: TransStatus,
    pub request: Option<SipMsg>,
    pub response: Option<SipMsg>,
    pub code: u16,
    pub start: Instant,
    pub cancel: CancelState,
    /// Distinct To-tags seen, primary first.
    pub to_tags: Vec<SmolStr>,
    pub timers: TimerTable,
    /// Current retransmission interval; doubles up to T2 on each fire.
    pub retrans_interval: Duration,
}

impl Trans {
    pub fn new(
        id: TransId,
        request: SipMsg,
        transport: TransportKind,
        from: TransFrom,
        opts: ReqOpts,
    ) -> Self {
        let method = request.method().clone();
        Self {
            id,
            status: TransStatus::initial(&method),
            method,
            transport,
            from,
            opts,
            request: Some(request),
            response: None,
            code: 0,
            start: Instant::now(),
            cancel: CancelState::None,
            to_tags: Vec::new(),
            timers: TimerTable::new(),
            retrans_interval: Duration::ZERO,
        }
    }

    /// The To-tag of the first final response, once one arrived.
    pub fn primary_tag(&self) -> Option<&SmolStr> {
        self.to_tags.first()
    }
}

/// Entry in the call's recent-message log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsgLogEntry {
    pub msg: MsgId,
    pub trans: TransId,
    pub dialog: Option<DialogId>,
}

/// Per-call configuration.
#[derive(Debug, Clone)]
pub struct CallConfig {
    pub timers: TimerConfig,
    /// Hard wall-clock bound on any transaction's lifetime.
    pub trans_time: Duration,
    /// Bound on the recent-message log.
    pub msg_log_cap: usize,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            timers: TimerConfig::default(),
            trans_time: Duration::from_secs(900),
            msg_log_cap: 100,
        }
    }
}

/// Aggregate state for one Call-ID.
#[derive(Debug)]
pub struct Call {
    pub service: SmolStr,
    pub call_id: SmolStr,
    pub config: CallConfig,
    pub trans: HashMap<TransId, Trans>,
    /// Recent messages, most recent first.
    pub msg_log: VecDeque<MsgLogEntry>,
    next_trans: u64,
}

impl Call {
    pub fn new(service: impl Into<SmolStr>, call_id: impl Into<SmolStr>, config: CallConfig) -> Self {
        Self {
            service: service.into(),
            call_id: call_id.into(),
            config,
            trans: HashMap::new(),
            msg_log: VecDeque::new(),
            next_trans: 0,
        }
    }

    fn next_trans_id(&mut self) -> TransId {
        self.next_trans += 1;
        TransId(self.next_trans)
    }

    /// Creates a client transaction for `request` and stores it.
    pub fn new_uac_trans(
        &mut self,
        request: SipMsg,
        transport: TransportKind,
        from: TransFrom,
        opts: ReqOpts,
    ) -> TransId {
        let id = self.next_trans_id();
        let trans = Trans::new(id, request, transport, from, opts);
        self.trans.insert(id, trans);
        id
    }

    /// Records a processed message, pruning the oldest entries past the cap.
    pub fn log_msg(&mut self, msg: MsgId, trans: TransId, dialog: Option<DialogId>) {
        self.msg_log.push_front(MsgLogEntry { msg, trans, dialog });
        self.msg_log.truncate(self.config.msg_log_cap);
    }

    /// Drops transactions that reached `Finished`.
    pub fn prune_finished(&mut self) {
        self.trans.retain(|_, t| !t.status.is_finished());
    }
}

/// Generates an RFC 3261 magic-cookie branch identifier.
pub fn generate_branch() -> SmolStr {
    SmolStr::new(format!("z9hG4bK{}", random_token(16)))
}

/// Generates a From/To tag.
pub fn generate_tag() -> SmolStr {
    random_token(12)
}

fn random_token(len: usize) -> SmolStr {
    let mut rng = rand::thread_rng();
    let token: String = (&mut rng)
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect();
    SmolStr::new(token)
}
