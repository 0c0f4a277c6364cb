// sluice - SIP call-control engine
// Copyright (C) 2026 The sluice developers
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Task-per-call runtime.
//!
//! Each call runs as one task draining a command queue, so all of its
//! transactions share a single logical execution context and the state
//! machine needs no locks. Separate calls proceed independently.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use smol_str::SmolStr;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use sluice_core::{DialogId, Method, ReqOpts, SipMsg, TransId, TransportKind, UriSet};

use crate::{
    env::{CallEnv, DialogError},
    timers::TimerKind,
    uac, Call, CallConfig, TransFrom,
};

/// Commands accepted by a call actor.
#[derive(Debug)]
pub enum CallCmd {
    /// Create a client transaction for `request` and send it.
    Start {
        request: SipMsg,
        transport: TransportKind,
        opts: ReqOpts,
    },
    /// Fork `request` over `uri_set` on behalf of server transaction
    /// `parent`.
    Fork {
        parent: TransId,
        request: SipMsg,
        uri_set: UriSet,
        transport: TransportKind,
        opts: ReqOpts,
    },
    /// A response arrived for transaction `trans`.
    Response { trans: TransId, msg: SipMsg },
    /// A scheduled timer fired.
    Timer {
        trans: TransId,
        kind: TimerKind,
        gen: u64,
    },
    /// Request cancellation of an INVITE transaction.
    Cancel { trans: TransId },
}

/// Clonable scheduler handed to each call's environment; timer fires loop
/// back into the owning call's queue.
#[derive(Clone)]
pub struct TimerSched {
    tx: mpsc::UnboundedSender<CallCmd>,
}

impl TimerSched {
    pub fn schedule(&self, trans: TransId, kind: TimerKind, gen: u64, after: Duration) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            // The call may be gone by now; a dead queue is fine.
            let _ = tx.send(CallCmd::Timer { trans, kind, gen });
        });
    }
}

/// Dialog-side entry point used by the spawned hangup task.
pub trait DialogInvoker: Send + Sync {
    fn invoke(&self, dialog: &DialogId, method: Method, opts: &ReqOpts) -> Result<(), DialogError>;
}

/// Accepts a surplus forked 2xx and immediately terminates it, off the call
/// actor. Failures only produce log lines; the primary call is unaffected.
pub fn spawn_hangup(invoker: Arc<dyn DialogInvoker>, dialog: DialogId) {
    tokio::spawn(async move {
        if let Err(err) = invoker.invoke(&dialog, Method::Ack, &ReqOpts::default()) {
            warn!("hangup ACK for {} failed: {}", dialog, err);
        }
        if let Err(err) = invoker.invoke(&dialog, Method::Bye, &ReqOpts::default()) {
            warn!("hangup BYE for {} failed: {}", dialog, err);
        }
    });
}

/// Routes commands to per-call actors, creating them on first use.
pub struct CallManager<E> {
    service: SmolStr,
    config: CallConfig,
    calls: DashMap<SmolStr, mpsc::UnboundedSender<CallCmd>>,
    make_env: Arc<dyn Fn(TimerSched) -> E + Send + Sync>,
}

impl<E: CallEnv + Send + 'static> CallManager<E> {
    /// `make_env` builds one environment per call; it receives the call's
    /// timer scheduler so armed timers find their way back.
    pub fn new(
        service: impl Into<SmolStr>,
        config: CallConfig,
        make_env: Arc<dyn Fn(TimerSched) -> E + Send + Sync>,
    ) -> Self {
        Self {
            service: service.into(),
            config,
            calls: DashMap::new(),
            make_env,
        }
    }

    /// Enqueues a command for `call_id`, spawning the actor when absent.
    pub fn dispatch(&self, call_id: &str, cmd: CallCmd) {
        let tx = self
            .calls
            .entry(SmolStr::new(call_id))
            .or_insert_with(|| self.spawn_call(call_id))
            .clone();
        if tx.send(cmd).is_err() {
            // The actor retired between lookup and send; rebuild it next
            // time around.
            self.calls.remove(call_id);
        }
    }

    /// Drops the actor for `call_id`; its queue drains and the task ends.
    pub fn finish(&self, call_id: &str) {
        self.calls.remove(call_id);
    }

    pub fn active_calls(&self) -> usize {
        self.calls.len()
    }

    fn spawn_call(&self, call_id: &str) -> mpsc::UnboundedSender<CallCmd> {
        let (tx, rx) = mpsc::unbounded_channel();
        let call = Call::new(self.service.clone(), call_id, self.config.clone());
        let env = (self.make_env)(TimerSched { tx: tx.clone() });
        tokio::spawn(run_call(call, env, rx));
        tx
    }
}

async fn run_call<E: CallEnv>(mut call: Call, mut env: E, mut rx: mpsc::UnboundedReceiver<CallCmd>) {
    debug!("call {} actor up", call.call_id);
    while let Some(cmd) = rx.recv().await {
        match cmd {
            CallCmd::Start {
                request,
                transport,
                opts,
            } => {
                let id = call.new_uac_trans(request, transport, TransFrom::User, opts);
                uac::start(&mut call, id, &mut env);
            }
            CallCmd::Fork {
                parent,
                request,
                uri_set,
                transport,
                opts,
            } => {
                uac::start_fork(&mut call, parent, &request, &uri_set, &opts, transport, &mut env);
            }
            CallCmd::Response { trans, msg } => uac::on_response(&mut call, trans, msg, &mut env),
            CallCmd::Timer { trans, kind, gen } => {
                uac::on_timer(&mut call, trans, kind, gen, &mut env)
            }
            CallCmd::Cancel { trans } => uac::cancel(&mut call, trans, &mut env),
        }
        call.prune_finished();
    }
    debug!("call {} actor down", call.call_id);
}
