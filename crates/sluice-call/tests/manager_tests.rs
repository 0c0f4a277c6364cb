// sluice - SIP call-control engine
// Copyright (C) 2026 The sluice developers
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The task-per-call runtime wired to a shared recording environment.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use smol_str::SmolStr;

use sluice_call::{
    env::{CallEnv, DialogError, HookFlow, TransportError},
    CallCmd, CallConfig, CallManager, TimerConfig, TimerKind, TimerSched, Trans,
};
use sluice_core::{
    DialogId, Method, MsgId, NameAddr, Origin, ReqOpts, SendOpts, SipMsg, TransId, TransportKind,
    Uri, UriSet, Via,
};

#[derive(Default)]
struct Log {
    sent: Vec<SipMsg>,
    resent: Vec<SipMsg>,
    replies: Vec<u16>,
}

#[derive(Clone)]
struct SharedEnv {
    sched: TimerSched,
    log: Arc<Mutex<Log>>,
}

impl CallEnv for SharedEnv {
    fn send_request(&mut self, req: &SipMsg, _opts: SendOpts) -> Result<SipMsg, TransportError> {
        self.log.lock().unwrap().sent.push(req.clone());
        Ok(req.clone())
    }

    fn resend_request(&mut self, msg: &SipMsg) -> Result<(), TransportError> {
        self.log.lock().unwrap().resent.push(msg.clone());
        Ok(())
    }

    fn send_response(&mut self, _resp: &SipMsg) -> Result<(), TransportError> {
        Ok(())
    }

    fn dialog_update(
        &mut self,
        _req: &SipMsg,
        _resp: &SipMsg,
        _is_proxy: bool,
        _call: &mut sluice_call::Call,
    ) {
    }

    fn dialog_auth_update(
        &mut self,
        _dialog: &DialogId,
        _resp: &SipMsg,
        _call: &mut sluice_call::Call,
    ) {
    }

    fn remove_prov_event(&mut self, _req: &SipMsg, _call: &mut sluice_call::Call) {}

    fn dialog_invoke(
        &mut self,
        _dialog: &DialogId,
        _method: Method,
        _opts: &ReqOpts,
    ) -> Result<(), DialogError> {
        Ok(())
    }

    fn hook_route(
        &mut self,
        _uri_set: &mut UriSet,
        _opts: &mut ReqOpts,
        _uas: &mut Trans,
        _call: &mut sluice_call::Call,
    ) -> HookFlow {
        HookFlow::Continue
    }

    fn hook_uac_response(
        &mut self,
        _resp: &mut SipMsg,
        _trans: &Trans,
        _call: &mut sluice_call::Call,
    ) -> HookFlow {
        HookFlow::Continue
    }

    fn reply(&mut self, resp: &SipMsg, _trans: &Trans) {
        if let Some(code) = resp.code() {
            self.log.lock().unwrap().replies.push(code);
        }
    }

    fn schedule_timer(&mut self, trans: TransId, kind: TimerKind, gen: u64, after: Duration) {
        self.sched.schedule(trans, kind, gen, after);
    }

    fn spawn_dialog_hangup(&mut self, _dialog: DialogId) {}
}

fn make_request(method: Method) -> SipMsg {
    let mut req = SipMsg::request(
        method,
        Uri::parse("sip:bob@far.example.com").unwrap(),
        NameAddr::with_tag(Uri::parse("sip:alice@near.example.net").unwrap(), "from1"),
        NameAddr::new(Uri::parse("sip:bob@far.example.com").unwrap()),
    );
    req.call_id = SmolStr::new("mgr-test-call");
    req.push_via(Via::parse("SIP/2.0/UDP near.example.net;branch=z9hG4bKmgr").unwrap());
    req
}

fn wire_response(req: &SipMsg, code: u16, tag: &str) -> SipMsg {
    let mut resp = SipMsg::response_to(req, code, "Reason");
    resp.id = MsgId::fresh();
    resp.set_to_tag(tag);
    resp.origin = Some(Origin {
        transport: TransportKind::Udp,
        remote: "192.0.2.1:5060".parse().unwrap(),
        socket: Some(3),
    });
    resp
}

fn manager_with_log(config: CallConfig) -> (CallManager<SharedEnv>, Arc<Mutex<Log>>) {
    let log = Arc::new(Mutex::new(Log::default()));
    let log2 = log.clone();
    let manager = CallManager::new(
        "svc",
        config,
        Arc::new(move |sched| SharedEnv {
            sched,
            log: log2.clone(),
        }),
    );
    (manager, log)
}

#[tokio::test]
async fn responses_flow_through_the_call_actor() {
    let (manager, log) = manager_with_log(CallConfig::default());
    let req = make_request(Method::Invite);

    manager.dispatch(
        "mgr-test-call",
        CallCmd::Start {
            request: req.clone(),
            transport: TransportKind::Udp,
            opts: ReqOpts::default(),
        },
    );
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(log.lock().unwrap().sent.len(), 1);
    assert_eq!(manager.active_calls(), 1);

    // The first transaction of a fresh call gets id 1.
    manager.dispatch(
        "mgr-test-call",
        CallCmd::Response {
            trans: TransId(1),
            msg: wire_response(&req, 180, "t1"),
        },
    );
    manager.dispatch(
        "mgr-test-call",
        CallCmd::Response {
            trans: TransId(1),
            msg: wire_response(&req, 200, "t1"),
        },
    );
    tokio::time::sleep(Duration::from_millis(50)).await;

    let log = log.lock().unwrap();
    assert_eq!(log.replies, vec![180, 200]);
}

#[tokio::test]
async fn armed_retransmission_timer_fires_through_the_queue() {
    let config = CallConfig {
        timers: TimerConfig {
            t1: Duration::from_millis(10),
            ..TimerConfig::default()
        },
        ..CallConfig::default()
    };
    let (manager, log) = manager_with_log(config);

    manager.dispatch(
        "mgr-test-call",
        CallCmd::Start {
            request: make_request(Method::Options),
            transport: TransportKind::Udp,
            opts: ReqOpts::default(),
        },
    );
    tokio::time::sleep(Duration::from_millis(120)).await;

    let log = log.lock().unwrap();
    assert!(
        !log.resent.is_empty(),
        "retransmission timer should have fired at least once"
    );
}

#[tokio::test]
async fn separate_calls_get_separate_actors() {
    let (manager, _log) = manager_with_log(CallConfig::default());
    for call_id in ["call-a", "call-b"] {
        manager.dispatch(
            call_id,
            CallCmd::Start {
                request: make_request(Method::Options),
                transport: TransportKind::Udp,
                opts: ReqOpts::default(),
            },
        );
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(manager.active_calls(), 2);
    manager.finish("call-a");
    assert_eq!(manager.active_calls(), 1);
}
