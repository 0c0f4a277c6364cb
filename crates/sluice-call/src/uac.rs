// sluice - SIP call-control engine
// Copyright (C) 2026 The sluice developers
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Client transaction response processing (RFC 3261 §17.1, RFC 6026).
//!
//! Transactions are taken out of the call map, transformed, and reinserted;
//! every outside effect goes through the [`CallEnv`] collaborators. The
//! machine is total: any `(status, response)` pair not listed below is
//! dropped.

use std::time::Duration;

use smol_str::SmolStr;
use tracing::{debug, info, warn};

use sluice_core::{
    CSeq, Method, MsgId, ReplySpec, ReqOpts, SendOpts, SipMsg, TransId, TransportKind, Uri, UriSet,
};

use crate::{
    env::{CallEnv, HookFlow},
    timers::TimerKind,
    Call, CancelState, Trans, TransFrom, TransStatus,
};

/// Sends a freshly created transaction's request and arms its start timers:
/// retransmission (UDP only), the transaction timeout, and `Expires`
/// enforcement for INVITE.
pub fn start(call: &mut Call, trans_id: TransId, env: &mut dyn CallEnv) {
    let Some(mut trans) = call.trans.remove(&trans_id) else {
        return;
    };
    let Some(req) = trans.request.clone() else {
        call.trans.insert(trans_id, trans);
        return;
    };

    match env.send_request(&req, SendOpts::default()) {
        Ok(sent) => {
            trans.request = Some(sent);
            if trans.transport == TransportKind::Udp {
                trans.retrans_interval = call.config.timers.t1;
                let gen = trans.timers.arm(TimerKind::Retrans);
                env.schedule_timer(trans.id, TimerKind::Retrans, gen, trans.retrans_interval);
            }
            let gen = trans.timers.arm(TimerKind::Timeout);
            env.schedule_timer(
                trans.id,
                TimerKind::Timeout,
                gen,
                call.config.timers.duration(TimerKind::Timeout, trans.transport),
            );
            if trans.method.is_invite() {
                if let Some(expires) = request_expires(&trans) {
                    let gen = trans.timers.arm(TimerKind::Expire);
                    env.schedule_timer(trans.id, TimerKind::Expire, gen, expires);
                }
            }
            call.trans.insert(trans.id, trans);
        }
        Err(err) => {
            warn!("{} could not send {}: {}", trans.id, trans.method, err);
            let resp = SipMsg::response_to(&req, 503, "Service Unavailable");
            call.trans.insert(trans.id, trans);
            on_response(call, trans_id, resp, env);
        }
    }
}

/// Spawns one child transaction per target in the first parallel group of a
/// forked destination set. Children carry `TransFrom::Fork(parent)` so
/// dialog updates run in proxy mode.
pub fn start_fork(
    call: &mut Call,
    parent: TransId,
    req: &SipMsg,
    uri_set: &UriSet,
    opts: &ReqOpts,
    transport: TransportKind,
    env: &mut dyn CallEnv,
) -> Vec<TransId> {
    let Some(group) = uri_set.groups().iter().find(|g| !g.is_empty()) else {
        return Vec::new();
    };
    let mut spawned = Vec::with_capacity(group.len());
    for uri in group {
        let child = match proxy_make(req, uri, opts) {
            Ok(child) => child,
            Err(spec) => {
                warn!("fork target {} rejected: {:?}", uri, spec);
                continue;
            }
        };
        let id = call.new_uac_trans(child, transport, TransFrom::Fork(parent), opts.clone());
        start(call, id, env);
        spawned.push(id);
    }
    spawned
}

/// Prepares `req` for forwarding to `uri` in proxy mode: the Request-URI is
/// replaced and its extension slots cleared. Via insertion is left to the
/// transport.
pub fn proxy_make(req: &SipMsg, uri: &Uri, _opts: &ReqOpts) -> Result<SipMsg, ReplySpec> {
    if !req.is_request() {
        return Err(ReplySpec::InvalidRequest);
    }
    let mut out = req.clone();
    out.id = MsgId::fresh();
    out.ruri = Some(uri.clone().into_request_uri());
    Ok(out)
}

/// Requests cancellation of an INVITE transaction.
///
/// Before any provisional has arrived the intent is only recorded
/// (RFC 3261 §9.1 forbids CANCEL until then); the next provisional converts
/// it into a CANCEL on the wire.
pub fn cancel(call: &mut Call, trans_id: TransId, env: &mut dyn CallEnv) {
    let Some(mut trans) = call.trans.remove(&trans_id) else {
        return;
    };
    match trans.status {
        TransStatus::InviteCalling => trans.cancel = CancelState::ToCancel,
        TransStatus::InviteProceeding => send_cancel(&mut trans, env),
        _ => debug!("{} cancel ignored in {:?}", trans.id, trans.status),
    }
    call.trans.insert(trans_id, trans);
}

/// Feeds a response into the owning transaction's state machine.
pub fn on_response(call: &mut Call, trans_id: TransId, resp: SipMsg, env: &mut dyn CallEnv) {
    let Some(mut trans) = call.trans.remove(&trans_id) else {
        debug!("response {:?} for unknown transaction {}", resp.code(), trans_id);
        return;
    };
    let prev_code = trans.code;

    // A transaction past its wall-clock limit only ever sees a local 408.
    let resp = if trans.start.elapsed() > call.config.trans_time {
        match trans.request.as_ref() {
            Some(req) => {
                info!("{} past transaction time, replacing {:?} with 408", trans.id, resp.code());
                SipMsg::response_to(req, 408, "Transaction Timeout")
            }
            None => resp,
        }
    } else {
        resp
    };
    let code = resp.code().unwrap_or(0);

    if (200..300).contains(&code) {
        if let Some(dialog) = resp.dialog_id() {
            env.dialog_auth_update(&dialog, &resp, call);
        }
    }

    trans.response = Some(resp.clone());
    trans.code = code;

    if !trans.opts.no_dialog {
        if let Some(req) = trans.request.as_ref() {
            env.dialog_update(req, &resp, trans.from.is_fork(), call);
        }
    }

    if code >= 300 && matches!(trans.method, Method::Subscribe | Method::Refer) {
        if let Some(req) = trans.request.as_ref() {
            env.remove_prov_event(req, call);
        }
    }

    call.log_msg(resp.id, trans_id, resp.dialog_id());

    match trans.status {
        TransStatus::InviteCalling => {
            trans.timers.cancel(TimerKind::Retrans);
            trans.status = TransStatus::InviteProceeding;
            invite_proceeding(call, trans, resp, env);
        }
        TransStatus::InviteProceeding => invite_proceeding(call, trans, resp, env),
        TransStatus::InviteAccepted => invite_accepted(call, trans, resp, env),
        TransStatus::InviteCompleted => invite_completed(call, trans, resp, prev_code, env),
        TransStatus::Trying => {
            trans.timers.cancel(TimerKind::Retrans);
            trans.status = TransStatus::Proceeding;
            proceeding(call, trans, resp, env);
        }
        TransStatus::Proceeding => proceeding(call, trans, resp, env),
        TransStatus::Completed => completed(call, trans, resp, env),
        TransStatus::Finished => {
            debug!("{} dropped {:?} in finished", trans.id, resp.code());
            call.trans.insert(trans_id, trans);
        }
    }
}

fn invite_proceeding(call: &mut Call, mut trans: Trans, resp: SipMsg, env: &mut dyn CallEnv) {
    let code = trans.code;
    if code < 200 {
        // Re-arming extends the provisional guard.
        let gen = trans.timers.arm(TimerKind::TimerC);
        env.schedule_timer(
            trans.id,
            TimerKind::TimerC,
            gen,
            call.config.timers.duration(TimerKind::TimerC, trans.transport),
        );
        env.reply(&resp, &trans);
        if trans.cancel == CancelState::ToCancel {
            send_cancel(&mut trans, env);
        }
        let mut resp = resp;
        let _ = env.hook_uac_response(&mut resp, &trans, call);
        trans.response = Some(resp);
        call.trans.insert(trans.id, trans);
    } else if code < 300 {
        env.reply(&resp, &trans);
        trans.status = TransStatus::InviteAccepted;
        trans.cancel = CancelState::None;
        trans.to_tags = vec![tag_of(&resp)];
        // Cleared so later arrivals are classified against to_tags alone.
        trans.response = None;
        trans.timers.cancel(TimerKind::Expire);
        trans.timers.cancel(TimerKind::TimerC);
        trans.timers.cancel(TimerKind::Timeout);
        let gen = trans.timers.arm(TimerKind::TimerM);
        env.schedule_timer(
            trans.id,
            TimerKind::TimerM,
            gen,
            call.config.timers.duration(TimerKind::TimerM, trans.transport),
        );
        if trans.opts.auto_2xx_ack {
            match resp.dialog_id() {
                Some(dialog) => {
                    if let Err(err) = env.dialog_invoke(&dialog, Method::Ack, &trans.opts) {
                        warn!("{} automatic ACK failed: {}", trans.id, err);
                    }
                }
                None => warn!("{} automatic ACK skipped: response carries no To-tag", trans.id),
            }
        }
        call.trans.insert(trans.id, trans);
    } else if resp.is_local() {
        env.reply(&resp, &trans);
        set_finished(&mut trans);
        call.trans.insert(trans.id, trans);
    } else {
        let tag = tag_of(&resp);
        if let Some(req) = trans.request.as_mut() {
            // Anchors the dialog identifier the ACK must carry.
            req.set_to_tag(tag.clone());
        }
        trans.to_tags = vec![tag];
        trans.timers.cancel(TimerKind::Timeout);
        trans.timers.cancel(TimerKind::Expire);
        trans.timers.cancel(TimerKind::TimerC);
        send_non2xx_ack(&trans, env);
        if trans.transport == TransportKind::Udp {
            trans.status = TransStatus::InviteCompleted;
            let gen = trans.timers.arm(TimerKind::TimerD);
            env.schedule_timer(
                trans.id,
                TimerKind::TimerD,
                gen,
                call.config.timers.duration(TimerKind::TimerD, trans.transport),
            );
        } else {
            set_finished(&mut trans);
        }
        let mut resp = resp;
        if matches!(env.hook_uac_response(&mut resp, &trans, call), HookFlow::Continue) {
            env.reply(&resp, &trans);
        }
        trans.response = Some(resp);
        call.trans.insert(trans.id, trans);
    }
}

fn invite_accepted(call: &mut Call, mut trans: Trans, resp: SipMsg, env: &mut dyn CallEnv) {
    let code = trans.code;
    if code < 200 {
        debug!("{} provisional {} dropped in accepted", trans.id, code);
    } else {
        match resp.to_tag() {
            Some(tag) if trans.primary_tag().map(SmolStr::as_str) == Some(tag) => {
                debug!("{} absorbed {} retransmission from {}", trans.id, code, tag);
            }
            Some(_) => received_hangup(&mut trans, &resp, env),
            None => debug!("{} final without To-tag dropped", trans.id),
        }
    }
    call.trans.insert(trans.id, trans);
}

fn invite_completed(
    call: &mut Call,
    mut trans: Trans,
    resp: SipMsg,
    prev_code: u16,
    env: &mut dyn CallEnv,
) {
    let code = trans.code;
    if code < 200 {
        debug!("{} provisional {} dropped in completed", trans.id, code);
        call.trans.insert(trans.id, trans);
        return;
    }
    match resp.to_tag() {
        Some(tag) if trans.primary_tag().map(SmolStr::as_str) == Some(tag) => {
            if code == prev_code {
                // The peer kept retransmitting its final response; the ACK
                // must be repeated for each copy.
                send_non2xx_ack(&trans, env);
            } else {
                debug!("{} {} with primary tag but stored code {} ignored", trans.id, code, prev_code);
            }
        }
        Some(_) => received_hangup(&mut trans, &resp, env),
        None => debug!("{} final without To-tag dropped", trans.id),
    }
    call.trans.insert(trans.id, trans);
}

fn proceeding(call: &mut Call, mut trans: Trans, resp: SipMsg, env: &mut dyn CallEnv) {
    let code = trans.code;
    if code < 200 {
        env.reply(&resp, &trans);
        trans.response = Some(resp);
        call.trans.insert(trans.id, trans);
    } else if resp.is_local() {
        env.reply(&resp, &trans);
        set_finished(&mut trans);
        call.trans.insert(trans.id, trans);
    } else {
        trans.to_tags = vec![tag_of(&resp)];
        if trans.transport == TransportKind::Udp {
            trans.status = TransStatus::Completed;
            trans.timers.cancel(TimerKind::Timeout);
            // Nothing is owed to the peer any more; drop both messages and
            // keep only the absorb timer.
            trans.request = None;
            trans.response = None;
            let gen = trans.timers.arm(TimerKind::TimerK);
            env.schedule_timer(
                trans.id,
                TimerKind::TimerK,
                gen,
                call.config.timers.duration(TimerKind::TimerK, trans.transport),
            );
        } else {
            set_finished(&mut trans);
        }
        let mut resp = resp;
        if matches!(env.hook_uac_response(&mut resp, &trans, call), HookFlow::Continue) {
            env.reply(&resp, &trans);
        }
        call.trans.insert(trans.id, trans);
    }
}

fn completed(call: &mut Call, mut trans: Trans, resp: SipMsg, env: &mut dyn CallEnv) {
    let _ = env;
    match resp.to_tag() {
        Some(tag) if trans.primary_tag().map(SmolStr::as_str) == Some(tag) => {
            debug!("{} retransmission from {} ignored", trans.id, tag);
        }
        Some(tag) => {
            debug!("{} secondary tag {} recorded", trans.id, tag);
            trans.to_tags.push(SmolStr::new(tag));
        }
        None => debug!("{} response without To-tag ignored", trans.id),
    }
    call.trans.insert(trans.id, trans);
}

/// A forked INVITE produced a second answerer after the primary outcome was
/// settled. A 2xx must be accepted and immediately torn down with ACK+BYE;
/// anything else is only recorded.
fn received_hangup(trans: &mut Trans, resp: &SipMsg, env: &mut dyn CallEnv) {
    let tag = tag_of(resp);
    if !trans.to_tags.iter().any(|t| *t == tag) {
        trans.to_tags.push(tag.clone());
    }
    let code = resp.code().unwrap_or(0);
    if code < 300 {
        match resp.dialog_id() {
            Some(dialog) => {
                info!("{} hanging up surplus forked answer {} ({})", trans.id, tag, code);
                env.spawn_dialog_hangup(dialog);
            }
            None => warn!("{} forked 2xx without dialog id", trans.id),
        }
    } else {
        info!("{} secondary final {} from {} ignored", trans.id, code, tag);
    }
}

/// Handles a timer fire. Stale generations (cancelled or re-armed since
/// scheduling) are ignored.
pub fn on_timer(call: &mut Call, trans_id: TransId, kind: TimerKind, gen: u64, env: &mut dyn CallEnv) {
    let Some(mut trans) = call.trans.remove(&trans_id) else {
        return;
    };
    if !trans.timers.take_fire(kind, gen) {
        call.trans.insert(trans_id, trans);
        return;
    }

    match kind {
        TimerKind::Retrans => {
            if let Some(req) = trans.request.as_ref() {
                match env.resend_request(req) {
                    Ok(()) => {
                        trans.retrans_interval =
                            (trans.retrans_interval * 2).min(call.config.timers.t2);
                        let gen = trans.timers.arm(TimerKind::Retrans);
                        env.schedule_timer(trans.id, TimerKind::Retrans, gen, trans.retrans_interval);
                    }
                    Err(err) => warn!("{} retransmission failed: {}", trans.id, err),
                }
            }
            call.trans.insert(trans_id, trans);
        }
        TimerKind::Timeout => {
            let reason = if trans.method.is_invite() {
                "Timer B Timeout"
            } else {
                "Timer F Timeout"
            };
            timeout_response(call, trans, reason, env);
        }
        TimerKind::TimerC => timeout_response(call, trans, "Timer C Timeout", env),
        TimerKind::Expire => {
            debug!("{} expired before a final response", trans.id);
            match trans.status {
                TransStatus::InviteCalling => trans.cancel = CancelState::ToCancel,
                TransStatus::InviteProceeding => send_cancel(&mut trans, env),
                _ => {}
            }
            call.trans.insert(trans_id, trans);
        }
        TimerKind::TimerD | TimerKind::TimerK | TimerKind::TimerM => {
            debug!("{} absorb interval over, finished", trans.id);
            set_finished(&mut trans);
            call.trans.insert(trans_id, trans);
        }
    }
}

fn timeout_response(call: &mut Call, mut trans: Trans, reason: &str, env: &mut dyn CallEnv) {
    let trans_id = trans.id;
    let resp = trans
        .request
        .as_ref()
        .map(|req| SipMsg::response_to(req, 408, reason));
    match resp {
        Some(resp) => {
            call.trans.insert(trans_id, trans);
            on_response(call, trans_id, resp, env);
        }
        None => {
            set_finished(&mut trans);
            call.trans.insert(trans_id, trans);
        }
    }
}

fn set_finished(trans: &mut Trans) {
    trans.status = TransStatus::Finished;
    trans.timers.clear();
}

fn tag_of(resp: &SipMsg) -> SmolStr {
    resp.to_tag().map(SmolStr::new).unwrap_or_default()
}

fn request_expires(trans: &Trans) -> Option<Duration> {
    let req = trans.request.as_ref()?;
    let secs: u64 = req.headers.get("Expires")?.trim().parse().ok()?;
    Some(Duration::from_secs(secs))
}

/// RFC 3261 §17.1.1.3: the non-2xx ACK reuses the INVITE's top Via (same
/// branch), its CSeq number with method ACK, and the To the final response
/// carried. Sending is best effort; the ACK is owed regardless of what the
/// transport reports.
fn send_non2xx_ack(trans: &Trans, env: &mut dyn CallEnv) {
    let Some(req) = trans.request.as_ref() else {
        return;
    };
    let ack = build_non2xx_ack(req);
    if let Err(err) = env.resend_request(&ack) {
        warn!("{} non-2xx ACK failed: {}", trans.id, err);
    }
}

fn build_non2xx_ack(req: &SipMsg) -> SipMsg {
    let ruri = req
        .ruri
        .clone()
        .unwrap_or_else(|| req.to.uri.clone());
    let mut ack = SipMsg::request(Method::Ack, ruri, req.from.clone(), req.to.clone());
    ack.call_id = req.call_id.clone();
    ack.cseq = CSeq {
        num: req.cseq.num,
        method: Method::Ack,
    };
    ack.max_forwards = req.max_forwards;
    if let Some(via) = req.top_via() {
        ack.vias = vec![via.clone()];
    }
    for route in req.headers.get_all("Route") {
        ack.headers.push("Route", route);
    }
    ack
}

fn send_cancel(trans: &mut Trans, env: &mut dyn CallEnv) {
    let Some(req) = trans.request.as_ref() else {
        return;
    };
    let cancel = build_cancel(req);
    if let Err(err) = env.send_request(&cancel, SendOpts::default()) {
        warn!("{} CANCEL failed: {}", trans.id, err);
    }
    trans.cancel = CancelState::Cancelled;
}

fn build_cancel(req: &SipMsg) -> SipMsg {
    let ruri = req
        .ruri
        .clone()
        .unwrap_or_else(|| req.to.uri.clone());
    let mut cancel = SipMsg::request(Method::Cancel, ruri, req.from.clone(), req.to.clone());
    cancel.call_id = req.call_id.clone();
    cancel.cseq = CSeq {
        num: req.cseq.num,
        method: Method::Cancel,
    };
    cancel.max_forwards = req.max_forwards;
    if let Some(via) = req.top_via() {
        cancel.vias = vec![via.clone()];
    }
    for route in req.headers.get_all("Route") {
        cancel.headers.push("Route", route);
    }
    cancel
}
