// sluice - SIP call-control engine
// Copyright (C) 2026 The sluice developers
// SPDX-License-Identifier: Apache-2.0 OR MIT

use smol_str::SmolStr;

use sluice_core::{tokens, Method, ReplyField, ReplySpec, ReqOpts, SipMsg};

/// Checks a request before forwarding.
///
/// Decrements `Max-Forwards`. A request that ran out of hops is answered
/// with 483, except OPTIONS, which gets a 200 describing our capabilities
/// so hop-limited probes still learn something useful. A request whose
/// `Max-Forwards` is missing or unreadable is rejected outright. When the
/// routing options demand the `path` extension, the client must have listed
/// it in `Supported`.
pub fn check(req: &SipMsg, opts: &ReqOpts) -> Result<SipMsg, ReplySpec> {
    let mut out = req.clone();
    match out.max_forwards {
        Some(n) if n > 0 => out.max_forwards = Some(n - 1),
        Some(_) if *req.method() == Method::Options => {
            return Err(ReplySpec::Ok(vec![
                ReplyField::Supported,
                ReplyField::Accept,
                ReplyField::Allow,
                ReplyField::ReasonPhrase(SmolStr::new("Max Forwards")),
            ]));
        }
        Some(_) => return Err(ReplySpec::TooManyHops),
        None => return Err(ReplySpec::InvalidRequest),
    }

    if opts.path {
        let supported = tokens(&out.headers, "Supported");
        if !supported.iter().any(|t| t.eq_ignore_ascii_case("path")) {
            return Err(ReplySpec::ExtensionRequired(SmolStr::new("path")));
        }
    }

    Ok(out)
}
