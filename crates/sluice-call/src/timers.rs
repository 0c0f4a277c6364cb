// sluice - SIP call-control engine
// Copyright (C) 2026 The sluice developers
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Transaction timers and their transport-aware durations.
//!
//! Absorb timers exist to soak up retransmissions that only unreliable
//! transports produce, so they collapse to zero on TCP/TLS
//! (RFC 3261 §17.1.2.2). Retransmission and guard timers derive from the
//! base T1/T2/T4 values of RFC 3261 Table 4.

use std::collections::HashMap;
use std::time::Duration;

use sluice_core::TransportKind;

/// Timer kinds owned by a client transaction.
///
/// At most one instance of each kind is live per transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Request retransmission on unreliable transports (Timer A / E).
    Retrans,
    /// Transaction timeout (Timer B / F), 64×T1.
    Timeout,
    /// INVITE `Expires:` enforcement.
    Expire,
    /// INVITE provisional guard; re-armed on every provisional.
    TimerC,
    /// Absorbs non-2xx final retransmissions after the ACK.
    TimerD,
    /// Absorbs non-INVITE final retransmissions.
    TimerK,
    /// Absorbs 2xx retransmissions and fork duplicates (RFC 6026).
    TimerM,
}

/// Base timer values and the guard intervals derived from them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerConfig {
    /// RTT estimate, default 500 ms.
    pub t1: Duration,
    /// Retransmission cap, default 4 s.
    pub t2: Duration,
    /// Network-clearing interval, default 5 s.
    pub t4: Duration,
    /// Provisional guard, default 3 min.
    pub timer_c: Duration,
    /// 2xx absorb interval, default 32 s.
    pub timer_m: Duration,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            t1: Duration::from_millis(500),
            t2: Duration::from_secs(4),
            t4: Duration::from_secs(5),
            timer_c: Duration::from_secs(180),
            timer_m: Duration::from_secs(32),
        }
    }
}

impl TimerConfig {
    /// Duration for a timer kind on the given transport.
    ///
    /// [`TimerKind::Expire`] has no configured duration; it comes from the
    /// request's `Expires` header and is scheduled explicitly.
    pub fn duration(&self, kind: TimerKind, transport: TransportKind) -> Duration {
        let reliable = transport.is_reliable();
        match kind {
            TimerKind::Retrans => {
                if reliable {
                    Duration::ZERO
                } else {
                    self.t1
                }
            }
            TimerKind::Timeout => self.t1.saturating_mul(64),
            TimerKind::Expire => Duration::ZERO,
            TimerKind::TimerC => self.timer_c,
            TimerKind::TimerD => {
                if reliable {
                    Duration::ZERO
                } else {
                    Duration::from_secs(32)
                }
            }
            TimerKind::TimerK => {
                if reliable {
                    Duration::ZERO
                } else {
                    self.t4
                }
            }
            TimerKind::TimerM => self.timer_m,
        }
    }
}

/// Armed-timer bookkeeping for one transaction.
///
/// Each arm hands out a fresh generation number; a fire is only honored when
/// it carries the generation currently stored for its kind. Re-arming a kind
/// therefore invalidates the outstanding sleep without needing to reach into
/// the runtime, and cancellation is idempotent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimerTable {
    armed: HashMap<TimerKind, u64>,
    next_gen: u64,
}

impl TimerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms `kind`, replacing any live instance. Returns the generation the
    /// runtime must echo back when the timer fires.
    pub fn arm(&mut self, kind: TimerKind) -> u64 {
        self.next_gen += 1;
        let gen = self.next_gen;
        self.armed.insert(kind, gen);
        gen
    }

    /// Cancels `kind` if armed. Cancelling an idle kind is a no-op.
    pub fn cancel(&mut self, kind: TimerKind) -> bool {
        self.armed.remove(&kind).is_some()
    }

    /// Disarms and accepts a fire when `gen` is the live generation.
    /// Stale fires (cancelled or re-armed since) return `false`.
    pub fn take_fire(&mut self, kind: TimerKind, gen: u64) -> bool {
        if self.armed.get(&kind) == Some(&gen) {
            self.armed.remove(&kind);
            true
        } else {
            false
        }
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.armed.contains_key(&kind)
    }

    pub fn armed_count(&self) -> usize {
        self.armed.len()
    }

    /// Cancels everything. Used when a transaction reaches a final state.
    pub fn clear(&mut self) {
        self.armed.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absorb_timers_are_zero_on_reliable_transports() {
        let cfg = TimerConfig::default();
        for kind in [TimerKind::TimerD, TimerKind::TimerK, TimerKind::Retrans] {
            assert_eq!(cfg.duration(kind, TransportKind::Tcp), Duration::ZERO);
            assert_eq!(cfg.duration(kind, TransportKind::Tls), Duration::ZERO);
        }
    }

    #[test]
    fn udp_durations_follow_table_four() {
        let cfg = TimerConfig::default();
        assert_eq!(
            cfg.duration(TimerKind::Retrans, TransportKind::Udp),
            Duration::from_millis(500)
        );
        assert_eq!(
            cfg.duration(TimerKind::Timeout, TransportKind::Udp),
            Duration::from_secs(32)
        );
        assert_eq!(
            cfg.duration(TimerKind::TimerD, TransportKind::Udp),
            Duration::from_secs(32)
        );
        assert_eq!(
            cfg.duration(TimerKind::TimerK, TransportKind::Udp),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn timeout_applies_to_all_transports() {
        let cfg = TimerConfig::default();
        assert_eq!(
            cfg.duration(TimerKind::Timeout, TransportKind::Tcp),
            Duration::from_secs(32)
        );
    }

    #[test]
    fn rearming_invalidates_previous_generation() {
        let mut table = TimerTable::new();
        let g1 = table.arm(TimerKind::TimerC);
        let g2 = table.arm(TimerKind::TimerC);
        assert_eq!(table.armed_count(), 1);
        assert!(!table.take_fire(TimerKind::TimerC, g1));
        assert!(table.take_fire(TimerKind::TimerC, g2));
        assert!(!table.is_armed(TimerKind::TimerC));
    }

    #[test]
    fn cancel_is_idempotent() {
        let mut table = TimerTable::new();
        table.arm(TimerKind::Timeout);
        assert!(table.cancel(TimerKind::Timeout));
        assert!(!table.cancel(TimerKind::Timeout));
    }

    #[test]
    fn fire_after_cancel_is_stale() {
        let mut table = TimerTable::new();
        let gen = table.arm(TimerKind::TimerM);
        table.cancel(TimerKind::TimerM);
        assert!(!table.take_fire(TimerKind::TimerM, gen));
    }
}
