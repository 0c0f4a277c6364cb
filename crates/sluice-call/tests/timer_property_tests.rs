// sluice - SIP call-control engine
// Copyright (C) 2026 The sluice developers
// SPDX-License-Identifier: Apache-2.0 OR MIT

use proptest::prelude::*;

use sluice_call::{TimerKind, TimerTable};

const KINDS: [TimerKind; 7] = [
    TimerKind::Retrans,
    TimerKind::Timeout,
    TimerKind::Expire,
    TimerKind::TimerC,
    TimerKind::TimerD,
    TimerKind::TimerK,
    TimerKind::TimerM,
];

#[derive(Debug, Clone)]
enum Op {
    Arm(usize),
    Cancel(usize),
    FireLatest(usize),
    FireStale(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..KINDS.len()).prop_map(Op::Arm),
        (0..KINDS.len()).prop_map(Op::Cancel),
        (0..KINDS.len()).prop_map(Op::FireLatest),
        (0..KINDS.len()).prop_map(Op::FireStale),
    ]
}

proptest! {
    /// No kind ever has more than one live instance, whatever the
    /// arm/cancel/fire history.
    #[test]
    fn at_most_one_instance_per_kind(ops in proptest::collection::vec(op_strategy(), 0..64)) {
        let mut table = TimerTable::new();
        let mut latest: [Option<u64>; 7] = [None; 7];
        let mut stale: [Option<u64>; 7] = [None; 7];

        for op in ops {
            match op {
                Op::Arm(k) => {
                    stale[k] = latest[k];
                    latest[k] = Some(table.arm(KINDS[k]));
                }
                Op::Cancel(k) => {
                    table.cancel(KINDS[k]);
                    stale[k] = latest[k].take();
                }
                Op::FireLatest(k) => {
                    if let Some(gen) = latest[k].take() {
                        prop_assert!(table.take_fire(KINDS[k], gen));
                    }
                }
                Op::FireStale(k) => {
                    if let Some(gen) = stale[k] {
                        prop_assert!(!table.take_fire(KINDS[k], gen));
                    }
                }
            }
            prop_assert!(table.armed_count() <= KINDS.len());
            for (k, kind) in KINDS.iter().enumerate() {
                prop_assert_eq!(table.is_armed(*kind), latest[k].is_some());
            }
        }
    }

    /// Generations are strictly increasing, so an old handle can never be
    /// confused with a live one.
    #[test]
    fn generations_never_repeat(arms in proptest::collection::vec(0..KINDS.len(), 1..64)) {
        let mut table = TimerTable::new();
        let mut seen = std::collections::HashSet::new();
        for k in arms {
            let gen = table.arm(KINDS[k]);
            prop_assert!(seen.insert(gen));
        }
    }
}
