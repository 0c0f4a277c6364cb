// sluice - SIP call-control engine
// Copyright (C) 2026 The sluice developers
// SPDX-License-Identifier: Apache-2.0 OR MIT

use proptest::prelude::*;

use sluice_core::{Uri, UriInput};
use sluice_proxy::targets::normalize;

fn leaf_strategy() -> impl Strategy<Value = UriInput> {
    prop_oneof![
        "[a-z]{1,8}".prop_map(|u| UriInput::Text(format!("sip:{}@example.com", u).into())),
        "[a-z]{1,8}".prop_map(|u| {
            UriInput::Uri(Uri::parse(&format!("sip:{}@example.org", u)).unwrap())
        }),
        Just(UriInput::Text("not a uri at all".into())),
        Just(UriInput::Text("".into())),
    ]
}

fn input_strategy() -> impl Strategy<Value = UriInput> {
    leaf_strategy().prop_recursive(3, 24, 6, |inner| {
        proptest::collection::vec(inner, 0..6).prop_map(UriInput::List)
    })
}

proptest! {
    /// The normalizer is total and always yields the canonical shape: at
    /// least one group, and every URI with empty extension slots.
    #[test]
    fn output_shape_is_canonical(input in input_strategy()) {
        let set = normalize(&input);
        prop_assert!(!set.groups().is_empty());
        for group in set.groups() {
            for uri in group {
                prop_assert!(uri.is_request_uri());
            }
        }
    }

    /// A flat list of plain URIs and parseable strings collapses into one
    /// parallel group holding every leaf, in order.
    #[test]
    fn flat_lists_form_one_group(users in proptest::collection::vec("[a-z]{1,8}", 1..8)) {
        let items: Vec<UriInput> = users
            .iter()
            .enumerate()
            .map(|(i, u)| {
                if i % 2 == 0 {
                    UriInput::Text(format!("sip:{}@example.com", u).into())
                } else {
                    UriInput::Uri(Uri::parse(&format!("sip:{}@example.com", u)).unwrap())
                }
            })
            .collect();

        let set = normalize(&UriInput::List(items));
        prop_assert_eq!(set.groups().len(), 1);
        prop_assert_eq!(set.groups()[0].len(), users.len());
        for (uri, user) in set.groups()[0].iter().zip(&users) {
            prop_assert_eq!(uri.user.as_deref(), Some(user.as_str()));
        }
    }
}
