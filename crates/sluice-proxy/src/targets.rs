// sluice - SIP call-control engine
// Copyright (C) 2026 The sluice developers
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Destination-set normalization.
//!
//! Callers hand the router anything from a single URI to a nested mix of
//! URIs, textual lists and sub-lists; forking needs the canonical two-level
//! [`UriSet`]. The function is total: malformed input degrades toward the
//! canonical empty set instead of failing.

use sluice_core::{parse_uris, Uri, UriInput, UriSet};

/// Flattens caller input into serial steps of parallel groups.
///
/// A wholly unparsable textual input yields the canonical empty set; an
/// unparsable leaf *inside* a list contributes an empty group (or nothing,
/// in a flat list) instead of poisoning its siblings. Every URI in the
/// output has empty extension slots.
pub fn normalize(input: &UriInput) -> UriSet {
    let mut set = match input {
        UriInput::Uri(uri) => UriSet::single(uri.clone().into_request_uri()),
        UriInput::Text(text) => match parse_uris(text) {
            Some(uris) => UriSet(vec![strip_all(uris)]),
            None => UriSet::none(),
        },
        UriInput::List(items) => {
            if items.iter().any(|i| matches!(i, UriInput::List(_))) {
                normalize_multi(items)
            } else {
                UriSet(vec![flatten_group(items)])
            }
        }
    };
    if set.0.is_empty() {
        set = UriSet::none();
    }
    set
}

/// Flat mode: every leaf lands in one parallel group, in order. Unparsable
/// text leaves contribute nothing.
fn flatten_group(items: &[UriInput]) -> Vec<Uri> {
    let mut group = Vec::new();
    for item in items {
        match item {
            UriInput::Uri(uri) => group.push(uri.clone().into_request_uri()),
            UriInput::Text(text) => {
                if let Some(uris) = parse_uris(text) {
                    group.extend(strip_all(uris));
                }
            }
            UriInput::List(inner) => group.extend(flatten_group(inner)),
        }
    }
    group
}

/// Multi mode: text and sub-list elements are serial boundaries; loose URIs
/// between boundaries accumulate into one parallel group.
fn normalize_multi(items: &[UriInput]) -> UriSet {
    let mut steps: Vec<Vec<Uri>> = Vec::new();
    let mut pending: Vec<Uri> = Vec::new();
    for item in items {
        match item {
            UriInput::Uri(uri) => pending.push(uri.clone().into_request_uri()),
            UriInput::Text(text) => {
                flush(&mut steps, &mut pending);
                steps.push(parse_uris(text).map(strip_all).unwrap_or_default());
            }
            UriInput::List(inner) => {
                flush(&mut steps, &mut pending);
                steps.push(flatten_group(inner));
            }
        }
    }
    flush(&mut steps, &mut pending);
    UriSet(steps)
}

fn flush(steps: &mut Vec<Vec<Uri>>, pending: &mut Vec<Uri>) {
    if !pending.is_empty() {
        steps.push(std::mem::take(pending));
    }
}

fn strip_all(uris: Vec<Uri>) -> Vec<Uri> {
    uris.into_iter().map(Uri::into_request_uri).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(text: &str) -> Uri {
        Uri::parse(text).unwrap()
    }

    #[test]
    fn single_uri_becomes_one_group() {
        let set = normalize(&UriInput::Uri(uri("sip:a@x.com")));
        assert_eq!(set.groups().len(), 1);
        assert_eq!(set.groups()[0].len(), 1);
    }

    #[test]
    fn text_list_becomes_one_group() {
        let set = normalize(&UriInput::Text("sip:a@x.com, sip:b@y.com".into()));
        assert_eq!(set.groups(), &[vec![uri("sip:a@x.com"), uri("sip:b@y.com")]]);
    }

    #[test]
    fn unparsable_text_is_the_empty_set() {
        let set = normalize(&UriInput::Text("rubbish".into()));
        assert!(set.is_empty());
        assert_eq!(set.groups().len(), 1);
    }

    #[test]
    fn flat_list_keeps_order_in_one_group() {
        let set = normalize(&UriInput::List(vec![
            UriInput::Uri(uri("sip:a@x.com")),
            UriInput::Text("sip:b@y.com".into()),
            UriInput::Uri(uri("sip:c@z.com")),
        ]));
        assert_eq!(
            set.groups(),
            &[vec![uri("sip:a@x.com"), uri("sip:b@y.com"), uri("sip:c@z.com")]]
        );
    }

    #[test]
    fn mixed_input_splits_into_serial_steps() {
        // ["sip:a", ["sip:b", UriC], "sip:d", ["sip:e"]]
        let set = normalize(&UriInput::List(vec![
            UriInput::Text("sip:a@h.com".into()),
            UriInput::List(vec![
                UriInput::Text("sip:b@h.com".into()),
                UriInput::Uri(uri("sip:c@h.com")),
            ]),
            UriInput::Text("sip:d@h.com".into()),
            UriInput::List(vec![UriInput::Text("sip:e@h.com".into())]),
        ]));
        assert_eq!(
            set.groups(),
            &[
                vec![uri("sip:a@h.com")],
                vec![uri("sip:b@h.com"), uri("sip:c@h.com")],
                vec![uri("sip:d@h.com")],
                vec![uri("sip:e@h.com")],
            ]
        );
    }

    #[test]
    fn loose_uris_accumulate_until_a_boundary() {
        let set = normalize(&UriInput::List(vec![
            UriInput::Uri(uri("sip:a@h.com")),
            UriInput::Uri(uri("sip:b@h.com")),
            UriInput::List(vec![UriInput::Uri(uri("sip:c@h.com"))]),
        ]));
        assert_eq!(
            set.groups(),
            &[
                vec![uri("sip:a@h.com"), uri("sip:b@h.com")],
                vec![uri("sip:c@h.com")],
            ]
        );
    }

    #[test]
    fn unparsable_leaf_in_multi_mode_is_an_empty_step() {
        let set = normalize(&UriInput::List(vec![
            UriInput::Text("rubbish".into()),
            UriInput::List(vec![UriInput::Uri(uri("sip:a@h.com"))]),
        ]));
        assert_eq!(set.groups().len(), 2);
        assert!(set.groups()[0].is_empty());
        assert_eq!(set.groups()[1], vec![uri("sip:a@h.com")]);
    }

    #[test]
    fn empty_list_is_the_empty_set() {
        let set = normalize(&UriInput::List(Vec::new()));
        assert!(set.is_empty());
        assert_eq!(set.groups().len(), 1);
    }

    #[test]
    fn output_uris_have_no_extension_slots() {
        let set = normalize(&UriInput::Text("<sip:a@h.com>;expires=30".into()));
        for group in set.groups() {
            for uri in group {
                assert!(uri.is_request_uri());
            }
        }
    }
}
