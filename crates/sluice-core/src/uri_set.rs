// sluice - SIP call-control engine
// Copyright (C) 2026 The sluice developers
// SPDX-License-Identifier: Apache-2.0 OR MIT

use smol_str::SmolStr;

use crate::Uri;

/// Heterogeneous destination input as callers supply it.
///
/// Callers hand the router a single URI, a textual URI list, or an
/// arbitrarily nested mix; normalization flattens it into a [`UriSet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UriInput {
    Uri(Uri),
    Text(SmolStr),
    List(Vec<UriInput>),
}

impl From<Uri> for UriInput {
    fn from(uri: Uri) -> Self {
        UriInput::Uri(uri)
    }
}

impl From<&str> for UriInput {
    fn from(text: &str) -> Self {
        UriInput::Text(SmolStr::new(text))
    }
}

/// Canonical two-level destination set.
///
/// The outer level is tried serially; each inner group is forked in
/// parallel. The canonical empty form is a single empty group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriSet(pub Vec<Vec<Uri>>);

impl UriSet {
    /// The canonical "no destinations" value.
    pub fn none() -> Self {
        UriSet(vec![Vec::new()])
    }

    pub fn single(uri: Uri) -> Self {
        UriSet(vec![vec![uri]])
    }

    /// `true` when no group holds any URI.
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(Vec::is_empty)
    }

    /// First URI of the first non-empty group.
    pub fn first(&self) -> Option<&Uri> {
        self.0.iter().find_map(|group| group.first())
    }

    pub fn groups(&self) -> &[Vec<Uri>] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_is_empty_but_keeps_one_group() {
        let set = UriSet::none();
        assert!(set.is_empty());
        assert_eq!(set.groups().len(), 1);
    }

    #[test]
    fn first_skips_empty_groups() {
        let uri = Uri::parse("sip:a@b.com").unwrap();
        let set = UriSet(vec![Vec::new(), vec![uri.clone()]]);
        assert_eq!(set.first(), Some(&uri));
    }
}
