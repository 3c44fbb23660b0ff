//! Greedy dictionary-backed decomposition of tokens that have no direct entry.
//!
//! The left piece is always the longest dictionary-valid proper prefix; when
//! no prefix matches, the first character is emitted alone. Each step strictly
//! shortens the remainder, so decomposition always terminates and never fails.

use crate::managers::lookup_cache::LookupCache;
use log::debug;
use std::collections::HashSet;

/// Whether a string has at least one dictionary entry.
pub trait Membership {
    fn contains(&self, token: &str) -> bool;
}

impl<T: Membership + ?Sized> Membership for &T {
    fn contains(&self, token: &str) -> bool {
        (**self).contains(token)
    }
}

impl Membership for HashSet<String> {
    fn contains(&self, token: &str) -> bool {
        HashSet::contains(self, token)
    }
}

impl Membership for HashSet<&str> {
    fn contains(&self, token: &str) -> bool {
        HashSet::contains(self, token)
    }
}

/// Decomposes `token` without memoization.
pub fn decompose_with<M: Membership + ?Sized>(membership: &M, token: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut rest = token;
    while !rest.is_empty() {
        let piece = next_piece(membership, rest);
        pieces.push(piece.to_string());
        rest = &rest[piece.len()..];
    }
    pieces
}

/// The first piece of the greedy decomposition of a non-empty `rest`.
fn next_piece<'a, M: Membership + ?Sized>(membership: &M, rest: &'a str) -> &'a str {
    if membership.contains(rest) {
        return rest;
    }

    // Byte offsets of every char boundary strictly inside `rest`, longest first.
    let boundaries: Vec<usize> = rest.char_indices().skip(1).map(|(i, _)| i).collect();
    for &end in boundaries.iter().rev() {
        let left = &rest[..end];
        if membership.contains(left) {
            return left;
        }
    }

    // No dictionary-valid prefix: emit the first character alone.
    boundaries.first().map(|&end| &rest[..end]).unwrap_or(rest)
}

/// Memoizing decomposition over the shared [`LookupCache`].
///
/// Every suffix that starts on a piece boundary has the same greedy result
/// as the corresponding tail of the pieces, so one decomposition fills the
/// cache for all of them, and a later token ending in a cached suffix stops
/// scanning there.
pub struct SegmentationResolver<'a, M: ?Sized> {
    membership: &'a M,
    cache: &'a LookupCache,
}

impl<'a, M: Membership + ?Sized> SegmentationResolver<'a, M> {
    pub fn new(membership: &'a M, cache: &'a LookupCache) -> Self {
        Self { membership, cache }
    }

    pub fn decompose(&self, token: &str) -> Vec<String> {
        if token.is_empty() {
            return Vec::new();
        }

        let mut pieces = Vec::new();
        let mut rest = token;
        while !rest.is_empty() {
            if let Some(tail) = self.cache.decomposition(rest) {
                pieces.extend(tail);
                break;
            }
            let piece = next_piece(self.membership, rest);
            pieces.push(piece.to_string());
            rest = &rest[piece.len()..];
        }

        // Shortest suffix first, so the whole token ends up most recently used.
        let mut offsets = Vec::with_capacity(pieces.len());
        let mut offset = 0;
        for piece in &pieces {
            offsets.push(offset);
            offset += piece.len();
        }
        for (i, &start) in offsets.iter().enumerate().rev() {
            self.cache
                .insert_decomposition(&token[start..], pieces[i..].to_vec());
        }

        debug!("Decomposed '{}' into {:?}", token, pieces);
        pieces
    }
}
