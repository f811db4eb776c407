// src/watch/ids.rs

//! Recyclable token identifiers.
//!
//! Destroyed identifiers are kept as a set of closed ranges `[start, end]`
//! that never overlap or touch. Allocation prefers the smallest destroyed
//! identifier and only advances the high-water mark when none is left.

use std::collections::BTreeMap;

use crate::errors::{Result, WatchError};

pub type TokenId = u32;

#[derive(Debug, Clone)]
pub struct IdAllocator {
    /// start -> end (inclusive) of reclaimable ranges.
    free: BTreeMap<TokenId, TokenId>,
    /// Next never-issued identifier. `u64` so the counter can step past
    /// `TokenId::MAX` without wrapping.
    next: u64,
    /// Number of identifiers this allocator may ever issue.
    limit: u64,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new(TokenId::MAX)
    }
}

impl IdAllocator {
    /// Allocator issuing identifiers `0..limit`.
    pub fn new(limit: TokenId) -> Self {
        Self {
            free: BTreeMap::new(),
            next: 0,
            limit: u64::from(limit),
        }
    }

    pub fn allocate(&mut self) -> Result<TokenId> {
        if let Some((&start, &end)) = self.free.iter().next() {
            self.free.remove(&start);
            if start < end {
                self.free.insert(start + 1, end);
            }
            return Ok(start);
        }

        if self.next >= self.limit {
            return Err(WatchError::CapacityExhausted);
        }
        let id = self.next as TokenId;
        self.next += 1;
        Ok(id)
    }

    /// Return `id` to the free-list, merging with its neighbours.
    ///
    /// Releasing an identifier that was never issued, or is already free,
    /// is ignored.
    pub fn release(&mut self, id: TokenId) {
        if u64::from(id) >= self.next || self.is_free(id) {
            return;
        }

        let below = self
            .free
            .range(..id)
            .next_back()
            .filter(|&(_, &end)| end.checked_add(1) == Some(id))
            .map(|(&start, _)| start);
        let above = id
            .checked_add(1)
            .and_then(|next| self.free.get(&next).map(|&end| (next, end)));

        let start = below.unwrap_or(id);
        let end = match above {
            Some((above_start, above_end)) => {
                self.free.remove(&above_start);
                above_end
            }
            None => id,
        };
        self.free.insert(start, end);
    }

    pub fn is_free(&self, id: TokenId) -> bool {
        self.free
            .range(..=id)
            .next_back()
            .is_some_and(|(_, &end)| id <= end)
    }

    /// Current reclaimable ranges in ascending order.
    pub fn free_ranges(&self) -> Vec<(TokenId, TokenId)> {
        self.free.iter().map(|(&s, &e)| (s, e)).collect()
    }

    /// High-water mark: the next identifier that has never been issued.
    pub fn high_water_mark(&self) -> u64 {
        self.next
    }
}
