//! # Merge Policy
//! Turns one round's per-source buffers into the increment appended to a listing.
//!
//! Buffers arrive in source priority order. Only the current round is ever
//! reordered; items already in the unified list are never touched.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::item::NormalizedItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Alternate one item per source in priority order; empty buffers drop out.
    RoundRobin,
    /// Newest first by `sort_key`, stable over priority-then-fetch order.
    SortedByKey,
    /// Priority-order concatenation.
    Concatenate,
}

impl MergePolicy {
    pub fn merge(&self, buffers: Vec<Vec<NormalizedItem>>) -> Vec<NormalizedItem> {
        match self {
            MergePolicy::RoundRobin => round_robin(buffers),
            MergePolicy::SortedByKey => sorted_by_key(buffers),
            MergePolicy::Concatenate => buffers.into_iter().flatten().collect(),
        }
    }
}

fn round_robin(buffers: Vec<Vec<NormalizedItem>>) -> Vec<NormalizedItem> {
    let total = buffers.iter().map(Vec::len).sum();
    let mut queues: Vec<VecDeque<NormalizedItem>> =
        buffers.into_iter().map(VecDeque::from).collect();
    let mut out = Vec::with_capacity(total);
    while out.len() < total {
        for q in queues.iter_mut() {
            if let Some(item) = q.pop_front() {
                out.push(item);
            }
        }
    }
    out
}

fn sorted_by_key(buffers: Vec<Vec<NormalizedItem>>) -> Vec<NormalizedItem> {
    let mut out: Vec<NormalizedItem> = buffers.into_iter().flatten().collect();
    // stable: ties keep priority-then-fetch order; keyless items go last
    out.sort_by(|a, b| b.sort_key.cmp(&a.sort_key));
    out
}
