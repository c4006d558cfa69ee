// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Property tests for the prioritized texture manager.

use std::collections::BTreeSet;

use quickcheck::{Arbitrary, Gen};
use quickcheck_macros::quickcheck;
use strata_render::{
    BackingAllocator, PrioritizedTextureManager, ResourceKey, TextureFormat, TextureId,
    TextureSize,
};

const SIZES: [TextureSize; 3] = [
    TextureSize::new(64, 64),
    TextureSize::new(128, 64),
    TextureSize::new(128, 128),
];

const UNIT: u64 = 64 * 64 * 4;

#[derive(Debug, Default)]
struct CountingAllocator {
    next: u64,
    live: BTreeSet<u64>,
}

impl BackingAllocator for CountingAllocator {
    fn create_backing(&mut self, _size: TextureSize, _format: TextureFormat) -> ResourceKey {
        self.next += 1;
        self.live.insert(self.next);
        ResourceKey(self.next)
    }

    fn delete_backing(&mut self, key: ResourceKey) {
        assert!(self.live.remove(&key.0), "double delete of {key:?}");
    }
}

#[derive(Clone, Debug)]
enum Op {
    Create(usize),
    SetPriority(usize, i32),
    Placeholder(usize, u64),
    Unregister(usize),
    Prioritize,
    Acquire(usize),
    RequestLate(usize),
    Return(usize),
    ReduceMemory,
    SetLimit(u64),
    ClearAll,
}

impl Arbitrary for Op {
    fn arbitrary(g: &mut Gen) -> Self {
        let index = usize::arbitrary(g) % 32;
        let priority = i32::from(u8::arbitrary(g) % 8);
        match u8::arbitrary(g) % 11 {
            0 | 1 => Self::Create(usize::arbitrary(g) % SIZES.len()),
            2 => Self::SetPriority(index, priority),
            3 => Self::Placeholder(index, u64::from(u8::arbitrary(g) % 4) * UNIT),
            4 => Self::Unregister(index),
            5 => Self::Prioritize,
            6 => Self::Acquire(index),
            7 => Self::RequestLate(index),
            8 => Self::Return(index),
            9 => Self::ReduceMemory,
            _ => {
                if bool::arbitrary(g) {
                    Self::SetLimit(u64::from(u8::arbitrary(g) % 32) * UNIT)
                } else {
                    Self::ClearAll
                }
            }
        }
    }
}

#[derive(Debug)]
struct Harness {
    manager: PrioritizedTextureManager,
    allocator: CountingAllocator,
    textures: Vec<TextureId>,
    placeholders: BTreeSet<TextureId>,
}

impl Harness {
    fn new(limit: u64) -> Self {
        Self {
            manager: PrioritizedTextureManager::new(limit),
            allocator: CountingAllocator::default(),
            textures: Vec::new(),
            placeholders: BTreeSet::new(),
        }
    }

    fn pick(&self, index: usize) -> Option<TextureId> {
        if self.textures.is_empty() {
            None
        } else {
            Some(self.textures[index % self.textures.len()])
        }
    }

    fn apply(&mut self, op: &Op) {
        match *op {
            Op::Create(size) => {
                let id = self.manager.create_texture(SIZES[size], TextureFormat::Rgba8);
                self.textures.push(id);
            }
            Op::SetPriority(i, p) => {
                if let Some(id) = self.pick(i) {
                    self.manager.set_request_priority(id, p);
                }
            }
            Op::Placeholder(i, bytes) => {
                if let Some(id) = self.pick(i) {
                    if !self.manager.have_backing_texture(id) {
                        self.manager.set_to_self_managed_placeholder(id, bytes);
                        self.placeholders.insert(id);
                    }
                }
            }
            Op::Unregister(i) => {
                if let Some(id) = self.pick(i) {
                    self.manager.unregister_texture(id);
                    self.textures.retain(|t| *t != id);
                    self.placeholders.remove(&id);
                }
            }
            Op::Prioritize => self.manager.prioritize_textures(),
            Op::Acquire(i) => {
                if let Some(id) = self.pick(i) {
                    if !self.placeholders.contains(&id) {
                        self.manager
                            .impl_access(&mut self.allocator)
                            .acquire_backing_if_needed(id);
                    }
                }
            }
            Op::RequestLate(i) => {
                if let Some(id) = self.pick(i) {
                    let _ = self.manager.request_late(id);
                }
            }
            Op::Return(i) => {
                if let Some(id) = self.pick(i) {
                    self.manager
                        .impl_access(&mut self.allocator)
                        .return_backing_texture(id);
                }
            }
            Op::ReduceMemory => self.reduce_memory(),
            Op::SetLimit(bytes) => self.manager.set_max_memory_limit_bytes(bytes),
            Op::ClearAll => self
                .manager
                .impl_access(&mut self.allocator)
                .evict_and_delete_all(),
        }
    }

    fn reduce_memory(&mut self) {
        self.manager.impl_access(&mut self.allocator).reduce_memory();
    }

    fn budget_holds(&self) -> bool {
        let m = &self.manager;
        m.memory_use_bytes() <= m.memory_available_bytes()
            && m.memory_available_bytes() <= m.max_memory_limit_bytes()
    }
}

#[quickcheck]
fn budget_holds_after_reduce_memory(ops: Vec<Op>) -> bool {
    let mut h = Harness::new(16 * UNIT);
    for op in &ops {
        h.apply(op);
        if matches!(op, Op::ReduceMemory) && !h.budget_holds() {
            return false;
        }
    }
    h.reduce_memory();
    h.budget_holds()
}

#[quickcheck]
fn backings_are_never_leaked(ops: Vec<Op>) -> bool {
    let mut h = Harness::new(16 * UNIT);
    for op in &ops {
        h.apply(op);
    }
    h.manager
        .impl_access(&mut h.allocator)
        .evict_and_delete_all();
    h.allocator.live.is_empty() && h.manager.memory_use_bytes() == 0
}

#[quickcheck]
fn granted_memory_fits_and_ties_are_all_or_nothing(requests: Vec<(u8, u8)>) -> bool {
    let mut manager = PrioritizedTextureManager::new(20 * UNIT);
    let ids: Vec<(TextureId, i32)> = requests
        .iter()
        .map(|&(size, priority)| {
            let id = manager.create_texture(SIZES[usize::from(size) % SIZES.len()], TextureFormat::Rgba8);
            let priority = i32::from(priority % 6);
            manager.set_request_priority(id, priority);
            (id, priority)
        })
        .collect();
    manager.prioritize_textures();

    let granted: u64 = ids
        .iter()
        .filter(|(id, _)| manager.is_above_cutoff(*id))
        .map(|(id, _)| {
            let (size, format) = manager.texture_size(*id);
            size.bytes(format)
        })
        .sum();
    let ties_agree = ids.iter().all(|(a, pa)| {
        ids.iter()
            .filter(|(_, pb)| pb == pa)
            .all(|(b, _)| manager.is_above_cutoff(*a) == manager.is_above_cutoff(*b))
    });
    granted == manager.memory_above_cutoff_bytes()
        && granted <= manager.memory_available_bytes()
        && ties_agree
}

/// Reference model: walk requests sorted by priority, then creation order.
fn reference_cutoff(requests: &[(u64, i32, bool)], limit: u64) -> (i32, u64) {
    let mut order: Vec<usize> = (0..requests.len()).collect();
    order.sort_by_key(|&i| requests[i].1);
    let mut available = limit;
    let mut used = 0;
    for i in order {
        let (bytes, priority, self_managed) = requests[i];
        if used + bytes > available {
            if self_managed {
                available = used;
            }
            return (priority, available);
        }
        if self_managed {
            available -= bytes;
        } else {
            used += bytes;
        }
    }
    (i32::MAX, available)
}

#[quickcheck]
fn equal_priorities_are_ordered_by_creation(requests: Vec<(u8, u8, bool)>) -> bool {
    let limit = 12 * UNIT;
    let mut manager = PrioritizedTextureManager::new(limit);
    let mut model = Vec::new();
    for &(units, priority, self_managed) in &requests {
        let id = manager.create_texture(SIZES[0], TextureFormat::Rgba8);
        let priority = i32::from(priority % 3);
        let bytes = u64::from(units % 5) * UNIT;
        manager.set_request_priority(id, priority);
        if self_managed {
            manager.set_to_self_managed_placeholder(id, bytes);
            model.push((bytes, priority, true));
        } else {
            model.push((UNIT, priority, false));
        }
    }
    manager.prioritize_textures();
    let (cutoff, available) = reference_cutoff(&model, limit);
    manager.priority_cutoff() == cutoff && manager.memory_available_bytes() == available
}

#[quickcheck]
fn prioritization_is_deterministic(ops: Vec<Op>) -> bool {
    let run = || {
        let mut h = Harness::new(16 * UNIT);
        for op in &ops {
            h.apply(op);
        }
        h.manager.prioritize_textures();
        h.textures
            .iter()
            .map(|id| (h.manager.is_above_cutoff(*id), h.manager.backing(*id)))
            .collect::<Vec<_>>()
    };
    run() == run()
}
