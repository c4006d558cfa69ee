// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Prioritized texture management.
//!
//! The client context registers a *texture request* for every piece of
//! content that needs GPU memory and gives it a priority (lower value means
//! more important, see [`PriorityCalculator`]). Once per commit,
//! [`prioritize_textures`](PrioritizedTextureManager::prioritize_textures)
//! sorts the requests and computes a *priority cutoff*: the requests strictly
//! higher than the cutoff fit in the memory budget and may hold a backing.
//! Requests that share the cutoff priority are accepted or rejected together
//! so the result never depends on hash or insertion order. Equal priorities
//! are ordered by creation order.
//!
//! Backings (the actual GPU allocations) are only created, recycled, and
//! evicted through [`ImplAccess`], which borrows the manager together with the
//! renderer's [`BackingAllocator`]. The compositor obtains one while the
//! client is blocked inside a commit.
//!
//! After [`ImplAccess::reduce_memory`], memory in use never exceeds the
//! available memory, which never exceeds the limit.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::fmt;

use strata_core::kurbo::Rect;
#[cfg(not(feature = "std"))]
use strata_core::kurbo::common::FloatFuncs as _;

use crate::resource::{BackingAllocator, ResourceKey};

// ---------------------------------------------------------------------------
// Size and format
// ---------------------------------------------------------------------------

/// Texture dimensions in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TextureSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl TextureSize {
    /// Creates a size.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns whether the size has no pixels.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Memory needed for a texture of this size in `format`.
    #[must_use]
    pub const fn bytes(self, format: TextureFormat) -> u64 {
        self.width as u64 * self.height as u64 * format.bytes_per_pixel()
    }
}

/// Pixel format of a texture.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// 8-bit RGBA.
    #[default]
    Rgba8,
    /// 8-bit BGRA.
    Bgra8,
    /// 8-bit single channel alpha.
    Alpha8,
}

impl TextureFormat {
    /// Bytes per pixel.
    #[must_use]
    pub const fn bytes_per_pixel(self) -> u64 {
        match self {
            Self::Rgba8 | Self::Bgra8 => 4,
            Self::Alpha8 => 1,
        }
    }
}

/// Handle to a texture request. Ids increase with creation order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TextureId(u64);

impl fmt::Debug for TextureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TextureId({})", self.0)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
struct BackingId(u64);

// ---------------------------------------------------------------------------
// Priorities
// ---------------------------------------------------------------------------

/// Priority constants and helpers. Lower values are more important.
#[derive(Clone, Copy, Debug)]
pub struct PriorityCalculator;

impl PriorityCalculator {
    /// Browser UI drawing into the root surface.
    pub const UI: i32 = -1;
    /// Visible content drawing into the root surface.
    pub const VISIBLE: i32 = 0;
    /// Render surface intermediates.
    pub const RENDER_SURFACE: i32 = 1;
    /// Browser UI drawing into a non-root surface.
    pub const UI_OFFSCREEN: i32 = 2;
    /// Visible content drawing into a non-root surface.
    pub const VISIBLE_OFFSCREEN: i32 = 3;
    /// Base for content that is not visible; distance in pixels is added.
    pub const NOT_VISIBLE_BASE: i32 = 1_000_000;
    /// Cap for distance-based priorities.
    pub const NOT_VISIBLE_LIMIT: i32 = 1_900_000;
    /// Small animated layers, treated as 512 pixels from visible.
    pub const SMALL_ANIMATED_LAYER: i32 = Self::NOT_VISIBLE_BASE + 512;
    /// Base for textures kept only because they may be reused.
    pub const LINGERING: i32 = 2_000_000;
    /// Cap for lingering priorities.
    pub const LINGERING_LIMIT: i32 = 2_900_000;
    /// Most important possible priority.
    pub const HIGHEST: i32 = i32::MIN;
    /// Never granted memory.
    pub const LOWEST: i32 = i32::MAX;

    /// Priority of visible content.
    #[must_use]
    pub const fn visible_priority(draws_to_root_surface: bool) -> i32 {
        if draws_to_root_surface {
            Self::VISIBLE
        } else {
            Self::VISIBLE_OFFSCREEN
        }
    }

    /// Priority of browser UI content.
    #[must_use]
    pub const fn ui_priority(draws_to_root_surface: bool) -> i32 {
        if draws_to_root_surface {
            Self::UI
        } else {
            Self::UI_OFFSCREEN
        }
    }

    /// Priority of content `distance` pixels away from the visible area.
    #[must_use]
    pub fn priority_from_distance(distance: u32, draws_to_root_surface: bool) -> i32 {
        if distance == 0 {
            return Self::visible_priority(draws_to_root_surface);
        }
        let distance = i32::try_from(distance).unwrap_or(i32::MAX);
        Self::NOT_VISIBLE_BASE
            .saturating_add(distance)
            .min(Self::NOT_VISIBLE_LIMIT)
    }

    /// Priority of `texture_rect` given the `visible_rect`, by Manhattan
    /// distance between the two.
    #[must_use]
    pub fn priority_from_rects(
        visible_rect: Rect,
        texture_rect: Rect,
        draws_to_root_surface: bool,
    ) -> i32 {
        let dx = (visible_rect.x0 - texture_rect.x1)
            .max(texture_rect.x0 - visible_rect.x1)
            .max(0.0);
        let dy = (visible_rect.y0 - texture_rect.y1)
            .max(texture_rect.y0 - visible_rect.y1)
            .max(0.0);
        #[expect(
            clippy::cast_possible_truncation,
            reason = "distance is non-negative and saturates at u32::MAX"
        )]
        let distance = (dx + dy).ceil().min(f64::from(u32::MAX)) as u32;
        Self::priority_from_distance(distance, draws_to_root_surface)
    }

    /// Priority of a texture that is no longer requested but may be reused.
    #[must_use]
    pub fn lingering_priority(previous: i32) -> i32 {
        previous
            .saturating_add(1)
            .clamp(Self::LINGERING, Self::LINGERING_LIMIT)
    }

    /// Returns whether `a` is more important than `b`.
    #[inline]
    #[must_use]
    pub const fn priority_is_higher(a: i32, b: i32) -> bool {
        a < b
    }

    /// Returns whether `a` is less important than `b`.
    #[inline]
    #[must_use]
    pub const fn priority_is_lower(a: i32, b: i32) -> bool {
        a > b
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct Texture {
    size: TextureSize,
    format: TextureFormat,
    bytes: u64,
    priority: i32,
    is_above_cutoff: bool,
    is_self_managed: bool,
    backing: Option<BackingId>,
}

#[derive(Clone, Debug)]
struct Backing {
    key: ResourceKey,
    size: TextureSize,
    format: TextureFormat,
    bytes: u64,
    owner: Option<TextureId>,
    // Snapshot of the owner taken at the last priority update; eviction
    // order is based on these, not on the live owner.
    priority_at_last_update: i32,
    was_above_cutoff_at_last_update: bool,
}

/// Grants GPU memory to texture requests by priority within a byte budget.
#[derive(Debug)]
pub struct PrioritizedTextureManager {
    // -- Budget --
    max_memory_limit_bytes: u64,
    memory_available_bytes: u64,
    memory_above_cutoff_bytes: u64,
    memory_use_bytes: u64,
    priority_cutoff: i32,

    // -- Requests --
    textures: BTreeMap<TextureId, Texture>,
    next_texture: u64,

    // -- Backings --
    backings: BTreeMap<BackingId, Backing>,
    /// Eviction and recycling order: front is evicted first.
    backing_order: Vec<BackingId>,
    next_backing: u64,
    evicted: Vec<ResourceKey>,
}

impl PrioritizedTextureManager {
    /// Creates a manager with a memory limit in bytes.
    #[must_use]
    pub fn new(max_memory_limit_bytes: u64) -> Self {
        Self {
            max_memory_limit_bytes,
            memory_available_bytes: max_memory_limit_bytes,
            memory_above_cutoff_bytes: 0,
            memory_use_bytes: 0,
            priority_cutoff: PriorityCalculator::LOWEST,
            textures: BTreeMap::new(),
            next_texture: 0,
            backings: BTreeMap::new(),
            backing_order: Vec::new(),
            next_backing: 0,
            evicted: Vec::new(),
        }
    }

    // -- Budget --

    /// The configured memory limit.
    #[inline]
    #[must_use]
    pub fn max_memory_limit_bytes(&self) -> u64 {
        self.max_memory_limit_bytes
    }

    /// Changes the memory limit. Takes effect at the next prioritization;
    /// the available memory is clamped immediately.
    pub fn set_max_memory_limit_bytes(&mut self, bytes: u64) {
        self.max_memory_limit_bytes = bytes;
        self.memory_available_bytes = self.memory_available_bytes.min(bytes);
    }

    /// Memory available to backed textures (the limit minus self-managed
    /// placeholders) as of the last prioritization.
    #[inline]
    #[must_use]
    pub fn memory_available_bytes(&self) -> u64 {
        self.memory_available_bytes
    }

    /// Memory of backed requests above the cutoff.
    #[inline]
    #[must_use]
    pub fn memory_above_cutoff_bytes(&self) -> u64 {
        self.memory_above_cutoff_bytes
    }

    /// Memory held by backings, owned or not.
    #[inline]
    #[must_use]
    pub fn memory_use_bytes(&self) -> u64 {
        self.memory_use_bytes
    }

    /// The priority at which the last prioritization ran out of memory.
    #[inline]
    #[must_use]
    pub fn priority_cutoff(&self) -> i32 {
        self.priority_cutoff
    }

    /// Number of live backings.
    #[must_use]
    pub fn backing_count(&self) -> usize {
        self.backings.len()
    }

    // -- Requests --

    /// Registers a request with the lowest priority and no backing.
    pub fn create_texture(&mut self, size: TextureSize, format: TextureFormat) -> TextureId {
        let id = TextureId(self.next_texture);
        self.next_texture += 1;
        self.textures.insert(
            id,
            Texture {
                size,
                format,
                bytes: size.bytes(format),
                priority: PriorityCalculator::LOWEST,
                is_above_cutoff: false,
                is_self_managed: false,
                backing: None,
            },
        );
        id
    }

    /// Removes a request. Its backing stays alive, unowned, for recycling.
    pub fn unregister_texture(&mut self, id: TextureId) {
        let texture = self.texture_mut(id);
        let backing = texture.backing.take();
        if let Some(b) = backing {
            if let Some(backing) = self.backings.get_mut(&b) {
                backing.owner = None;
            }
        }
        self.textures.remove(&id);
    }

    /// Returns whether `id` is a registered request.
    #[must_use]
    pub fn contains(&self, id: TextureId) -> bool {
        self.textures.contains_key(&id)
    }

    /// Sets the priority used by the next prioritization.
    pub fn set_request_priority(&mut self, id: TextureId, priority: i32) {
        self.texture_mut(id).priority = priority;
    }

    /// The request's priority.
    #[must_use]
    pub fn request_priority(&self, id: TextureId) -> i32 {
        self.texture(id).priority
    }

    /// Turns the request into a placeholder reserving `bytes` for memory
    /// managed outside the manager (render surface intermediates). Placeholders
    /// never get backings.
    pub fn set_to_self_managed_placeholder(&mut self, id: TextureId, bytes: u64) {
        let texture = self.texture_mut(id);
        assert!(
            texture.backing.is_none(),
            "a backed texture cannot become a placeholder"
        );
        texture.is_self_managed = true;
        texture.bytes = bytes;
    }

    /// Returns whether the request was granted memory.
    #[must_use]
    pub fn is_above_cutoff(&self, id: TextureId) -> bool {
        self.texture(id).is_above_cutoff
    }

    /// Returns whether the request currently owns a backing.
    #[must_use]
    pub fn have_backing_texture(&self, id: TextureId) -> bool {
        self.texture(id).backing.is_some()
    }

    /// The resource key of the request's backing, if any.
    #[must_use]
    pub fn backing(&self, id: TextureId) -> Option<ResourceKey> {
        let backing = self.textures.get(&id)?.backing?;
        self.backings.get(&backing).map(|b| b.key)
    }

    /// Size and format of a request.
    #[must_use]
    pub fn texture_size(&self, id: TextureId) -> (TextureSize, TextureFormat) {
        let texture = self.texture(id);
        (texture.size, texture.format)
    }

    /// Computes the priority cutoff and marks every request above or below it.
    pub fn prioritize_textures(&mut self) {
        let mut sorted: Vec<(i32, TextureId)> =
            self.textures.iter().map(|(id, t)| (t.priority, *id)).collect();
        // Creation order breaks ties: ids are allocated monotonically.
        sorted.sort_unstable();

        self.memory_available_bytes = self.max_memory_limit_bytes;
        self.priority_cutoff = PriorityCalculator::LOWEST;
        let mut memory_bytes = 0_u64;
        for &(priority, id) in &sorted {
            if priority == PriorityCalculator::LOWEST {
                break;
            }
            let texture = &self.textures[&id];
            let new_memory_bytes = memory_bytes + texture.bytes;
            if new_memory_bytes > self.memory_available_bytes {
                self.priority_cutoff = priority;
                if texture.is_self_managed {
                    self.memory_available_bytes = memory_bytes;
                }
                break;
            }
            if texture.is_self_managed {
                // Placeholders are never acquired; reserve them up front.
                self.memory_available_bytes -= texture.bytes;
            } else {
                memory_bytes = new_memory_bytes;
            }
        }

        self.memory_above_cutoff_bytes = 0;
        for texture in self.textures.values_mut() {
            texture.is_above_cutoff =
                PriorityCalculator::priority_is_higher(texture.priority, self.priority_cutoff);
            if texture.is_above_cutoff && !texture.is_self_managed {
                self.memory_above_cutoff_bytes += texture.bytes;
            }
        }
        assert!(
            self.memory_above_cutoff_bytes <= self.memory_available_bytes,
            "granted memory exceeds the available memory"
        );

        self.update_backing_priorities();
    }

    /// Grants memory to a request at the cutoff priority if the granted set
    /// leaves enough room. Never evicts. Returns whether the request is now
    /// above the cutoff.
    pub fn request_late(&mut self, id: TextureId) -> bool {
        let available = self.memory_available_bytes;
        let above = self.memory_above_cutoff_bytes;
        let cutoff = self.priority_cutoff;
        let texture = self.texture_mut(id);
        if texture.is_above_cutoff {
            return true;
        }
        if PriorityCalculator::priority_is_lower(texture.priority, cutoff) {
            return false;
        }
        let new_memory_bytes = above + texture.bytes;
        if new_memory_bytes > available {
            return false;
        }
        texture.is_above_cutoff = true;
        self.memory_above_cutoff_bytes = new_memory_bytes;
        true
    }

    /// Borrows the backing-mutation capability.
    pub fn impl_access<'a>(
        &'a mut self,
        allocator: &'a mut dyn BackingAllocator,
    ) -> ImplAccess<'a> {
        ImplAccess {
            manager: self,
            allocator,
        }
    }

    /// Forgets every backing without deleting it, after the graphics context
    /// that owned them was lost.
    pub fn all_backings_were_deleted(&mut self) {
        for texture in self.textures.values_mut() {
            texture.backing = None;
        }
        self.backings.clear();
        self.backing_order.clear();
        self.evicted.clear();
        self.memory_use_bytes = 0;
    }

    fn texture(&self, id: TextureId) -> &Texture {
        match self.textures.get(&id) {
            Some(t) => t,
            None => panic!("unknown {id:?}"),
        }
    }

    fn texture_mut(&mut self, id: TextureId) -> &mut Texture {
        match self.textures.get_mut(&id) {
            Some(t) => t,
            None => panic!("unknown {id:?}"),
        }
    }

    /// Refreshes backing snapshots from their owners and re-sorts the
    /// eviction order: recyclable backings first, then by priority, least
    /// important first. The sort is stable so equal backings keep their
    /// recency order.
    fn update_backing_priorities(&mut self) {
        for backing in self.backings.values_mut() {
            let owner = backing.owner.and_then(|o| self.textures.get(&o));
            backing.priority_at_last_update =
                owner.map_or(PriorityCalculator::LOWEST, |t| t.priority);
            backing.was_above_cutoff_at_last_update = owner.is_some_and(|t| t.is_above_cutoff);
        }
        let backings = &self.backings;
        self.backing_order.sort_by(|a, b| {
            let a = &backings[a];
            let b = &backings[b];
            a.was_above_cutoff_at_last_update
                .cmp(&b.was_above_cutoff_at_last_update)
                .then(b.priority_at_last_update.cmp(&a.priority_at_last_update))
        });
    }

    fn unlink(&mut self, backing_id: BackingId) {
        let backing = self
            .backings
            .get_mut(&backing_id)
            .map(|b| b.owner.take());
        if let Some(Some(owner)) = backing {
            if let Some(texture) = self.textures.get_mut(&owner) {
                texture.backing = None;
            }
        }
    }

    /// Evicts backings from the front of the eviction order until memory in
    /// use is at most `limit_bytes`. With `respect_cutoff`, stops at the
    /// first backing that was above the cutoff.
    fn evict_backings_to_reduce_memory(&mut self, limit_bytes: u64, respect_cutoff: bool) {
        while self.memory_use_bytes > limit_bytes {
            let Some(&first) = self.backing_order.first() else {
                break;
            };
            if respect_cutoff && self.backings[&first].was_above_cutoff_at_last_update {
                break;
            }
            self.evict_backing(first);
        }
    }

    fn evict_backing(&mut self, backing_id: BackingId) {
        self.unlink(backing_id);
        self.backing_order.retain(|b| *b != backing_id);
        if let Some(backing) = self.backings.remove(&backing_id) {
            self.memory_use_bytes -= backing.bytes;
            self.evicted.push(backing.key);
        }
    }
}

// ---------------------------------------------------------------------------
// ImplAccess
// ---------------------------------------------------------------------------

/// Backing-mutation capability, borrowed from a [`PrioritizedTextureManager`]
/// together with the renderer's allocator.
pub struct ImplAccess<'a> {
    manager: &'a mut PrioritizedTextureManager,
    allocator: &'a mut dyn BackingAllocator,
}

impl fmt::Debug for ImplAccess<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImplAccess")
            .field("manager", &self.manager)
            .finish_non_exhaustive()
    }
}

impl ImplAccess<'_> {
    /// Read access to the manager.
    #[must_use]
    pub fn manager(&self) -> &PrioritizedTextureManager {
        self.manager
    }

    /// Gives an above-cutoff request a backing, recycling a same-size and
    /// same-format backing whose owner is absent or below the cutoff, or
    /// else evicting down to budget and allocating a new one. Does nothing
    /// for requests below the cutoff or already backed.
    pub fn acquire_backing_if_needed(&mut self, id: TextureId) {
        let m = &mut *self.manager;
        let texture = m.texture(id);
        assert!(
            !texture.is_self_managed,
            "placeholders cannot acquire backings"
        );
        if texture.backing.is_some() || !texture.is_above_cutoff {
            return;
        }
        let (size, format, bytes) = (texture.size, texture.format, texture.bytes);

        let mut recycled = None;
        for backing_id in &m.backing_order {
            let backing = &m.backings[backing_id];
            let owner_above = backing
                .owner
                .and_then(|o| m.textures.get(&o))
                .is_some_and(|t| t.is_above_cutoff);
            if owner_above {
                break;
            }
            if backing.size == size && backing.format == format {
                recycled = Some(*backing_id);
                break;
            }
        }

        let backing_id = match recycled {
            Some(b) => {
                m.unlink(b);
                b
            }
            None => {
                m.evict_backings_to_reduce_memory(
                    m.memory_available_bytes.saturating_sub(bytes),
                    true,
                );
                self.create_backing(size, format)
            }
        };

        let m = &mut *self.manager;
        let priority = m.texture(id).priority;
        if let Some(backing) = m.backings.get_mut(&backing_id) {
            backing.owner = Some(id);
            backing.priority_at_last_update = priority;
            backing.was_above_cutoff_at_last_update = true;
        }
        m.texture_mut(id).backing = Some(backing_id);
        m.backing_order.retain(|b| *b != backing_id);
        m.backing_order.push(backing_id);
    }

    /// Detaches the request's backing, keeping it for recycling.
    pub fn return_backing_texture(&mut self, id: TextureId) {
        if let Some(backing) = self.manager.texture(id).backing {
            self.manager.unlink(backing);
        }
    }

    /// Evicts down to the available memory, then trims unowned backings
    /// beyond 10% of it, and deletes everything evicted.
    pub fn reduce_memory(&mut self) {
        let m = &mut *self.manager;
        m.update_backing_priorities();
        let available = m.memory_available_bytes.min(m.max_memory_limit_bytes);
        m.evict_backings_to_reduce_memory(available, true);
        // Hard limit: backings granted before a limit change may still be
        // over budget.
        m.evict_backings_to_reduce_memory(available, false);

        let wasted: u64 = m
            .backings
            .values()
            .filter(|b| b.owner.is_none())
            .map(|b| b.bytes)
            .sum();
        let ten_percent = available / 10;
        if wasted > ten_percent {
            let limit = m.memory_use_bytes.saturating_sub(wasted - ten_percent);
            m.evict_backings_to_reduce_memory(limit, true);
        }
        let _ = self.delete_evicted_backings();
    }

    /// Evicts every backing, leaving them for
    /// [`delete_evicted_backings`](Self::delete_evicted_backings).
    pub fn clear_all_memory(&mut self) {
        let m = &mut *self.manager;
        while let Some(&first) = m.backing_order.first() {
            m.evict_backing(first);
        }
    }

    /// Evicts and deletes every backing.
    pub fn evict_and_delete_all(&mut self) {
        self.clear_all_memory();
        let _ = self.delete_evicted_backings();
    }

    /// Deletes evicted backings through the allocator. Returns how many were
    /// deleted.
    pub fn delete_evicted_backings(&mut self) -> usize {
        let evicted = core::mem::take(&mut self.manager.evicted);
        for key in &evicted {
            self.allocator.delete_backing(*key);
        }
        evicted.len()
    }

    fn create_backing(&mut self, size: TextureSize, format: TextureFormat) -> BackingId {
        let key = self.allocator.create_backing(size, format);
        let m = &mut *self.manager;
        let id = BackingId(m.next_backing);
        m.next_backing += 1;
        let bytes = size.bytes(format);
        m.memory_use_bytes += bytes;
        m.backings.insert(
            id,
            Backing {
                key,
                size,
                format,
                bytes,
                owner: None,
                priority_at_last_update: PriorityCalculator::LOWEST,
                was_above_cutoff_at_last_update: false,
            },
        );
        m.backing_order.push(id);
        id
    }
}
