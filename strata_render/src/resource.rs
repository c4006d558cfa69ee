// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Opaque resource keys and the backing allocation contract.

use core::fmt;

use crate::texture::{TextureFormat, TextureSize};

/// An opaque handle to a renderer-managed resource (a texture backing).
///
/// Resource keys are assigned by the renderer and passed through the render
/// passes without interpretation.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceKey(pub u64);

impl fmt::Debug for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceKey({})", self.0)
    }
}

/// Creates and destroys GPU texture backings on behalf of the
/// [`PrioritizedTextureManager`](crate::PrioritizedTextureManager).
pub trait BackingAllocator {
    /// Allocates a backing of the given size and format.
    fn create_backing(&mut self, size: TextureSize, format: TextureFormat) -> ResourceKey;

    /// Releases a backing previously returned by
    /// [`create_backing`](Self::create_backing).
    fn delete_backing(&mut self, key: ResourceKey);
}
