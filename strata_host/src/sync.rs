// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pending-to-impl tree synchronization.
//!
//! [`synchronize_trees`] walks the pending tree depth first, parents before
//! children, with mask and replica layers visited right after their owner.
//! Every pending layer whose id already has an impl counterpart reuses it,
//! keeping its scroll delta, texture binding, damage history, and running
//! animations; impl layers no longer reachable are destroyed.
//!
//! The [`LayerChanges`] evaluated since the last commit name the owners whose
//! mask, replica, or filter changed. Those owners, and everything drawn with
//! them, are marked changed so their surface is damaged in full.

use std::collections::{HashMap, HashSet};

use log::debug;
use strata_core::geometry;
use strata_core::kurbo::Vec2;
use strata_core::layer::{LayerChanges, LayerId, LayerProperties, LayerStore};
use strata_render::TextureId;

use crate::tree::{LayerImpl, LayerTreeImpl};

/// What a synchronization pass did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Impl layers created.
    pub created: u32,
    /// Impl layers destroyed.
    pub destroyed: u32,
    /// Animations handed to the compositor.
    pub animations: u32,
}

/// Merges the pending tree rooted at `root` into `tree`.
///
/// `changes` holds what the pending tree evaluated since the last commit.
/// Update rects and queued animations are taken from `store`. Scroll deltas
/// already reported to the client are subtracted, since the committed scroll
/// offset now includes them.
///
/// # Panics
///
/// Panics if the pending tree is malformed: the root has a parent or an
/// owner, or a layer is reachable twice.
pub fn synchronize_trees(
    store: &mut LayerStore,
    root: Option<LayerId>,
    changes: &LayerChanges,
    textures: &HashMap<LayerId, TextureId>,
    tree: &mut LayerTreeImpl,
) -> SyncStats {
    let mut stats = SyncStats::default();
    let effects: HashSet<LayerId> = changes
        .effects
        .iter()
        .map(|idx| store.layer_id_at(*idx))
        .filter(|id| store.is_alive(*id))
        .collect();
    let mut old = tree.take_layers();
    let mut visited = HashSet::new();
    let mut invalidated = Vec::new();

    if let Some(root) = root {
        assert!(
            store.parent(root).is_none(),
            "root layer {root:?} has a parent"
        );
        assert!(
            store.attached_to(root).is_none(),
            "root layer {root:?} is attached to an owner"
        );

        let mut stack = vec![(root, None)];
        while let Some((id, parent)) = stack.pop() {
            assert!(
                visited.insert(id),
                "layer {id:?} is reachable twice from the root"
            );
            let mut layer = old.remove(&id).unwrap_or_else(|| {
                stats.created += 1;
                LayerImpl::new(id)
            });
            let texture = textures.get(&id).copied();
            match push_properties(store, &mut layer, parent, texture, effects.contains(&id)) {
                Invalidation::None => {}
                invalidation => invalidated.push((id, invalidation)),
            }

            // Popped in reverse, so children are visited in paint order after
            // the mask and replica.
            for child in layer.children.iter().rev() {
                stack.push((*child, Some(id)));
            }
            stack.extend(layer.replica.map(|r| (r, None)));
            stack.extend(layer.mask.map(|m| (m, None)));
            tree.insert(layer);
        }
    }

    stats.destroyed = u32::try_from(old.len()).unwrap_or(u32::MAX);
    for id in old.keys() {
        debug!("destroying impl layer {id:?}");
    }
    tree.set_root(root);

    for (id, invalidation) in invalidated {
        if invalidation == Invalidation::Subtree {
            tree.note_subtree_property_changed(id);
        } else {
            tree.note_descendants_property_changed(id);
        }
    }

    for (id, animation) in store.take_pending_animations() {
        // Animations on layers outside the committed tree are dropped.
        if let Some(layer) = tree.layer_mut(id) {
            layer.animations.add(animation);
            stats.animations += 1;
        }
    }
    stats
}

/// Which part of the tree a property push invalidates beyond the layer's
/// own flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Invalidation {
    None,
    /// Descendants moved with a scroll.
    Descendants,
    /// The layer and everything beneath it moved, faded, or gained or lost
    /// a mask or replica.
    Subtree,
}

fn push_properties(
    store: &mut LayerStore,
    layer: &mut LayerImpl,
    parent: Option<LayerId>,
    texture: Option<TextureId>,
    effects_changed: bool,
) -> Invalidation {
    let id = layer.id;
    let p: LayerProperties = store.properties(id);

    // Running animations own their property until they finish.
    let transform_owned = layer.animations.has_running_transform();
    let opacity_owned = layer.animations.has_running_opacity();

    let moved = layer.parent != parent
        || layer.position != p.position
        || layer.anchor_point != p.anchor_point
        || layer.bounds != p.bounds
        || (!transform_owned && layer.transform != p.transform);
    let faded = !opacity_owned && layer.opacity != p.opacity;
    let restyled =
        layer.content != p.content || layer.flags != p.flags || layer.filter != p.filter;
    let reattached = effects_changed
        || layer.mask != store.mask(id)
        || layer.replica != store.replica(id);

    layer.parent = parent;
    layer.children = store.children(id).collect();
    layer.mask = store.mask(id);
    layer.replica = store.replica(id);
    layer.position = p.position;
    layer.anchor_point = p.anchor_point;
    layer.bounds = p.bounds;
    if !transform_owned {
        layer.transform = p.transform;
    }
    if !opacity_owned {
        layer.opacity = p.opacity;
    }
    layer.content = p.content;
    layer.flags = p.flags;
    layer.filter = p.filter;
    layer.texture = texture;

    let previous_offset = layer.scroll_offset();
    layer.scroll_delta -= layer.sent_scroll_delta;
    layer.sent_scroll_delta = Vec2::ZERO;
    layer.scroll_position = p.scroll_offset;
    layer.max_scroll_offset = p.max_scroll_offset;
    clamp_scroll_delta(layer);
    let scrolled = layer.scroll_offset() != previous_offset;

    layer.update_rect = geometry::union(layer.update_rect, store.take_update_rect(id));
    layer.property_changed |= restyled;

    if moved || faded || reattached {
        Invalidation::Subtree
    } else if scrolled {
        Invalidation::Descendants
    } else {
        Invalidation::None
    }
}

/// Keeps the total scroll offset within `[0, max_scroll_offset]`.
pub(crate) fn clamp_scroll_delta(layer: &mut LayerImpl) {
    let max = layer.max_scroll_offset;
    let total = layer.scroll_offset();
    let clamped = Vec2::new(
        total.x.clamp(0.0, max.x.max(0.0)),
        total.y.clamp(0.0, max.y.max(0.0)),
    );
    layer.scroll_delta = clamped - layer.scroll_position;
}

#[cfg(test)]
mod tests {
    use strata_core::kurbo::{Point, Rect, Size};
    use strata_core::layer::LayerContent;

    use super::*;

    struct Fixture {
        store: LayerStore,
        tree: LayerTreeImpl,
        root: LayerId,
        child: LayerId,
        grandchild: LayerId,
    }

    impl Fixture {
        fn new() -> Self {
            let mut store = LayerStore::new();
            let root = store.create_layer();
            let child = store.create_layer();
            let grandchild = store.create_layer();
            store.add_child(root, child);
            store.add_child(child, grandchild);
            for id in [root, child, grandchild] {
                store.set_anchor_point(id, Point::ZERO);
                store.set_bounds(id, Size::new(10.0, 10.0));
                store.set_content(id, LayerContent::Solid { rgba: [1.0; 4] });
            }
            Self {
                store,
                tree: LayerTreeImpl::new(),
                root,
                child,
                grandchild,
            }
        }

        fn sync(&mut self) -> SyncStats {
            let changes = self.store.evaluate();
            synchronize_trees(
                &mut self.store,
                Some(self.root),
                &changes,
                &HashMap::new(),
                &mut self.tree,
            )
        }

        fn changed(&self, id: LayerId) -> bool {
            self.tree.layer(id).unwrap().property_changed
        }
    }

    #[test]
    fn layers_are_created_then_reused_then_destroyed() {
        let mut f = Fixture::new();
        let stats = f.sync();
        assert_eq!(stats.created, 3);
        assert_eq!(stats.destroyed, 0);
        assert_eq!(f.tree.root(), Some(f.root));

        f.tree.layer_mut(f.child).unwrap().scroll_delta = Vec2::new(0.0, 4.0);
        f.tree.layer_mut(f.child).unwrap().max_scroll_offset = Vec2::new(0.0, 50.0);
        f.store.set_max_scroll_offset(f.child, Vec2::new(0.0, 50.0));
        let stats = f.sync();
        assert_eq!(stats.created, 0, "every layer reused");
        assert_eq!(
            f.tree.layer(f.child).unwrap().scroll_delta,
            Vec2::new(0.0, 4.0),
            "unsent scroll delta survives the commit"
        );

        f.store.remove_from_parent(f.child);
        let stats = f.sync();
        assert_eq!(stats.destroyed, 2, "child and grandchild are unreachable");
        assert!(f.tree.layer(f.child).is_none(), "child destroyed");
        assert_eq!(f.tree.len(), 1);
    }

    #[test]
    fn mask_and_replica_are_synchronized_without_parent() {
        let mut f = Fixture::new();
        let mask = f.store.create_layer();
        f.store.set_mask(f.child, Some(mask));
        let _ = f.sync();
        let child = f.tree.layer(f.child).unwrap();
        assert_eq!(child.mask, Some(mask));
        assert_eq!(f.tree.layer(mask).unwrap().parent, None);
    }

    #[test]
    #[should_panic(expected = "has a parent")]
    fn root_with_parent_panics() {
        let mut f = Fixture::new();
        let _ = synchronize_trees(
            &mut f.store,
            Some(f.child),
            &LayerChanges::default(),
            &HashMap::new(),
            &mut f.tree,
        );
    }

    #[test]
    fn sent_scroll_delta_is_subtracted_at_commit() {
        let mut f = Fixture::new();
        f.store.set_max_scroll_offset(f.child, Vec2::new(0.0, 100.0));
        let _ = f.sync();

        let layer = f.tree.layer_mut(f.child).unwrap();
        layer.scroll_delta = Vec2::new(0.0, 15.0);
        layer.sent_scroll_delta = Vec2::new(0.0, 10.0);

        // The client folded the reported 10 into its offset.
        f.store.set_scroll_offset(f.child, Vec2::new(0.0, 10.0));
        let _ = f.sync();

        let layer = f.tree.layer(f.child).unwrap();
        assert_eq!(layer.scroll_position, Vec2::new(0.0, 10.0));
        assert_eq!(layer.scroll_delta, Vec2::new(0.0, 5.0), "unsent part kept");
        assert_eq!(layer.sent_scroll_delta, Vec2::ZERO);
        assert_eq!(layer.scroll_offset(), Vec2::new(0.0, 15.0));
    }

    #[test]
    fn committed_scroll_is_clamped() {
        let mut f = Fixture::new();
        f.store.set_max_scroll_offset(f.child, Vec2::new(0.0, 20.0));
        f.store.set_scroll_offset(f.child, Vec2::new(5.0, 30.0));
        let _ = f.sync();
        assert_eq!(
            f.tree.layer(f.child).unwrap().scroll_offset(),
            Vec2::new(0.0, 20.0)
        );
    }

    #[test]
    fn scroll_marks_descendants_only() {
        let mut f = Fixture::new();
        f.store.set_max_scroll_offset(f.child, Vec2::new(0.0, 100.0));
        let _ = f.sync();
        f.tree.did_draw_all_layers();

        f.store.set_scroll_offset(f.child, Vec2::new(0.0, 10.0));
        let _ = f.sync();
        assert!(!f.changed(f.root), "root unaffected");
        assert!(!f.changed(f.child), "scrolled layer itself unchanged");
        assert!(f.changed(f.grandchild), "scrolled content moved");
    }

    #[test]
    fn moving_a_layer_marks_its_subtree() {
        let mut f = Fixture::new();
        let _ = f.sync();
        f.tree.did_draw_all_layers();

        f.store.set_position(f.child, Point::new(3.0, 0.0));
        let _ = f.sync();
        assert!(!f.changed(f.root), "root unaffected");
        assert!(f.changed(f.child), "moved layer changed");
        assert!(f.changed(f.grandchild), "descendant moved along");
    }

    #[test]
    fn repaint_accumulates_update_rect() {
        let mut f = Fixture::new();
        let _ = f.sync();
        f.tree.did_draw_all_layers();

        f.store
            .set_needs_display_rect(f.grandchild, Rect::new(1.0, 1.0, 3.0, 3.0));
        let _ = f.sync();
        assert_eq!(
            f.tree.layer(f.grandchild).unwrap().update_rect,
            Rect::new(1.0, 1.0, 3.0, 3.0)
        );
        assert!(!f.changed(f.grandchild), "repaint is not a property change");
    }

    #[test]
    fn attaching_or_detaching_a_replica_marks_the_owner_subtree() {
        let mut f = Fixture::new();
        let replica = f.store.create_layer();
        let _ = f.sync();
        f.tree.did_draw_all_layers();

        f.store.set_replica(f.child, Some(replica));
        let _ = f.sync();
        assert!(!f.changed(f.root), "root unaffected");
        assert!(f.changed(f.child), "owner changed");
        assert!(f.changed(f.grandchild), "owner's subtree is reflected");
        f.tree.did_draw_all_layers();

        f.store.set_replica(f.child, None);
        let _ = f.sync();
        assert!(f.changed(f.child), "detaching changes the owner");
        assert!(f.tree.layer(replica).is_none(), "replica destroyed");
    }

    #[test]
    fn detaching_a_mask_marks_the_owner() {
        let mut f = Fixture::new();
        let mask = f.store.create_layer();
        f.store.set_mask(f.child, Some(mask));
        let _ = f.sync();
        f.tree.did_draw_all_layers();

        f.store.set_mask(f.child, None);
        let _ = f.sync();
        assert!(f.changed(f.child), "owner changed");
        assert!(!f.changed(f.root), "root unaffected");
    }

    #[test]
    fn evaluated_effects_mark_the_owner() {
        let mut f = Fixture::new();
        let _ = f.sync();
        f.tree.did_draw_all_layers();

        // Effects carried over from an evaluation whose cycle never committed.
        let changes = LayerChanges {
            effects: vec![f.child.index()],
            ..LayerChanges::default()
        };
        let _ = synchronize_trees(
            &mut f.store,
            Some(f.root),
            &changes,
            &HashMap::new(),
            &mut f.tree,
        );
        assert!(f.changed(f.child), "owner changed");
        assert!(f.changed(f.grandchild), "owner's subtree changed");
        assert!(!f.changed(f.root), "root unaffected");
    }
}
