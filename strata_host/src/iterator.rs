// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Walks over the render surface tree.
//!
//! Positions come in the order the occlusion tracker expects for front to
//! back: every layer drawing into a surface frontmost first (child surfaces
//! fully walked at their contributing position), then the surface as a
//! target, then the surface as a contribution to its parent.

use strata_core::layer::LayerId;

use crate::tree::LayerTreeImpl;

/// One stop of a surface-tree walk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IteratorPosition {
    /// The surface owned by this layer, as a render target.
    TargetSurface(LayerId),
    /// A surface drawn into `target`.
    ContributingSurface {
        /// Owner of the contributing surface.
        surface: LayerId,
        /// Owner of the surface it draws into.
        target: LayerId,
    },
    /// A layer drawing its own content into `target`.
    Layer {
        /// The layer.
        layer: LayerId,
        /// Owner of the surface it draws into.
        target: LayerId,
    },
}

/// Positions from the frontmost layer to the root target.
#[must_use]
pub fn front_to_back(tree: &LayerTreeImpl) -> Vec<IteratorPosition> {
    let mut out = Vec::new();
    if let Some(root) = tree.root().filter(|r| tree.surface(*r).is_some()) {
        walk_target(tree, root, &mut out);
    }
    out
}

/// Positions in painter's order: the exact reverse of [`front_to_back`].
#[must_use]
pub fn back_to_front(tree: &LayerTreeImpl) -> Vec<IteratorPosition> {
    let mut out = front_to_back(tree);
    out.reverse();
    out
}

fn walk_target(tree: &LayerTreeImpl, target: LayerId, out: &mut Vec<IteratorPosition>) {
    let Some(surface) = tree.surface(target) else {
        return;
    };
    for &id in surface.layer_list.iter().rev() {
        if id != target && tree.surface(id).is_some() {
            walk_target(tree, id, out);
            out.push(IteratorPosition::ContributingSurface {
                surface: id,
                target,
            });
        } else {
            out.push(IteratorPosition::Layer { layer: id, target });
        }
    }
    out.push(IteratorPosition::TargetSurface(target));
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use strata_core::kurbo::{Point, Rect, Size};
    use strata_core::layer::{LayerContent, LayerStore};

    use super::*;
    use crate::draw_properties::calculate_draw_properties;
    use crate::sync::synchronize_trees;

    fn layer(store: &mut LayerStore, parent: Option<LayerId>, draws: bool) -> LayerId {
        let id = store.create_layer();
        if let Some(parent) = parent {
            store.add_child(parent, id);
        }
        store.set_anchor_point(id, Point::ZERO);
        store.set_bounds(id, Size::new(10.0, 10.0));
        if draws {
            store.set_content(id, LayerContent::Solid { rgba: [1.0; 4] });
        }
        id
    }

    #[test]
    fn nested_surface_is_walked_at_its_position() {
        let mut store = LayerStore::new();
        let root = layer(&mut store, None, true);
        let a = layer(&mut store, Some(root), true);
        let group = layer(&mut store, Some(root), true);
        store.set_opacity(group, 0.5);
        let inner = layer(&mut store, Some(group), true);
        let b = layer(&mut store, Some(root), true);

        let mut tree = LayerTreeImpl::new();
        let changes = store.evaluate();
        let _ = synchronize_trees(&mut store, Some(root), &changes, &HashMap::new(), &mut tree);
        calculate_draw_properties(&mut tree, Size::new(100.0, 100.0), 1.0);

        use IteratorPosition::*;
        let expected = vec![
            Layer { layer: b, target: root },
            Layer {
                layer: inner,
                target: group,
            },
            Layer {
                layer: group,
                target: group,
            },
            TargetSurface(group),
            ContributingSurface {
                surface: group,
                target: root,
            },
            Layer { layer: a, target: root },
            Layer {
                layer: root,
                target: root,
            },
            TargetSurface(root),
        ];
        assert_eq!(front_to_back(&tree), expected);

        let mut reversed = expected;
        reversed.reverse();
        assert_eq!(back_to_front(&tree), reversed);
        assert_eq!(
            tree.surface(root).map(|s| s.content_rect),
            Some(Rect::new(0.0, 0.0, 100.0, 100.0))
        );
    }

    #[test]
    fn empty_tree_has_no_positions() {
        let tree = LayerTreeImpl::new();
        assert!(front_to_back(&tree).is_empty(), "no root");
    }
}
