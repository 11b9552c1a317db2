use std::fmt;

use glam::DVec3;
use massing_core::block::BlockId;
use tracing::debug;

use crate::store::SessionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignAxis {
    X,
    Y,
    Z,
}

impl AlignAxis {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "x" => Some(AlignAxis::X),
            "y" => Some(AlignAxis::Y),
            "z" => Some(AlignAxis::Z),
            _ => None,
        }
    }

    #[inline]
    fn component(self, position: DVec3) -> f64 {
        match self {
            AlignAxis::X => position.x,
            AlignAxis::Y => position.y,
            AlignAxis::Z => position.z,
        }
    }

    #[inline]
    fn set_component(self, position: &mut DVec3, value: f64) {
        match self {
            AlignAxis::X => position.x = value,
            AlignAxis::Y => position.y = value,
            AlignAxis::Z => position.z = value,
        }
    }
}

impl fmt::Display for AlignAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AlignAxis::X => "x",
            AlignAxis::Y => "y",
            AlignAxis::Z => "z",
        };
        f.write_str(name)
    }
}

/// 对齐基准：参考体块的坐标，或选中集在该轴上的最小/最大值。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlignAnchor {
    #[default]
    Reference,
    Min,
    Max,
}

impl AlignAnchor {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "reference" | "ref" => Some(AlignAnchor::Reference),
            "min" => Some(AlignAnchor::Min),
            "max" => Some(AlignAnchor::Max),
            _ => None,
        }
    }
}

/// 将选中体块在指定轴上的位置对齐到同一数值，整体作为一次历史记录。
///
/// 选中少于两个体块时为空操作。
pub fn align_selection(store: &mut SessionStore, axis: AlignAxis, anchor: AlignAnchor) -> bool {
    let selection: Vec<BlockId> = store.selection().to_vec();
    if selection.len() < 2 {
        debug!(selected = selection.len(), "对齐需要至少两个选中体块");
        return false;
    }

    let values: Vec<f64> = selection
        .iter()
        .filter_map(|id| store.block(id))
        .map(|block| axis.component(block.position))
        .collect();
    let target = match anchor {
        AlignAnchor::Reference => store
            .reference()
            .and_then(|id| store.block(id))
            .map(|block| axis.component(block.position)),
        AlignAnchor::Min => values.iter().copied().reduce(f64::min),
        AlignAnchor::Max => values.iter().copied().reduce(f64::max),
    };
    let Some(target) = target else {
        return false;
    };

    let applied = store.apply_batch(|draft| {
        for id in &selection {
            if let Some(block) = draft.block_mut(id) {
                axis.set_component(&mut block.position, target);
            }
        }
    });
    debug!(%axis, ?anchor, target, applied, "选中体块已对齐");
    applied
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spread_store() -> SessionStore {
        let mut store = SessionStore::new();
        let a = store.blocks()[0].id.clone();
        let b = store.add_block();
        let c = store.add_block();
        store.apply_batch(|draft| {
            draft.blocks[0].position = DVec3::new(0.0, 3.0, 10.0);
            draft.blocks[1].position = DVec3::new(25.0, 0.0, -4.0);
            draft.blocks[2].position = DVec3::new(50.0, 6.0, 7.0);
        });
        store.set_selection([&b, &a, &c]);
        store
    }

    #[test]
    fn aligns_to_reference() {
        let mut store = spread_store();
        let depth = store.undo_depth();
        assert!(align_selection(&mut store, AlignAxis::Z, AlignAnchor::Reference));
        assert!(store.blocks().iter().all(|b| b.position.z == -4.0));
        assert_eq!(store.undo_depth(), depth + 1);
    }

    #[test]
    fn reference_anchor_follows_first_selected_block() {
        let mut store = spread_store();
        let ids: Vec<BlockId> = store.blocks().iter().map(|b| b.id.clone()).collect();
        store.set_selection([&ids[2], &ids[0], &ids[1]]);
        assert!(align_selection(&mut store, AlignAxis::X, AlignAnchor::Reference));
        assert!(store.blocks().iter().all(|b| b.position.x == 50.0));
    }

    #[test]
    fn aligns_to_extremes() {
        let mut store = spread_store();
        assert!(align_selection(&mut store, AlignAxis::Y, AlignAnchor::Max));
        assert!(store.blocks().iter().all(|b| b.position.y == 6.0));

        assert!(align_selection(&mut store, AlignAxis::X, AlignAnchor::Min));
        assert!(store.blocks().iter().all(|b| b.position.x == 0.0));
        assert!(!align_selection(&mut store, AlignAxis::X, AlignAnchor::Min));
    }

    #[test]
    fn single_selection_is_ignored() {
        let mut store = SessionStore::new();
        assert!(!align_selection(&mut store, AlignAxis::X, AlignAnchor::Min));
    }

    #[test]
    fn parses_axis_and_anchor() {
        assert_eq!(AlignAxis::parse(" Y "), Some(AlignAxis::Y));
        assert_eq!(AlignAxis::parse("w"), None);
        assert_eq!(AlignAnchor::parse("MAX"), Some(AlignAnchor::Max));
        assert_eq!(AlignAnchor::parse("ref"), Some(AlignAnchor::Reference));
    }
}
