//! 成组刚体变换：直接操作参考体块，其余选中体块跟随平移或绕参考点旋转。
//!
//! 增量始终相对手势开始时缓存的基准计算，不做逐帧累加。

use glam::{DQuat, DVec3};
use massing_core::block::{Block, BlockId};
use massing_core::geometry::{degrees_from_orientation, normalize_degrees, orientation_from_degrees};
use tracing::{debug, warn};

use crate::errors::EngineError;
use crate::store::SessionStore;

/// 旋转增量视为单位四元数的阈值。
const IDENTITY_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformMode {
    Translate,
    Rotate,
}

/// 体块位姿：位置（米）与 XYZ 欧拉角（度）。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: DVec3,
    pub rotation: DVec3,
}

impl Pose {
    #[inline]
    pub fn new(position: DVec3, rotation: DVec3) -> Self {
        Self { position, rotation }
    }

    #[inline]
    pub fn of(block: &Block) -> Self {
        Self::new(block.position, block.rotation)
    }

    #[inline]
    pub fn orientation(&self) -> DQuat {
        orientation_from_degrees(self.rotation)
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.rotation.is_finite()
    }

    fn normalized(self) -> Self {
        Self::new(
            self.position,
            DVec3::new(
                normalize_degrees(self.rotation.x),
                normalize_degrees(self.rotation.y),
                normalize_degrees(self.rotation.z),
            ),
        )
    }
}

#[derive(Debug, Clone)]
struct Member {
    id: BlockId,
    pose: Pose,
    orientation: DQuat,
}

impl Member {
    fn capture(block: &Block) -> Self {
        let pose = Pose::of(block);
        Self {
            id: block.id.clone(),
            orientation: pose.orientation(),
            pose,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Delta {
    Identity,
    Translate(DVec3),
    Rotate { pivot: DVec3, rotation: DQuat },
}

/// 一次手势：begin → preview* → commit | cancel。
///
/// 手势只持有开始时的位姿快照，`preview` 不会写入 `SessionStore`。
#[derive(Debug, Clone)]
pub struct GroupGesture {
    mode: TransformMode,
    reference: Member,
    others: Vec<Member>,
}

impl GroupGesture {
    /// 缓存选中体块与参考体块的起始位姿。
    ///
    /// 参考体块不在实时模型中时返回错误；选中集中已不存在的体块会被跳过。
    pub fn begin(
        store: &SessionStore,
        selection: &[BlockId],
        reference: &BlockId,
        mode: TransformMode,
    ) -> Result<Self, EngineError> {
        let reference_block = store
            .block(reference)
            .ok_or_else(|| EngineError::ReferenceNotFound(reference.to_string()))?;

        let mut others: Vec<Member> = Vec::with_capacity(selection.len());
        for id in selection {
            if id == reference || others.iter().any(|member| &member.id == id) {
                continue;
            }
            match store.block(id) {
                Some(block) => others.push(Member::capture(block)),
                None => debug!(id = %id, "手势跳过已不存在的体块"),
            }
        }

        debug!(
            reference = %reference,
            members = others.len() + 1,
            ?mode,
            "手势开始"
        );

        Ok(Self {
            mode,
            reference: Member::capture(reference_block),
            others,
        })
    }

    /// 以当前选中集和参考体块开始手势。
    pub fn from_selection(store: &SessionStore, mode: TransformMode) -> Result<Self, EngineError> {
        let reference = store.reference().ok_or(EngineError::EmptySelection)?;
        Self::begin(store, store.selection(), reference, mode)
    }

    #[inline]
    pub fn mode(&self) -> TransformMode {
        self.mode
    }

    #[inline]
    pub fn reference_id(&self) -> &BlockId {
        &self.reference.id
    }

    /// 参考体块在手势开始时的位姿。
    #[inline]
    pub fn reference_start(&self) -> Pose {
        self.reference.pose
    }

    /// 参与手势的体块数（含参考体块）。
    #[inline]
    pub fn member_count(&self) -> usize {
        self.others.len() + 1
    }

    /// 根据参考体块的当前位姿计算其余成员的临时位姿。幂等，不产生副作用。
    pub fn preview(&self, reference: &Pose) -> Vec<(BlockId, Pose)> {
        let delta = self.delta(reference);
        self.others
            .iter()
            .map(|member| (member.id.clone(), Self::apply(delta, member)))
            .collect()
    }

    /// 将所有成员（含参考体块）的最终位姿以一次批量修改写回。
    ///
    /// 位姿未发生变化时由 `apply_batch` 的无变化判定保证不写历史。
    pub fn commit(self, store: &mut SessionStore, reference: &Pose) -> bool {
        if !reference.is_finite() {
            warn!(reference = %self.reference.id, "参考位姿包含非有限值，放弃提交");
            return false;
        }
        let mut poses = self.preview(reference);
        poses.push((self.reference.id.clone(), reference.normalized()));

        let applied = store.apply_batch(|draft| {
            for (id, pose) in &poses {
                if let Some(block) = draft.block_mut(id) {
                    block.position = pose.position;
                    block.rotation = pose.rotation;
                }
            }
        });
        debug!(
            reference = %self.reference.id,
            members = poses.len(),
            applied,
            "手势提交"
        );
        applied
    }

    /// 丢弃缓存的基准。
    pub fn cancel(self) {
        debug!(reference = %self.reference.id, "手势取消");
    }

    fn delta(&self, reference: &Pose) -> Delta {
        if !reference.is_finite() {
            return Delta::Identity;
        }
        match self.mode {
            TransformMode::Translate => {
                let offset = reference.position - self.reference.pose.position;
                if offset == DVec3::ZERO {
                    Delta::Identity
                } else {
                    Delta::Translate(offset)
                }
            }
            TransformMode::Rotate => {
                let rotation =
                    (reference.orientation() * self.reference.orientation.inverse()).normalize();
                if rotation.xyz().length_squared() <= IDENTITY_EPSILON * IDENTITY_EPSILON {
                    Delta::Identity
                } else {
                    Delta::Rotate {
                        pivot: self.reference.pose.position,
                        rotation,
                    }
                }
            }
        }
    }

    fn apply(delta: Delta, member: &Member) -> Pose {
        match delta {
            Delta::Identity => member.pose,
            Delta::Translate(offset) => Pose::new(member.pose.position + offset, member.pose.rotation),
            Delta::Rotate { pivot, rotation } => Pose::new(
                pivot + rotation * (member.pose.position - pivot),
                degrees_from_orientation(rotation * member.orientation),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use massing_core::block::{BlockField, BlockUpdate};
    use proptest::prelude::*;

    use super::*;

    fn store_with_blocks(count: usize) -> (SessionStore, Vec<BlockId>) {
        let mut store = SessionStore::new();
        let mut ids = vec![store.blocks()[0].id.clone()];
        for _ in 1..count {
            ids.push(store.add_block());
        }
        store.set_selection(ids.iter());
        (store, ids)
    }

    #[test]
    fn missing_reference_cannot_start() {
        let (store, ids) = store_with_blocks(2);
        let err = GroupGesture::begin(
            &store,
            &ids,
            &BlockId::new("ghost"),
            TransformMode::Translate,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::ReferenceNotFound(_)));
    }

    #[test]
    fn empty_selection_cannot_start() {
        let mut store = SessionStore::new();
        store.clear_selection();
        let err = GroupGesture::from_selection(&store, TransformMode::Rotate).unwrap_err();
        assert_eq!(err, EngineError::EmptySelection);
    }

    #[test]
    fn five_block_translate_commits_one_history_entry() {
        let (mut store, ids) = store_with_blocks(5);
        let depth = store.undo_depth();
        let starts: Vec<DVec3> = store.blocks().iter().map(|b| b.position).collect();

        let gesture = GroupGesture::from_selection(&store, TransformMode::Translate).unwrap();
        assert_eq!(gesture.member_count(), 5);
        let d = DVec3::new(3.0, 1.5, -7.25);
        let target = Pose::new(starts[0] + d, DVec3::ZERO);

        let preview = gesture.preview(&target);
        assert_eq!(preview.len(), 4);
        assert_eq!(store.undo_depth(), depth);

        assert!(gesture.commit(&mut store, &target));
        assert_eq!(store.undo_depth(), depth + 1);
        for (index, id) in ids.iter().enumerate() {
            let block = store.block(id).unwrap();
            assert_eq!(block.position, starts[index] + d);
        }
    }

    #[test]
    fn commit_without_movement_is_a_no_op() {
        let (mut store, _) = store_with_blocks(3);
        let depth = store.undo_depth();
        let reference = store.reference().cloned().unwrap();
        let start = Pose::of(store.block(&reference).unwrap());

        for mode in [TransformMode::Translate, TransformMode::Rotate] {
            let gesture = GroupGesture::from_selection(&store, mode).unwrap();
            assert!(!gesture.commit(&mut store, &start));
        }
        assert_eq!(store.undo_depth(), depth);
    }

    #[test]
    fn rotate_swings_members_around_reference_pivot() {
        let (mut store, ids) = store_with_blocks(2);
        store.apply_batch(|draft| {
            draft.blocks[0].position = DVec3::new(10.0, 0.0, 5.0);
            draft.blocks[1].position = DVec3::new(20.0, 0.0, 5.0);
        });

        let gesture = GroupGesture::from_selection(&store, TransformMode::Rotate).unwrap();
        let pivot = DVec3::new(10.0, 0.0, 5.0);
        let target = Pose::new(pivot, DVec3::new(0.0, 0.0, 90.0));
        assert!(gesture.commit(&mut store, &target));

        let other = store.block(&ids[1]).unwrap();
        assert!((other.position - DVec3::new(10.0, 10.0, 5.0)).length() < 1e-9);
        assert!((other.rotation.z - 90.0).abs() < 1e-9);
        assert!(other.rotation.x.abs() < 1e-9);
        assert!(other.rotation.y.abs() < 1e-9);

        let reference = store.block(&ids[0]).unwrap();
        assert_eq!(reference.rotation, DVec3::new(0.0, 0.0, 90.0));
    }

    #[test]
    fn rotate_composes_with_existing_orientation() {
        let (mut store, ids) = store_with_blocks(2);
        store.update_block(
            &ids[1],
            &BlockUpdate::new()
                .with(BlockField::Position(DVec3::new(0.0, 0.0, 10.0)))
                .with(BlockField::RotationY(30.0)),
        );
        store.set_selection(ids.iter());

        let gesture = GroupGesture::from_selection(&store, TransformMode::Rotate).unwrap();
        let target = Pose::new(DVec3::ZERO, DVec3::new(0.0, 45.0, 0.0));
        let preview = gesture.preview(&target);
        let (_, pose) = &preview[0];

        let expected_position =
            DQuat::from_rotation_y(45f64.to_radians()) * DVec3::new(0.0, 0.0, 10.0);
        assert!((pose.position - expected_position).length() < 1e-9);
        assert!((pose.rotation.y - 75.0).abs() < 1e-9);
    }

    #[test]
    fn cancel_leaves_store_untouched() {
        let (store, _) = store_with_blocks(3);
        let before = store.snapshot();
        let gesture = GroupGesture::from_selection(&store, TransformMode::Translate).unwrap();
        let _ = gesture.preview(&Pose::new(DVec3::splat(50.0), DVec3::ZERO));
        gesture.cancel();
        assert_eq!(store.model(), &before);
    }

    #[test]
    fn reference_pose_is_authoritative_in_rotate_mode() {
        let (mut store, ids) = store_with_blocks(2);
        let gesture = GroupGesture::from_selection(&store, TransformMode::Rotate).unwrap();
        let target = Pose::new(DVec3::new(4.0, 0.0, 4.0), DVec3::new(0.0, 370.0, 0.0));
        assert!(gesture.commit(&mut store, &target));
        let reference = store.block(&ids[0]).unwrap();
        assert_eq!(reference.position, DVec3::new(4.0, 0.0, 4.0));
        assert!((reference.rotation.y - 10.0).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn translate_moves_every_member_by_reference_delta(
            offsets in proptest::collection::vec((-500.0f64..500.0, -50.0f64..50.0, -500.0f64..500.0), 1..6),
            dx in -100.0f64..100.0,
            dy in -10.0f64..10.0,
            dz in -100.0f64..100.0,
        ) {
            let (mut store, ids) = store_with_blocks(offsets.len());
            store.apply_batch(|draft| {
                for (block, (x, y, z)) in draft.blocks.iter_mut().zip(&offsets) {
                    block.position = DVec3::new(*x, *y, *z);
                }
            });
            store.set_selection(ids.iter());
            let starts: Vec<DVec3> = store.blocks().iter().map(|b| b.position).collect();
            let depth = store.undo_depth();

            let gesture = GroupGesture::from_selection(&store, TransformMode::Translate).unwrap();
            let d = DVec3::new(dx, dy, dz);
            let moved = gesture.commit(&mut store, &Pose::new(starts[0] + d, DVec3::ZERO));

            let expected_depth = if moved { depth + 1 } else { depth };
            prop_assert_eq!(store.undo_depth(), expected_depth);
            prop_assert_eq!(store.block(&ids[0]).unwrap().position, starts[0] + d);
            for (index, id) in ids.iter().enumerate().skip(1) {
                let block = store.block(id).unwrap();
                prop_assert_eq!(block.position, starts[index] + (starts[0] + d - starts[0]));
            }
        }
    }
}
