use glam::DVec3;
use massing_core::block::{BlockField, BlockUpdate};
use massing_core::session::SessionModel;
use massing_engine::store::SessionStore;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Add,
    Levels(usize, u32),
    Remove(usize),
    Move(usize, f64, f64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Add),
        (0usize..8, 1u32..40).prop_map(|(slot, levels)| Op::Levels(slot, levels)),
        (0usize..8).prop_map(Op::Remove),
        (0usize..8, -50.0f64..50.0, -50.0f64..50.0).prop_map(|(slot, x, z)| Op::Move(slot, x, z)),
    ]
}

/// 执行操作并返回是否写入了历史。
fn run(store: &mut SessionStore, op: &Op) -> bool {
    let pick = |store: &SessionStore, slot: usize| {
        let blocks = store.blocks();
        blocks[slot % blocks.len()].id.clone()
    };
    match op {
        Op::Add => {
            store.add_block();
            true
        }
        Op::Levels(slot, levels) => {
            let id = pick(store, *slot);
            store.update_block(&id, &BlockField::Levels(*levels).into())
        }
        Op::Remove(slot) => {
            let id = pick(store, *slot);
            store.remove_block(&id)
        }
        Op::Move(slot, x, z) => {
            let id = pick(store, *slot);
            let update = BlockUpdate::new().with(BlockField::Position(DVec3::new(*x, 0.0, *z)));
            store.update_block(&id, &update)
        }
    }
}

proptest! {
    #[test]
    fn undo_then_redo_restores_every_state(ops in proptest::collection::vec(op_strategy(), 1..30)) {
        let mut store = SessionStore::new();
        let mut states: Vec<SessionModel> = vec![store.snapshot()];
        for op in &ops {
            if run(&mut store, op) {
                states.push(store.snapshot());
            }
        }
        let applied = states.len() - 1;
        prop_assert_eq!(store.undo_depth(), applied);

        for expected in states.iter().rev().skip(1) {
            prop_assert!(store.undo());
            prop_assert_eq!(store.model(), expected);
        }
        prop_assert!(!store.undo());

        for expected in states.iter().skip(1) {
            prop_assert!(store.redo());
            prop_assert_eq!(store.model(), expected);
        }
        prop_assert!(!store.redo());
        prop_assert!(store.blocks().len() >= 1);
    }

    #[test]
    fn unchanged_batches_never_grow_history(ops in proptest::collection::vec(op_strategy(), 0..10)) {
        let mut store = SessionStore::new();
        for op in &ops {
            run(&mut store, op);
        }
        let depth = store.undo_depth();
        let revision = store.revision();
        let applied = store.apply_batch(|draft| {
            let copy = draft.blocks.clone();
            draft.blocks = copy;
        });
        prop_assert!(!applied);
        prop_assert_eq!(store.undo_depth(), depth);
        prop_assert_eq!(store.revision(), revision);
    }
}

#[test]
fn reset_is_a_hard_history_boundary() {
    let mut store = SessionStore::new();
    store.add_block();
    store.add_block();
    store.reset(None);
    assert_eq!(store.blocks().len(), 1);
    assert!(!store.undo());
}
