pub mod align;
pub mod command;
pub mod context;
pub mod fetch;
pub mod scenarios;
pub mod transform;

pub mod errors {
    use thiserror::Error;

    #[derive(Debug, Clone, PartialEq, Error)]
    pub enum EngineError {
        #[error("reference block {0} is not in the session")]
        ReferenceNotFound(String),
        #[error("selection is empty")]
        EmptySelection,
        #[error("all {0} scenario slots are in use")]
        ScenarioSlotsFull(usize),
        #[error("scenario with id {0} not found")]
        ScenarioNotFound(String),
    }
}

pub mod store {
    use std::collections::VecDeque;

    use massing_core::block::{Block, BlockId, BlockUpdate, unique_name};
    use massing_core::session::SessionModel;
    use massing_core::units::UnitSystem;
    use tracing::debug;

    /// 默认历史深度。
    pub const DEFAULT_HISTORY_LIMIT: usize = 50;

    /// 会话状态的唯一写入点：体块列表、单位制、选中集与撤销/重做历史。
    ///
    /// 历史条目是 `SessionModel` 的独立副本（值语义），实时状态不会与历史共享数据。
    /// 所有操作都是全函数：未知 id、删除最后一个体块、无变化的批量修改都只是空操作，
    /// 通过返回值 `false` 告知调用方，不产生错误。其中只有 `update_block` 对未知 id
    /// 仍会写入历史并清空重做栈。
    #[derive(Debug, Clone)]
    pub struct SessionStore {
        model: SessionModel,
        selection: Vec<BlockId>,
        past: VecDeque<SessionModel>,
        future: VecDeque<SessionModel>,
        history_limit: usize,
        revision: u64,
    }

    impl SessionStore {
        pub fn new() -> Self {
            Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
        }

        /// 指定历史深度（至少为 1）。
        pub fn with_history_limit(limit: usize) -> Self {
            let model = SessionModel::with_default_block();
            let selection = model.blocks.iter().take(1).map(|b| b.id.clone()).collect();
            Self {
                model,
                selection,
                past: VecDeque::new(),
                future: VecDeque::new(),
                history_limit: limit.max(1),
                revision: 0,
            }
        }

        /// 以给定模型初始化，等价于 `new()` 之后 `reset(Some(model))`。
        pub fn from_model(model: SessionModel) -> Self {
            let mut store = Self::new();
            store.reset(Some(model));
            store
        }

        #[inline]
        pub fn model(&self) -> &SessionModel {
            &self.model
        }

        #[inline]
        pub fn blocks(&self) -> &[Block] {
            &self.model.blocks
        }

        #[inline]
        pub fn block(&self, id: &BlockId) -> Option<&Block> {
            self.model.block(id)
        }

        #[inline]
        pub fn units(&self) -> UnitSystem {
            self.model.units
        }

        /// 选中集，按选中先后排序。
        #[inline]
        pub fn selection(&self) -> &[BlockId] {
            &self.selection
        }

        /// 参考体块：最先被选中的体块。
        #[inline]
        pub fn reference(&self) -> Option<&BlockId> {
            self.selection.first()
        }

        #[inline]
        pub fn is_selected(&self, id: &BlockId) -> bool {
            self.selection.contains(id)
        }

        #[inline]
        pub fn can_undo(&self) -> bool {
            !self.past.is_empty()
        }

        #[inline]
        pub fn can_redo(&self) -> bool {
            !self.future.is_empty()
        }

        #[inline]
        pub fn undo_depth(&self) -> usize {
            self.past.len()
        }

        #[inline]
        pub fn redo_depth(&self) -> usize {
            self.future.len()
        }

        #[inline]
        pub fn history_limit(&self) -> usize {
            self.history_limit
        }

        /// 每次实时状态变化都会递增，供观察者轮询。
        #[inline]
        pub fn revision(&self) -> u64 {
            self.revision
        }

        /// 当前模型的深拷贝，用于保存与导出。
        #[inline]
        pub fn snapshot(&self) -> SessionModel {
            self.model.clone()
        }

        /// 追加一个默认体块并选中它，返回新体块 id。
        pub fn add_block(&mut self) -> BlockId {
            let block = Block::with_defaults(self.model.blocks.len());
            let id = block.id.clone();
            self.record();
            self.model.blocks.push(block);
            self.selection = vec![id.clone()];
            self.touch();
            debug!(id = %id, count = self.model.blocks.len(), "已添加体块");
            id
        }

        /// 局部更新体块字段，返回是否修改了体块。
        ///
        /// 校验失败的更新被拒绝，不写历史。id 不存在时体块保持不变，
        /// 但调用仍然有效：照常写入历史并清空重做栈。
        pub fn update_block(&mut self, id: &BlockId, update: &BlockUpdate) -> bool {
            if let Err(err) = update.validate() {
                debug!(id = %id, error = %err, "更新被忽略：字段校验失败");
                return false;
            }
            self.record();
            if !self.model.contains(id) {
                self.touch();
                debug!(id = %id, "体块不存在，更新未修改任何体块");
                return false;
            }
            if let Some(block) = self.model.block_mut(id) {
                update.apply_to(block);
            }
            self.touch();
            true
        }

        /// 重命名；名称去除首尾空白后为空则忽略，重名时追加 ` (2)`、` (3)` …
        pub fn rename_block(&mut self, id: &BlockId, name: &str) -> bool {
            let desired = name.trim();
            if desired.is_empty() {
                return false;
            }
            let Some(current) = self.model.block(id) else {
                debug!(id = %id, "重命名被忽略：体块不存在");
                return false;
            };
            if current.name == desired {
                return false;
            }
            let resolved = unique_name(
                desired,
                self.model
                    .blocks
                    .iter()
                    .filter(|block| &block.id != id)
                    .map(|block| block.name.as_str()),
            );
            self.record();
            if let Some(block) = self.model.block_mut(id) {
                block.name = resolved;
            }
            self.touch();
            true
        }

        /// 复制体块并选中副本。未知 id 返回 `None`。
        pub fn duplicate_block(&mut self, id: &BlockId) -> Option<BlockId> {
            let copy = self.model.block(id)?.duplicate(self.model.blocks.len());
            let copy_id = copy.id.clone();
            self.record();
            self.model.blocks.push(copy);
            self.selection = vec![copy_id.clone()];
            self.touch();
            debug!(source = %id, copy = %copy_id, "已复制体块");
            Some(copy_id)
        }

        /// 删除体块并移出选中集。会话中只剩一个体块时拒绝删除。
        pub fn remove_block(&mut self, id: &BlockId) -> bool {
            let Some(index) = self.model.position_of(id) else {
                debug!(id = %id, "删除被忽略：体块不存在");
                return false;
            };
            if self.model.blocks.len() <= 1 {
                debug!(id = %id, "删除被忽略：会话至少保留一个体块");
                return false;
            }
            self.record();
            self.model.blocks.remove(index);
            self.selection.retain(|selected| selected != id);
            self.touch();
            true
        }

        /// 切换单位制。只影响显示，但会写入历史。
        pub fn set_units(&mut self, units: UnitSystem) -> bool {
            if self.model.units == units {
                return false;
            }
            self.record();
            self.model.units = units;
            self.touch();
            true
        }

        /// 整体替换会话状态并清空历史。空模型会补一个默认体块，选中第一个体块。
        pub fn reset(&mut self, model: Option<SessionModel>) {
            let mut model = model.unwrap_or_else(SessionModel::with_default_block);
            if model.ensure_not_empty() {
                debug!("加载的模型为空，已补充默认体块");
            }
            self.selection = model.blocks.iter().take(1).map(|b| b.id.clone()).collect();
            self.model = model;
            self.past.clear();
            self.future.clear();
            self.touch();
            debug!(count = self.model.blocks.len(), "会话已重置");
        }

        /// 在工作副本上执行批量修改。副本与实时状态完全相同时不写历史。
        ///
        /// 修改后体块列表为空的副本会被拒绝。
        pub fn apply_batch<F>(&mut self, mutator: F) -> bool
        where
            F: FnOnce(&mut SessionModel),
        {
            let mut draft = self.model.clone();
            mutator(&mut draft);
            if draft.blocks.is_empty() {
                debug!("批量修改被拒绝：结果不含任何体块");
                return false;
            }
            if draft == self.model {
                debug!("批量修改无变化，跳过历史记录");
                return false;
            }
            self.record();
            self.model = draft;
            self.prune_selection();
            self.touch();
            true
        }

        pub fn undo(&mut self) -> bool {
            let Some(previous) = self.past.pop_back() else {
                return false;
            };
            let current = std::mem::replace(&mut self.model, previous);
            self.future.push_front(current);
            self.future.truncate(self.history_limit);
            self.prune_selection();
            self.touch();
            debug!(
                undo = self.past.len(),
                redo = self.future.len(),
                "已撤销"
            );
            true
        }

        pub fn redo(&mut self) -> bool {
            let Some(next) = self.future.pop_front() else {
                return false;
            };
            let current = std::mem::replace(&mut self.model, next);
            self.push_past(current);
            self.prune_selection();
            self.touch();
            debug!(
                undo = self.past.len(),
                redo = self.future.len(),
                "已重做"
            );
            true
        }

        /// `None` 清空选中集；非追加模式选中唯一体块；追加模式切换成员关系。
        /// 选中不会写入历史，未知 id 为空操作。
        pub fn select(&mut self, id: Option<&BlockId>, additive: bool) -> bool {
            let Some(id) = id else {
                let changed = !self.selection.is_empty();
                self.selection.clear();
                return changed;
            };
            if !self.model.contains(id) {
                debug!(id = %id, "选中被忽略：体块不存在");
                return false;
            }
            if !additive {
                self.selection = vec![id.clone()];
            } else if let Some(index) = self.selection.iter().position(|s| s == id) {
                self.selection.remove(index);
            } else {
                self.selection.push(id.clone());
            }
            true
        }

        /// 按顺序设置选中集，自动过滤未知与重复 id。
        pub fn set_selection<'a>(&mut self, ids: impl IntoIterator<Item = &'a BlockId>) {
            self.selection.clear();
            for id in ids {
                if self.model.contains(id) && !self.selection.contains(id) {
                    self.selection.push(id.clone());
                }
            }
        }

        #[inline]
        pub fn clear_selection(&mut self) {
            self.selection.clear();
        }

        fn record(&mut self) {
            let snapshot = self.model.clone();
            self.push_past(snapshot);
            self.future.clear();
        }

        fn push_past(&mut self, snapshot: SessionModel) {
            self.past.push_back(snapshot);
            while self.past.len() > self.history_limit {
                self.past.pop_front();
            }
        }

        fn prune_selection(&mut self) {
            let model = &self.model;
            self.selection.retain(|id| model.contains(id));
        }

        #[inline]
        fn touch(&mut self) {
            self.revision = self.revision.wrapping_add(1);
        }
    }

    impl Default for SessionStore {
        fn default() -> Self {
            Self::new()
        }
    }

}
