use chrono::Utc;
use glam::DVec3;
use massing_core::block::{Block, Program};
use massing_core::metrics::{Metrics, compute_metrics};
use massing_core::session::SessionModel;
use massing_core::units::UnitSystem;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::errors::EngineError;
use crate::store::SessionStore;

/// 可同时保存的方案数量上限。
pub const MAX_SCENARIOS: usize = 3;

/// 一个保存下来的设计方案：模型快照加上保存时计算的指标。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioOption {
    pub id: String,
    pub name: String,
    pub created_at: String,
    pub source: String,
    pub model: SessionModel,
    pub metrics: Metrics,
}

impl ScenarioOption {
    pub fn new(name: impl Into<String>, model: SessionModel) -> Self {
        let metrics = compute_metrics(&model);
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            created_at: Utc::now().to_rfc3339(),
            source: "blocks".to_string(),
            model,
            metrics,
        }
    }

    /// 从当前会话拍摄方案。
    pub fn capture(name: impl Into<String>, store: &SessionStore) -> Self {
        Self::new(name, store.snapshot())
    }

    /// 两个体块组成的演示方案。
    pub fn demo() -> Self {
        let mut podium = Block::with_defaults(0);
        podium.levels = 6;

        let mut tower = Block::with_defaults(1);
        tower.x_size = 15.0;
        tower.y_size = 15.0;
        tower.levels = 10;
        tower.position = DVec3::new(30.0, 0.0, 0.0);
        tower.program = Program::Residential;

        Self::new(
            "Demo Option",
            SessionModel::new(UnitSystem::Metric, vec![podium, tower]),
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScenarioBook {
    options: Vec<ScenarioOption>,
    selected: Option<String>,
}

impl ScenarioBook {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn options(&self) -> &[ScenarioOption] {
        &self.options
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.options.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.options.len() >= MAX_SCENARIOS
    }

    pub fn get(&self, id: &str) -> Option<&ScenarioOption> {
        self.options.iter().find(|option| option.id == id)
    }

    /// 追加并选中方案。已满时返回错误，调用方可改为 `replace`。
    pub fn add(&mut self, option: ScenarioOption) -> Result<&ScenarioOption, EngineError> {
        if self.is_full() {
            return Err(EngineError::ScenarioSlotsFull(MAX_SCENARIOS));
        }
        debug!(id = %option.id, name = %option.name, "已保存方案");
        self.selected = Some(option.id.clone());
        self.options.push(option);
        let index = self.options.len() - 1;
        Ok(&self.options[index])
    }

    /// 用新方案替换指定槽位并选中它。
    pub fn replace(&mut self, id: &str, next: ScenarioOption) -> Result<(), EngineError> {
        let slot = self
            .options
            .iter_mut()
            .find(|option| option.id == id)
            .ok_or_else(|| EngineError::ScenarioNotFound(id.to_string()))?;
        debug!(old = %id, new = %next.id, "已替换方案");
        self.selected = Some(next.id.clone());
        *slot = next;
        Ok(())
    }

    pub fn select(&mut self, id: &str) -> Result<(), EngineError> {
        if self.get(id).is_none() {
            return Err(EngineError::ScenarioNotFound(id.to_string()));
        }
        self.selected = Some(id.to_string());
        Ok(())
    }

    /// 当前选中的方案；未选中时退回第一个。
    pub fn selected(&self) -> Option<&ScenarioOption> {
        self.selected
            .as_deref()
            .and_then(|id| self.get(id))
            .or_else(|| self.options.first())
    }

    /// 为空时插入演示方案。
    pub fn seed_if_empty(&mut self) -> bool {
        if !self.options.is_empty() {
            return false;
        }
        let option = ScenarioOption::demo();
        self.selected = Some(option.id.clone());
        self.options.push(option);
        true
    }
}
