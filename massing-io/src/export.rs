use std::fs;
use std::path::Path;

use chrono::Utc;
use massing_core::metrics::{Metrics, compute_metrics};
use massing_core::session::SessionModel;
use massing_core::units::UnitSystem;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::IoError;
use crate::document::BlockRecord;

/// 供下游报表使用的导出内容：体块记录与派生指标。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportPayload {
    pub units: UnitSystem,
    pub generated_at: String,
    pub blocks: Vec<BlockRecord>,
    pub metrics: Metrics,
}

impl ExportPayload {
    pub fn from_model(model: &SessionModel) -> Self {
        Self {
            units: model.units,
            generated_at: Utc::now().to_rfc3339(),
            blocks: model.blocks.iter().map(BlockRecord::from).collect(),
            metrics: compute_metrics(model),
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, IoError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_to(&self, path: &Path) -> Result<(), IoError> {
        let text = self.to_json_pretty()?;
        fs::write(path, text).map_err(|source| IoError::WriteError {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), blocks = self.blocks.len(), "导出完成");
        Ok(())
    }
}
