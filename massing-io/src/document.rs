//! 会话文件中的 JSON 文档：`model.json` 与 `context.json`。
//!
//! 解码先检查 `schemaVersion`，再做结构与数值校验；任何一项失败都会拒绝整个文档。

use std::collections::HashSet;

use chrono::Utc;
use glam::DVec3;
use massing_core::block::{Block, BlockId, Program};
use massing_core::context::{
    BuildingFootprint, CONTEXT_SCHEMA_VERSION, ContextSnapshot, GeoPoint, MAX_CONTEXT_BUILDINGS,
};
use massing_core::geometry::normalize_degrees;
use massing_core::session::SessionModel;
use massing_core::units::UnitSystem;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::IoError;

pub const MODEL_SCHEMA_VERSION: u32 = 1;
pub const DEFAULT_CONTEXT_SOURCE: &str = "tbk";

/// 文件中的体块记录，字段与 `model.json` 一一对应。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRecord {
    pub id: String,
    pub name: String,
    pub x_size: f64,
    pub y_size: f64,
    pub levels: u32,
    pub level_height: f64,
    pub pos_x: f64,
    pub pos_y: f64,
    pub pos_z: f64,
    #[serde(default)]
    pub rotation_x: f64,
    #[serde(default)]
    pub rotation_y: f64,
    #[serde(default)]
    pub rotation_z: f64,
    pub default_function: Program,
}

impl From<&Block> for BlockRecord {
    fn from(block: &Block) -> Self {
        Self {
            id: block.id.to_string(),
            name: block.name.clone(),
            x_size: block.x_size,
            y_size: block.y_size,
            levels: block.levels,
            level_height: block.level_height,
            pos_x: block.position.x,
            pos_y: block.position.y,
            pos_z: block.position.z,
            rotation_x: block.rotation.x,
            rotation_y: block.rotation.y,
            rotation_z: block.rotation.z,
            default_function: block.program,
        }
    }
}

impl BlockRecord {
    fn into_block(self) -> Block {
        Block {
            id: BlockId::new(self.id),
            name: self.name,
            x_size: self.x_size,
            y_size: self.y_size,
            levels: self.levels,
            level_height: self.level_height,
            position: DVec3::new(self.pos_x, self.pos_y, self.pos_z),
            rotation: DVec3::new(
                normalize_degrees(self.rotation_x),
                normalize_degrees(self.rotation_y),
                normalize_degrees(self.rotation_z),
            ),
            program: self.default_function,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDocument {
    pub schema_version: u32,
    pub units: UnitSystem,
    pub blocks: Vec<BlockRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl ModelDocument {
    pub fn from_model(model: &SessionModel) -> Self {
        Self {
            schema_version: MODEL_SCHEMA_VERSION,
            units: model.units,
            blocks: model.blocks.iter().map(BlockRecord::from).collect(),
            created_at: Some(Utc::now().to_rfc3339()),
        }
    }
}

/// 解码 `model.json`。体块列表为空时原样返回，由会话在重置时补充默认体块。
pub fn decode_model(value: Value) -> Result<(SessionModel, Option<String>), IoError> {
    check_schema_version("model.json", &value, MODEL_SCHEMA_VERSION)?;
    let document: ModelDocument = serde_json::from_value(value)?;

    let mut seen = HashSet::new();
    let mut blocks = Vec::with_capacity(document.blocks.len());
    for (index, record) in document.blocks.into_iter().enumerate() {
        let block = record.into_block();
        block
            .validate()
            .map_err(|err| IoError::InvalidDocument(format!("block #{index}: {err}")))?;
        if !seen.insert(block.id.clone()) {
            return Err(IoError::InvalidDocument(format!(
                "block #{index}: duplicate id `{}`",
                block.id
            )));
        }
        blocks.push(block);
    }

    debug!(blocks = blocks.len(), units = %document.units, "model.json 解码完成");
    Ok((
        SessionModel::new(document.units, blocks),
        document.created_at,
    ))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextDocument {
    pub schema_version: u32,
    pub center: GeoPoint,
    pub radius_m: f64,
    pub buildings: Vec<BuildingFootprint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetched_at: Option<String>,
    pub source: String,
}

impl From<&ContextSnapshot> for ContextDocument {
    fn from(snapshot: &ContextSnapshot) -> Self {
        Self {
            schema_version: CONTEXT_SCHEMA_VERSION,
            center: snapshot.center,
            radius_m: snapshot.radius_m,
            buildings: snapshot.buildings.clone(),
            fetched_at: snapshot.fetched_at.clone(),
            source: snapshot.source.clone(),
        }
    }
}

/// 解码 `context.json`。
///
/// 版本不符或缺少中心点/半径时整体拒绝；单个建筑中的坏点被丢弃，
/// 不足 3 个点的建筑被跳过，数量超过上限的部分被截断。
pub fn decode_context(value: Value) -> Result<ContextSnapshot, IoError> {
    check_schema_version("context.json", &value, CONTEXT_SCHEMA_VERSION)?;

    let center = value
        .get("center")
        .and_then(|center| {
            let lat = center.get("lat")?.as_f64()?;
            let lon = center.get("lon")?.as_f64()?;
            Some(GeoPoint::new(lat, lon))
        })
        .ok_or_else(|| IoError::InvalidDocument("context.json: missing center".to_string()))?;
    let radius_m = value
        .get("radiusM")
        .and_then(Value::as_f64)
        .ok_or_else(|| IoError::InvalidDocument("context.json: missing radiusM".to_string()))?;
    let rows = value
        .get("buildings")
        .and_then(Value::as_array)
        .ok_or_else(|| IoError::InvalidDocument("context.json: missing buildings".to_string()))?;

    let buildings = sanitize_buildings(rows);
    debug!(
        rows = rows.len(),
        kept = buildings.len(),
        "context.json 解码完成"
    );

    Ok(ContextSnapshot {
        center,
        radius_m,
        buildings,
        fetched_at: value
            .get("fetchedAt")
            .and_then(Value::as_str)
            .map(str::to_string),
        source: value
            .get("source")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_CONTEXT_SOURCE)
            .to_string(),
    })
}

fn sanitize_buildings(rows: &[Value]) -> Vec<BuildingFootprint> {
    let mut sanitized = Vec::new();
    for row in rows {
        let Some(id) = row.get("id").and_then(Value::as_str) else {
            continue;
        };
        let Some(points) = row.get("footprint").and_then(Value::as_array) else {
            continue;
        };
        let footprint: Vec<[f64; 2]> = points
            .iter()
            .filter_map(|point| {
                let pair = point.as_array()?;
                let lat = pair.first()?.as_f64()?;
                let lon = pair.get(1)?.as_f64()?;
                (lat.is_finite() && lon.is_finite()).then_some([lat, lon])
            })
            .collect();
        if footprint.len() < 3 {
            continue;
        }
        sanitized.push(BuildingFootprint {
            id: id.to_string(),
            footprint,
            height_m: row.get("heightM").and_then(Value::as_f64),
            levels: row
                .get("levels")
                .and_then(Value::as_f64)
                .filter(|levels| levels.is_finite() && *levels >= 0.0 && *levels <= f64::from(u32::MAX))
                .map(|levels| levels.trunc() as u32),
        });
        if sanitized.len() >= MAX_CONTEXT_BUILDINGS {
            break;
        }
    }
    sanitized
}

fn check_schema_version(document: &'static str, value: &Value, expected: u32) -> Result<(), IoError> {
    if !value.is_object() {
        return Err(IoError::InvalidDocument(format!(
            "{document}: expected a JSON object"
        )));
    }
    let found = value.get("schemaVersion").and_then(Value::as_u64);
    if found != Some(u64::from(expected)) {
        return Err(IoError::SchemaVersion {
            document,
            found,
            expected,
        });
    }
    Ok(())
}
