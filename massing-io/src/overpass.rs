//! Overpass API 的查询构造与响应解析。网络请求本身不在此处。

use massing_core::context::{BuildingFootprint, GeoPoint};
use serde_json::Value;
use tracing::debug;

use crate::IoError;

pub const OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";

/// 半径范围内带 `building` 标签的 way 与 relation，附带几何。
pub fn build_query(center: GeoPoint, radius_m: f64) -> String {
    let around = format!("(around:{radius_m},{},{})", center.lat, center.lon);
    format!(
        "[out:json][timeout:25];\n(\n  way[\"building\"]{around};\n  relation[\"building\"]{around};\n);\nout body geom;"
    )
}

pub fn parse_response(text: &str) -> Result<Vec<BuildingFootprint>, IoError> {
    let value: Value = serde_json::from_str(text)?;
    Ok(parse_buildings(&value))
}

/// 从 Overpass JSON 中提取建筑轮廓，跳过无几何、非 way/relation 或点数不足 3 的元素。
pub fn parse_buildings(data: &Value) -> Vec<BuildingFootprint> {
    let Some(elements) = data.get("elements").and_then(Value::as_array) else {
        return Vec::new();
    };

    let buildings: Vec<BuildingFootprint> = elements
        .iter()
        .filter_map(|element| {
            let kind = element.get("type").and_then(Value::as_str)?;
            if kind != "way" && kind != "relation" {
                return None;
            }
            let footprint = parse_geometry(element.get("geometry")?)?;
            let id = match element.get("id")? {
                Value::String(raw) => raw.clone(),
                Value::Number(raw) => raw.to_string(),
                _ => return None,
            };
            let tags = element.get("tags");
            Some(BuildingFootprint {
                id: format!("{kind}/{id}"),
                footprint,
                height_m: tags.and_then(|tags| tag_text(tags, "height")).and_then(parse_height),
                levels: tags
                    .and_then(|tags| {
                        tag_text(tags, "building:levels").or_else(|| tag_text(tags, "levels"))
                    })
                    .and_then(parse_levels),
            })
        })
        .collect();

    debug!(
        elements = elements.len(),
        buildings = buildings.len(),
        "Overpass 响应解析完成"
    );
    buildings
}

fn parse_geometry(geometry: &Value) -> Option<Vec<[f64; 2]>> {
    let nodes = geometry.as_array()?;
    let points: Vec<[f64; 2]> = nodes
        .iter()
        .filter_map(|node| {
            let lat = node.get("lat")?.as_f64()?;
            let lon = node.get("lon")?.as_f64()?;
            Some([round6(lat), round6(lon)])
        })
        .collect();
    (points.len() >= 3).then_some(points)
}

#[inline]
fn round6(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}

fn tag_text(tags: &Value, key: &str) -> Option<String> {
    match tags.get(key)? {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// 只保留数字与小数点后取最长的合法数值前缀，例如 `"12.5 m"` -> 12.5。
fn parse_height(raw: String) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|ch| ch.is_ascii_digit() || *ch == '.')
        .collect();
    let mut end = 0;
    let mut seen_dot = false;
    for (index, ch) in cleaned.char_indices() {
        if ch == '.' {
            if seen_dot {
                break;
            }
            seen_dot = true;
        }
        end = index + 1;
    }
    cleaned[..end].parse::<f64>().ok()
}

/// 取前导整数部分，例如 `"5;6"` -> 5。
fn parse_levels(raw: String) -> Option<u32> {
    let trimmed = raw.trim_start();
    let digits: String = trimmed
        .strip_prefix('+')
        .unwrap_or(trimmed)
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse::<u32>().ok()
}
