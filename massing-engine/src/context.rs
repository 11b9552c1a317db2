//! 周边建筑准备流程：把不可信的经纬度轮廓转换为局部坐标下可直接拉伸的多边形。
//!
//! 投影采用等距圆柱近似，仅适用于几十到几百米的查询半径；
//! 更大的范围会产生明显的形变。

use massing_core::block::DEFAULT_LEVEL_HEIGHT;
use massing_core::context::{BuildingFootprint, GeoPoint, MAX_CONTEXT_BUILDINGS};
use massing_core::geometry::{Point2, clamp, is_finite_polygon, seeded_noise, signed_area};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// 每经度（赤道处）对应的米数，需再乘以 cos(纬度)。
pub const METERS_PER_DEGREE_LON: f64 = 111_320.0;
/// 每纬度对应的米数。
pub const METERS_PER_DEGREE_LAT: f64 = 110_540.0;

pub const DEFAULT_MIN_HEIGHT: f64 = 6.0;
pub const DEFAULT_MAX_HEIGHT: f64 = 80.0;
pub const DEFAULT_FALLBACK_HEIGHT: f64 = 12.0;
pub const DEFAULT_MIN_AREA: f64 = 1e-2;

const CLOSURE_EPSILON: f64 = 0.01;
const JITTER_RATIO: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PreparationSettings {
    pub max_buildings: usize,
    pub default_level_height: f64,
    pub min_height: f64,
    pub max_height: f64,
    pub fallback_height: f64,
    pub min_area: f64,
}

impl Default for PreparationSettings {
    fn default() -> Self {
        Self {
            max_buildings: MAX_CONTEXT_BUILDINGS,
            default_level_height: DEFAULT_LEVEL_HEIGHT,
            min_height: DEFAULT_MIN_HEIGHT,
            max_height: DEFAULT_MAX_HEIGHT,
            fallback_height: DEFAULT_FALLBACK_HEIGHT,
            min_area: DEFAULT_MIN_AREA,
        }
    }
}

/// 每次运行的统计，用于诊断真实数据源的质量。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparationStats {
    pub input_count: usize,
    pub valid_count: usize,
    pub skipped_too_few_points: usize,
    pub skipped_nan: usize,
    pub skipped_degenerate_area: usize,
    pub skipped_other: usize,
    pub corrected_swaps: usize,
}

impl PreparationStats {
    pub fn skipped_total(&self) -> usize {
        self.skipped_too_few_points
            + self.skipped_nan
            + self.skipped_degenerate_area
            + self.skipped_other
    }
}

/// 渲染层可直接使用的建筑：闭合的局部多边形 (x, z) 与最终高度。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextMesh {
    pub id: String,
    pub polygon: Vec<Point2>,
    pub height: f64,
    /// 高度是否由中位数推断得到。
    pub inferred: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextPreparation {
    pub meshes: Vec<ContextMesh>,
    pub stats: PreparationStats,
}

/// 经纬度 -> 以 `center` 为原点的局部平面坐标 (x 向东, z 向南)。
#[inline]
pub fn project_to_local(lat: f64, lon: f64, center: GeoPoint) -> Point2 {
    let x = (lon - center.lon) * center.lat.to_radians().cos() * METERS_PER_DEGREE_LON;
    let z = -(lat - center.lat) * METERS_PER_DEGREE_LAT;
    Point2::new(x, z)
}

struct Accepted<'a> {
    id: &'a str,
    index: usize,
    polygon: Vec<Point2>,
    known_height: Option<f64>,
}

enum Rejection {
    TooFewPoints,
    NonFinite,
    OutOfRange,
    Degenerate,
}

/// 准备周边建筑数据。
///
/// 中心点未设置（或无效）或输入为空时返回 `None`。其余情况总会返回统计信息，
/// 即使所有建筑都被剔除。相同输入的结果逐位相同。
pub fn prepare_context_payload(
    center: Option<GeoPoint>,
    radius_m: f64,
    buildings: &[BuildingFootprint],
    settings: &PreparationSettings,
) -> Option<ContextPreparation> {
    let center = center.filter(|center| center.is_valid())?;
    if buildings.is_empty() {
        return None;
    }

    let mut stats = PreparationStats {
        input_count: buildings.len(),
        ..PreparationStats::default()
    };
    let mut accepted: Vec<Accepted<'_>> = Vec::new();

    for building in buildings {
        if accepted.len() >= settings.max_buildings {
            debug!(limit = settings.max_buildings, "已达到周边建筑数量上限");
            break;
        }

        let (coordinates, swapped) = repair_coordinate_order(&building.footprint);
        if swapped {
            stats.corrected_swaps += 1;
            trace!(id = %building.id, "经纬度顺序已交换");
        }

        match build_ring(&coordinates, center, settings.min_area) {
            Ok(polygon) => accepted.push(Accepted {
                id: &building.id,
                index: accepted.len(),
                polygon,
                known_height: known_height(building, settings.default_level_height),
            }),
            Err(reason) => {
                let label = match reason {
                    Rejection::TooFewPoints => {
                        stats.skipped_too_few_points += 1;
                        "too_few_points"
                    }
                    Rejection::NonFinite => {
                        stats.skipped_nan += 1;
                        "nan"
                    }
                    Rejection::OutOfRange => {
                        stats.skipped_other += 1;
                        "out_of_range"
                    }
                    Rejection::Degenerate => {
                        stats.skipped_degenerate_area += 1;
                        "degenerate_area"
                    }
                };
                trace!(id = %building.id, reason = label, "周边建筑被剔除");
            }
        }
    }

    let mut samples: Vec<f64> = accepted.iter().filter_map(|item| item.known_height).collect();
    let baseline = median(&mut samples).unwrap_or(settings.fallback_height);
    let seed_base = center.fetch_key(radius_m);

    let meshes: Vec<ContextMesh> = accepted
        .into_iter()
        .map(|item| {
            let (raw, inferred) = match item.known_height {
                Some(height) => (height, false),
                None => {
                    let key = format!("{seed_base}-{}-{}", item.id, item.index);
                    (baseline * (1.0 + JITTER_RATIO * seeded_noise(&key)), true)
                }
            };
            ContextMesh {
                id: item.id.to_string(),
                polygon: item.polygon,
                height: clamp(raw, settings.min_height, settings.max_height),
                inferred,
            }
        })
        .collect();

    stats.valid_count = meshes.len();
    debug!(
        input = stats.input_count,
        valid = stats.valid_count,
        too_few = stats.skipped_too_few_points,
        nan = stats.skipped_nan,
        degenerate = stats.skipped_degenerate_area,
        other = stats.skipped_other,
        swaps = stats.corrected_swaps,
        baseline,
        "周边建筑准备完成"
    );

    Some(ContextPreparation { meshes, stats })
}

/// 前两个点超出经纬度范围时认为 (lat, lon) 顺序颠倒，整体交换。
fn repair_coordinate_order(footprint: &[[f64; 2]]) -> (Vec<[f64; 2]>, bool) {
    let swapped = footprint
        .iter()
        .take(2)
        .any(|[lat, lon]| lat.abs() > 90.0 || lon.abs() > 180.0);
    if swapped {
        (footprint.iter().map(|[a, b]| [*b, *a]).collect(), true)
    } else {
        (footprint.to_vec(), false)
    }
}

fn build_ring(
    coordinates: &[[f64; 2]],
    center: GeoPoint,
    min_area: f64,
) -> Result<Vec<Point2>, Rejection> {
    if coordinates.len() < 3 {
        return Err(Rejection::TooFewPoints);
    }
    let mut ring: Vec<Point2> = coordinates
        .iter()
        .map(|[lat, lon]| project_to_local(*lat, *lon, center))
        .collect();

    let first = ring[0];
    let last = ring[ring.len() - 1];
    if !first.approx_eq(last, CLOSURE_EPSILON) {
        ring.push(first);
    }
    if !is_finite_polygon(&ring) {
        return Err(Rejection::NonFinite);
    }
    if coordinates
        .iter()
        .any(|[lat, lon]| lat.abs() > 90.0 || lon.abs() > 180.0)
    {
        return Err(Rejection::OutOfRange);
    }
    if signed_area(&ring).abs() < min_area {
        return Err(Rejection::Degenerate);
    }
    Ok(ring)
}

/// 源数据中的显式高度（任意有限值，包括 0 与负数），其次是层数 × 层高。
/// 异常值交由后续的夹取处理。
fn known_height(building: &BuildingFootprint, level_height: f64) -> Option<f64> {
    if let Some(height) = building.height_m.filter(|h| h.is_finite()) {
        return Some(height);
    }
    building
        .levels
        .map(|levels| f64::from(levels) * level_height)
}

fn median(samples: &mut [f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    samples.sort_by(f64::total_cmp);
    let mid = samples.len() / 2;
    if samples.len() % 2 == 0 {
        Some((samples[mid - 1] + samples[mid]) / 2.0)
    } else {
        Some(samples[mid])
    }
}
