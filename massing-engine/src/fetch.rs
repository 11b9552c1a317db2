//! 周边建筑获取的状态门：只接受最新一次请求的结果。
//!
//! 网络传输由调用方负责。`begin_fetch` 签发带单调递增令牌的票据，
//! `complete` 只应用最新且未被取消的票据，过期结果直接丢弃。

use chrono::Utc;
use massing_core::context::{BuildingFootprint, ContextSnapshot, GeoPoint};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::context::{ContextPreparation, PreparationSettings, prepare_context_payload};

pub const DEFAULT_RADIUS_M: f64 = 100.0;
pub const DEFAULT_SOURCE: &str = "overpass";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStatus {
    #[default]
    Idle,
    Loading,
    Success,
    Error,
}

/// 一次获取请求的凭据。
#[derive(Debug, Clone, PartialEq)]
pub struct FetchTicket {
    token: u64,
    key: String,
    center: GeoPoint,
    radius_m: f64,
}

impl FetchTicket {
    #[inline]
    pub fn token(&self) -> u64 {
        self.token
    }

    /// 查询键，形如 `lat,lon,radius`。
    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[inline]
    pub fn center(&self) -> GeoPoint {
        self.center
    }

    #[inline]
    pub fn radius_m(&self) -> f64 {
        self.radius_m
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// 结果已应用，附带建筑数量。
    Applied(usize),
    /// 请求失败，状态切换为 `Error`。
    Failed(String),
    /// 票据已过期或已取消，结果被丢弃。
    Stale,
}

#[derive(Debug, Clone)]
pub struct ContextSession {
    center: Option<GeoPoint>,
    radius_m: f64,
    status: FetchStatus,
    error: Option<String>,
    buildings: Vec<BuildingFootprint>,
    last_fetched_key: Option<String>,
    fetched_at: Option<String>,
    source: String,
    issued: u64,
    in_flight: Option<u64>,
}

impl ContextSession {
    pub fn new() -> Self {
        Self::with_radius(DEFAULT_RADIUS_M)
    }

    pub fn with_radius(radius_m: f64) -> Self {
        let radius_m = if radius_m.is_finite() && radius_m > 0.0 {
            radius_m
        } else {
            DEFAULT_RADIUS_M
        };
        Self {
            center: None,
            radius_m,
            status: FetchStatus::Idle,
            error: None,
            buildings: Vec::new(),
            last_fetched_key: None,
            fetched_at: None,
            source: DEFAULT_SOURCE.to_string(),
            issued: 0,
            in_flight: None,
        }
    }

    #[inline]
    pub fn center(&self) -> Option<GeoPoint> {
        self.center
    }

    #[inline]
    pub fn radius_m(&self) -> f64 {
        self.radius_m
    }

    #[inline]
    pub fn status(&self) -> FetchStatus {
        self.status
    }

    #[inline]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    #[inline]
    pub fn buildings(&self) -> &[BuildingFootprint] {
        &self.buildings
    }

    #[inline]
    pub fn last_fetched_key(&self) -> Option<&str> {
        self.last_fetched_key.as_deref()
    }

    /// 设置中心点。无效坐标被忽略。
    pub fn set_center(&mut self, center: GeoPoint) -> bool {
        if !center.is_valid() {
            debug!(lat = center.lat, lon = center.lon, "中心点无效，已忽略");
            return false;
        }
        self.center = Some(center);
        true
    }

    pub fn set_radius(&mut self, radius_m: f64) -> bool {
        if !(radius_m.is_finite() && radius_m > 0.0) {
            return false;
        }
        self.radius_m = radius_m;
        true
    }

    /// 当前中心与半径是否已有对应的成功结果。
    pub fn is_current(&self) -> bool {
        match (self.center, self.last_fetched_key.as_deref()) {
            (Some(center), Some(key)) => center.fetch_key(self.radius_m) == key,
            _ => false,
        }
    }

    /// 签发新票据，之前的在途请求随之失效。中心点未设置时返回 `None`。
    pub fn begin_fetch(&mut self) -> Option<FetchTicket> {
        let center = self.center?;
        self.issued += 1;
        if let Some(previous) = self.in_flight.replace(self.issued) {
            debug!(token = previous, "在途请求已被新请求取代");
        }
        self.status = FetchStatus::Loading;
        self.error = None;
        let ticket = FetchTicket {
            token: self.issued,
            key: center.fetch_key(self.radius_m),
            center,
            radius_m: self.radius_m,
        };
        debug!(token = ticket.token, key = %ticket.key, "开始获取周边建筑");
        Some(ticket)
    }

    /// 提交请求结果。只有最新且未取消的票据会被应用。
    pub fn complete(
        &mut self,
        ticket: &FetchTicket,
        result: Result<Vec<BuildingFootprint>, String>,
    ) -> FetchOutcome {
        if self.in_flight != Some(ticket.token) {
            debug!(token = ticket.token, latest = self.issued, "丢弃过期的获取结果");
            return FetchOutcome::Stale;
        }
        self.in_flight = None;
        match result {
            Ok(buildings) => {
                let count = buildings.len();
                self.buildings = buildings;
                self.status = FetchStatus::Success;
                self.error = None;
                self.last_fetched_key = Some(ticket.key.clone());
                self.fetched_at = Some(Utc::now().to_rfc3339());
                self.source = DEFAULT_SOURCE.to_string();
                debug!(token = ticket.token, count, "周边建筑获取成功");
                FetchOutcome::Applied(count)
            }
            Err(message) => {
                warn!(token = ticket.token, error = %message, "周边建筑获取失败");
                self.status = FetchStatus::Error;
                self.error = Some(message.clone());
                FetchOutcome::Failed(message)
            }
        }
    }

    /// 取消在途请求并回到 `Idle`。
    pub fn cancel(&mut self) -> bool {
        let Some(token) = self.in_flight.take() else {
            return false;
        };
        self.status = FetchStatus::Idle;
        self.error = Some("Request cancelled".to_string());
        self.last_fetched_key = None;
        debug!(token, "获取已取消");
        true
    }

    /// 清空中心点、半径与已获取的建筑，在途请求随之失效。
    pub fn clear(&mut self) {
        let issued = self.issued;
        *self = Self::new();
        self.issued = issued;
    }

    /// 载入保存的周边快照。
    pub fn load_snapshot(&mut self, snapshot: ContextSnapshot) {
        self.in_flight = None;
        self.center = Some(snapshot.center);
        self.radius_m = snapshot.radius_m;
        self.last_fetched_key = Some(snapshot.center.fetch_key(snapshot.radius_m));
        self.buildings = snapshot.buildings;
        self.fetched_at = snapshot.fetched_at;
        self.source = snapshot.source;
        self.status = FetchStatus::Success;
        self.error = None;
    }

    /// 有中心点且至少有一个建筑时生成可保存的快照。
    pub fn snapshot_for_save(&self) -> Option<ContextSnapshot> {
        let center = self.center?;
        if self.buildings.is_empty() {
            return None;
        }
        Some(ContextSnapshot {
            center,
            radius_m: self.radius_m,
            buildings: self.buildings.clone(),
            fetched_at: self.fetched_at.clone(),
            source: self.source.clone(),
        })
    }

    /// 对当前数据运行准备流程。
    pub fn prepare(&self, settings: &PreparationSettings) -> Option<ContextPreparation> {
        prepare_context_payload(self.center, self.radius_m, &self.buildings, settings)
    }
}

impl Default for ContextSession {
    fn default() -> Self {
        Self::new()
    }
}
