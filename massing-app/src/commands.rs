use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use glam::DVec3;
use massing_config::{AppConfig, ContextConfig};
use massing_core::context::GeoPoint;
use massing_core::metrics::compute_metrics;
use massing_core::session::SessionModel;
use massing_core::units::{UnitSystem, format_area};
use massing_engine::align::{AlignAnchor, AlignAxis, align_selection};
use massing_engine::command::{CommandBus, CommandContext, CommandRequest};
use massing_engine::context::PreparationSettings;
use massing_engine::fetch::{ContextSession, FetchOutcome};
use massing_engine::scenarios::{ScenarioBook, ScenarioOption};
use massing_engine::store::SessionStore;
use massing_engine::transform::{GroupGesture, Pose, TransformMode};
use massing_io::export::ExportPayload;
use massing_io::{ArchiveFacade, LoadedSession, SessionLoader, overpass};
use tracing::{info, warn};

use crate::cli::{Cli, Commands, ContextArgs, ExportArgs, InspectArgs};
use crate::report;

pub fn execute(cli: Cli, config: &AppConfig) -> Result<()> {
    let units = cli.units.map(UnitSystem::from);
    match cli.command {
        Commands::Demo => run_demo(config, units),
        Commands::Inspect(args) => run_inspect(&args, config, units),
        Commands::Context(args) => run_context(&args, config, units),
        Commands::Export(args) => run_export(&args, config),
    }
}

/// 配置 -> 准备流程参数。
pub fn preparation_settings(config: &ContextConfig) -> PreparationSettings {
    PreparationSettings {
        max_buildings: config.max_buildings,
        default_level_height: config.default_level_height_m,
        min_height: config.min_height_m,
        max_height: config.max_height_m,
        fallback_height: config.fallback_height_m,
        min_area: config.min_area_m2,
    }
}

fn new_store(config: &AppConfig, model: SessionModel) -> SessionStore {
    let mut store = SessionStore::with_history_limit(config.session.history_limit);
    store.reset(Some(model));
    store
}

fn load_session(path: &Path) -> Result<LoadedSession> {
    ArchiveFacade::new()
        .load(path)
        .with_context(|| format!("无法读取会话文件 {}", path.display()))
}

fn run_demo(config: &AppConfig, units: Option<UnitSystem>) -> Result<()> {
    let mut store = new_store(
        config,
        SessionModel::new(config.session.default_units, Vec::new()),
    );
    let bus = CommandBus::new();
    {
        let mut context = CommandContext { store: &mut store };
        for name in ["add_block", "add_block"] {
            let response = bus.dispatch(&CommandRequest::new(name), &mut context);
            if !response.success {
                warn!(command = name, message = ?response.message, "演示命令执行失败");
            }
        }
    }
    let ids: Vec<_> = store.blocks().iter().map(|block| block.id.clone()).collect();
    store.set_selection(ids.iter());

    let gesture = GroupGesture::from_selection(&store, TransformMode::Translate)?;
    let start = gesture.reference_start();
    let moved = Pose::new(start.position + DVec3::new(5.0, 0.0, 10.0), start.rotation);
    gesture.commit(&mut store, &moved);

    let gesture = GroupGesture::from_selection(&store, TransformMode::Rotate)?;
    let start = gesture.reference_start();
    let turned = Pose::new(start.position, start.rotation + DVec3::new(0.0, 30.0, 0.0));
    gesture.commit(&mut store, &turned);

    align_selection(&mut store, AlignAxis::Y, AlignAnchor::Min);
    store.undo();
    store.redo();

    let commands: Vec<&str> = bus.available_commands().copied().collect();
    println!("支持的命令: {}", commands.join(", "));

    let display = units.unwrap_or(store.units());
    report::print_blocks(&store, display);
    let metrics = compute_metrics(store.model());
    report::print_metrics(&metrics, display);

    let mut book = ScenarioBook::new();
    book.seed_if_empty();
    book.add(ScenarioOption::capture("Current", &store))?;
    println!("方案（{} 个）：", book.len());
    for option in book.options() {
        println!(
            "  - {} 总建筑面积 {}",
            option.name,
            format_area(option.metrics.total_gfa, display)
        );
    }
    info!(blocks = store.blocks().len(), "演示完成");
    Ok(())
}

fn run_inspect(args: &InspectArgs, config: &AppConfig, units: Option<UnitSystem>) -> Result<()> {
    let loaded = load_session(&args.path)?;
    if let Some(created_at) = &loaded.created_at {
        println!("创建时间: {created_at}");
    }
    let store = new_store(config, loaded.model);
    let display = units.unwrap_or(store.units());
    report::print_blocks(&store, display);
    report::print_metrics(&compute_metrics(store.model()), display);

    match loaded.context {
        Some(snapshot) => {
            println!(
                "周边快照: 中心=({:.6}, {:.6}), 半径={} m, 来源={}",
                snapshot.center.lat, snapshot.center.lon, snapshot.radius_m, snapshot.source
            );
            let mut session = ContextSession::new();
            session.load_snapshot(snapshot);
            match session.prepare(&preparation_settings(&config.context)) {
                Some(preparation) => report::print_preparation(&preparation, display),
                None => println!("周边快照中没有可用的建筑"),
            }
        }
        None => println!("文件不含周边建筑快照"),
    }
    Ok(())
}

fn run_context(args: &ContextArgs, config: &AppConfig, units: Option<UnitSystem>) -> Result<()> {
    let text = fs::read_to_string(&args.input)
        .with_context(|| format!("无法读取 Overpass 响应 {}", args.input.display()))?;
    let buildings = overpass::parse_response(&text)
        .with_context(|| format!("无法解析 Overpass 响应 {}", args.input.display()))?;

    let radius = args.radius.unwrap_or(config.context.default_radius_m);
    let mut session = ContextSession::with_radius(radius);
    if !session.set_center(GeoPoint::new(args.lat, args.lon)) {
        bail!("无效的中心点: ({}, {})", args.lat, args.lon);
    }
    let Some(ticket) = session.begin_fetch() else {
        bail!("中心点未设置");
    };
    println!(
        "查询地址: {}\n查询语句:\n{}",
        overpass::OVERPASS_URL,
        overpass::build_query(ticket.center(), ticket.radius_m())
    );
    match session.complete(&ticket, Ok(buildings)) {
        FetchOutcome::Applied(count) => info!(count, key = ticket.key(), "周边建筑已载入"),
        other => bail!("周边建筑未能载入: {other:?}"),
    }

    let display = units.unwrap_or(config.session.default_units);
    match session.prepare(&preparation_settings(&config.context)) {
        Some(preparation) => report::print_preparation(&preparation, display),
        None => println!("响应中没有建筑"),
    }
    Ok(())
}

fn run_export(args: &ExportArgs, config: &AppConfig) -> Result<()> {
    let loaded = load_session(&args.input)?;
    let store = new_store(config, loaded.model);
    ExportPayload::from_model(store.model())
        .write_to(&args.output)
        .with_context(|| format!("无法写出导出文件 {}", args.output.display()))?;
    println!("已导出到 {}", args.output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use massing_io::SessionSaver;

    use super::*;

    #[test]
    fn settings_follow_configuration() {
        let mut config = AppConfig::default();
        config.context.max_buildings = 12;
        config.context.min_height_m = 4.0;
        let settings = preparation_settings(&config.context);
        assert_eq!(settings.max_buildings, 12);
        assert_eq!(settings.min_height, 4.0);
        assert_eq!(settings.max_height, 80.0);
        assert_eq!(settings.default_level_height, 3.2);
    }

    #[test]
    fn demo_runs_with_defaults() {
        run_demo(&AppConfig::default(), None).expect("demo");
    }

    #[test]
    fn export_writes_payload_for_saved_session() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = dir.path().join("session.tbk");
        let output = dir.path().join("report.json");
        ArchiveFacade::new()
            .save(&SessionModel::with_default_block(), None, &input)
            .expect("save session");

        let args = ExportArgs {
            input: input.clone(),
            output: output.clone(),
        };
        run_export(&args, &AppConfig::default()).expect("export");
        let text = fs::read_to_string(&output).expect("read export");
        assert!(text.contains("\"totalGfa\""));

        let inspect = InspectArgs { path: input };
        run_inspect(&inspect, &AppConfig::default(), Some(UnitSystem::Imperial)).expect("inspect");
    }

    #[test]
    fn missing_session_file_is_reported() {
        let args = InspectArgs {
            path: "does/not/exist.tbk".into(),
        };
        let err = run_inspect(&args, &AppConfig::default(), None).unwrap_err();
        assert!(err.to_string().contains("does/not/exist.tbk"));
    }
}
