use std::io::{Cursor, Write};

use glam::DVec3;
use massing_core::block::{Block, Program};
use massing_core::context::{BuildingFootprint, ContextSnapshot, GeoPoint};
use massing_core::session::SessionModel;
use massing_core::units::UnitSystem;
use massing_io::export::ExportPayload;
use massing_io::{ArchiveFacade, IoError, SessionLoader, SessionSaver};
use serde_json::json;
use tempfile::NamedTempFile;
use zip::write::SimpleFileOptions;

fn sample_model() -> SessionModel {
    let mut podium = Block::with_defaults(0);
    podium.program = Program::Retail;
    podium.rotation = DVec3::new(0.0, 45.0, 0.0);
    let mut tower = Block::with_defaults(1);
    tower.levels = 18;
    tower.position.y = 16.0;
    SessionModel::new(UnitSystem::Imperial, vec![podium, tower])
}

fn sample_context() -> ContextSnapshot {
    ContextSnapshot {
        center: GeoPoint::new(40.0, -74.0),
        radius_m: 120.0,
        buildings: vec![BuildingFootprint {
            id: "way/1".to_string(),
            footprint: vec![[40.0, -74.0], [40.0001, -74.0], [40.0001, -73.9999]],
            height_m: Some(18.0),
            levels: None,
        }],
        fetched_at: Some("2026-01-02T03:04:05+00:00".to_string()),
        source: "overpass".to_string(),
    }
}

fn zip_with(entries: &[(&str, String)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, text) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .expect("start entry");
        writer.write_all(text.as_bytes()).expect("write entry");
    }
    writer.finish().expect("finish zip").into_inner()
}

#[test]
fn saved_archive_loads_back_with_context() {
    let file = NamedTempFile::new().expect("创建临时文件失败");
    let facade = ArchiveFacade::new();
    let model = sample_model();
    let context = sample_context();

    facade
        .save(&model, Some(&context), file.path())
        .expect("保存归档失败");
    let loaded = facade.load(file.path()).expect("读取归档失败");

    assert_eq!(loaded.model, model);
    assert_eq!(loaded.context, Some(context));
    assert!(loaded.created_at.is_some());
}

#[test]
fn context_without_buildings_is_not_written() {
    let facade = ArchiveFacade::new();
    let mut empty = sample_context();
    empty.buildings.clear();

    let bytes = facade
        .encode(&sample_model(), Some(&empty))
        .expect("encode archive");
    let loaded = facade.decode(&bytes).expect("decode archive");
    assert!(loaded.context.is_none());
}

#[test]
fn bare_json_model_is_accepted() {
    let text = json!({
        "schemaVersion": 1,
        "units": "metric",
        "blocks": [{
            "id": "legacy-1",
            "name": "Block A",
            "xSize": 12,
            "ySize": 30,
            "levels": 3,
            "levelHeight": 4.0,
            "posX": 0,
            "posY": 0,
            "posZ": 0,
            "defaultFunction": "Residential"
        }]
    })
    .to_string();

    let loaded = ArchiveFacade::new()
        .decode(text.as_bytes())
        .expect("decode bare json");
    assert!(loaded.context.is_none());
    assert_eq!(loaded.model.blocks.len(), 1);
    assert_eq!(loaded.model.blocks[0].id.as_str(), "legacy-1");
    assert_eq!(loaded.model.blocks[0].rotation, DVec3::ZERO);
}

#[test]
fn garbage_input_reports_archive_error() {
    let err = ArchiveFacade::new()
        .decode(b"definitely not an archive")
        .unwrap_err();
    assert!(matches!(err, IoError::Archive(_)));
}

#[test]
fn archive_without_model_is_rejected() {
    let bytes = zip_with(&[("notes.txt", "hello".to_string())]);
    let err = ArchiveFacade::new().decode(&bytes).unwrap_err();
    assert!(matches!(err, IoError::InvalidDocument(_)));
}

#[test]
fn bad_context_rejects_the_whole_file() {
    let model = json!({"schemaVersion": 1, "units": "metric", "blocks": []}).to_string();
    let context = json!({"schemaVersion": 2, "center": {"lat": 1, "lon": 2}, "radiusM": 10, "buildings": []})
        .to_string();
    let bytes = zip_with(&[("model.json", model), ("context.json", context)]);

    let err = ArchiveFacade::new().decode(&bytes).unwrap_err();
    assert!(matches!(err, IoError::SchemaVersion { document: "context.json", .. }));
}

#[test]
fn empty_block_list_loads_as_empty_model() {
    let model = json!({"schemaVersion": 1, "units": "imperial", "blocks": []}).to_string();
    let bytes = zip_with(&[("model.json", model)]);
    let loaded = ArchiveFacade::new().decode(&bytes).expect("decode");
    assert!(loaded.model.blocks.is_empty());
    assert_eq!(loaded.model.units, UnitSystem::Imperial);
}

#[test]
fn missing_file_reports_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("absent.tbk");
    let err = ArchiveFacade::new().load(&path).unwrap_err();
    match err {
        IoError::ReadError { path: reported, .. } => assert_eq!(reported, path),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn export_writes_pretty_json() {
    let file = NamedTempFile::new().expect("创建临时文件失败");
    let payload = ExportPayload::from_model(&sample_model());
    payload.write_to(file.path()).expect("导出失败");

    let text = std::fs::read_to_string(file.path()).expect("读取导出文件失败");
    assert!(text.contains('\n'));
    let value: serde_json::Value = serde_json::from_str(&text).expect("解析导出文件失败");
    assert_eq!(value["units"], "imperial");
    assert_eq!(value["blocks"].as_array().map(Vec::len), Some(2));
    assert_eq!(value["metrics"]["totalLevels"], 23);
}
