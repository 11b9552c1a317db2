use massing_core::block::Program;
use massing_core::metrics::Metrics;
use massing_core::units::{UnitSystem, format_area, to_display_length};
use massing_engine::context::ContextPreparation;
use massing_engine::store::SessionStore;

/// 打印体块列表，长度按显示单位换算。
pub fn print_blocks(store: &SessionStore, units: UnitSystem) {
    let suffix = units.length_suffix();
    println!("体块（共 {} 个，单位: {}）：", store.blocks().len(), units);
    for block in store.blocks() {
        let marker = if store.reference() == Some(&block.id) {
            "*"
        } else if store.is_selected(&block.id) {
            "+"
        } else {
            " "
        };
        println!(
            " {marker} {} [{}] {:.2}{suffix} x {:.2}{suffix}, {} 层 x {:.2}{suffix}, 位置=({:.2}, {:.2}, {:.2}), 旋转=({:.1}°, {:.1}°, {:.1}°)",
            block.name,
            block.program.label(),
            to_display_length(block.x_size, units),
            to_display_length(block.y_size, units),
            block.levels,
            to_display_length(block.level_height, units),
            to_display_length(block.position.x, units),
            to_display_length(block.position.y, units),
            to_display_length(block.position.z, units),
            block.rotation.x,
            block.rotation.y,
            block.rotation.z,
        );
    }
    println!(
        "历史：可撤销 {} 步，可重做 {} 步（修订号 {}）",
        store.undo_depth(),
        store.redo_depth(),
        store.revision()
    );
}

pub fn print_metrics(metrics: &Metrics, units: UnitSystem) {
    println!("指标：");
    println!("  总建筑面积: {}", format_area(metrics.total_gfa, units));
    println!("  总层数: {}", metrics.total_levels);
    println!(
        "  最大高度: {:.2} {}",
        to_display_length(metrics.max_height, units),
        units.length_suffix()
    );
    for program in Program::ALL {
        let gfa = metrics.gfa_by_program.get(&program).copied().unwrap_or(0.0);
        println!(
            "  - {:<12} {:>14}  ({:.1}%)",
            program.label(),
            format_area(gfa, units),
            metrics.program_share(program) * 100.0
        );
    }
}

pub fn print_preparation(preparation: &ContextPreparation, units: UnitSystem) {
    let stats = &preparation.stats;
    println!("周边建筑准备统计：");
    println!("  输入 {} 个，有效 {} 个", stats.input_count, stats.valid_count);
    println!(
        "  剔除：点数不足 {}，非有限坐标 {}，面积退化 {}，其他 {}",
        stats.skipped_too_few_points,
        stats.skipped_nan,
        stats.skipped_degenerate_area,
        stats.skipped_other
    );
    println!("  修正经纬度顺序 {} 次", stats.corrected_swaps);

    let inferred = preparation.meshes.iter().filter(|mesh| mesh.inferred).count();
    println!("  其中 {inferred} 个建筑的高度由中位数推断");
    for mesh in preparation.meshes.iter().take(10) {
        println!(
            "  - {} 顶点 {} 个，高度 {:.2} {}{}",
            mesh.id,
            mesh.polygon.len(),
            to_display_length(mesh.height, units),
            units.length_suffix(),
            if mesh.inferred { "（推断）" } else { "" }
        );
    }
    if preparation.meshes.len() > 10 {
        println!("  … 另有 {} 个", preparation.meshes.len() - 10);
    }
}
