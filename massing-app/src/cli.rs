use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use massing_core::units::UnitSystem;

/// 体块推敲工作台的命令行入口
#[derive(Parser, Debug)]
#[command(name = "massing")]
#[command(about = "Massing workshop session tools", long_about = None)]
#[command(version)]
pub struct Cli {
    /// 配置文件路径（默认读取 MASSING_CONFIG 或 ./config/default.toml）
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// 显示单位制，覆盖文件或配置中的设置
    #[arg(long, global = true, value_enum)]
    pub units: Option<DisplayUnits>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DisplayUnits {
    Metric,
    Imperial,
}

impl From<DisplayUnits> for UnitSystem {
    fn from(value: DisplayUnits) -> Self {
        match value {
            DisplayUnits::Metric => UnitSystem::Metric,
            DisplayUnits::Imperial => UnitSystem::Imperial,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 构建演示会话，执行成组变换与撤销/重做，并打印结果
    Demo,

    /// 读取会话文件并打印体块、指标与周边建筑统计
    Inspect(InspectArgs),

    /// 解析 Overpass 响应并运行周边建筑准备流程
    Context(ContextArgs),

    /// 将会话文件导出为 JSON 报表
    Export(ExportArgs),
}

#[derive(Parser, Debug)]
pub struct InspectArgs {
    /// 会话文件（zip 归档或纯 model.json）
    pub path: PathBuf,
}

#[derive(Parser, Debug)]
pub struct ContextArgs {
    /// Overpass JSON 响应文件
    pub input: PathBuf,

    /// 中心点纬度
    #[arg(long, allow_negative_numbers = true)]
    pub lat: f64,

    /// 中心点经度
    #[arg(long, allow_negative_numbers = true)]
    pub lon: f64,

    /// 查询半径（米），默认取配置值
    #[arg(long)]
    pub radius: Option<f64>,
}

#[derive(Parser, Debug)]
pub struct ExportArgs {
    /// 会话文件
    pub input: PathBuf,

    /// 输出 JSON 路径
    pub output: PathBuf,
}
