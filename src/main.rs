use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use env_logger::Env;
use log::info;

use eu5_mapdata::utils::parse_decimal;
use eu5_mapdata::{
    EditorConfig, GameLayout, MapSession, PopDefinition, ProvinceId, ProvinceLoader,
    Repository, ValueListKind,
};
use eu5_mapdata::io::DefaultTextReader;

#[derive(Parser)]
#[command(name = "eu5_mapdata")]
#[command(about = "读取、编辑并保存 EU5 地图数据（地点名称、地点属性、人口）")]
#[command(version)]
struct Cli {
    /// 游戏本体根目录
    #[arg(long)]
    base: Option<PathBuf>,

    /// 模组根目录（所有写入都发生在这里）
    #[arg(long = "mod")]
    mod_dir: Option<PathBuf>,

    /// JSON 配置文件（命令行目录参数优先）
    #[arg(long)]
    config: Option<PathBuf>,

    /// 显示实体与定义统计信息
    #[arg(long)]
    stats: bool,

    /// 显示单个地点（标识或名称）
    #[arg(long, value_name = "ID")]
    show: Option<String>,

    /// 把全部地点导出为 JSON
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// 检查所有数据文件的结构与往返一致性
    #[arg(long)]
    check: bool,

    /// 重命名地点
    #[arg(long, num_args = 2, value_names = ["ID", "NAME"])]
    rename: Option<Vec<String>>,

    /// 设置地点属性
    #[arg(long, num_args = 2, value_names = ["ID", "FIELD=VALUE"])]
    set: Option<Vec<String>>,

    /// 新增或更新一条人口记录（大小为 0 时删除）
    #[arg(long, num_args = 5, value_names = ["ID", "TYPE", "CULTURE", "RELIGION", "SIZE"])]
    set_pop: Option<Vec<String>>,

    /// 删除地点
    #[arg(long, value_name = "ID")]
    delete: Option<String>,

    /// 静默模式(仅输出错误)
    #[arg(long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.quiet { "error" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    let config = build_config(&cli)?;

    if cli.check {
        return handle_check(&cli, &config);
    }

    let mut session = MapSession::open(config.clone())
        .with_context(|| format!("加载地图数据失败: {:?} / {:?}", config.base_dir, config.mod_dir))?;

    if has_edits(&cli) {
        handle_edits(&cli, &mut session)?;
    }

    if cli.stats {
        print_stats(&session);
    }

    if let Some(id) = &cli.show {
        handle_show(&session, id)?;
    }

    if let Some(output) = &cli.output {
        handle_export(&cli, &session, output)?;
    }

    Ok(())
}

/// 合并配置文件与命令行参数
fn build_config(cli: &Cli) -> Result<EditorConfig> {
    let mut config = match &cli.config {
        Some(path) => EditorConfig::from_json_file(path)
            .with_context(|| format!("读取配置文件失败: {:?}", path))?,
        None => {
            let base = cli
                .base
                .clone()
                .ok_or_else(|| anyhow!("需要 --base 或 --config"))?;
            let mod_dir = cli
                .mod_dir
                .clone()
                .ok_or_else(|| anyhow!("需要 --mod 或 --config"))?;
            EditorConfig::new(base, mod_dir)
        }
    };

    if let Some(base) = &cli.base {
        config.base_dir = base.clone();
    }
    if let Some(mod_dir) = &cli.mod_dir {
        config.mod_dir = mod_dir.clone();
    }
    config.validate()?;
    Ok(config)
}

fn has_edits(cli: &Cli) -> bool {
    cli.rename.is_some() || cli.set.is_some() || cli.set_pop.is_some() || cli.delete.is_some()
}

/// 解析地点参数（标识或名称）
fn resolve_id(session: &MapSession, raw: &str) -> Result<ProvinceId> {
    session
        .store()
        .lookup(raw)
        .map(|p| p.id.clone())
        .ok_or_else(|| anyhow!("找不到地点: {}", raw))
}

/// 应用编辑并事务式保存
fn handle_edits(cli: &Cli, session: &mut MapSession) -> Result<()> {
    if let Some(args) = &cli.rename {
        let id = resolve_id(session, &args[0])?;
        session.repository().rename(&id, args[1].as_str())?;
    }

    if let Some(args) = &cli.set {
        let id = resolve_id(session, &args[0])?;
        let (field, value) = args[1]
            .split_once('=')
            .ok_or_else(|| anyhow!("属性格式应为 FIELD=VALUE: {}", args[1]))?;
        let (field, value) = (field.trim().to_string(), value.trim().to_string());
        session
            .repository()
            .modify(&id, |p| p.location.set_field(&field, value))?;
    }

    if let Some(args) = &cli.set_pop {
        let id = resolve_id(session, &args[0])?;
        let size = parse_decimal(&args[4]).ok_or_else(|| anyhow!("无效的人口大小: {}", args[4]))?;
        let pop = PopDefinition::new(args[1].as_str(), size, args[2].as_str(), args[3].as_str());
        session.repository().modify(&id, |p| {
            if size == 0.0 {
                p.pops.remove(&pop.pop_type, &pop.culture, &pop.religion);
            } else {
                p.pops.upsert(pop);
            }
        })?;
    }

    if let Some(raw) = &cli.delete {
        let id = resolve_id(session, raw)?;
        session.repository().delete(&id)?;
    }

    let counts = session.counts();
    let report = session.save().context("保存失败，所有文件已恢复")?;

    if !cli.quiet {
        println!("已保存 {} 个地点 ({})", report.entities, counts);
        for path in &report.files {
            println!("  写入: {:?}", path);
        }
        if !report.conflicts.is_empty() {
            println!("  新旧名称冲突已解决: {}", report.conflicts.join(", "));
        }
        if !report.unpersisted.is_empty() {
            let ids: Vec<_> = report.unpersisted.iter().map(|id| id.as_str()).collect();
            println!("  以下地点来自游戏本体，删除不会生效: {}", ids.join(", "));
        }
    }
    Ok(())
}

fn print_stats(session: &MapSession) {
    let store = session.store();
    let named = store.iter().filter(|p| p.name.is_some()).count();
    let with_pops = store.iter().filter(|p| !p.pops.is_empty()).count();

    println!("地点总数: {}", store.len());
    println!("  有名称: {}", named);
    println!("  无名称: {}", store.len() - named);
    println!("  有人口: {}", with_pops);
    println!("加载警告: {}", session.warnings().len());

    let sizes = session.definitions().sizes();
    for kind in ValueListKind::ALL {
        println!("定义 {}: {}", kind, sizes.get(&kind).copied().unwrap_or(0));
    }

    let unknown = session.unknown_values();
    if !unknown.is_empty() {
        println!("未知定义值: {}", unknown.len());
        for (id, value) in unknown.iter().take(5) {
            println!("  {} {} = {}", id, value.field, value.value);
        }
        if unknown.len() > 5 {
            println!("  ... 还有 {} 个", unknown.len() - 5);
        }
    }
}

fn handle_show(session: &MapSession, raw: &str) -> Result<()> {
    let province = session
        .store()
        .lookup(raw)
        .ok_or_else(|| anyhow!("找不到地点: {}", raw))?;
    println!("{}", serde_json::to_string_pretty(province)?);
    Ok(())
}

fn handle_export(cli: &Cli, session: &MapSession, output: &Path) -> Result<()> {
    let provinces = session.store().all();
    let json = serde_json::to_string_pretty(&provinces)?;
    std::fs::write(output, json).with_context(|| format!("写入失败: {:?}", output))?;

    if !cli.quiet {
        println!("导出 {} 个地点到: {:?}", provinces.len(), output);
    }
    Ok(())
}

/// 检查两个根目录下的全部数据文件
fn handle_check(cli: &Cli, config: &EditorConfig) -> Result<()> {
    let loader = ProvinceLoader::new(&GameLayout, &DefaultTextReader);
    let mut failed = 0;

    for root in [&config.base_dir, &config.mod_dir] {
        let checks = loader.check(root);
        info!("{:?}: {} files checked", root, checks.len());

        for check in checks {
            if check.is_ok() {
                if !cli.quiet {
                    println!(
                        "OK    {:?} ({} 条记录, {} 个警告)",
                        check.path, check.records, check.warnings
                    );
                }
                continue;
            }
            failed += 1;
            match &check.error {
                Some(error) => println!("ERROR {:?}: {}", check.path, error),
                None => println!("DIFF  {:?}: 重新序列化后记录不一致", check.path),
            }
        }
    }

    if failed > 0 {
        bail!("{} 个文件检查失败", failed);
    }
    Ok(())
}
