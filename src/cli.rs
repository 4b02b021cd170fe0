use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use runpost::chaos::ChaosLevel;
use runpost::dataset::Dataset;
use runpost::runner::{ConsoleReporter, RunMode};
use runpost::storage::FileBaselineStore;
use runpost::variable::{ConfigLoader, RunpostConfig};
use runpost::{CollectionRunner, load_collection, render_json_report, render_text_report};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// 输出调试日志与断言详情
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 运行一个集合
    Run(RunArgs),
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ModeArg {
    Serial,
    Parallel,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ChaosArg {
    Light,
    Aggressive,
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

#[derive(Args)]
pub struct RunArgs {
    /// 集合 JSON 文件
    pub collection: PathBuf,

    /// 调度模式（覆盖配置文件）
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// 串行模式下请求间隔（毫秒）
    #[arg(long)]
    pub delay_ms: Option<u64>,

    /// 迭代次数
    #[arg(short = 'n', long)]
    pub iterations: Option<usize>,

    /// 数据集文件（.csv 或 .json）
    #[arg(short, long)]
    pub data: Option<PathBuf>,

    /// 使用的环境名
    #[arg(short, long)]
    pub env: Option<String>,

    /// 覆盖变量，可重复：--var key=value
    #[arg(long = "var", value_name = "KEY=VALUE")]
    pub vars: Vec<String>,

    /// 配置文件路径，默认自动查找 runpost.toml
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// 启用契约漂移检查
    #[arg(long)]
    pub contract: bool,

    /// 有漂移时判定失败
    #[arg(long)]
    pub break_on_drift: bool,

    /// 运行结束后用本次结果更新契约与性能基线
    #[arg(long)]
    pub update_baselines: bool,

    /// 启用混沌用例
    #[arg(long, value_enum)]
    pub chaos: Option<ChaosArg>,

    /// aggressive 混沌的随机种子
    #[arg(long)]
    pub chaos_seed: Option<u64>,

    /// 启用性能实验室
    #[arg(long)]
    pub perf: bool,

    /// p95 回归阈值（百分比）
    #[arg(long)]
    pub regression_threshold: Option<f64>,

    /// 基线存储目录
    #[arg(long)]
    pub baseline_dir: Option<PathBuf>,

    /// 录制流量并保存为新集合
    #[arg(long, value_name = "FILE")]
    pub record: Option<PathBuf>,

    /// 报告格式
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    pub report: ReportFormat,

    /// 报告输出文件
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// 执行 `run` 子命令，返回本次运行是否判定失败
pub async fn run(args: RunArgs, verbose: bool) -> Result<bool> {
    let collection = load_collection(&args.collection)
        .with_context(|| format!("Failed to load collection {}", args.collection.display()))?;

    let config = match &args.config {
        Some(path) => ConfigLoader::load_from_path(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ConfigLoader::find_and_load().unwrap_or_default(),
    };

    let mut cli_vars = Vec::new();
    for raw in &args.vars {
        match ConfigLoader::parse_cli_var(raw) {
            Some(pair) => cli_vars.push(pair),
            None => bail!("Invalid --var '{}', expected KEY=VALUE", raw),
        }
    }
    let variables = ConfigLoader::build_context(
        &collection.variables,
        &config,
        args.env.as_deref(),
        &cli_vars,
    );

    let options = build_options(&args, &config)?;

    let store = match &args.baseline_dir {
        Some(dir) => FileBaselineStore::new_with_dir(dir),
        None => FileBaselineStore::new(),
    };
    let runner = CollectionRunner::http()?
        .with_baseline_store(Arc::new(store))
        .with_variables(variables);

    let cancel = CancellationToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling remaining requests");
            signal.cancel();
        }
    });

    // JSON 报告占用 stdout 时，终端输出改走 stderr
    let json_to_stdout = matches!(args.report, ReportFormat::Json) && args.output.is_none();
    let reporter = ConsoleReporter::new(verbose).with_stderr(json_to_stdout);
    reporter.print_header(&collection.name, collection.request_count());

    let progress = |completed: usize, total: usize| reporter.print_progress(completed, total);
    let result = runner
        .run(&collection, &options, Some(&progress), Some(cancel))
        .await?;

    for entry in &result.results {
        reporter.print_result(entry);
    }
    reporter.print_summary(&result);

    let rendered = match args.report {
        ReportFormat::Text => render_text_report(&result),
        ReportFormat::Json => render_json_report(&result)?,
    };
    match &args.output {
        Some(path) => {
            std::fs::write(path, rendered)
                .with_context(|| format!("Failed to write report {}", path.display()))?;
            info!(path = %path.display(), "Report written");
        }
        None if json_to_stdout => println!("{}", rendered),
        None => {}
    }

    if let (Some(path), Some(recorded)) = (&args.record, &result.recorded_collection) {
        let json = serde_json::to_string_pretty(recorded)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write recording {}", path.display()))?;
        info!(path = %path.display(), requests = recorded.requests.len(), "Traffic recorded");
    }

    Ok(result.is_failure())
}

/// 配置文件中的 `[runner]` 为基础，命令行参数覆盖
fn build_options(args: &RunArgs, config: &RunpostConfig) -> Result<runpost::RunnerOptions> {
    let mut options = config.runner.clone();

    if let Some(mode) = args.mode {
        options.mode = match mode {
            ModeArg::Serial => RunMode::Serial,
            ModeArg::Parallel => RunMode::Parallel,
        };
    }
    if let Some(delay_ms) = args.delay_ms {
        options.delay_ms = delay_ms;
    }
    if let Some(iterations) = args.iterations {
        options.iterations = iterations;
    }
    if let Some(path) = &args.data {
        options.dataset = Dataset::source_from_path(path)
            .with_context(|| format!("Failed to read dataset {}", path.display()))?;
    }

    if args.contract || args.break_on_drift {
        options.contract.enabled = true;
    }
    if args.break_on_drift {
        options.contract.break_on_drift = true;
    }
    if args.update_baselines {
        options.contract.auto_update_baseline = true;
        options.performance.auto_update_baseline = true;
    }

    if let Some(level) = args.chaos {
        options.chaos.enabled = true;
        options.chaos.level = match level {
            ChaosArg::Light => ChaosLevel::Light,
            ChaosArg::Aggressive => ChaosLevel::Aggressive,
        };
    }
    if args.chaos_seed.is_some() {
        options.chaos.seed = args.chaos_seed;
    }

    if args.perf || args.regression_threshold.is_some() {
        options.performance.enabled = true;
    }
    if let Some(threshold) = args.regression_threshold {
        options.performance.regression_threshold_pct = threshold;
    }

    if args.record.is_some() {
        options.recorder.enabled = true;
    }

    Ok(options)
}
