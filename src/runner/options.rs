use crate::chaos::ChaosLevel;
use crate::dataset::DatasetSource;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 调度模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Serial,
    Parallel,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Serial => f.write_str("serial"),
            RunMode::Parallel => f.write_str("parallel"),
        }
    }
}

/// 契约守卫配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ContractOptions {
    pub enabled: bool,
    /// 有任何漂移即标记闸门失败
    pub break_on_drift: bool,
    /// 运行结束时用本次指纹覆盖基线
    pub auto_update_baseline: bool,
}

/// 混沌用例配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ChaosOptions {
    pub enabled: bool,
    pub level: ChaosLevel,
    /// aggressive 级别的随机种子，便于复现
    pub seed: Option<u64>,
}

/// 性能实验室配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceOptions {
    pub enabled: bool,
    pub regression_threshold_pct: f64,
    pub auto_update_baseline: bool,
}

impl Default for PerformanceOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            regression_threshold_pct: 20.0,
            auto_update_baseline: false,
        }
    }
}

/// 流量录制配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RecorderOptions {
    pub enabled: bool,
}

/// 一次运行的全部选项
///
/// 可来自 runpost.toml 的 `[runner]` 段，命令行参数覆盖文件中的值。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerOptions {
    pub mode: RunMode,
    /// 串行模式下两次执行之间的间隔
    pub delay_ms: u64,
    /// 迭代次数，小于 1 时按 1 处理
    pub iterations: usize,
    pub dataset: DatasetSource,
    pub contract: ContractOptions,
    pub chaos: ChaosOptions,
    pub performance: PerformanceOptions,
    pub recorder: RecorderOptions,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            mode: RunMode::Serial,
            delay_ms: 0,
            iterations: 1,
            dataset: DatasetSource::None,
            contract: ContractOptions::default(),
            chaos: ChaosOptions::default(),
            performance: PerformanceOptions::default(),
            recorder: RecorderOptions::default(),
        }
    }
}

impl RunnerOptions {
    pub fn serial() -> Self {
        Self::default()
    }

    pub fn parallel() -> Self {
        Self {
            mode: RunMode::Parallel,
            ..Self::default()
        }
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn with_dataset(mut self, dataset: DatasetSource) -> Self {
        self.dataset = dataset;
        self
    }

    pub fn effective_iterations(&self) -> usize {
        self.iterations.max(1)
    }
}
