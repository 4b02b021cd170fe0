use crate::assertion::AssertionResult;
use crate::chaos::ChaosLevel;
use crate::collection::Collection;
use crate::contract::ContractDrift;
use crate::http::Response;
use crate::http::serialization::duration_ms;
use crate::perf::PerformanceReport;
use crate::runner::options::RunMode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// 实际生效的调度方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EffectiveMode {
    #[default]
    Serial,
    Parallel,
    /// 请求并行模式，但依赖关系迫使部分请求串行
    Mixed,
}

impl fmt::Display for EffectiveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EffectiveMode::Serial => f.write_str("serial"),
            EffectiveMode::Parallel => f.write_str("parallel"),
            EffectiveMode::Mixed => f.write_str("mixed"),
        }
    }
}

impl EffectiveMode {
    pub fn resolve(requested: RunMode, has_dependencies: bool) -> Self {
        match (requested, has_dependencies) {
            (RunMode::Serial, _) => EffectiveMode::Serial,
            (RunMode::Parallel, false) => EffectiveMode::Parallel,
            (RunMode::Parallel, true) => EffectiveMode::Mixed,
        }
    }
}

/// 单次执行（请求 × 轮次 × 可选混沌用例）的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerRequestResult {
    /// 规划阶段分配的序号，报告按此排序
    pub sequence: usize,
    pub request_id: String,
    pub name: String,
    pub method: String,
    pub url: String,
    pub pass: usize,
    pub iteration: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chaos_case: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Response>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "durationMs", with = "duration_ms")]
    pub duration: Duration,
    pub skipped: bool,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assertions: Vec<AssertionResult>,
    /// 传输成功且全部断言通过
    pub passed: bool,
}

/// 结果的身份信息，由规划出的 RunContext 给出
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultMeta {
    pub sequence: usize,
    pub request_id: String,
    pub name: String,
    pub method: String,
    pub url: String,
    pub pass: usize,
    pub iteration: usize,
    pub row_index: Option<usize>,
    pub chaos_case: Option<String>,
}

impl RunnerRequestResult {
    fn base(meta: ResultMeta) -> Self {
        Self {
            sequence: meta.sequence,
            request_id: meta.request_id,
            name: meta.name,
            method: meta.method,
            url: meta.url,
            pass: meta.pass,
            iteration: meta.iteration,
            row_index: meta.row_index,
            chaos_case: meta.chaos_case,
            response: None,
            error: None,
            duration: Duration::ZERO,
            skipped: false,
            cancelled: false,
            skip_reason: None,
            started_at: None,
            assertions: Vec::new(),
            passed: false,
        }
    }

    /// 收到响应（任何状态码都算传输成功），是否通过取决于断言
    pub fn completed(
        meta: ResultMeta,
        started_at: DateTime<Utc>,
        response: Response,
        assertions: Vec<AssertionResult>,
    ) -> Self {
        let passed = assertions.iter().all(|a| a.passed);
        Self {
            duration: response.duration,
            response: Some(response),
            started_at: Some(started_at),
            assertions,
            passed,
            ..Self::base(meta)
        }
    }

    pub fn error(
        meta: ResultMeta,
        started_at: DateTime<Utc>,
        error: String,
        duration: Duration,
        assertions: Vec<AssertionResult>,
    ) -> Self {
        Self {
            error: Some(error),
            duration,
            started_at: Some(started_at),
            assertions,
            ..Self::base(meta)
        }
    }

    pub fn skipped(meta: ResultMeta, reason: impl Into<String>) -> Self {
        Self {
            skipped: true,
            skip_reason: Some(reason.into()),
            ..Self::base(meta)
        }
    }

    pub fn cancelled(meta: ResultMeta) -> Self {
        Self {
            skipped: true,
            cancelled: true,
            skip_reason: Some("run cancelled".to_string()),
            ..Self::base(meta)
        }
    }

    /// 已执行但未通过
    pub fn failed(&self) -> bool {
        !self.skipped && !self.passed
    }

    pub fn status(&self) -> Option<u16> {
        self.response.as_ref().map(|r| r.status.code())
    }
}

/// 契约守卫输出
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractOutcome {
    pub drifts: Vec<ContractDrift>,
    pub gate_failed: bool,
    pub baseline_updated: bool,
}

/// 一次运行的聚合结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerResult {
    pub collection_id: String,
    pub collection_name: String,
    pub total_requests: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    #[serde(rename = "totalDurationMs", with = "duration_ms")]
    pub total_duration: Duration,
    pub total_assertions: usize,
    pub passed_assertions: usize,
    pub failed_assertions: usize,
    /// 按序号排列
    pub results: Vec<RunnerRequestResult>,
    pub effective_mode: EffectiveMode,
    pub cancelled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_collection: Option<Collection>,

    pub contract_drifts: Vec<ContractDrift>,
    pub contract_gate_failed: bool,
    pub contract_baseline_updated: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chaos_level: Option<ChaosLevel>,
    pub chaos_case_count: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance: Option<PerformanceReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance_regression_pct: Option<f64>,
    pub performance_gate_failed: bool,
    pub performance_baseline_updated: bool,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunnerResult {
    /// 汇总各请求结果，子引擎输出由调用方随后附加
    pub fn aggregate(
        collection: &Collection,
        mut results: Vec<RunnerRequestResult>,
        effective_mode: EffectiveMode,
        started_at: DateTime<Utc>,
    ) -> Self {
        results.sort_by_key(|r| r.sequence);

        let skipped = results.iter().filter(|r| r.skipped).count();
        let passed = results.iter().filter(|r| !r.skipped && r.passed).count();
        let total_duration = results.iter().map(|r| r.duration).sum();

        let total_assertions = results.iter().map(|r| r.assertions.len()).sum();
        let passed_assertions = results
            .iter()
            .flat_map(|r| &r.assertions)
            .filter(|a| a.passed)
            .count();

        Self {
            collection_id: collection.id.clone(),
            collection_name: collection.name.clone(),
            total_requests: results.len(),
            passed,
            failed: results.len() - passed - skipped,
            skipped,
            total_duration,
            total_assertions,
            passed_assertions,
            failed_assertions: total_assertions - passed_assertions,
            results,
            effective_mode,
            cancelled: false,
            recorded_collection: None,
            contract_drifts: Vec::new(),
            contract_gate_failed: false,
            contract_baseline_updated: false,
            chaos_level: None,
            chaos_case_count: 0,
            performance: None,
            performance_regression_pct: None,
            performance_gate_failed: false,
            performance_baseline_updated: false,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn attach_contract(&mut self, outcome: ContractOutcome) {
        self.contract_drifts = outcome.drifts;
        self.contract_gate_failed = outcome.gate_failed;
        self.contract_baseline_updated = outcome.baseline_updated;
    }

    pub fn attach_performance(&mut self, report: PerformanceReport, baseline_updated: bool) {
        self.performance_regression_pct = report.regression_pct;
        self.performance_gate_failed = report.gate_failed;
        self.performance_baseline_updated = baseline_updated;
        self.performance = Some(report);
    }

    /// 是否有任意请求失败或任意闸门触发
    pub fn is_failure(&self) -> bool {
        self.failed > 0 || self.contract_gate_failed || self.performance_gate_failed
    }

    pub fn result_for(&self, name_or_id: &str) -> impl Iterator<Item = &RunnerRequestResult> {
        self.results
            .iter()
            .filter(move |r| r.request_id == name_or_id || r.name == name_or_id)
    }
}
