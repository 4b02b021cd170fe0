use crate::Result;
use crate::collection::Collection;
use crate::contract::{self, Fingerprint};
use crate::http::HttpTransport;
use crate::perf::{self, PerformanceBaseline, PerformanceReport, Sample};
use crate::planner::Plan;
use crate::recorder::{Exchange, TrafficRecorder};
use crate::runner::executor::RequestExecutor;
use crate::runner::options::{ContractOptions, PerformanceOptions, RunnerOptions};
use crate::runner::scheduler::{ProgressFn, Scheduler};
use crate::runner::types::{ContractOutcome, EffectiveMode, RunnerRequestResult, RunnerResult};
use crate::script::{ExprScriptEngine, ScriptEngine};
use crate::storage::{BaselineStore, ContractBaseline, MemoryBaselineStore};
use crate::transport::{Protocol, TransportRegistry};
use crate::variable::VariableContext;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 集合运行器
///
/// 传输层、脚本引擎与基线存储均由调用方注入；每次 [`run`](Self::run)
/// 拥有独立的计划与状态，可在多个运行之间共享同一个运行器。
pub struct CollectionRunner {
    executor: RequestExecutor,
    baselines: Arc<dyn BaselineStore>,
    variables: VariableContext,
}

/// 运行开始时读取的基线快照
#[derive(Default)]
struct BaselineSnapshot {
    contracts: HashMap<String, ContractBaseline>,
    performance: HashMap<String, PerformanceBaseline>,
}

impl CollectionRunner {
    pub fn new(transports: TransportRegistry) -> Self {
        Self::with_parts(
            transports,
            Arc::new(ExprScriptEngine::new()),
            Arc::new(MemoryBaselineStore::new()),
        )
    }

    pub fn with_parts(
        transports: TransportRegistry,
        scripts: Arc<dyn ScriptEngine>,
        baselines: Arc<dyn BaselineStore>,
    ) -> Self {
        Self {
            executor: RequestExecutor::new(transports, scripts),
            baselines,
            variables: VariableContext::new(),
        }
    }

    /// HTTP 与 GraphQL 走 reqwest 传输
    pub fn http() -> Result<Self> {
        let http = Arc::new(HttpTransport::new()?);
        let transports = TransportRegistry::new()
            .with(Protocol::Http, http.clone())
            .with(Protocol::Graphql, http);
        Ok(Self::new(transports))
    }

    pub fn with_baseline_store(mut self, baselines: Arc<dyn BaselineStore>) -> Self {
        self.baselines = baselines;
        self
    }

    /// 环境与命令行变量，优先级高于集合变量
    pub fn with_variables(mut self, variables: VariableContext) -> Self {
        self.variables = variables;
        self
    }

    /// 运行集合
    ///
    /// 依赖环、未知依赖与数据集错误在任何请求发出前返回 `Err`；
    /// 单个请求的失败与取消都记录在结果中。
    pub async fn run(
        &self,
        collection: &Collection,
        options: &RunnerOptions,
        progress: Option<&ProgressFn<'_>>,
        cancel: Option<CancellationToken>,
    ) -> Result<RunnerResult> {
        let started_at = Utc::now();
        let plan = Plan::build(collection, options)?;
        let effective_mode = EffectiveMode::resolve(options.mode, plan.graph.has_edges());
        info!(
            collection = %collection.name,
            mode = %effective_mode,
            planned = plan.total(),
            "Starting run"
        );

        let snapshot = self.snapshot(&plan, options);

        let mut variables = VariableContext::new();
        variables.extend(collection.variables.clone());
        variables.extend(self.variables.iter().map(|(k, v)| (k.clone(), v.clone())));

        let cancel = cancel.unwrap_or_default();
        let outcome = Scheduler::new(&plan, &self.executor, &variables, &cancel)
            .with_delay(Duration::from_millis(options.delay_ms))
            .with_progress(progress)
            .run(options.mode)
            .await;

        let mut result =
            RunnerResult::aggregate(collection, outcome.results, effective_mode, started_at);
        result.cancelled = outcome.cancelled;

        if options.contract.enabled {
            let outcome = self.guard_contracts(&result.results, &snapshot, &options.contract);
            result.attach_contract(outcome);
        }
        if options.chaos.enabled {
            result.chaos_level = Some(options.chaos.level);
            result.chaos_case_count = plan.chaos_case_count();
        }
        if options.performance.enabled {
            let (report, updated) =
                self.measure_performance(&result.results, &snapshot, &options.performance);
            result.attach_performance(report, updated);
        }
        if options.recorder.enabled {
            result.recorded_collection = Some(record(collection, outcome.exchanges));
        }
        result.finished_at = Utc::now();

        info!(
            total = result.total_requests,
            passed = result.passed,
            failed = result.failed,
            skipped = result.skipped,
            cancelled = result.cancelled,
            "Run finished"
        );
        Ok(result)
    }

    /// 一次性读取本次运行涉及的基线；读取失败按无基线处理
    fn snapshot(&self, plan: &Plan, options: &RunnerOptions) -> BaselineSnapshot {
        let mut snapshot = BaselineSnapshot::default();
        for request in &plan.requests {
            if options.contract.enabled {
                match self.baselines.get_contract_baseline(&request.id) {
                    Ok(Some(baseline)) => {
                        snapshot.contracts.insert(request.id.clone(), baseline);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(request = %request.id, "Failed to read contract baseline: {}", e)
                    }
                }
            }
            if options.performance.enabled {
                match self.baselines.get_performance_baseline(&request.id) {
                    Ok(Some(baseline)) => {
                        snapshot.performance.insert(request.id.clone(), baseline);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(request = %request.id, "Failed to read performance baseline: {}", e)
                    }
                }
            }
        }
        snapshot
    }

    fn guard_contracts(
        &self,
        results: &[RunnerRequestResult],
        snapshot: &BaselineSnapshot,
        options: &ContractOptions,
    ) -> ContractOutcome {
        let mut outcome = ContractOutcome::default();
        let mut current: Vec<(String, Fingerprint)> = Vec::new();

        for result in results.iter().filter(|r| r.chaos_case.is_none()) {
            let Some(fingerprint) = result
                .response
                .as_ref()
                .filter(|r| r.is_success())
                .and_then(|r| Fingerprint::from_body(&r.body))
            else {
                continue;
            };

            if let Some(baseline) = snapshot.contracts.get(&result.request_id) {
                let drifts = contract::diff(
                    &result.request_id,
                    &result.name,
                    &baseline.fingerprint,
                    &fingerprint,
                );
                for drift in drifts {
                    if !outcome.drifts.contains(&drift) {
                        outcome.drifts.push(drift);
                    }
                }
            }

            match current.iter_mut().find(|(id, _)| *id == result.request_id) {
                Some(entry) => entry.1 = fingerprint,
                None => current.push((result.request_id.clone(), fingerprint)),
            }
        }

        outcome.gate_failed = options.break_on_drift && !outcome.drifts.is_empty();
        if !outcome.drifts.is_empty() {
            warn!(drifts = outcome.drifts.len(), "Contract drift detected");
        }

        if options.auto_update_baseline {
            for (request_id, fingerprint) in current {
                let baseline = ContractBaseline::new(fingerprint);
                match self.baselines.set_contract_baseline(&request_id, &baseline) {
                    Ok(()) => outcome.baseline_updated = true,
                    Err(e) => {
                        warn!(request = %request_id, "Failed to write contract baseline: {}", e)
                    }
                }
            }
        }
        outcome
    }

    fn measure_performance(
        &self,
        results: &[RunnerRequestResult],
        snapshot: &BaselineSnapshot,
        options: &PerformanceOptions,
    ) -> (PerformanceReport, bool) {
        let samples: Vec<Sample> = results
            .iter()
            .filter(|r| r.chaos_case.is_none() && r.response.is_some())
            .map(|r| Sample {
                request_id: r.request_id.clone(),
                request_name: r.name.clone(),
                millis: r.duration.as_secs_f64() * 1000.0,
            })
            .collect();
        let report = perf::analyze(
            &samples,
            &snapshot.performance,
            options.regression_threshold_pct,
        );
        if report.gate_failed {
            warn!(
                regression_pct = ?report.regression_pct,
                threshold_pct = options.regression_threshold_pct,
                "Performance regression over threshold"
            );
        }

        let mut updated = false;
        if options.auto_update_baseline {
            for request in &report.requests {
                let baseline = PerformanceBaseline::new(request.percentiles, request.sample_count);
                match self
                    .baselines
                    .set_performance_baseline(&request.request_id, &baseline)
                {
                    Ok(()) => updated = true,
                    Err(e) => warn!(
                        request = %request.request_id,
                        "Failed to write performance baseline: {}",
                        e
                    ),
                }
            }
        }
        (report, updated)
    }
}

fn record(collection: &Collection, exchanges: Vec<Exchange>) -> Collection {
    let mut recorder = TrafficRecorder::new();
    for exchange in exchanges {
        recorder.record(exchange);
    }
    recorder.into_collection(collection)
}
