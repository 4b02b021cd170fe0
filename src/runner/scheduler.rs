use crate::flow::{ConditionScope, Decision, decide};
use crate::planner::{Pass, Plan, RunContext};
use crate::recorder::Exchange;
use crate::runner::executor::{Execution, RequestExecutor};
use crate::runner::options::RunMode;
use crate::runner::types::RunnerRequestResult;
use crate::variable::VariableContext;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// 进度回调：(已完成数, 计划总数)
pub type ProgressFn<'p> = dyn Fn(usize, usize) + Send + Sync + 'p;

/// 调度产物
#[derive(Debug, Default)]
pub struct Outcome {
    pub results: Vec<RunnerRequestResult>,
    pub exchanges: Vec<Exchange>,
    pub cancelled: bool,
    settled: usize,
}

/// 单个轮次内的状态
struct PassState {
    variables: VariableContext,
    /// 请求下标 -> 本轮基础执行结果在 results 中的位置
    settled: HashMap<usize, usize>,
    /// 请求下标 -> 本轮基础执行的决定，混沌用例沿用
    decisions: HashMap<usize, Decision>,
}

impl PassState {
    fn new(variables: &VariableContext, pass: &Pass) -> Self {
        let mut variables = variables.clone();
        variables.merge_row(&pass.row);
        Self {
            variables,
            settled: HashMap::new(),
            decisions: HashMap::new(),
        }
    }
}

/// 调度器
///
/// 所有上下文在同一个任务中推进；并行模式用 FuturesUnordered 同时等待多个传输调用。
/// 轮次依次执行，依赖只在同一轮次内生效。
pub struct Scheduler<'a> {
    plan: &'a Plan,
    executor: &'a RequestExecutor,
    variables: &'a VariableContext,
    delay: Duration,
    cancel: &'a CancellationToken,
    progress: Option<&'a ProgressFn<'a>>,
}

impl<'a> Scheduler<'a> {
    pub fn new(
        plan: &'a Plan,
        executor: &'a RequestExecutor,
        variables: &'a VariableContext,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            plan,
            executor,
            variables,
            delay: Duration::ZERO,
            cancel,
            progress: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_progress(mut self, progress: Option<&'a ProgressFn<'a>>) -> Self {
        self.progress = progress;
        self
    }

    pub async fn run(&self, mode: RunMode) -> Outcome {
        let outcome = match mode {
            RunMode::Serial => self.run_serial().await,
            RunMode::Parallel => self.run_parallel().await,
        };
        self.finish(outcome)
    }

    /// 串行：按计划顺序逐个执行，两次发送之间等待 delay
    async fn run_serial(&self) -> Outcome {
        let mut outcome = Outcome::default();
        let mut sent_any = false;

        'passes: for pass in &self.plan.passes {
            let mut state = PassState::new(self.variables, pass);
            for context in self.plan.pass_contexts(pass.index) {
                if self.cancel.is_cancelled() {
                    break 'passes;
                }
                if let Decision::Skip(reason) = self.decide(context, &mut state, &outcome) {
                    self.skip(&mut state, &mut outcome, context, reason);
                    continue;
                }

                if sent_any && !self.delay.is_zero() {
                    tokio::select! {
                        _ = self.cancel.cancelled() => break 'passes,
                        _ = tokio::time::sleep(self.delay) => {}
                    }
                }
                sent_any = true;

                let (context, execution) = self.execute(context, state.variables.clone()).await;
                self.accept(&mut state, &mut outcome, context, execution);
            }
        }

        outcome
    }

    /// 并行：依赖全部完成即启动，无依赖的上下文同时进行
    async fn run_parallel(&self) -> Outcome {
        let mut outcome = Outcome::default();

        for pass in &self.plan.passes {
            if self.cancel.is_cancelled() {
                break;
            }
            let mut state = PassState::new(self.variables, pass);
            let mut pending: Vec<&'a RunContext> =
                self.plan.pass_contexts(pass.index).iter().collect();
            let mut in_flight = FuturesUnordered::new();

            loop {
                while !self.cancel.is_cancelled() {
                    let Some(position) = pending.iter().position(|c| self.is_ready(c, &state))
                    else {
                        break;
                    };
                    let context = pending.remove(position);
                    match self.decide(context, &mut state, &outcome) {
                        Decision::Skip(reason) => {
                            self.skip(&mut state, &mut outcome, context, reason);
                        }
                        Decision::Run => {
                            in_flight.push(self.execute(context, state.variables.clone()));
                        }
                    }
                }

                if in_flight.is_empty() {
                    break;
                }
                tokio::select! {
                    _ = self.cancel.cancelled(), if !self.cancel.is_cancelled() => {}
                    Some((context, execution)) = in_flight.next() => {
                        self.accept(&mut state, &mut outcome, context, execution);
                    }
                }
            }
        }

        outcome
    }

    async fn execute(
        &self,
        context: &'a RunContext,
        variables: VariableContext,
    ) -> (&'a RunContext, Execution) {
        let execution = self
            .executor
            .execute(
                self.plan.request(context),
                self.plan.meta(context),
                variables,
                context.chaos.as_ref(),
                self.cancel,
            )
            .await;
        (context, execution)
    }

    /// 同轮次依赖均已结束；混沌用例还需等待其基础执行
    fn is_ready(&self, context: &RunContext, state: &PassState) -> bool {
        let base_done = !context.is_chaos() || state.settled.contains_key(&context.request);
        base_done
            && self
                .plan
                .graph
                .dependencies(context.request)
                .iter()
                .all(|dep| state.settled.contains_key(dep))
    }

    fn decide(&self, context: &RunContext, state: &mut PassState, outcome: &Outcome) -> Decision {
        if context.is_chaos() {
            return match state.decisions.get(&context.request) {
                Some(Decision::Skip(reason)) => Decision::Skip(reason.clone()),
                _ => Decision::Run,
            };
        }

        let pass = &self.plan.passes[context.pass];
        let dependencies = self
            .plan
            .graph
            .dependencies(context.request)
            .iter()
            .filter_map(|dep| {
                let position = state.settled.get(dep)?;
                Some((&self.plan.requests[*dep], &outcome.results[*position]))
            })
            .collect();
        let scope = ConditionScope {
            iteration: pass.iteration,
            pass: pass.index,
            row: &pass.row,
            variables: &state.variables,
            dependencies,
            results: &outcome.results,
        };
        let decision = decide(self.plan.request(context), &scope);
        state.decisions.insert(context.request, decision.clone());
        decision
    }

    fn skip(
        &self,
        state: &mut PassState,
        outcome: &mut Outcome,
        context: &RunContext,
        reason: String,
    ) {
        debug!(sequence = context.sequence, reason = %reason, "Skipping request");
        let result = RunnerRequestResult::skipped(self.plan.meta(context), reason);
        self.settle(state, outcome, context, result, None, Vec::new());
    }

    /// 接收执行结果；取消后才完成的结果被丢弃
    fn accept(
        &self,
        state: &mut PassState,
        outcome: &mut Outcome,
        context: &RunContext,
        execution: Execution,
    ) {
        if execution.result.cancelled || self.cancel.is_cancelled() {
            debug!(sequence = context.sequence, "Discarding result completed after cancellation");
            outcome
                .results
                .push(RunnerRequestResult::cancelled(self.plan.meta(context)));
            return;
        }
        self.settle(
            state,
            outcome,
            context,
            execution.result,
            execution.exchange,
            execution.variables,
        );
    }

    fn settle(
        &self,
        state: &mut PassState,
        outcome: &mut Outcome,
        context: &RunContext,
        result: RunnerRequestResult,
        exchange: Option<Exchange>,
        variables: Vec<(String, String)>,
    ) {
        if !context.is_chaos() {
            state.settled.insert(context.request, outcome.results.len());
            state.variables.extend(variables);
        }
        if let Some(exchange) = exchange {
            outcome.exchanges.push(exchange);
        }
        outcome.results.push(result);
        outcome.settled += 1;

        if let Some(progress) = self.progress {
            progress(outcome.settled, self.plan.total());
        }
    }

    /// 取消后，未结束的上下文记为 cancelled
    fn finish(&self, mut outcome: Outcome) -> Outcome {
        if !self.cancel.is_cancelled() {
            return outcome;
        }
        let seen: HashSet<usize> = outcome.results.iter().map(|r| r.sequence).collect();
        let remaining: Vec<RunnerRequestResult> = self
            .plan
            .contexts
            .iter()
            .filter(|c| !seen.contains(&c.sequence))
            .map(|c| RunnerRequestResult::cancelled(self.plan.meta(c)))
            .collect();
        info!(
            settled = outcome.settled,
            cancelled = remaining.len(),
            "Run cancelled"
        );
        outcome.results.extend(remaining);
        outcome.cancelled = true;
        outcome
    }
}
