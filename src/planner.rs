//! 迭代规划
//!
//! 把集合展开为一次运行的有序上下文列表：共 `iterations × 数据行` 轮，
//! 每轮内按依赖顺序排列请求，每个请求之后紧跟它的混沌用例。
//! 上下文在计划中的位置即其序号。

use crate::Result;
use crate::chaos::{self, ChaosCase};
use crate::collection::{Collection, SavedRequest};
use crate::dataset::{DataRow, Dataset};
use crate::flow::FlowGraph;
use crate::runner::options::RunnerOptions;
use crate::runner::types::ResultMeta;
use std::ops::Range;
use tracing::debug;

/// 一个（迭代，数据行）组合
#[derive(Debug, Clone, PartialEq)]
pub struct Pass {
    pub index: usize,
    pub iteration: usize,
    /// 没有数据集时为 `None`
    pub row_index: Option<usize>,
    pub row: DataRow,
}

/// 一次计划中的执行
#[derive(Debug, Clone, PartialEq)]
pub struct RunContext {
    pub sequence: usize,
    pub pass: usize,
    /// [`Plan::requests`] 中的下标
    pub request: usize,
    pub chaos: Option<ChaosCase>,
}

impl RunContext {
    pub fn is_chaos(&self) -> bool {
        self.chaos.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct Plan {
    pub requests: Vec<SavedRequest>,
    pub graph: FlowGraph,
    pub passes: Vec<Pass>,
    pub contexts: Vec<RunContext>,
    pass_ranges: Vec<Range<usize>>,
    chaos_case_count: usize,
}

impl Plan {
    /// 构建计划；数据集错误与依赖问题（环、未知引用、重复 ID）
    /// 在任何请求执行前返回错误。
    pub fn build(collection: &Collection, options: &RunnerOptions) -> Result<Self> {
        let flattened = collection.flatten();
        let graph = FlowGraph::build(&flattened)?;
        let requests: Vec<SavedRequest> = flattened.into_iter().cloned().collect();

        let dataset = Dataset::parse(&options.dataset)?;
        let has_dataset = !dataset.is_empty();
        let rows = dataset.effective_rows();

        let mut passes = Vec::with_capacity(options.effective_iterations() * rows.len());
        for iteration in 0..options.effective_iterations() {
            for (row_index, row) in rows.iter().enumerate() {
                passes.push(Pass {
                    index: passes.len(),
                    iteration,
                    row_index: has_dataset.then_some(row_index),
                    row: row.clone(),
                });
            }
        }

        // 混沌用例每个请求只抽取一次，在每轮中重复使用
        let chaos_cases: Vec<Vec<ChaosCase>> = if options.chaos.enabled {
            let mut rng = chaos::run_rng(options.chaos.seed);
            requests
                .iter()
                .map(|request| chaos::generate_cases(request, options.chaos.level, &mut rng))
                .collect()
        } else {
            vec![Vec::new(); requests.len()]
        };

        let mut contexts = Vec::new();
        let mut pass_ranges = Vec::with_capacity(passes.len());
        for pass in &passes {
            let start = contexts.len();
            for &request in graph.order() {
                contexts.push(RunContext {
                    sequence: contexts.len(),
                    pass: pass.index,
                    request,
                    chaos: None,
                });
                for case in &chaos_cases[request] {
                    contexts.push(RunContext {
                        sequence: contexts.len(),
                        pass: pass.index,
                        request,
                        chaos: Some(case.clone()),
                    });
                }
            }
            pass_ranges.push(start..contexts.len());
        }

        let chaos_case_count = contexts.iter().filter(|c| c.is_chaos()).count();
        debug!(
            requests = requests.len(),
            passes = passes.len(),
            contexts = contexts.len(),
            chaos_cases = chaos_case_count,
            "Run planned"
        );

        Ok(Self {
            requests,
            graph,
            passes,
            contexts,
            pass_ranges,
            chaos_case_count,
        })
    }

    pub fn total(&self) -> usize {
        self.contexts.len()
    }

    /// 所有轮次中混沌上下文的数量
    pub fn chaos_case_count(&self) -> usize {
        self.chaos_case_count
    }

    pub fn pass_contexts(&self, pass: usize) -> &[RunContext] {
        &self.contexts[self.pass_ranges[pass].clone()]
    }

    pub fn request(&self, context: &RunContext) -> &SavedRequest {
        &self.requests[context.request]
    }

    /// 上下文在变量替换之前的结果标识
    pub fn meta(&self, context: &RunContext) -> ResultMeta {
        let request = self.request(context);
        let pass = &self.passes[context.pass];
        ResultMeta {
            sequence: context.sequence,
            request_id: request.id.clone(),
            name: request.name.clone(),
            method: request.method.to_uppercase(),
            url: request.url.clone(),
            pass: pass.index,
            iteration: pass.iteration,
            row_index: pass.row_index,
            chaos_case: context.chaos.as_ref().map(|c| c.name.clone()),
        }
    }
}
