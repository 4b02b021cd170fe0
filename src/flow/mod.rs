//! 流程编排：依赖排序与运行条件

pub mod condition;
pub mod graph;

pub use condition::{ConditionScope, Decision, decide};
pub use graph::FlowGraph;
