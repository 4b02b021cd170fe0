mod evaluator;
mod extractor;
mod parser;
/// 断言模块 - 声明式断言与脚本测试的统一结果
mod types;

pub use evaluator::{evaluate_all, evaluate_assertion};
pub use extractor::extract_value;
pub use parser::parse_assertion;
pub use types::{
    AssertError, AssertExpr, AssertValue, AssertionResult, AssertionSource, CompareOp, ValuePath,
};
