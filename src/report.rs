//! 运行结束后的纯文本 / JSON 报告
//!
//! 两种渲染都只依赖 [`RunnerResult`]：不带颜色，不读时钟，不做 I/O。
//! 终端输出见 [`ConsoleReporter`](crate::runner::ConsoleReporter)。

use crate::Result;
use crate::runner::types::{RunnerRequestResult, RunnerResult};
use std::fmt::Write;

/// 可读的文本报告
pub fn render_text_report(result: &RunnerResult) -> String {
    let mut out = String::new();
    // 写入 String 不会失败
    let _ = write_text(&mut out, result);
    out
}

/// 结果的 JSON 文档，可解析回 `RunnerResult`
pub fn render_json_report(result: &RunnerResult) -> Result<String> {
    Ok(serde_json::to_string_pretty(result)?)
}

fn write_text(out: &mut String, result: &RunnerResult) -> std::fmt::Result {
    writeln!(
        out,
        "Collection: {} ({})",
        result.collection_name, result.collection_id
    )?;
    writeln!(
        out,
        "Mode: {}{}",
        result.effective_mode,
        if result.cancelled { " (cancelled)" } else { "" }
    )?;
    writeln!(out)?;

    for entry in &result.results {
        write_entry(out, entry)?;
    }

    writeln!(out)?;
    writeln!(
        out,
        "Requests: {} total, {} passed, {} failed, {} skipped",
        result.total_requests, result.passed, result.failed, result.skipped
    )?;
    writeln!(
        out,
        "Assertions: {} total, {} passed, {} failed",
        result.total_assertions, result.passed_assertions, result.failed_assertions
    )?;
    writeln!(
        out,
        "Duration: {}ms",
        result.total_duration.as_millis()
    )?;

    if let Some(level) = result.chaos_level {
        writeln!(out, "Chaos: {} level, {} cases", level, result.chaos_case_count)?;
    }

    if !result.contract_drifts.is_empty() || result.contract_gate_failed {
        writeln!(
            out,
            "Contract: {} drift(s){}",
            result.contract_drifts.len(),
            gate_label(result.contract_gate_failed)
        )?;
        for drift in &result.contract_drifts {
            writeln!(out, "  - {}: {}", drift.request_name, drift)?;
        }
    }
    if result.contract_baseline_updated {
        writeln!(out, "Contract baseline updated")?;
    }

    if let Some(performance) = &result.performance {
        writeln!(
            out,
            "Performance: p50={:.1}ms p95={:.1}ms p99={:.1}ms over {} samples{}",
            performance.overall.p50,
            performance.overall.p95,
            performance.overall.p99,
            performance.sample_count,
            gate_label(result.performance_gate_failed)
        )?;
        if let Some(pct) = result.performance_regression_pct {
            writeln!(out, "  p95 regression: {:+.1}%", pct)?;
        }
        for request in &performance.requests {
            write!(
                out,
                "  - {}: p50={:.1}ms p95={:.1}ms p99={:.1}ms (n={})",
                request.request_name,
                request.percentiles.p50,
                request.percentiles.p95,
                request.percentiles.p99,
                request.sample_count
            )?;
            match request.regression_pct {
                Some(pct) => writeln!(out, " {:+.1}% vs baseline", pct)?,
                None => writeln!(out)?,
            }
        }
    }
    if result.performance_baseline_updated {
        writeln!(out, "Performance baseline updated")?;
    }

    if let Some(recorded) = &result.recorded_collection {
        writeln!(
            out,
            "Recorded: {} request(s) into '{}'",
            recorded.requests.len(),
            recorded.name
        )?;
    }

    writeln!(
        out,
        "Result: {}",
        if result.is_failure() { "FAILED" } else { "PASSED" }
    )
}

fn write_entry(out: &mut String, entry: &RunnerRequestResult) -> std::fmt::Result {
    let marker = if entry.cancelled {
        "CANCELLED"
    } else if entry.skipped {
        "SKIP"
    } else if entry.passed {
        "PASS"
    } else {
        "FAIL"
    };
    write!(
        out,
        "[{}] {} #{} {} {} {}",
        marker, entry.sequence, entry.pass, entry.name, entry.method, entry.url
    )?;
    if let Some(case) = &entry.chaos_case {
        write!(out, " [chaos: {}]", case)?;
    }
    if let Some(status) = entry.status() {
        write!(out, " -> {} ({}ms)", status, entry.duration.as_millis())?;
    }
    writeln!(out)?;

    if let Some(reason) = entry.skip_reason.as_ref().filter(|_| !entry.cancelled) {
        writeln!(out, "    skipped: {}", reason)?;
    }
    if let Some(error) = &entry.error {
        writeln!(out, "    error: {}", error)?;
    }
    for assertion in &entry.assertions {
        write!(
            out,
            "    {} {}",
            if assertion.passed { "ok  " } else { "fail" },
            assertion.name
        )?;
        match &assertion.message {
            Some(message) if !assertion.passed => writeln!(out, ": {}", message)?,
            _ => writeln!(out)?,
        }
    }
    Ok(())
}

fn gate_label(failed: bool) -> &'static str {
    if failed { " [gate failed]" } else { "" }
}
