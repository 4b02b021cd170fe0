use crate::runner::types::{RunnerRequestResult, RunnerResult};
use colored::Colorize;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color, Table};
use std::io::Write;

/// 终端报告输出（带颜色）
///
/// 默认写 stdout；JSON 报告占用 stdout 时改写 stderr。
pub struct ConsoleReporter {
    verbose: bool,
    to_stderr: bool,
}

impl ConsoleReporter {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            to_stderr: false,
        }
    }

    pub fn with_stderr(mut self, to_stderr: bool) -> Self {
        self.to_stderr = to_stderr;
        self
    }

    fn line(&self, text: impl std::fmt::Display) {
        if self.to_stderr {
            eprintln!("{}", text);
        } else {
            println!("{}", text);
        }
    }

    /// 打印运行开始
    pub fn print_header(&self, collection: &str, requests: usize) {
        self.line(format_args!(
            "\nRunning {} requests from {}...\n",
            requests,
            collection.bold()
        ));
    }

    /// 单行进度，覆盖上一次输出
    pub fn print_progress(&self, completed: usize, total: usize) {
        eprint!("\r  {} {}/{}", "▶".cyan(), completed, total);
        let _ = std::io::stderr().flush();
        if completed == total {
            eprintln!();
        }
    }

    /// 打印单个执行结果
    pub fn print_result(&self, result: &RunnerRequestResult) {
        let chaos_part = result
            .chaos_case
            .as_ref()
            .map(|c| format!(" [{}]", c.magenta()))
            .unwrap_or_default();

        if result.skipped {
            let label = if result.cancelled { "(cancelled)" } else { "(skipped)" };
            self.line(format_args!(
                " {} [{}] {}{} {} {} {}",
                "⊘".dimmed(),
                result.sequence,
                result.name,
                chaos_part,
                result.method.cyan(),
                result.url,
                label.dimmed()
            ));
            if self.verbose
                && let Some(reason) = result.skip_reason.as_ref().filter(|_| !result.cancelled)
            {
                self.line(format_args!("   {}", reason.dimmed()));
            }
            return;
        }

        let symbol = if result.passed { "✓".green() } else { "✗".red() };
        let status = result
            .status()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "---".to_string());
        self.line(format_args!(
            " {} [{}] {}{} {} {} {} ({}ms)",
            symbol,
            result.sequence,
            result.name,
            chaos_part,
            result.method.cyan(),
            result.url,
            status,
            result.duration.as_millis()
        ));

        if let Some(error) = &result.error {
            self.line(format_args!("   {}: {}", "Error".red().bold(), error));
        }

        // verbose 模式或失败时显示断言详情
        if (self.verbose || !result.passed) && !result.assertions.is_empty() {
            for assertion in &result.assertions {
                if assertion.passed {
                    self.line(format_args!("     {} {}", "✓".green(), assertion.name));
                } else {
                    self.line(format_args!("     {} {}", "✗".red(), assertion.name));
                    if let Some(msg) = &assertion.message {
                        self.line(format_args!("       {}", msg.red()));
                    }
                }
            }
        }
    }

    /// 打印运行摘要
    pub fn print_summary(&self, result: &RunnerResult) {
        self.line(format_args!("\n{}", "━".repeat(50)));
        self.line("Summary".bold());
        self.line(format_args!("{}", "━".repeat(50)));

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_header(vec!["Metric", "Value"]);

        let failed_color = if result.failed == 0 {
            Color::Green
        } else {
            Color::Red
        };
        table.add_row(vec![
            Cell::new("Requests"),
            Cell::new(result.total_requests),
        ]);
        table.add_row(vec![
            Cell::new("Passed"),
            Cell::new(result.passed).fg(Color::Green),
        ]);
        table.add_row(vec![
            Cell::new("Failed"),
            Cell::new(result.failed).fg(failed_color),
        ]);
        table.add_row(vec![
            Cell::new("Skipped"),
            Cell::new(result.skipped).add_attribute(Attribute::Dim),
        ]);
        table.add_row(vec![
            Cell::new("Assertions"),
            Cell::new(format!(
                "{}/{} passed",
                result.passed_assertions, result.total_assertions
            )),
        ]);
        table.add_row(vec![
            Cell::new("Mode"),
            Cell::new(result.effective_mode),
        ]);
        table.add_row(vec![
            Cell::new("Duration"),
            Cell::new(format!("{:.3}s", result.total_duration.as_secs_f64())),
        ]);

        if let Some(level) = result.chaos_level {
            table.add_row(vec![
                Cell::new("Chaos"),
                Cell::new(format!("{} ({} cases)", level, result.chaos_case_count)),
            ]);
        }
        if !result.contract_drifts.is_empty() || result.contract_baseline_updated {
            let color = if result.contract_gate_failed {
                Color::Red
            } else {
                Color::Yellow
            };
            table.add_row(vec![
                Cell::new("Contract drifts"),
                Cell::new(result.contract_drifts.len()).fg(color),
            ]);
        }
        if let Some(performance) = &result.performance {
            table.add_row(vec![
                Cell::new("Latency p50/p95/p99"),
                Cell::new(format!(
                    "{:.1} / {:.1} / {:.1} ms",
                    performance.overall.p50, performance.overall.p95, performance.overall.p99
                )),
            ]);
            if let Some(pct) = result.performance_regression_pct {
                let color = if result.performance_gate_failed {
                    Color::Red
                } else {
                    Color::Green
                };
                table.add_row(vec![
                    Cell::new("p95 regression"),
                    Cell::new(format!("{:+.1}%", pct)).fg(color),
                ]);
            }
        }

        self.line(&table);

        for drift in &result.contract_drifts {
            self.line(format_args!("  {} {}: {}", "⚠".yellow(), drift.request_name, drift));
        }
        if result.cancelled {
            self.line(format_args!("  {}", "Run cancelled before completion".yellow()));
        }
        if result.contract_gate_failed {
            self.line(format_args!("  {}", "Contract gate failed".red().bold()));
        }
        if result.performance_gate_failed {
            self.line(format_args!("  {}", "Performance gate failed".red().bold()));
        }
        self.line("");
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new(false)
    }
}
