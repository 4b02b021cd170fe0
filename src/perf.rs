//! 性能实验室
//!
//! 延迟分位数统一在相邻秩之间线性插值（rank = p × (n − 1)），
//! 单个请求、整次运行以及写回的基线都使用同一算法。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 计算单个分位数（0-100）
pub fn compute_percentile(samples: &[f64], percentile: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }

    if samples.len() == 1 {
        return samples[0];
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let n = sorted.len();
    let rank = (percentile / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
    let lower_idx = rank.floor() as usize;
    let upper_idx = (lower_idx + 1).min(n - 1);
    let fraction = rank - lower_idx as f64;

    sorted[lower_idx] + fraction * (sorted[upper_idx] - sorted[lower_idx])
}

/// 延迟分位数（毫秒）
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Percentiles {
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

impl Percentiles {
    pub fn from_samples(samples: &[f64]) -> Self {
        Self {
            p50: compute_percentile(samples, 50.0),
            p95: compute_percentile(samples, 95.0),
            p99: compute_percentile(samples, 99.0),
        }
    }
}

/// 单个请求保存的延迟基线
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceBaseline {
    #[serde(flatten)]
    pub percentiles: Percentiles,
    pub sample_count: usize,
    pub updated_at: DateTime<Utc>,
}

impl PerformanceBaseline {
    pub fn new(percentiles: Percentiles, sample_count: usize) -> Self {
        Self {
            percentiles,
            sample_count,
            updated_at: Utc::now(),
        }
    }
}

/// `(current − baseline) / baseline × 100`；没有可用基线时为 `None`
pub fn regression_pct(current_p95: f64, baseline_p95: f64) -> Option<f64> {
    if baseline_p95 <= 0.0 || !baseline_p95.is_finite() {
        return None;
    }
    Some((current_p95 - baseline_p95) / baseline_p95 * 100.0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPerformance {
    pub request_id: String,
    pub request_name: String,
    pub sample_count: usize,
    #[serde(flatten)]
    pub percentiles: Percentiles,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_p95: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regression_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceReport {
    pub sample_count: usize,
    #[serde(flatten)]
    pub overall: Percentiles,
    pub requests: Vec<RequestPerformance>,
    /// 各请求中最大的回归
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regression_pct: Option<f64>,
    pub gate_failed: bool,
}

/// 一个延迟样本
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub request_id: String,
    pub request_name: String,
    pub millis: f64,
}

/// 汇总样本，并用每个请求的 p95 与其基线比较
pub fn analyze(
    samples: &[Sample],
    baselines: &HashMap<String, PerformanceBaseline>,
    threshold_pct: f64,
) -> PerformanceReport {
    let mut order: Vec<(&str, &str)> = Vec::new();
    let mut grouped: HashMap<&str, Vec<f64>> = HashMap::new();
    for sample in samples {
        let entry = grouped.entry(sample.request_id.as_str()).or_insert_with(|| {
            order.push((sample.request_id.as_str(), sample.request_name.as_str()));
            Vec::new()
        });
        entry.push(sample.millis);
    }

    let requests: Vec<RequestPerformance> = order
        .iter()
        .map(|(id, name)| {
            let values = grouped.get(id).map(|v| v.as_slice()).unwrap_or(&[]);
            let percentiles = Percentiles::from_samples(values);
            let baseline_p95 = baselines.get(*id).map(|b| b.percentiles.p95);
            RequestPerformance {
                request_id: id.to_string(),
                request_name: name.to_string(),
                sample_count: values.len(),
                percentiles,
                baseline_p95,
                regression_pct: baseline_p95.and_then(|b| regression_pct(percentiles.p95, b)),
            }
        })
        .collect();

    let regression = requests
        .iter()
        .filter_map(|r| r.regression_pct)
        .fold(None, |worst: Option<f64>, pct| {
            Some(worst.map_or(pct, |w| w.max(pct)))
        });

    let all: Vec<f64> = samples.iter().map(|s| s.millis).collect();
    PerformanceReport {
        sample_count: all.len(),
        overall: Percentiles::from_samples(&all),
        requests,
        regression_pct: regression,
        gate_failed: regression.is_some_and(|pct| pct > threshold_pct),
    }
}
