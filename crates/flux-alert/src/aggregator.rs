use flux_types::Aggregation;

/// 将一组样本聚合为单个值
///
/// 空样本返回 `None`（包括 `count`），数据不足的条件一律视为不满足。
/// 时间窗口的裁剪由调用方提供的上下文决定，这里不做时间过滤。
pub fn aggregate(aggregation: Aggregation, samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }

    let value = match aggregation {
        Aggregation::Average => samples.iter().sum::<f64>() / samples.len() as f64,
        Aggregation::Sum => samples.iter().sum(),
        Aggregation::Min => samples.iter().copied().fold(f64::INFINITY, f64::min),
        Aggregation::Max => samples.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        Aggregation::Count => samples.len() as f64,
    };

    Some(value)
}
