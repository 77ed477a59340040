//! Weighted provider ranking.

use mercato_types::{LimitsConfig, RequestPriority};

/// Inputs to [`provider_score`] for one provider and request.
#[derive(Debug, Clone, Copy)]
pub struct ScoreInput {
    /// Health score in `[0, 100]`.
    pub health: u8,
    /// Configured priority, `1` = primary.
    pub priority: u32,
    /// Number of configured providers.
    pub provider_count: usize,
    /// Quota `used / limit` for the request type.
    pub usage_rate: f64,
    /// Unused share of the per-second budget, in `[0, 1]`.
    pub rate_headroom: f64,
    /// Priority of the request being routed.
    pub request_priority: RequestPriority,
}

/// `priority_rank = n + 1 - priority`, floored at zero.
#[must_use]
pub fn priority_rank(priority: u32, provider_count: usize) -> f64 {
    let n = u32::try_from(provider_count).unwrap_or(u32::MAX);
    f64::from(n.saturating_add(1).saturating_sub(priority))
}

/// Score used to order eligible providers; higher is better.
///
/// `0.4 * health + 10 * rank + 30 * (1 - usage_rate) + 5 * rate_headroom`,
/// plus `critical_bonus * rank / n` for critical requests and
/// `high_bonus * rank / n` for high-priority requests.
#[must_use]
pub fn provider_score(input: &ScoreInput, cfg: &LimitsConfig) -> f64 {
    let rank = priority_rank(input.priority, input.provider_count);
    let mut score = 0.4 * f64::from(input.health)
        + 10.0 * rank
        + 30.0 * (1.0 - input.usage_rate.clamp(0.0, 1.0))
        + 5.0 * input.rate_headroom.clamp(0.0, 1.0);

    #[allow(clippy::cast_precision_loss)]
    let n = input.provider_count.max(1) as f64;
    score += match input.request_priority {
        RequestPriority::Critical => cfg.critical_bonus * rank / n,
        RequestPriority::High => cfg.high_bonus * rank / n,
        RequestPriority::Standard | RequestPriority::Low => 0.0,
    };
    score
}
