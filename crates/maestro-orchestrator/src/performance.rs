use crate::types::AgentPerformance;

const SUCCESS_RATE_STEP: f64 = 0.01;
const SUCCESS_RATE_CEILING: f64 = 0.99;
const FAST_TASK_MS: f64 = 30_000.0;
const LEAN_TASK_TOKENS: f64 = 2_000.0;
const MIN_OUTPUT_LEN: usize = 50;
const MAX_OUTPUT_LEN: usize = 20_000;

/// Observable facts about one finished execution.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionSample {
    pub duration_ms: u64,
    pub tokens_used: u64,
    pub output_len: usize,
}

/// Heuristic quality of a successful execution, in `[0, 1]`.
///
/// Zero duration or zero tokens count as fully efficient.
pub fn task_quality(sample: &ExecutionSample) -> f64 {
    let mut quality = 0.4;

    quality += if sample.duration_ms == 0 {
        0.2
    } else {
        0.2 * (FAST_TASK_MS / sample.duration_ms as f64).min(1.0)
    };
    quality += if sample.tokens_used == 0 {
        0.2
    } else {
        0.2 * (LEAN_TASK_TOKENS / sample.tokens_used as f64).min(1.0)
    };
    if (MIN_OUTPUT_LEN..=MAX_OUTPUT_LEN).contains(&sample.output_len) {
        quality += 0.2;
    }
    quality.clamp(0.0, 1.0)
}

/// Fold a successful execution into the agent's performance record.
pub fn record_success(performance: &mut AgentPerformance, sample: &ExecutionSample) {
    performance.tasks_completed += 1;
    let n = performance.tasks_completed as f64;

    performance.success_rate = (performance.success_rate + SUCCESS_RATE_STEP).min(SUCCESS_RATE_CEILING);
    performance.average_time_ms =
        (performance.average_time_ms * (n - 1.0) + sample.duration_ms as f64) / n;
    performance.quality_score =
        ((performance.quality_score * (n - 1.0) + task_quality(sample)) / n).clamp(0.0, 1.0);
}

/// Failures do not touch the record.
// TODO: decide with product whether failures should lower success_rate.
pub fn record_failure(_performance: &mut AgentPerformance) {}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn sample(duration_ms: u64, tokens_used: u64, output_len: usize) -> ExecutionSample {
        ExecutionSample {
            duration_ms,
            tokens_used,
            output_len,
        }
    }

    #[test]
    fn test_perfect_quality() {
        assert!((task_quality(&sample(10_000, 500, 400)) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_slow_verbose_quality() {
        // 0.4 + 0.2 * 0.5 + 0.2 * 0.5 + 0 (too short)
        assert!((task_quality(&sample(60_000, 4_000, 10)) - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_zero_duration_and_tokens() {
        assert!((task_quality(&sample(0, 0, 100)) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_success_updates_running_means() {
        let mut perf = AgentPerformance::default();
        record_success(&mut perf, &sample(10_000, 100, 100));
        record_success(&mut perf, &sample(30_000, 100, 100));
        assert_eq!(perf.tasks_completed, 2);
        assert!((perf.average_time_ms - 20_000.0).abs() < 1e-9);
        assert!((perf.success_rate - 0.02).abs() < 1e-9);
        assert!((perf.quality_score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_success_rate_ceiling() {
        let mut perf = AgentPerformance {
            success_rate: 0.985,
            ..AgentPerformance::default()
        };
        record_success(&mut perf, &sample(1, 1, 100));
        assert_eq!(perf.success_rate, 0.99);
        record_success(&mut perf, &sample(1, 1, 100));
        assert_eq!(perf.success_rate, 0.99);
    }

    // Pins current behavior: failures never lower the success rate.
    #[test]
    fn test_failure_leaves_record_untouched() {
        let mut perf = AgentPerformance {
            tasks_completed: 3,
            success_rate: 0.9,
            average_time_ms: 1_000.0,
            quality_score: 0.8,
            user_rating: 0.7,
        };
        let before = perf.clone();
        record_failure(&mut perf);
        assert_eq!(perf, before);
    }
}
