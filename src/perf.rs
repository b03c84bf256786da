// ==========================================
// 仓储定价运营系统 - 调用耗时统计
// ==========================================
// 职责: 记录后端调用与发布流程的耗时，超过阈值时输出慢调用告警
// 开关: `FACILITY_PRICING_SLOW_CALL_MS=800` 配置慢调用阈值（毫秒，0 表示关闭）
// ==========================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Once;
use std::time::Instant;

const SLOW_CALL_ENV: &str = "FACILITY_PRICING_SLOW_CALL_MS";

static SLOW_CALL_THRESHOLD_MS: AtomicU64 = AtomicU64::new(0);
static THRESHOLD_INIT: Once = Once::new();

fn slow_call_threshold_ms() -> u64 {
    THRESHOLD_INIT.call_once(|| {
        let ms = std::env::var(SLOW_CALL_ENV)
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(if cfg!(debug_assertions) { 500 } else { 2_000 });
        SLOW_CALL_THRESHOLD_MS.store(ms, Ordering::Relaxed);
    });
    SLOW_CALL_THRESHOLD_MS.load(Ordering::Relaxed)
}

/// 耗时统计 Guard：drop 时记录 elapsed_ms
///
/// 可跨 `.await` 持有（不依赖线程局部状态）
///
/// 使用方式：
/// ```ignore
/// let _perf = facility_pricing_ops::perf::PerfGuard::new("backend.publish_all");
/// // do work...
/// ```
pub struct PerfGuard {
    op: &'static str,
    start: Instant,
}

impl PerfGuard {
    pub fn new(op: &'static str) -> Self {
        Self {
            op,
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Drop for PerfGuard {
    fn drop(&mut self) {
        let elapsed_ms = self.elapsed_ms();
        let threshold = slow_call_threshold_ms();

        if threshold > 0 && elapsed_ms >= threshold {
            tracing::warn!(
                target: "slow_call",
                op = self.op,
                elapsed_ms,
                threshold_ms = threshold,
                "slow call"
            );
        }
        tracing::info!(target: "perf", op = self.op, elapsed_ms, "done");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_measures_elapsed() {
        let guard = PerfGuard::new("test.op");
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(guard.elapsed_ms() >= 5);
    }
}
