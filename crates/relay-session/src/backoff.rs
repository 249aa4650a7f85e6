//! 指数バックオフ
//!
//! read と write はそれぞれ独立した `BackoffController` を持つ。
//! 一方の失敗がもう一方の再試行間隔に影響してはいけない。

use crate::RelayConfig;

/// 失敗 1 回に対する再試行計画
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPlan {
    /// 再試行までの待ち時間（ミリ秒）
    pub delay_ms: u64,
    /// ユーザーに通知を出す場合の表示時間（ミリ秒）
    pub notice_duration_ms: Option<u64>,
}

/// バックオフ状態
///
/// `backoff_ms == 0` は「バックオフなし（正常）」を表す。
///
/// 失敗のたびに `1, 95, 283, 659, 1411, ...`（`next = prev * 2 + 93`）と伸びる。
#[derive(Debug, Clone)]
pub struct BackoffController {
    backoff_ms: u64,
    step_ms: u64,
    notice_threshold_ms: u64,
    notice_grace_ms: u64,
}

impl BackoffController {
    pub fn new(config: &RelayConfig) -> Self {
        BackoffController {
            backoff_ms: 0,
            step_ms: config.backoff_step_ms,
            notice_threshold_ms: config.notice_threshold_ms,
            notice_grace_ms: config.notice_grace_ms,
        }
    }

    /// 失敗を記録して、今回の再試行計画を返す
    ///
    /// 今回の遅延は現在の `backoff_ms`（0 なら 1）。
    /// 次回の値は返した後に `backoff_ms * 2 + step` に更新される。
    pub fn on_failure(&mut self) -> RetryPlan {
        if self.backoff_ms == 0 {
            self.backoff_ms = 1;
        }

        let delay_ms = self.backoff_ms;
        let notice_duration_ms = if delay_ms >= self.notice_threshold_ms {
            Some(delay_ms.saturating_add(self.notice_grace_ms))
        } else {
            None
        };

        self.backoff_ms = self
            .backoff_ms
            .saturating_mul(2)
            .saturating_add(self.step_ms);

        RetryPlan {
            delay_ms,
            notice_duration_ms,
        }
    }

    /// 成功したのでバックオフを解除する
    pub fn on_success(&mut self) {
        self.backoff_ms = 0;
    }

    /// 次に失敗したときに使われる遅延（0 = バックオフなし）
    pub fn backoff_ms(&self) -> u64 {
        self.backoff_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    fn controller() -> BackoffController {
        BackoffController::new(&RelayConfig::default())
    }

    #[test]
    fn test_delay_sequence_from_fresh_state() {
        let mut backoff = controller();
        let delays: Vec<u64> = (0..6).map(|_| backoff.on_failure().delay_ms).collect();
        assert_eq!(delays, [1, 95, 283, 659, 1411, 2915]);
    }

    #[test]
    fn test_notice_only_at_threshold() {
        let mut backoff = controller();
        for _ in 0..4 {
            assert_eq!(backoff.on_failure().notice_duration_ms, None);
        }
        // 5 回目: 1411ms → 通知は 1911ms 表示
        let plan = backoff.on_failure();
        assert_eq!(plan.delay_ms, 1411);
        assert_eq!(plan.notice_duration_ms, Some(1911));
    }

    #[test]
    fn test_notice_at_exact_threshold() {
        let config = RelayConfig {
            notice_threshold_ms: 95,
            ..RelayConfig::default()
        };
        let mut backoff = BackoffController::new(&config);
        assert_eq!(backoff.on_failure().notice_duration_ms, None);
        assert_eq!(backoff.on_failure().notice_duration_ms, Some(595));
    }

    #[test]
    fn test_success_resets() {
        let mut backoff = controller();
        backoff.on_failure();
        backoff.on_failure();
        assert_eq!(backoff.backoff_ms(), 283);

        backoff.on_success();
        assert_eq!(backoff.backoff_ms(), 0);
        assert_eq!(backoff.on_failure().delay_ms, 1);
    }

    #[test]
    fn test_growth_saturates() {
        let mut backoff = controller();
        for _ in 0..100 {
            backoff.on_failure();
        }
        assert_eq!(backoff.backoff_ms(), u64::MAX);
    }
}
