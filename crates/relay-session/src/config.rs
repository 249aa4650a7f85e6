//! ストリームの設定値

use serde::{Deserialize, Serialize};

use crate::{StreamError, BACKOFF_STEP_MS, MAX_CHUNK_LEN, NOTICE_GRACE_MS, NOTICE_THRESHOLD_MS};

/// リレーストリームの設定
///
/// すべて省略可能。省略したフィールドはリレーサーバーの既定値になる。
/// `max_chunk_len` 以外はリレー側と合わせる必要はない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// write 1 回あたりの最大文字数
    pub max_chunk_len: usize,
    /// 再試行通知を出すバックオフの閾値（ミリ秒）
    pub notice_threshold_ms: u64,
    /// 通知の表示時間に加える余裕（ミリ秒）
    pub notice_grace_ms: u64,
    /// バックオフの加算項（ミリ秒）
    pub backoff_step_ms: u64,
}

impl RelayConfig {
    /// # エラー
    /// - `StreamError::InvalidConfig`: `max_chunk_len` が 0
    pub fn validate(&self) -> Result<(), StreamError> {
        if self.max_chunk_len == 0 {
            return Err(StreamError::InvalidConfig("max_chunk_len must be positive"));
        }
        Ok(())
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig {
            max_chunk_len: MAX_CHUNK_LEN,
            notice_threshold_ms: NOTICE_THRESHOLD_MS,
            notice_grace_ms: NOTICE_GRACE_MS,
            backoff_step_ms: BACKOFF_STEP_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.max_chunk_len, 1024);
        assert_eq!(config.notice_threshold_ms, 1000);
        assert_eq!(config.notice_grace_ms, 500);
        assert_eq!(config.backoff_step_ms, 93);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: RelayConfig = serde_json::from_str(r#"{"max_chunk_len":512}"#).unwrap();
        assert_eq!(config.max_chunk_len, 512);
        assert_eq!(config.notice_threshold_ms, NOTICE_THRESHOLD_MS);
    }

    #[test]
    fn test_zero_chunk_len_rejected() {
        let config = RelayConfig {
            max_chunk_len: 0,
            ..RelayConfig::default()
        };
        assert!(matches!(config.validate(), Err(StreamError::InvalidConfig(_))));
    }
}
