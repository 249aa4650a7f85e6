//! 受信側: hanging GET のループ
//!
//! 常に最大 1 本の read リクエストだけを張る。
//! 応答が来たらデコードして上位に渡し、すぐに次の read を張る。

use alloc::vec::Vec;

use relay_codec::CodecError;
use relay_transport::{ByteCounter, RequestId, ResponseClass};

use crate::backoff::{BackoffController, RetryPlan};
use crate::{RelayConfig, RequestIds};

/// 発行する read リクエストの内容
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadAttempt {
    pub id: RequestId,
    /// `rcnt` に載せる値
    pub read_count: u64,
}

/// read 応答を処理した結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadProgress {
    /// デコード済みデータ（空の場合もある）。次の read を張ること
    Data(Vec<u8>),
    /// 410: セッション消滅
    SessionGone,
    /// 応答が base64 として不正（致命的）
    Malformed(CodecError),
    /// 一時エラー: 計画どおり再試行タイマーを張ること
    Retry(RetryPlan),
}

/// read ループの状態
#[derive(Debug)]
pub struct ReadLoop {
    read_count: ByteCounter,
    backoff: BackoffController,
    in_flight: Option<RequestId>,
    retry_pending: bool,
    bytes_delivered: u64,
}

impl ReadLoop {
    pub fn new(config: &RelayConfig) -> Self {
        ReadLoop {
            read_count: ByteCounter::ZERO,
            backoff: BackoffController::new(config),
            in_flight: None,
            retry_pending: false,
            bytes_delivered: 0,
        }
    }

    /// 次の read を張る
    ///
    /// すでに read が飛んでいる、または再試行待ちの場合は `None`。
    pub fn issue(&mut self, ids: &mut RequestIds) -> Option<ReadAttempt> {
        if self.in_flight.is_some() || self.retry_pending {
            return None;
        }

        let id = ids.allocate();
        self.in_flight = Some(id);
        Some(ReadAttempt {
            id,
            read_count: self.read_count.raw(),
        })
    }

    /// この read ループが発行中のリクエストか
    pub fn owns(&self, id: RequestId) -> bool {
        self.in_flight == Some(id)
    }

    /// read 応答を処理する
    ///
    /// 呼び出し側は事前に `owns(id)` で照合しておくこと。
    pub fn complete(&mut self, class: ResponseClass) -> ReadProgress {
        self.in_flight = None;

        match class {
            ResponseClass::Success(body) => match relay_codec::decode(&body) {
                Ok(data) => {
                    self.read_count.advance(body.len());
                    self.bytes_delivered += data.len() as u64;
                    self.backoff.on_success();
                    ReadProgress::Data(data)
                }
                Err(e) => ReadProgress::Malformed(e),
            },
            ResponseClass::SessionGone => ReadProgress::SessionGone,
            ResponseClass::Transient(_) => {
                self.retry_pending = true;
                ReadProgress::Retry(self.backoff.on_failure())
            }
        }
    }

    /// 再試行タイマーが発火した
    ///
    /// # 戻り値
    /// - `true`: 再試行待ちだった（read を張り直すこと）
    /// - `false`: 待っていなかった（古いタイマー）
    pub fn retry_fired(&mut self) -> bool {
        core::mem::replace(&mut self.retry_pending, false)
    }

    /// 応答待ちの read リクエスト
    pub fn in_flight(&self) -> Option<RequestId> {
        self.in_flight
    }

    /// 再試行待ちか
    pub fn retry_pending(&self) -> bool {
        self.retry_pending
    }

    pub fn read_count(&self) -> u64 {
        self.read_count.raw()
    }

    pub fn backoff_ms(&self) -> u64 {
        self.backoff.backoff_ms()
    }

    /// 上位に渡した総バイト数（統計用）
    pub fn bytes_delivered(&self) -> u64 {
        self.bytes_delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    fn setup() -> (ReadLoop, RequestIds) {
        (ReadLoop::new(&RelayConfig::default()), RequestIds::new())
    }

    #[test]
    fn test_only_one_read_in_flight() {
        let (mut read, mut ids) = setup();
        let first = read.issue(&mut ids).unwrap();
        assert_eq!(first.read_count, 0);
        assert!(read.issue(&mut ids).is_none(), "2 本目の read を張ってはいけない");
        assert!(read.owns(first.id));
    }

    #[test]
    fn test_success_advances_count_by_encoded_length() {
        let (mut read, mut ids) = setup();
        let _ = read.issue(&mut ids).unwrap();

        // "aGVsbG8"（7 文字）→ floor(21 / 4) = 5
        let progress = read.complete(ResponseClass::Success("aGVsbG8".to_string()));
        assert_eq!(progress, ReadProgress::Data(b"hello".to_vec()));
        assert_eq!(read.read_count(), 5);
        assert_eq!(read.bytes_delivered(), 5);

        let next = read.issue(&mut ids).unwrap();
        assert_eq!(next.read_count, 5);
    }

    #[test]
    fn test_transient_blocks_issue_until_timer() {
        let (mut read, mut ids) = setup();
        let _ = read.issue(&mut ids).unwrap();

        let progress = read.complete(ResponseClass::Transient("502".to_string()));
        assert_eq!(
            progress,
            ReadProgress::Retry(RetryPlan {
                delay_ms: 1,
                notice_duration_ms: None
            })
        );
        assert!(read.issue(&mut ids).is_none(), "タイマー発火前に張り直さない");

        assert!(read.retry_fired());
        assert!(!read.retry_fired(), "2 回目の発火は無視される");
        assert!(read.issue(&mut ids).is_some());
    }

    #[test]
    fn test_success_resets_backoff() {
        let (mut read, mut ids) = setup();
        let _ = read.issue(&mut ids);
        let _ = read.complete(ResponseClass::Transient("x".to_string()));
        assert_eq!(read.backoff_ms(), 95);

        read.retry_fired();
        let _ = read.issue(&mut ids);
        let _ = read.complete(ResponseClass::Success("YQ".to_string()));
        assert_eq!(read.backoff_ms(), 0);
    }

    #[test]
    fn test_nonzero_trailing_bits_delivered() {
        let (mut read, mut ids) = setup();
        let _ = read.issue(&mut ids);

        let progress = read.complete(ResponseClass::Success("YR".to_string()));
        assert_eq!(progress, ReadProgress::Data(b"a".to_vec()));
        assert_eq!(read.read_count(), 1);
    }

    #[test]
    fn test_malformed_body() {
        let (mut read, mut ids) = setup();
        let _ = read.issue(&mut ids);
        let progress = read.complete(ResponseClass::Success("abcde".to_string()));
        assert_eq!(
            progress,
            ReadProgress::Malformed(CodecError::MalformedLength { len: 5 })
        );
        assert_eq!(read.read_count(), 0, "不正データではカウンタを進めない");
    }

    #[test]
    fn test_session_gone() {
        let (mut read, mut ids) = setup();
        let _ = read.issue(&mut ids);
        assert_eq!(read.complete(ResponseClass::SessionGone), ReadProgress::SessionGone);
    }
}
