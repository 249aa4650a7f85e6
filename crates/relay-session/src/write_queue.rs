//! 送信側: write キュー
//!
//! 送信データはエンキュー時に web-safe base64 のチャンクへ分割する。
//! 先頭チャンクを 1 本ずつ送り、200 が返ってはじめて取り除く。
//! リレーはバイト位置を `wcnt` で照合するため、並列送信は絶対にしない。

use alloc::collections::VecDeque;
use alloc::string::String;

use relay_transport::{ByteCounter, Chunk, Chunker, RequestId, ResponseClass};

use crate::backoff::{BackoffController, RetryPlan};
use crate::{RelayConfig, RequestIds};

/// 発行する write リクエストの内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteAttempt {
    pub id: RequestId,
    /// `wcnt` に載せる値
    pub write_count: u64,
    /// `data` に載せる先頭チャンク
    pub payload: String,
}

/// write 応答を処理した結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteProgress {
    /// 先頭チャンクが受理された。次のチャンクを送ること
    Acked,
    /// 410: セッション消滅
    SessionGone,
    /// 一時エラー: 同じチャンクを計画どおり再送すること
    Retry(RetryPlan),
}

/// write キュー
#[derive(Debug)]
pub struct WriteQueue {
    chunker: Chunker,
    chunks: VecDeque<Chunk>,
    write_count: ByteCounter,
    backoff: BackoffController,
    in_flight: Option<RequestId>,
    retry_pending: bool,
    bytes_accepted: u64,
}

impl WriteQueue {
    pub fn new(config: &RelayConfig) -> Self {
        WriteQueue {
            chunker: Chunker::new(config.max_chunk_len),
            chunks: VecDeque::new(),
            write_count: ByteCounter::ZERO,
            backoff: BackoffController::new(config),
            in_flight: None,
            retry_pending: false,
            bytes_accepted: 0,
        }
    }

    /// 送信データを積む
    ///
    /// # 戻り値
    /// キューが空だった（すぐに `drain()` すべき）なら `true`
    pub fn enqueue(&mut self, raw: &[u8]) -> bool {
        let was_empty = self.chunks.is_empty();
        self.chunks.extend(self.chunker.split(raw));
        self.bytes_accepted += raw.len() as u64;
        was_empty && !self.chunks.is_empty()
    }

    /// 先頭チャンクの送信を開始する
    ///
    /// キューが空、送信中、再試行待ちのいずれかなら `None`。
    pub fn drain(&mut self, ids: &mut RequestIds) -> Option<WriteAttempt> {
        if self.in_flight.is_some() || self.retry_pending {
            return None;
        }
        let head = self.chunks.front()?;

        let id = ids.allocate();
        self.in_flight = Some(id);
        Some(WriteAttempt {
            id,
            write_count: self.write_count.raw(),
            payload: head.payload().into(),
        })
    }

    /// このキューが発行中のリクエストか
    pub fn owns(&self, id: RequestId) -> bool {
        self.in_flight == Some(id)
    }

    /// 応答待ちの write リクエスト
    pub fn in_flight(&self) -> Option<RequestId> {
        self.in_flight
    }

    /// write 応答を処理する
    ///
    /// 呼び出し側は事前に `owns(id)` で照合しておくこと。
    pub fn complete(&mut self, class: ResponseClass) -> WriteProgress {
        self.in_flight = None;

        match class {
            ResponseClass::Success(_) => {
                if let Some(head) = self.chunks.pop_front() {
                    self.write_count.advance(head.len());
                }
                self.backoff.on_success();
                WriteProgress::Acked
            }
            ResponseClass::SessionGone => WriteProgress::SessionGone,
            ResponseClass::Transient(_) => {
                self.retry_pending = true;
                WriteProgress::Retry(self.backoff.on_failure())
            }
        }
    }

    /// 再試行タイマーが発火した
    ///
    /// # 戻り値
    /// 再試行待ちだったなら `true`（`drain()` で同じチャンクを送り直すこと）
    pub fn retry_fired(&mut self) -> bool {
        core::mem::replace(&mut self.retry_pending, false)
    }

    /// 再試行待ちか
    pub fn retry_pending(&self) -> bool {
        self.retry_pending
    }

    /// 未送信チャンクをすべて捨てる（ストリームを閉じるとき）
    pub fn discard(&mut self) {
        self.chunks.clear();
        self.in_flight = None;
        self.retry_pending = false;
    }

    /// キューに残っているチャンク数（送信中の先頭を含む）
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn write_count(&self) -> u64 {
        self.write_count.raw()
    }

    pub fn backoff_ms(&self) -> u64 {
        self.backoff.backoff_ms()
    }

    /// 受け付けた総バイト数（統計用）
    pub fn bytes_accepted(&self) -> u64 {
        self.bytes_accepted
    }
}
