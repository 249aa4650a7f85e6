//! # relay-session
//!
//! HTTP リレー上の 1 本のバイトストリームを管理する状態機械。
//!
//! ## 概要
//!
//! リレーとのやりとりは 2 本の独立したリクエスト列で構成される。
//!
//! - **read**: hanging GET を常に 1 本だけ張り続け、応答が来たら即座に次を張る
//! - **write**: 送信データを web-safe base64 のチャンクに分け、1 本ずつ順番に送る
//!
//! どちらも一時的なエラーは指数バックオフで無限に再試行し、
//! 410（セッション消滅）でストリームを閉じる。
//!
//! ## Sans-IO
//!
//! この crate は HTTP もタイマーも直接扱わない。
//! 呼び出し・HTTP 応答・タイマー発火をそれぞれ入力として受け取り、
//! 実行すべき副作用（[`Effect`]）のリストを返す。
//! 実際の `fetch` / `setTimeout` は `relay-wasm` が担当する。
//!
//! ## ライフサイクル
//!
//! ```text
//! Opening ──(proxy 200)──→ Open ──(close / 410 / 不正データ)──→ Closed
//!    └──────(proxy 失敗 / close)──────────────────────────────→ Closed
//! ```

#![no_std]
extern crate alloc;

pub mod backoff;
pub mod client;
pub mod config;
pub mod effect;
pub mod error;
pub mod read_loop;
pub mod write_queue;

pub use backoff::{BackoffController, RetryPlan};
pub use client::{Lifecycle, RelayStreamClient, Session, StreamStats};
pub use config::RelayConfig;
pub use effect::{CloseReason, Effect, TimerId};
pub use error::StreamError;
pub use read_loop::ReadLoop;
pub use write_queue::WriteQueue;

/// write 1 回あたりの最大チャンク長（web-safe base64 の文字数）
pub const MAX_CHUNK_LEN: usize = 1024;

/// この遅延以上のバックオフでユーザーに再試行中の通知を出す（ミリ秒）
pub const NOTICE_THRESHOLD_MS: u64 = 1000;

/// 通知の表示時間をバックオフより長くする分（ミリ秒）
///
/// 再試行の直前に通知が消えてしまわないようにする。
pub const NOTICE_GRACE_MS: u64 = 500;

/// バックオフの加算項（ミリ秒）: `next = prev * 2 + BACKOFF_STEP_MS`
pub const BACKOFF_STEP_MS: u64 = 93;

/// 再試行中の通知メッセージ
pub const RETRY_NOTICE_MESSAGE: &str = "Relay connection interrupted, retrying";

/// リクエスト ID の払い出し
///
/// read / write / proxy で共有する単調増加カウンタ。
#[derive(Debug)]
pub struct RequestIds {
    next: u64,
}

impl RequestIds {
    pub fn new() -> Self {
        RequestIds { next: 1 }
    }

    /// 次の ID を払い出す
    pub fn allocate(&mut self) -> relay_transport::RequestId {
        let id = relay_transport::RequestId(self.next);
        self.next = self.next.wrapping_add(1);
        id
    }
}

impl Default for RequestIds {
    fn default() -> Self {
        Self::new()
    }
}
