//! 状態機械が返す副作用

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use relay_transport::{RelayRequest, RequestId};
use serde::Serialize;

/// 再試行タイマーの識別子
///
/// read / write でそれぞれ最大 1 本。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerId {
    ReadRetry,
    WriteRetry,
}

/// ストリームが閉じた理由
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// 呼び出し側が `close()` した
    Requested,
    /// リレーが 410 を返した（セッションが存在しない）
    SessionGone,
    /// read の応答が base64 として復元できなかった
    MalformedData,
    /// セッション確立に失敗した
    OpenFailed,
}

impl CloseReason {
    /// JS 側に渡す識別子（serde の表現と同じ）
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Requested => "requested",
            CloseReason::SessionGone => "session_gone",
            CloseReason::MalformedData => "malformed_data",
            CloseReason::OpenFailed => "open_failed",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Requested => write!(f, "closed by caller"),
            CloseReason::SessionGone => write!(f, "relay session no longer exists"),
            CloseReason::MalformedData => write!(f, "malformed data from relay"),
            CloseReason::OpenFailed => write!(f, "failed to establish relay session"),
        }
    }
}

/// ドライバが実行すべき副作用
///
/// 返されたリストの順番どおりに実行すること。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// GET リクエストを発行し、結果を `handle_response` に渡す
    Send(RelayRequest),
    /// `delay_ms` 後に `handle_timer(timer)` を呼ぶ
    StartTimer { timer: TimerId, delay_ms: u64 },
    /// 発火前のタイマーを取り消す
    CancelTimer(TimerId),
    /// 応答待ちのリクエストを中断する（応答が来ても捨てられる）
    Abort(RequestId),
    /// デコード済みの受信データを上位レイヤーに渡す
    Deliver(Vec<u8>),
    /// 再試行中であることをユーザーに表示する
    ShowNotice { message: String, duration_ms: u64 },
    /// セッション確立の結果
    OpenComplete(bool),
    /// ストリームが閉じた（以後の副作用はない）
    Closed(CloseReason),
}
