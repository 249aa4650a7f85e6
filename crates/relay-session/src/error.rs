//! ストリーム操作のエラー型

use relay_transport::TransportError;
use thiserror::Error;

use crate::Lifecycle;

/// 呼び出し側の誤用など、同期的に返すエラー
///
/// どれもストリームの状態は変えない。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// 現在のライフサイクル状態では許されない操作
    #[error("Cannot {operation} while stream is {state}")]
    InvalidState {
        operation: &'static str,
        state: Lifecycle,
    },
    /// write 完了の通知は提供できない（リレーは write ごとの完了を返さない）
    #[error("Write completion acknowledgement is not supported by the relay stream")]
    WriteAckUnsupported,
    /// リレー探索で接続先のリレーが見つからなかった
    #[error("No relay resolved for {0}")]
    RelayUnresolved(alloc::string::String),
    /// 設定値が不正
    #[error("Invalid relay configuration: {0}")]
    InvalidConfig(&'static str),
    /// 接続先・リレー URL が不正
    #[error(transparent)]
    Transport(#[from] TransportError),
}
