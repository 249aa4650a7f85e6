//! relay-transport エラー型

use thiserror::Error;

/// トランスポート層のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// リレーのベース URL が http(s) ではない、または空
    #[error("Invalid relay base URL: {0:?}")]
    InvalidRelayUrl(String),
    /// 接続先ホスト名が空
    #[error("Target host must not be empty")]
    EmptyHost,
}
