//! コーデックのエラー型

use thiserror::Error;

/// web-safe base64 変換のエラー
///
/// どちらもストリームにとっては致命的。黙って続行するとバイト列が壊れる。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// パディングを復元できない長さ（`len % 4 == 1`）
    #[error("Malformed web-safe base64: length {len} leaves remainder 1")]
    MalformedLength {
        /// 受信した文字列長（パディングなし）
        len: usize,
    },
    /// base64 アルファベット外の文字を含む
    #[error("Invalid base64 payload")]
    InvalidBase64,
}
