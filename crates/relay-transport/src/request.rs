//! リレーへのリクエストと応答の分類

use std::fmt;

use crate::STATUS_SESSION_GONE;

/// 発行したリクエストの識別子
///
/// 応答を受け取ったとき、どのリクエストに対するものかを照合するために使う。
/// 照合できない（古い）応答は捨てられる。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// リクエストの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// セッション確立（`proxy`）
    Proxy,
    /// hanging GET（`read`）
    Read,
    /// 送信（`write`）
    Write,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Proxy => "proxy",
            RequestKind::Read => "read",
            RequestKind::Write => "write",
        }
    }
}

/// 発行すべき GET リクエスト
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayRequest {
    pub id: RequestId,
    pub kind: RequestKind,
    pub url: String,
}

/// HTTP リクエストの結果（ドライバから状態機械へ渡す）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpOutcome {
    /// 応答を受け取った（ステータスは問わない）
    Response { status: u16, body: String },
    /// ネットワークエラー・中断・タイムアウトなど、応答がなかった
    Failed(String),
}

impl HttpOutcome {
    /// 200 応答を作る（テスト・ドライバ用）
    pub fn ok(body: impl Into<String>) -> Self {
        HttpOutcome::Response {
            status: 200,
            body: body.into(),
        }
    }

    /// ボディなしのステータス応答を作る
    pub fn status(status: u16) -> Self {
        HttpOutcome::Response {
            status,
            body: String::new(),
        }
    }

    /// read / write の応答を分類する
    pub fn classify(self) -> ResponseClass {
        match self {
            HttpOutcome::Response { status: 200, body } => ResponseClass::Success(body),
            HttpOutcome::Response {
                status: STATUS_SESSION_GONE,
                ..
            } => ResponseClass::SessionGone,
            HttpOutcome::Response { status, .. } => {
                ResponseClass::Transient(format!("HTTP status {}", status))
            }
            HttpOutcome::Failed(reason) => ResponseClass::Transient(reason),
        }
    }
}

/// read / write 応答の分類結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseClass {
    /// 200: ボディ付き
    Success(String),
    /// 410: セッションが存在しない
    SessionGone,
    /// それ以外: バックオフして再試行する
    Transient(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_success() {
        assert_eq!(
            HttpOutcome::ok("aGk").classify(),
            ResponseClass::Success("aGk".to_string())
        );
    }

    #[test]
    fn test_classify_gone() {
        assert_eq!(HttpOutcome::status(410).classify(), ResponseClass::SessionGone);
    }

    #[test]
    fn test_classify_transient() {
        assert!(matches!(
            HttpOutcome::status(502).classify(),
            ResponseClass::Transient(_)
        ));
        // 204 も 200 以外なので一時エラー扱い
        assert!(matches!(
            HttpOutcome::status(204).classify(),
            ResponseClass::Transient(_)
        ));
        assert_eq!(
            HttpOutcome::Failed("aborted".to_string()).classify(),
            ResponseClass::Transient("aborted".to_string())
        );
    }
}
