//! リレーのベース URL と接続先
//!
//! ベース URL はリレー探索（Cookie サーバー経由のリダイレクト）で解決済みのものを受け取る。
//! 探索そのものはこのクレートの範囲外。

use std::fmt;

use crate::error::TransportError;

/// 解決済みのリレーのベース URL
///
/// 常に `/` で終わるように正規化する。エンドポイント名はそのまま後ろに連結される。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayBaseUrl(String);

impl RelayBaseUrl {
    /// 文字列からベース URL を作る
    ///
    /// # エラー
    /// - `TransportError::InvalidRelayUrl`: `http://` / `https://` で始まらない
    pub fn parse(raw: &str) -> Result<Self, TransportError> {
        let trimmed = raw.trim();
        let has_scheme = trimmed.starts_with("http://") || trimmed.starts_with("https://");
        let has_authority = trimmed.split("://").nth(1).is_some_and(|rest| !rest.is_empty());
        if !has_scheme || !has_authority {
            return Err(TransportError::InvalidRelayUrl(raw.to_string()));
        }

        let mut url = trimmed.to_string();
        if !url.ends_with('/') {
            url.push('/');
        }
        Ok(RelayBaseUrl(url))
    }

    /// 正規化済みの URL 文字列
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// セッション確立リクエストの URL
    pub fn proxy_url(&self, target: &Target) -> String {
        format!(
            "{}proxy?host={}&port={}",
            self.0,
            urlencoding::encode(&target.host),
            target.port
        )
    }

    /// hanging GET（read）の URL
    pub fn read_url(&self, session_id: &str, read_count: u64) -> String {
        format!(
            "{}read?sid={}&rcnt={}",
            self.0,
            urlencoding::encode(session_id),
            read_count
        )
    }

    /// write の URL
    ///
    /// `chunk` は web-safe base64 なのでエンコードせずにそのまま載せる。
    pub fn write_url(&self, session_id: &str, write_count: u64, chunk: &str) -> String {
        format!(
            "{}write?sid={}&wcnt={}&data={}",
            self.0,
            urlencoding::encode(session_id),
            write_count,
            chunk
        )
    }
}

impl fmt::Display for RelayBaseUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// リレーの先にある接続先（SSH サーバー）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
}

impl Target {
    /// # エラー
    /// - `TransportError::EmptyHost`: ホスト名が空
    pub fn new(host: &str, port: u16) -> Result<Self, TransportError> {
        let host = host.trim();
        if host.is_empty() {
            return Err(TransportError::EmptyHost);
        }
        Ok(Target {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
