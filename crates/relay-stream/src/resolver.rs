//! リレー探索の注入口

use relay_transport::RelayBaseUrl;

/// 接続先からリレーのベース URL を解決する
///
/// 実装（リダイレクトによる探索や、その結果の永続化）はこの crate の外に置く。
pub trait RelayResolver {
    /// # 引数
    /// - `destination`: `host:port` 形式の接続先
    ///
    /// # 戻り値
    /// 解決できなければ `None`
    fn resolve_relay_host(&self, destination: &str) -> Option<RelayBaseUrl>;
}

/// どの接続先にも同じリレーを返す Resolver
#[derive(Debug, Clone)]
pub struct FixedRelay(pub RelayBaseUrl);

impl RelayResolver for FixedRelay {
    fn resolve_relay_host(&self, _destination: &str) -> Option<RelayBaseUrl> {
        Some(self.0.clone())
    }
}
