//! read / write のバイトカウンタ
//!
//! リレーはクライアントが送ってくる `rcnt` / `wcnt` でバイト位置を照合する。
//! カウンタはデコード後バイト数の概算（`floor(エンコード長 * 3 / 4)`）で進める。

use std::fmt;

/// 単調増加するバイトカウンタ
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByteCounter(u64);

impl ByteCounter {
    /// 初期値（0）
    pub const ZERO: Self = ByteCounter(0);

    /// 送受信したエンコード済み文字列の長さぶん進める
    ///
    /// # 引数
    /// - `encoded_len`: 送信した（または受信した）web-safe base64 の文字数
    pub fn advance(&mut self, encoded_len: usize) {
        self.0 = self
            .0
            .saturating_add(relay_codec::approx_decoded_len(encoded_len));
    }

    /// 生の値を返す
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ByteCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
