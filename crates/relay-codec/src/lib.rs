//! # relay-codec
//!
//! 標準 base64 と web-safe base64 の相互変換。
//!
//! リレーは read の応答ボディと write の `data` クエリパラメータに
//! web-safe base64 を使う。URL にそのまま載せられるよう、
//! `+` / `/` を `-` / `_` に置換し、`=` パディングを落とした形式。
//!
//! ## 変換の流れ
//!
//! ```text
//! 送信: raw bytes → 標準 base64 → to_url_safe() → write?data=...
//! 受信: read の応答ボディ → from_url_safe() → 標準 base64 → raw bytes
//! ```
//!
//! ## パディングの復元
//!
//! | `len % 4` | 付加するパディング |
//! |-----------|--------------------|
//! | 0         | なし               |
//! | 2         | `==`               |
//! | 3         | `=`                |
//! | 1         | 不正（復元不能）   |

#![no_std]
extern crate alloc;

mod error;

use alloc::string::String;
use alloc::vec::Vec;

use base64::alphabet;
use base64::engine::{GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;

pub use error::CodecError;

/// リレーとの変換に使う base64 エンジン
///
/// 末尾の余りビットが 0 でない入力（`"YR"` など）も受け付ける。
/// リレーの相手側はブラウザの `atob` 相当で、これを拒否しない。
const RELAY_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

/// 標準 base64 を web-safe base64 に変換する
///
/// `+` → `-`、`/` → `_`、`=` は除去する。
pub fn to_url_safe(standard: &str) -> String {
    standard
        .chars()
        .filter(|&c| c != '=')
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect()
}

/// web-safe base64 を標準 base64（パディング付き）に戻す
///
/// # エラー
/// - `CodecError::MalformedLength`: `len % 4 == 1`（どのパディングでも正しくならない）
pub fn from_url_safe(url_safe: &str) -> Result<String, CodecError> {
    let padding = match url_safe.len() % 4 {
        0 => "",
        2 => "==",
        3 => "=",
        _ => {
            return Err(CodecError::MalformedLength {
                len: url_safe.len(),
            })
        }
    };

    let mut standard = String::with_capacity(url_safe.len() + padding.len());
    standard.extend(url_safe.chars().map(|c| match c {
        '-' => '+',
        '_' => '/',
        other => other,
    }));
    standard.push_str(padding);
    Ok(standard)
}

/// raw バイト列を web-safe base64 にエンコードする
pub fn encode(raw: &[u8]) -> String {
    to_url_safe(&RELAY_ENGINE.encode(raw))
}

/// web-safe base64 を raw バイト列にデコードする
///
/// # エラー
/// - `CodecError::MalformedLength`: パディングを復元できない長さ
/// - `CodecError::InvalidBase64`: アルファベット外の文字
pub fn decode(url_safe: &str) -> Result<Vec<u8>, CodecError> {
    let standard = from_url_safe(url_safe)?;
    RELAY_ENGINE
        .decode(standard)
        .map_err(|_| CodecError::InvalidBase64)
}

/// エンコード済み文字列長からデコード後バイト数を概算する
///
/// `floor(len * 3 / 4)`。送信した（パディングなしの）文字列長で計算するため、
/// 4 の倍数でない長さでは実際のバイト数とずれることがある。
/// リレーサーバー側のカウンタがこの計算に合わせているので、補正してはいけない。
pub fn approx_decoded_len(encoded_len: usize) -> u64 {
    (encoded_len as u64 * 3) / 4
}
