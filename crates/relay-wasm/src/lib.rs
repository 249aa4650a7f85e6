//! # relay-wasm
//!
//! wasm-bindgen エクスポート：ブラウザのターミナル（JS）から呼び出す公開 API。
//!
//! ## 使用方法（TypeScript）
//!
//! ```typescript
//! import { RelayClient, init_panic_hook, initLogging } from '../relay-wasm-pkg/relay_wasm';
//!
//! // パニック時のスタックトレースを有効化（開発時）
//! init_panic_hook();
//! initLogging("debug");
//!
//! // クライアント初期化（設定は省略可能な JSON）
//! const client = new RelayClient(
//!     (data: Uint8Array) => terminal.write(data),
//!     (message: string, durationMs: number) => overlay.show(message, durationMs),
//!     (success: boolean) => onConnected(success),
//!     '{"max_chunk_len":1024}',
//! );
//! client.setOnClosed((reason: string) => onDisconnected(reason));
//!
//! // リレー探索は済んでいる前提
//! client.open("ssh.example.com", 22, "https://relay.example.com/");
//!
//! // ターミナルの入力を送信（完了通知はない）
//! client.write(encoder.encode("ls\n"));
//!
//! client.close();
//! ```

use wasm_bindgen::prelude::*;

pub mod client;
pub mod fetch;
pub mod logging;
pub mod timer;

pub use client::RelayClient;

/// パニック時にブラウザコンソールにスタックトレースを出力する
///
/// 開発時に必ず呼び出すこと。本番ビルドでは feature flag で無効化可能。
#[wasm_bindgen]
pub fn init_panic_hook() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// tracing のログをブラウザコンソールに出す
///
/// # 引数
/// - `max_level`: `"error"` / `"warn"` / `"info"` / `"debug"` / `"trace"`。省略時は `"info"`
#[wasm_bindgen(js_name = "initLogging")]
pub fn init_logging(max_level: Option<String>) {
    logging::init(max_level.as_deref());
}

/// web-safe base64 を Uint8Array にデコードするユーティリティ
///
/// テスト・デバッグ用。リレーの read 応答をそのまま渡して中身を確認できる。
///
/// # エラー
/// - 長さからパディングを復元できない
/// - base64 アルファベット外の文字
#[wasm_bindgen(js_name = "decodeWebSafeBase64")]
pub fn decode_web_safe_base64(encoded: &str) -> Result<js_sys::Uint8Array, JsError> {
    let bytes = relay_codec::decode(encoded).map_err(|e| JsError::new(&format!("{}", e)))?;
    Ok(js_sys::Uint8Array::from(bytes.as_slice()))
}
