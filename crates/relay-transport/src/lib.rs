//! # relay-transport
//!
//! HTTP リレーのワイヤモデル。
//!
//! 実際の HTTP 送受信は行わない。リクエスト URL の組み立て、応答ステータスの分類、
//! write データのチャンク分割、バイトカウンタを担当する。
//!
//! ## リレーのエンドポイント
//!
//! ```text
//! GET {relay}proxy?host={host}&port={port}             → 200: body = セッション ID
//! GET {relay}read?sid={sid}&rcnt={read_count}          → 200: body = web-safe base64
//! GET {relay}write?sid={sid}&wcnt={write_count}&data=… → 200: 受理
//!
//! read / write の 410 はセッション消滅（再試行しない）。
//! それ以外のステータスや通信エラーは一時的なエラーとして扱う。
//! ```

pub mod chunk;
pub mod counter;
pub mod endpoint;
pub mod error;
pub mod request;

pub use chunk::{Chunk, Chunker};
pub use counter::ByteCounter;
pub use endpoint::{RelayBaseUrl, Target};
pub use error::TransportError;
pub use request::{HttpOutcome, RelayRequest, RequestId, RequestKind, ResponseClass};

/// セッション消滅を示す HTTP ステータス（410 Gone）
pub const STATUS_SESSION_GONE: u16 = 410;
