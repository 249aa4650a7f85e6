//! # relay-stream
//!
//! 汎用の双方向バイトストリームとしてリレーセッションを見せる抽象化レイヤー。
//!
//! ## 設計の背景
//!
//! ストリームの登録・管理側（ターミナル側）はリレーの詳細を知らない。
//! 知っているのは `open` / `write` / `close` と、データ到着などの通知だけ。
//! この crate はその境界を [`DuplexStream`] と [`StreamListener`] で定義し、
//! `relay-session` の状態機械を [`RelayStream`] として実装する。
//!
//! ## 副作用の振り分け
//!
//! ```text
//! RelayStreamClient が返す Effect
//!   ├── Deliver / ShowNotice / OpenComplete / Closed → StreamListener に即通知
//!   └── Send / StartTimer / CancelTimer             → IoAction として溜め、
//!                                                      ホストが take_io() で取り出して実行
//! ```
//!
//! リレー探索（Cookie サーバー経由のリダイレクト）は範囲外。
//! 解決済みのベース URL を返す [`RelayResolver`] として外から注入する。

#![no_std]
extern crate alloc;

pub mod capability;
pub mod events;
pub mod relay;
pub mod resolver;

pub use capability::{DuplexStream, StreamListener};
pub use events::{EventQueue, StreamEvent};
pub use relay::{IoAction, RelayStream};
pub use resolver::{FixedRelay, RelayResolver};
