//! RelayClient wasm-bindgen エクスポート
//!
//! ブラウザのターミナル（JS）から呼び出すリレークライアントの主エントリポイント。
//! `relay-stream` の状態機械を `fetch()` と `setTimeout()` で駆動する。

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use js_sys::{Function, Uint8Array};
use wasm_bindgen::prelude::*;

use relay_session::{RelayConfig, TimerId};
use relay_stream::{DuplexStream, EventQueue, IoAction, RelayStream, StreamEvent};
use relay_transport::{RelayBaseUrl, RequestId, Target};
use web_sys::AbortController;

use crate::{fetch, timer};

/// JS 側のコールバック
struct Callbacks {
    on_data: Function,
    show_overlay: Function,
    on_open_complete: Function,
    on_closed: Option<Function>,
}

/// 非同期タスクと共有する状態
struct Inner {
    stream: RefCell<RelayStream<EventQueue>>,
    callbacks: RefCell<Callbacks>,
    timers: RefCell<HashMap<TimerId, timer::TimeoutHandle>>,
    /// 応答待ちの fetch（中断用）
    requests: RefCell<HashMap<RequestId, AbortController>>,
    gate: CloseGate,
}

/// on_closed を配送した後の通知を止める
///
/// コールバックの中で `close()` されると、同じバッチの残りの通知より先に
/// Closed が配送される。その残りは捨てる。
#[derive(Debug, Default)]
struct CloseGate {
    closed: Cell<bool>,
}

impl CloseGate {
    /// この通知を配送してよいか（Closed を通した後はすべて false）
    fn admit(&self, event: &StreamEvent) -> bool {
        if self.closed.get() {
            return false;
        }
        if matches!(event, StreamEvent::Closed(_)) {
            self.closed.set(true);
        }
        true
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        // JS 側で free() された: 張りっぱなしの fetch とタイマーを片付ける
        for (_, controller) in self.requests.get_mut().drain() {
            controller.abort();
        }
        for (_, handle) in self.timers.get_mut().drain() {
            timer::cancel(handle);
        }
    }
}

/// リレークライアント（1 本のストリーム）
///
/// ## 内部アーキテクチャ
///
/// ```text
/// RelayClient
///   └── Inner (Rc)
///         ├── RelayStream<EventQueue>  (relay-stream) - 状態機械 + 通知キュー
///         ├── Callbacks                               - JS コールバック
///         ├── timers                                  - setTimeout のハンドル
///         └── requests                                - fetch の AbortController
/// ```
///
/// `fetch` とタイマーのタスクは `Weak` で `Inner` を参照する。
/// JS 側で `free()` された後に完了した応答は捨てられ、次のリクエストは出ない。
///
/// ## スレッド安全性
///
/// WASM は シングルスレッドのため、`!Send + !Sync` を満たす。
/// JS からは単一スレッドで呼び出される前提。
#[wasm_bindgen]
pub struct RelayClient {
    inner: Rc<Inner>,
}

#[wasm_bindgen]
impl RelayClient {
    /// リレークライアントを初期化する
    ///
    /// # 引数
    /// - `on_data`: `(data: Uint8Array) => void` 受信データ
    /// - `show_overlay`: `(message: string, durationMs: number) => void` 再試行中の通知
    /// - `on_open_complete`: `(success: boolean) => void` セッション確立の結果
    /// - `config_json`: `RelayConfig` の JSON（省略可能、省略フィールドは既定値）
    ///
    /// # エラー
    /// - 設定 JSON のパース失敗
    /// - 設定値が不正
    #[wasm_bindgen(constructor)]
    pub fn new(
        on_data: Function,
        show_overlay: Function,
        on_open_complete: Function,
        config_json: Option<String>,
    ) -> Result<RelayClient, JsError> {
        let config = match config_json.as_deref() {
            Some(json) if !json.trim().is_empty() => serde_json::from_str::<RelayConfig>(json)
                .map_err(|e| JsError::new(&format!("Invalid relay config: {}", e)))?,
            _ => RelayConfig::default(),
        };

        let stream = RelayStream::new(config, EventQueue::new())
            .map_err(|e| JsError::new(&format!("{}", e)))?;

        Ok(RelayClient {
            inner: Rc::new(Inner {
                stream: RefCell::new(stream),
                callbacks: RefCell::new(Callbacks {
                    on_data,
                    show_overlay,
                    on_open_complete,
                    on_closed: None,
                }),
                timers: RefCell::new(HashMap::new()),
                requests: RefCell::new(HashMap::new()),
                gate: CloseGate::default(),
            }),
        })
    }

    /// ストリームが閉じたときのコールバックを設定する
    ///
    /// `(reason: string) => void`。reason は `"requested"` / `"session_gone"` /
    /// `"malformed_data"` / `"open_failed"` のいずれか。
    #[wasm_bindgen(js_name = "setOnClosed")]
    pub fn set_on_closed(&self, on_closed: Function) {
        self.inner.callbacks.borrow_mut().on_closed = Some(on_closed);
    }

    /// セッションを確立する
    ///
    /// # 引数
    /// - `host` / `port`: リレーの先の接続先
    /// - `relay_base`: 解決済みのリレーのベース URL
    ///
    /// # エラー
    /// - URL・ホスト名が不正
    /// - すでに open 済み、または閉じている
    pub fn open(&self, host: &str, port: u16, relay_base: &str) -> Result<(), JsError> {
        let target = Target::new(host, port).map_err(|e| JsError::new(&format!("{}", e)))?;
        let relay =
            RelayBaseUrl::parse(relay_base).map_err(|e| JsError::new(&format!("{}", e)))?;

        self.inner
            .stream
            .borrow_mut()
            .open(target, relay)
            .map_err(|e| JsError::new(&format!("{}", e)))?;
        pump(&self.inner);
        Ok(())
    }

    /// データを送信する（完了通知なし）
    ///
    /// # エラー
    /// - Open 状態でない
    pub fn write(&self, data: &[u8]) -> Result<(), JsError> {
        self.inner
            .stream
            .borrow_mut()
            .write(data)
            .map_err(|e| JsError::new(&format!("{}", e)))?;
        pump(&self.inner);
        Ok(())
    }

    /// ストリームを閉じる
    pub fn close(&self) {
        self.inner.stream.borrow_mut().close();
        pump(&self.inner);
    }

    /// 現在のライフサイクル（`"opening"` / `"open"` / `"closed"`）
    pub fn lifecycle(&self) -> String {
        self.inner.stream.borrow().lifecycle().to_string()
    }

    /// ストリーム統計を JSON 文字列で返す
    ///
    /// # 戻り値
    /// ```json
    /// {
    ///   "lifecycle": "open",
    ///   "read_count": 1536,
    ///   "write_count": 42,
    ///   "queued_chunks": 0,
    ///   "read_backoff_ms": 0,
    ///   "write_backoff_ms": 0,
    ///   "bytes_delivered": 1536,
    ///   "bytes_accepted": 42,
    ///   "retry_notices": 0,
    ///   "close_reason": null
    /// }
    /// ```
    #[wasm_bindgen(js_name = "getStats")]
    pub fn get_stats(&self) -> Result<String, JsError> {
        let stats = self.inner.stream.borrow().stats();
        serde_json::to_string(&stats).map_err(|e| JsError::new(&format!("{}", e)))
    }
}

/// 溜まっている I/O と通知をすべて処理する
///
/// `stream` の借用を解放してから JS を呼ぶ。
/// コールバックの中から `write()` などが呼ばれても二重借用にならない。
fn pump(inner: &Rc<Inner>) {
    loop {
        let (io, events) = {
            let mut stream = inner.stream.borrow_mut();
            (stream.take_io(), stream.listener_mut().drain())
        };
        if io.is_empty() && events.is_empty() {
            break;
        }

        for action in io {
            execute(inner, action);
        }
        for event in events {
            dispatch(inner, event);
        }
    }
}

fn execute(inner: &Rc<Inner>, action: IoAction) {
    match action {
        IoAction::Send(request) => {
            let controller = match fetch::abort_controller() {
                Ok(controller) => Some(controller),
                Err(e) => {
                    tracing::warn!(error = %e, request = %request.id, "request cannot be aborted");
                    None
                }
            };
            let signal = controller.as_ref().map(AbortController::signal);
            if let Some(controller) = controller {
                inner.requests.borrow_mut().insert(request.id, controller);
            }

            let weak = Rc::downgrade(inner);
            wasm_bindgen_futures::spawn_local(async move {
                let outcome = fetch::get(&request.url, signal.as_ref()).await;
                with_inner(&weak, |inner| {
                    inner.requests.borrow_mut().remove(&request.id);
                    inner.stream.borrow_mut().handle_response(request.id, outcome);
                });
            });
        }
        IoAction::StartTimer { timer: id, delay_ms } => {
            let (sleep, handle) = timer::sleep(delay_ms);
            let previous = inner.timers.borrow_mut().insert(id, handle);
            if let Some(previous) = previous {
                timer::cancel(previous);
            }

            let weak = Rc::downgrade(inner);
            wasm_bindgen_futures::spawn_local(async move {
                if !sleep.await {
                    return;
                }
                with_inner(&weak, |inner| {
                    inner.timers.borrow_mut().remove(&id);
                    inner.stream.borrow_mut().handle_timer(id);
                });
            });
        }
        IoAction::CancelTimer(id) => {
            let handle = inner.timers.borrow_mut().remove(&id);
            if let Some(handle) = handle {
                timer::cancel(handle);
            }
        }
        IoAction::Abort(id) => {
            let controller = inner.requests.borrow_mut().remove(&id);
            if let Some(controller) = controller {
                controller.abort();
            }
        }
    }
}

/// `Inner` がまだ生きていれば処理してから溜まった I/O を流す
fn with_inner(weak: &Weak<Inner>, f: impl FnOnce(&Rc<Inner>)) {
    if let Some(inner) = weak.upgrade() {
        f(&inner);
        pump(&inner);
    } else {
        tracing::debug!("relay client dropped, discarding completion");
    }
}

fn dispatch(inner: &Rc<Inner>, event: StreamEvent) {
    if !inner.gate.admit(&event) {
        tracing::debug!(?event, "stream closed, dropping event");
        return;
    }

    // コールバックの中から setOnClosed が呼ばれてもよいよう、呼ぶ前に関数を複製する
    let callbacks = inner.callbacks.borrow();
    let result = match event {
        StreamEvent::Data(data) => {
            let f = callbacks.on_data.clone();
            drop(callbacks);
            f.call1(&JsValue::NULL, &Uint8Array::from(data.as_slice()))
        }
        StreamEvent::Notice {
            message,
            duration_ms,
        } => {
            let f = callbacks.show_overlay.clone();
            drop(callbacks);
            f.call2(
                &JsValue::NULL,
                &JsValue::from_str(&message),
                &JsValue::from_f64(duration_ms as f64),
            )
        }
        StreamEvent::OpenComplete(success) => {
            let f = callbacks.on_open_complete.clone();
            drop(callbacks);
            f.call1(&JsValue::NULL, &JsValue::from_bool(success))
        }
        StreamEvent::Closed(reason) => {
            let f = callbacks.on_closed.clone();
            drop(callbacks);
            match f {
                Some(f) => f.call1(&JsValue::NULL, &JsValue::from_str(reason.as_str())),
                None => Ok(JsValue::UNDEFINED),
            }
        }
    };

    if let Err(e) = result {
        tracing::error!(error = ?e, "relay client callback threw");
    }
}
