//! `setTimeout` / `clearTimeout` による再試行タイマー
//!
//! `Window` と `WorkerGlobalScope` のどちらでも動くよう、グローバルから直接引く。
//! 取り消したタイマーの future も `false` で完了させ、待っているタスクを終わらせる。

use std::future::Future;

use js_sys::{Function, Promise, Reflect};
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;

/// 取り消し用のハンドル
#[derive(Debug)]
pub struct TimeoutHandle {
    id: JsValue,
    resolve: Option<Function>,
}

/// `ms` ミリ秒後に完了する future と、取り消し用ハンドルを作る
///
/// # 戻り値
/// future は発火したら `true`、[`cancel`] されたら `false` で完了する。
pub fn sleep(ms: u64) -> (impl Future<Output = bool>, TimeoutHandle) {
    let ms: i32 = ms.try_into().unwrap_or(i32::MAX);
    let mut out_id = JsValue::UNDEFINED;
    let mut out_resolve = None;

    let promise = Promise::new(&mut |resolve, _reject| {
        let global = js_sys::global();

        let set_timeout = match Reflect::get(&global, &JsValue::from_str("setTimeout"))
            .and_then(JsCast::dyn_into::<Function>)
        {
            Ok(f) => f,
            Err(_) => {
                // setTimeout がない環境では即座に完了させる
                drop(resolve.call1(&JsValue::NULL, &JsValue::TRUE));
                return;
            }
        };

        // setTimeout(resolve, ms, true)
        out_id = set_timeout
            .call3(&global, resolve.as_ref(), &JsValue::from(ms), &JsValue::TRUE)
            .unwrap_or(JsValue::UNDEFINED);
        out_resolve = Some(resolve);
    });

    let fut = async move {
        JsFuture::from(promise)
            .await
            .ok()
            .and_then(|fired| fired.as_bool())
            .unwrap_or(false)
    };

    (
        fut,
        TimeoutHandle {
            id: out_id,
            resolve: out_resolve,
        },
    )
}

/// 発火前のタイマーを取り消し、待っている future を `false` で完了させる
///
/// すでに発火していた場合は何も起きない。
pub fn cancel(handle: TimeoutHandle) {
    let global = js_sys::global();
    if let Ok(clear_timeout) = Reflect::get(&global, &JsValue::from_str("clearTimeout"))
        .and_then(JsCast::dyn_into::<Function>)
    {
        drop(clear_timeout.call1(&global, &handle.id));
    }
    if let Some(resolve) = handle.resolve {
        drop(resolve.call1(&JsValue::NULL, &JsValue::FALSE));
    }
}
