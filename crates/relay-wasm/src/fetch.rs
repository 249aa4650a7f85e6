//! `fetch()` による GET
//!
//! `Window` と `WorkerGlobalScope` のどちらでも動く。
//! 認証は Cookie など、ブラウザが持っている資格情報にまかせる（`credentials: include`）。
//! ストリームを閉じたときに hanging GET を切れるよう、リクエストごとに `AbortController` を付ける。

use relay_transport::HttpOutcome;
use thiserror::Error;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{AbortController, AbortSignal};

/// fetch のエラー（通信エラー・中断を含む）
#[derive(Debug, Error)]
#[error("{0}")]
pub struct FetchError(String);

/// リクエストを中断するための `AbortController` を作る
///
/// # エラー
/// - `AbortController` がない環境
pub fn abort_controller() -> Result<AbortController, FetchError> {
    AbortController::new().map_err(|e| FetchError(format!("AbortController::new failed: {e:?}")))
}

/// GET を発行して結果を `HttpOutcome` にする
///
/// 応答が得られなかった場合（`signal` による中断を含む）は `HttpOutcome::Failed`。
/// ステータスの解釈は状態機械にまかせる。
pub async fn get(url: &str, signal: Option<&AbortSignal>) -> HttpOutcome {
    match try_get(url, signal).await {
        Ok((status, body)) => HttpOutcome::Response { status, body },
        Err(e) => HttpOutcome::Failed(e.to_string()),
    }
}

async fn try_get(url: &str, signal: Option<&AbortSignal>) -> Result<(u16, String), FetchError> {
    let opts = web_sys::RequestInit::new();
    opts.set_method("GET");
    opts.set_mode(web_sys::RequestMode::Cors);
    opts.set_credentials(web_sys::RequestCredentials::Include);
    opts.set_signal(signal);

    let request = web_sys::Request::new_with_str_and_init(url, &opts)
        .map_err(|e| FetchError(format!("Request::new failed: {e:?}")))?;

    let promise =
        fetch_global(&request).map_err(|e| FetchError(format!("fetch failed: {e:?}")))?;

    let resp_value = JsFuture::from(promise)
        .await
        .map_err(|e| FetchError(format!("fetch rejected: {e:?}")))?;

    let resp: web_sys::Response = resp_value
        .dyn_into()
        .map_err(|_| FetchError("response is not a Response".into()))?;

    let status = resp.status();

    let text_promise = resp
        .text()
        .map_err(|e| FetchError(format!("text() failed: {e:?}")))?;
    let text = JsFuture::from(text_promise)
        .await
        .map_err(|e| FetchError(format!("body read failed: {e:?}")))?;

    Ok((status, text.as_string().unwrap_or_default()))
}

/// 適切なグローバルスコープ（`Window` または `WorkerGlobalScope`）の `fetch()` を呼ぶ
fn fetch_global(request: &web_sys::Request) -> Result<js_sys::Promise, JsValue> {
    let global: js_sys::Object = js_sys::global().unchecked_into();

    if let Ok(window) = global.clone().dyn_into::<web_sys::Window>() {
        return Ok(window.fetch_with_request(request));
    }

    if let Ok(worker) = global.dyn_into::<web_sys::WorkerGlobalScope>() {
        return Ok(worker.fetch_with_request(request));
    }

    Err(JsValue::from_str(
        "no global fetch available (not Window or WorkerGlobalScope)",
    ))
}
