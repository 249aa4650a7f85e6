//! 双方向バイトストリームのインターフェース

use relay_session::{CloseReason, StreamError};
use relay_transport::{RelayBaseUrl, Target};

/// 双方向バイトストリーム
///
/// ストリーム管理側はこの trait だけに依存する。
pub trait DuplexStream {
    /// 接続先へのストリームを開く
    ///
    /// 結果は [`StreamListener::on_open_complete`] で非同期に通知される。
    fn open(&mut self, target: Target, relay: RelayBaseUrl) -> Result<(), StreamError>;

    /// データを送る（完了通知なし）
    fn write(&mut self, data: &[u8]) -> Result<(), StreamError>;

    /// 完了通知付きで送る
    ///
    /// 既定では未対応。対応する実装だけが上書きする。
    fn write_with_ack(&mut self, _data: &[u8]) -> Result<(), StreamError> {
        Err(StreamError::WriteAckUnsupported)
    }

    /// ストリームを閉じる
    fn close(&mut self);
}

/// ストリームからの通知を受け取る側
pub trait StreamListener {
    /// デコード済みの受信データ
    fn on_data_available(&mut self, data: &[u8]);

    /// 再試行中の通知を `duration_ms` の間表示する
    fn show_overlay(&mut self, message: &str, duration_ms: u64);

    /// セッション確立の結果（1 回だけ呼ばれる）
    fn on_open_complete(&mut self, success: bool);

    /// ストリームが閉じた
    fn on_closed(&mut self, _reason: CloseReason) {}
}
