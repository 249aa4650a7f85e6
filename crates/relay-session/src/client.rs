//! RelayStreamClient: 1 本のリレーストリームの状態機械
//!
//! セッション確立、read ループ、write キューを束ね、
//! 入力（呼び出し・HTTP 応答・タイマー発火）ごとに副作用のリストを返す。

use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use relay_transport::{
    HttpOutcome, RelayBaseUrl, RelayRequest, RequestId, RequestKind, Target,
};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::backoff::RetryPlan;
use crate::effect::{CloseReason, Effect, TimerId};
use crate::error::StreamError;
use crate::read_loop::{ReadLoop, ReadProgress};
use crate::write_queue::{WriteProgress, WriteQueue};
use crate::{RelayConfig, RequestIds, RETRY_NOTICE_MESSAGE};

/// ストリームのライフサイクル
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Opening,
    Open,
    Closed,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifecycle::Opening => write!(f, "opening"),
            Lifecycle::Open => write!(f, "open"),
            Lifecycle::Closed => write!(f, "closed"),
        }
    }
}

/// 確立済みのセッション
///
/// 確立後は変更しない。ストリームを閉じると破棄される。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub relay: RelayBaseUrl,
    pub session_id: String,
    pub target: Target,
}

/// 確立待ちの proxy リクエスト
#[derive(Debug)]
struct PendingOpen {
    id: RequestId,
    relay: RelayBaseUrl,
    target: Target,
}

/// ストリーム統計情報
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    pub lifecycle: Lifecycle,
    pub read_count: u64,
    pub write_count: u64,
    /// 送信待ちチャンク数（送信中の先頭を含む）
    pub queued_chunks: usize,
    pub read_backoff_ms: u64,
    pub write_backoff_ms: u64,
    /// 上位に渡した総バイト数
    pub bytes_delivered: u64,
    /// write で受け付けた総バイト数
    pub bytes_accepted: u64,
    /// 表示した再試行通知の数
    pub retry_notices: u64,
    pub close_reason: Option<CloseReason>,
}

/// リレーストリームの状態機械
///
/// ## 内部アーキテクチャ
///
/// ```text
/// RelayStreamClient
///   ├── Session     - proxy で得たセッション ID（Open の間だけ存在）
///   ├── ReadLoop    - hanging GET（最大 1 本）+ read 用バックオフ
///   └── WriteQueue  - チャンク列（最大 1 本送信中）+ write 用バックオフ
/// ```
///
/// read と write は独立していて、同時に 1 本ずつ飛んでいてよい。
/// どの入力も、Closed になった後は副作用を生まない。
#[derive(Debug)]
pub struct RelayStreamClient {
    config: RelayConfig,
    lifecycle: Lifecycle,
    pending_open: Option<PendingOpen>,
    session: Option<Session>,
    read: ReadLoop,
    write: WriteQueue,
    ids: RequestIds,
    retry_notices: u64,
    close_reason: Option<CloseReason>,
}

impl RelayStreamClient {
    /// # エラー
    /// - `StreamError::InvalidConfig`: 設定値が不正
    pub fn new(config: RelayConfig) -> Result<Self, StreamError> {
        config.validate()?;
        Ok(RelayStreamClient {
            config,
            lifecycle: Lifecycle::Opening,
            pending_open: None,
            session: None,
            read: ReadLoop::new(&config),
            write: WriteQueue::new(&config),
            ids: RequestIds::new(),
            retry_notices: 0,
            close_reason: None,
        })
    }

    /// セッション確立リクエストを発行する
    ///
    /// 結果は `Effect::OpenComplete` で通知される。
    ///
    /// # エラー
    /// - `StreamError::InvalidState`: Opening 以外、または確立中
    pub fn open(&mut self, target: Target, relay: RelayBaseUrl) -> Result<Vec<Effect>, StreamError> {
        if self.lifecycle != Lifecycle::Opening || self.pending_open.is_some() {
            return Err(StreamError::InvalidState {
                operation: "open",
                state: self.lifecycle,
            });
        }

        let id = self.ids.allocate();
        let url = relay.proxy_url(&target);
        info!(target_addr = %target, relay = %relay, request = %id, "opening relay session");

        self.pending_open = Some(PendingOpen { id, relay, target });
        Ok(vec![Effect::Send(RelayRequest {
            id,
            kind: RequestKind::Proxy,
            url,
        })])
    }

    /// 送信データを積む
    ///
    /// 完了通知はない。順序と最終的な到達だけを保証する。
    ///
    /// # エラー
    /// - `StreamError::InvalidState`: Open 以外
    pub fn write(&mut self, data: &[u8]) -> Result<Vec<Effect>, StreamError> {
        if self.lifecycle != Lifecycle::Open {
            return Err(StreamError::InvalidState {
                operation: "write",
                state: self.lifecycle,
            });
        }

        let mut effects = Vec::new();
        if self.write.enqueue(data) {
            self.drain_writes(&mut effects);
        }
        Ok(effects)
    }

    /// ストリームを閉じる
    ///
    /// どの状態からでも Closed に遷移する。保留中の再試行タイマーは取り消す。
    /// 既に Closed なら何もしない。
    pub fn close(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        self.shutdown(CloseReason::Requested, &mut effects);
        effects
    }

    /// HTTP リクエストの結果を処理する
    ///
    /// どのパイプラインも待っていない ID（古い応答、閉じた後の応答）は捨てる。
    pub fn handle_response(&mut self, id: RequestId, outcome: HttpOutcome) -> Vec<Effect> {
        let mut effects = Vec::new();

        if self.lifecycle == Lifecycle::Closed {
            debug!(request = %id, "ignoring response on closed stream");
        } else if self.pending_open.as_ref().is_some_and(|p| p.id == id) {
            self.complete_open(outcome, &mut effects);
        } else if self.read.owns(id) {
            self.complete_read(outcome, &mut effects);
        } else if self.write.owns(id) {
            self.complete_write(outcome, &mut effects);
        } else {
            debug!(request = %id, "ignoring stale response");
        }

        effects
    }

    /// 再試行タイマーの発火を処理する
    pub fn handle_timer(&mut self, timer: TimerId) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.lifecycle != Lifecycle::Open {
            debug!(?timer, lifecycle = %self.lifecycle, "ignoring timer");
            return effects;
        }

        match timer {
            TimerId::ReadRetry => {
                if self.read.retry_fired() {
                    self.issue_read(&mut effects);
                }
            }
            TimerId::WriteRetry => {
                if self.write.retry_fired() {
                    self.drain_writes(&mut effects);
                }
            }
        }
        effects
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason
    }

    pub fn stats(&self) -> StreamStats {
        StreamStats {
            lifecycle: self.lifecycle,
            read_count: self.read.read_count(),
            write_count: self.write.write_count(),
            queued_chunks: self.write.len(),
            read_backoff_ms: self.read.backoff_ms(),
            write_backoff_ms: self.write.backoff_ms(),
            bytes_delivered: self.read.bytes_delivered(),
            bytes_accepted: self.write.bytes_accepted(),
            retry_notices: self.retry_notices,
            close_reason: self.close_reason,
        }
    }

    // ===== Private メソッド =====

    fn complete_open(&mut self, outcome: HttpOutcome, effects: &mut Vec<Effect>) {
        let Some(pending) = self.pending_open.take() else {
            return;
        };

        let session_id = match outcome {
            HttpOutcome::Response { status: 200, body } if !body.trim().is_empty() => {
                body.trim().to_string()
            }
            HttpOutcome::Response { status, .. } => {
                warn!(status, target_addr = %pending.target, "relay refused session");
                effects.push(Effect::OpenComplete(false));
                self.shutdown(CloseReason::OpenFailed, effects);
                return;
            }
            HttpOutcome::Failed(reason) => {
                warn!(%reason, target_addr = %pending.target, "session request failed");
                effects.push(Effect::OpenComplete(false));
                self.shutdown(CloseReason::OpenFailed, effects);
                return;
            }
        };

        info!(target_addr = %pending.target, "relay session established");
        self.session = Some(Session {
            relay: pending.relay,
            session_id,
            target: pending.target,
        });
        self.lifecycle = Lifecycle::Open;
        effects.push(Effect::OpenComplete(true));
        self.issue_read(effects);
    }

    fn complete_read(&mut self, outcome: HttpOutcome, effects: &mut Vec<Effect>) {
        match self.read.complete(outcome.classify()) {
            ReadProgress::Data(data) => {
                if !data.is_empty() {
                    effects.push(Effect::Deliver(data));
                }
                self.issue_read(effects);
            }
            ReadProgress::SessionGone => {
                info!("relay reported session gone on read");
                self.shutdown(CloseReason::SessionGone, effects);
            }
            ReadProgress::Malformed(e) => {
                error!(error = %e, "malformed data from relay");
                self.shutdown(CloseReason::MalformedData, effects);
            }
            ReadProgress::Retry(plan) => {
                self.schedule_retry(TimerId::ReadRetry, plan, effects);
            }
        }
    }

    fn complete_write(&mut self, outcome: HttpOutcome, effects: &mut Vec<Effect>) {
        match self.write.complete(outcome.classify()) {
            WriteProgress::Acked => self.drain_writes(effects),
            WriteProgress::SessionGone => {
                info!("relay reported session gone on write");
                self.shutdown(CloseReason::SessionGone, effects);
            }
            WriteProgress::Retry(plan) => {
                self.schedule_retry(TimerId::WriteRetry, plan, effects);
            }
        }
    }

    fn issue_read(&mut self, effects: &mut Vec<Effect>) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        if let Some(attempt) = self.read.issue(&mut self.ids) {
            debug!(request = %attempt.id, rcnt = attempt.read_count, "issuing read");
            effects.push(Effect::Send(RelayRequest {
                id: attempt.id,
                kind: RequestKind::Read,
                url: session
                    .relay
                    .read_url(&session.session_id, attempt.read_count),
            }));
        }
    }

    fn drain_writes(&mut self, effects: &mut Vec<Effect>) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        if let Some(attempt) = self.write.drain(&mut self.ids) {
            debug!(
                request = %attempt.id,
                wcnt = attempt.write_count,
                len = attempt.payload.len(),
                "issuing write"
            );
            effects.push(Effect::Send(RelayRequest {
                id: attempt.id,
                kind: RequestKind::Write,
                url: session.relay.write_url(
                    &session.session_id,
                    attempt.write_count,
                    &attempt.payload,
                ),
            }));
        }
    }

    fn schedule_retry(&mut self, timer: TimerId, plan: RetryPlan, effects: &mut Vec<Effect>) {
        warn!(?timer, delay_ms = plan.delay_ms, "relay request failed, backing off");
        if let Some(duration_ms) = plan.notice_duration_ms {
            self.retry_notices += 1;
            effects.push(Effect::ShowNotice {
                message: RETRY_NOTICE_MESSAGE.to_string(),
                duration_ms,
            });
        }
        effects.push(Effect::StartTimer {
            timer,
            delay_ms: plan.delay_ms,
        });
    }

    fn shutdown(&mut self, reason: CloseReason, effects: &mut Vec<Effect>) {
        if self.lifecycle == Lifecycle::Closed {
            return;
        }

        if self.read.retry_pending() {
            effects.push(Effect::CancelTimer(TimerId::ReadRetry));
        }
        if self.write.retry_pending() {
            effects.push(Effect::CancelTimer(TimerId::WriteRetry));
        }

        // 閉じた後は通信しない。hanging GET も張りっぱなしにしない
        let outstanding = [
            self.pending_open.as_ref().map(|p| p.id),
            self.read.in_flight(),
            self.write.in_flight(),
        ];
        for id in outstanding.into_iter().flatten() {
            debug!(request = %id, "aborting outstanding request");
            effects.push(Effect::Abort(id));
        }

        self.write.discard();
        self.pending_open = None;
        self.session = None;
        self.lifecycle = Lifecycle::Closed;
        self.close_reason = Some(reason);

        info!(%reason, "relay stream closed");
        effects.push(Effect::Closed(reason));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RELAY: &str = "https://relay.example/";

    fn open_client() -> RelayStreamClient {
        let mut client = RelayStreamClient::new(RelayConfig::default()).unwrap();
        let effects = client
            .open(Target::new("ssh.example", 22).unwrap(), RelayBaseUrl::parse(RELAY).unwrap())
            .unwrap();
        let id = sent(&effects)[0].id;
        let _ = client.handle_response(id, HttpOutcome::ok("sid42"));
        client
    }

    fn sent(effects: &[Effect]) -> Vec<&RelayRequest> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Send(req) => Some(req),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_open_sends_proxy_request() {
        let mut client = RelayStreamClient::new(RelayConfig::default()).unwrap();
        let effects = client
            .open(Target::new("ssh.example", 2222).unwrap(), RelayBaseUrl::parse(RELAY).unwrap())
            .unwrap();

        let requests = sent(&effects);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].kind, RequestKind::Proxy);
        assert_eq!(requests[0].url, "https://relay.example/proxy?host=ssh.example&port=2222");
        assert_eq!(client.lifecycle(), Lifecycle::Opening);
    }

    #[test]
    fn test_open_success_starts_read_loop() {
        let mut client = RelayStreamClient::new(RelayConfig::default()).unwrap();
        let effects = client
            .open(Target::new("h", 22).unwrap(), RelayBaseUrl::parse(RELAY).unwrap())
            .unwrap();
        let id = sent(&effects)[0].id;

        let effects = client.handle_response(id, HttpOutcome::ok("sid42\n"));
        assert_eq!(effects[0], Effect::OpenComplete(true));
        let reads = sent(&effects);
        assert_eq!(reads.len(), 1);
        assert_eq!(reads[0].url, "https://relay.example/read?sid=sid42&rcnt=0");
        assert_eq!(client.lifecycle(), Lifecycle::Open);
        assert_eq!(client.session().unwrap().session_id, "sid42");
    }

    #[test]
    fn test_open_failure_closes() {
        let mut client = RelayStreamClient::new(RelayConfig::default()).unwrap();
        let effects = client
            .open(Target::new("h", 22).unwrap(), RelayBaseUrl::parse(RELAY).unwrap())
            .unwrap();
        let id = sent(&effects)[0].id;

        let effects = client.handle_response(id, HttpOutcome::status(403));
        assert_eq!(
            effects,
            vec![Effect::OpenComplete(false), Effect::Closed(CloseReason::OpenFailed)]
        );
        assert_eq!(client.lifecycle(), Lifecycle::Closed);
    }

    #[test]
    fn test_open_with_empty_session_id_fails() {
        let mut client = RelayStreamClient::new(RelayConfig::default()).unwrap();
        let effects = client
            .open(Target::new("h", 22).unwrap(), RelayBaseUrl::parse(RELAY).unwrap())
            .unwrap();
        let id = sent(&effects)[0].id;
        let effects = client.handle_response(id, HttpOutcome::ok(""));
        assert_eq!(effects[0], Effect::OpenComplete(false));
    }

    #[test]
    fn test_open_twice_rejected() {
        let mut client = RelayStreamClient::new(RelayConfig::default()).unwrap();
        let target = Target::new("h", 22).unwrap();
        let relay = RelayBaseUrl::parse(RELAY).unwrap();
        client.open(target.clone(), relay.clone()).unwrap();
        assert!(matches!(
            client.open(target, relay),
            Err(StreamError::InvalidState { operation: "open", .. })
        ));
    }

    #[test]
    fn test_write_before_open_rejected() {
        let mut client = RelayStreamClient::new(RelayConfig::default()).unwrap();
        assert_eq!(
            client.write(b"x"),
            Err(StreamError::InvalidState {
                operation: "write",
                state: Lifecycle::Opening
            })
        );
        assert_eq!(client.lifecycle(), Lifecycle::Opening, "誤用で状態は変わらない");
    }

    #[test]
    fn test_write_sends_immediately_when_idle() {
        let mut client = open_client();
        let effects = client.write(b"hi").unwrap();
        let writes = sent(&effects);
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].url, "https://relay.example/write?sid=sid42&wcnt=0&data=aGk");

        // 送信中の追加は即座には送らない
        let effects = client.write(b"more").unwrap();
        assert!(effects.is_empty());
    }

    #[test]
    fn test_read_delivers_and_reissues() {
        let mut client = open_client();
        // open_client の read は ID 2
        let effects = client.handle_response(RequestId(2), HttpOutcome::ok("aGVsbG8"));
        assert_eq!(effects[0], Effect::Deliver(b"hello".to_vec()));
        let reads = sent(&effects);
        assert_eq!(reads[0].url, "https://relay.example/read?sid=sid42&rcnt=5");
    }

    #[test]
    fn test_malformed_read_closes() {
        let mut client = open_client();
        let effects = client.handle_response(RequestId(2), HttpOutcome::ok("abcde"));
        assert_eq!(effects, vec![Effect::Closed(CloseReason::MalformedData)]);
        assert!(client.write(b"x").is_err());
    }

    #[test]
    fn test_stale_response_ignored() {
        let mut client = open_client();
        let effects = client.handle_response(RequestId(99), HttpOutcome::ok("aGk"));
        assert!(effects.is_empty());
        assert_eq!(client.stats().read_count, 0);
    }

    #[test]
    fn test_close_cancels_pending_timers() {
        let mut client = open_client();
        let effects = client.handle_response(RequestId(2), HttpOutcome::status(500));
        assert_eq!(
            effects,
            vec![Effect::StartTimer {
                timer: TimerId::ReadRetry,
                delay_ms: 1
            }]
        );

        let effects = client.close();
        assert_eq!(
            effects,
            vec![
                Effect::CancelTimer(TimerId::ReadRetry),
                Effect::Closed(CloseReason::Requested)
            ]
        );

        // 取り消しが間に合わずに発火しても何も送らない
        assert!(client.handle_timer(TimerId::ReadRetry).is_empty());
        assert!(client.close().is_empty(), "2 回目の close は何もしない");
    }

    #[test]
    fn test_close_aborts_outstanding_requests() {
        let mut client = open_client();
        let effects = client.write(b"hi").unwrap();
        let write_id = sent(&effects)[0].id;

        let effects = client.close();
        assert_eq!(
            effects,
            vec![
                Effect::Abort(RequestId(2)),
                Effect::Abort(write_id),
                Effect::Closed(CloseReason::Requested)
            ]
        );
    }

    #[test]
    fn test_close_while_opening_aborts_proxy() {
        let mut client = RelayStreamClient::new(RelayConfig::default()).unwrap();
        let effects = client
            .open(Target::new("h", 22).unwrap(), RelayBaseUrl::parse(RELAY).unwrap())
            .unwrap();
        let proxy_id = sent(&effects)[0].id;

        assert_eq!(
            client.close(),
            vec![Effect::Abort(proxy_id), Effect::Closed(CloseReason::Requested)]
        );
    }

    #[test]
    fn test_session_gone_on_write_aborts_read() {
        let mut client = open_client();
        let effects = client.write(b"hi").unwrap();
        let write_id = sent(&effects)[0].id;

        let effects = client.handle_response(write_id, HttpOutcome::status(410));
        assert_eq!(
            effects,
            vec![
                Effect::Abort(RequestId(2)),
                Effect::Closed(CloseReason::SessionGone)
            ]
        );
    }

    #[test]
    fn test_stats_serialize() {
        let client = open_client();
        let json = serde_json::to_string(&client.stats()).unwrap();
        assert!(json.contains(r#""lifecycle":"open""#));
        assert!(json.contains(r#""close_reason":null"#));
    }
}
