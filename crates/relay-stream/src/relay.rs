//! RelayStream: リレーセッションを DuplexStream として実装する

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use relay_session::{
    Effect, Lifecycle, RelayConfig, RelayStreamClient, StreamError, StreamStats, TimerId,
};
use relay_transport::{HttpOutcome, RelayBaseUrl, RelayRequest, RequestId, Target};
use tracing::debug;

use crate::{DuplexStream, RelayResolver, StreamListener};

/// ホストが実行する I/O
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IoAction {
    /// GET を発行し、結果を [`RelayStream::handle_response`] に渡す
    Send(RelayRequest),
    /// `delay_ms` 後に [`RelayStream::handle_timer`] を呼ぶ
    StartTimer { timer: TimerId, delay_ms: u64 },
    /// タイマーを取り消す
    CancelTimer(TimerId),
    /// 応答待ちのリクエストを中断する
    Abort(RequestId),
}

/// リレー上の双方向バイトストリーム
///
/// 状態機械の副作用のうち、通知は `listener` に即座に渡し、
/// I/O は溜めておいてホストに [`take_io`](Self::take_io) で取り出させる。
pub struct RelayStream<L: StreamListener> {
    client: RelayStreamClient,
    listener: L,
    io: VecDeque<IoAction>,
}

impl<L: StreamListener> RelayStream<L> {
    /// # エラー
    /// - `StreamError::InvalidConfig`: 設定値が不正
    pub fn new(config: RelayConfig, listener: L) -> Result<Self, StreamError> {
        Ok(RelayStream {
            client: RelayStreamClient::new(config)?,
            listener,
            io: VecDeque::new(),
        })
    }

    /// Resolver でリレーを解決してから開く
    ///
    /// # エラー
    /// - `StreamError::RelayUnresolved`: リレーが見つからない
    /// - `StreamError::InvalidState`: すでに開いている
    pub fn open_with<R: RelayResolver>(
        &mut self,
        resolver: &R,
        target: Target,
    ) -> Result<(), StreamError> {
        let destination = alloc::format!("{}", target);
        let relay = resolver
            .resolve_relay_host(&destination)
            .ok_or(StreamError::RelayUnresolved(destination))?;
        self.open(target, relay)
    }

    /// HTTP リクエストの結果を渡す
    pub fn handle_response(&mut self, id: RequestId, outcome: HttpOutcome) {
        let effects = self.client.handle_response(id, outcome);
        self.apply(effects);
    }

    /// タイマーの発火を渡す
    pub fn handle_timer(&mut self, timer: TimerId) {
        let effects = self.client.handle_timer(timer);
        self.apply(effects);
    }

    /// 実行待ちの I/O をすべて取り出す
    pub fn take_io(&mut self) -> Vec<IoAction> {
        self.io.drain(..).collect()
    }

    pub fn has_pending_io(&self) -> bool {
        !self.io.is_empty()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.client.lifecycle()
    }

    pub fn stats(&self) -> StreamStats {
        self.client.stats()
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    pub fn listener_mut(&mut self) -> &mut L {
        &mut self.listener
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Send(request) => self.io.push_back(IoAction::Send(request)),
                Effect::StartTimer { timer, delay_ms } => {
                    self.io.push_back(IoAction::StartTimer { timer, delay_ms })
                }
                Effect::CancelTimer(timer) => {
                    // まだ実行されていない StartTimer があれば相殺する
                    let before = self.io.len();
                    self.io.retain(|action| {
                        !matches!(action, IoAction::StartTimer { timer: t, .. } if *t == timer)
                    });
                    if self.io.len() == before {
                        self.io.push_back(IoAction::CancelTimer(timer));
                    } else {
                        debug!(?timer, "dropped unstarted timer");
                    }
                }
                Effect::Abort(id) => {
                    // まだ発行されていなければ送らないだけでよい
                    let before = self.io.len();
                    self.io
                        .retain(|action| !matches!(action, IoAction::Send(req) if req.id == id));
                    if self.io.len() == before {
                        self.io.push_back(IoAction::Abort(id));
                    } else {
                        debug!(request = %id, "dropped unsent request");
                    }
                }
                Effect::Deliver(data) => self.listener.on_data_available(&data),
                Effect::ShowNotice {
                    message,
                    duration_ms,
                } => self.listener.show_overlay(&message, duration_ms),
                Effect::OpenComplete(success) => self.listener.on_open_complete(success),
                Effect::Closed(reason) => {
                    // 閉じた後に送るべきリクエストはない
                    self.io.retain(|action| !matches!(action, IoAction::Send(_)));
                    self.listener.on_closed(reason);
                }
            }
        }
    }
}

impl<L: StreamListener> DuplexStream for RelayStream<L> {
    fn open(&mut self, target: Target, relay: RelayBaseUrl) -> Result<(), StreamError> {
        let effects = self.client.open(target, relay)?;
        self.apply(effects);
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), StreamError> {
        let effects = self.client.write(data)?;
        self.apply(effects);
        Ok(())
    }

    fn close(&mut self) {
        let effects = self.client.close();
        self.apply(effects);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EventQueue, FixedRelay, StreamEvent};
    use relay_session::CloseReason;

    fn stream() -> RelayStream<EventQueue> {
        RelayStream::new(RelayConfig::default(), EventQueue::new()).unwrap()
    }

    fn first_send(io: &[IoAction]) -> &RelayRequest {
        io.iter()
            .find_map(|a| match a {
                IoAction::Send(req) => Some(req),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn test_open_with_resolver() {
        let mut s = stream();
        let resolver = FixedRelay(RelayBaseUrl::parse("https://relay/").unwrap());
        s.open_with(&resolver, Target::new("host", 22).unwrap()).unwrap();

        let io = s.take_io();
        assert_eq!(first_send(&io).url, "https://relay/proxy?host=host&port=22");
        assert!(!s.has_pending_io());
    }

    #[test]
    fn test_unresolved_relay() {
        struct Nowhere;
        impl RelayResolver for Nowhere {
            fn resolve_relay_host(&self, _: &str) -> Option<RelayBaseUrl> {
                None
            }
        }

        let mut s = stream();
        let result = s.open_with(&Nowhere, Target::new("host", 22).unwrap());
        assert_eq!(
            result,
            Err(StreamError::RelayUnresolved(alloc::string::String::from("host:22")))
        );
    }

    #[test]
    fn test_write_with_ack_unsupported() {
        let mut s = stream();
        assert_eq!(s.write_with_ack(b"x"), Err(StreamError::WriteAckUnsupported));
    }

    #[test]
    fn test_notifications_routed_to_listener() {
        let mut s = stream();
        s.open(Target::new("h", 22).unwrap(), RelayBaseUrl::parse("https://r/").unwrap())
            .unwrap();
        let open_id = first_send(&s.take_io()).id;

        s.handle_response(open_id, HttpOutcome::ok("sid"));
        let read_id = first_send(&s.take_io()).id;
        s.handle_response(read_id, HttpOutcome::ok("aGk"));
        s.handle_response(RequestId(read_id.0 + 1), HttpOutcome::status(410));

        assert_eq!(
            s.listener_mut().drain(),
            [
                StreamEvent::OpenComplete(true),
                StreamEvent::Data(b"hi".to_vec()),
                StreamEvent::Closed(CloseReason::SessionGone),
            ]
        );
    }

    #[test]
    fn test_close_aborts_read_in_flight() {
        let mut s = stream();
        s.open(Target::new("h", 22).unwrap(), RelayBaseUrl::parse("https://r/").unwrap())
            .unwrap();
        let open_id = first_send(&s.take_io()).id;
        s.handle_response(open_id, HttpOutcome::ok("sid"));
        let read_id = first_send(&s.take_io()).id;

        s.close();
        assert_eq!(s.take_io(), [IoAction::Abort(read_id)]);
    }

    #[test]
    fn test_close_drops_unsent_request() {
        let mut s = stream();
        s.open(Target::new("h", 22).unwrap(), RelayBaseUrl::parse("https://r/").unwrap())
            .unwrap();

        // proxy をホストが発行する前に閉じる
        s.close();
        assert!(s.take_io().is_empty(), "未発行のリクエストは中断ではなく破棄");
    }

    #[test]
    fn test_close_drops_unstarted_timer() {
        let mut s = stream();
        s.open(Target::new("h", 22).unwrap(), RelayBaseUrl::parse("https://r/").unwrap())
            .unwrap();
        let open_id = first_send(&s.take_io()).id;
        s.handle_response(open_id, HttpOutcome::ok("sid"));
        let read_id = first_send(&s.take_io()).id;

        // 再試行タイマーを積んだまま、ホストが実行する前に閉じる
        s.handle_response(read_id, HttpOutcome::status(503));
        s.close();

        let io = s.take_io();
        assert!(io.is_empty(), "未実行のタイマーは相殺されるべき: {:?}", io);
        assert_eq!(s.lifecycle(), Lifecycle::Closed);
    }
}
