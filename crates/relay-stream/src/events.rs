//! 通知を溜めておく StreamListener
//!
//! ホストがストリームを借用したまま JS コールバックなどを呼ぶと、
//! コールバックの中から `write()` が呼ばれたときに二重借用になる。
//! 通知をいったん溜め、借用を解放してから取り出して配送する。

use alloc::collections::VecDeque;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use relay_session::CloseReason;

use crate::StreamListener;

/// 溜めておく通知
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Data(Vec<u8>),
    Notice { message: String, duration_ms: u64 },
    OpenComplete(bool),
    Closed(CloseReason),
}

/// 通知キュー
#[derive(Debug, Default)]
pub struct EventQueue {
    events: VecDeque<StreamEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        EventQueue {
            events: VecDeque::new(),
        }
    }

    /// 溜まっている通知をすべて取り出す
    pub fn drain(&mut self) -> Vec<StreamEvent> {
        self.events.drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl StreamListener for EventQueue {
    fn on_data_available(&mut self, data: &[u8]) {
        self.events.push_back(StreamEvent::Data(data.to_vec()));
    }

    fn show_overlay(&mut self, message: &str, duration_ms: u64) {
        self.events.push_back(StreamEvent::Notice {
            message: message.to_string(),
            duration_ms,
        });
    }

    fn on_open_complete(&mut self, success: bool) {
        self.events.push_back(StreamEvent::OpenComplete(success));
    }

    fn on_closed(&mut self, reason: CloseReason) {
        self.events.push_back(StreamEvent::Closed(reason));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_drain_in_order() {
        let mut queue = EventQueue::new();
        queue.on_open_complete(true);
        queue.on_data_available(b"one");
        queue.on_data_available(b"two");

        let events = queue.drain();
        assert_eq!(
            events,
            [
                StreamEvent::OpenComplete(true),
                StreamEvent::Data(b"one".to_vec()),
                StreamEvent::Data(b"two".to_vec()),
            ]
        );
        assert!(queue.is_empty());
    }
}
