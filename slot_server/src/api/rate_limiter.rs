//! Per-connection message budget for the realtime socket.
//!
//! Each connection gets a burst window and a sustained window. A message that
//! exceeds either is answered with a `RATE_LIMITED` error instead of reaching
//! the session engine.

use async_trait::async_trait;
use slot_core::hub::{ClientContext, ClientMessage, HubEvent, MessageDispatcher};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::{logging::log_security_event, metrics};

/// Sliding window counter
#[derive(Debug)]
pub struct SlidingWindow {
    timestamps: VecDeque<Instant>,
    max_requests: usize,
    window: Duration,
}

impl SlidingWindow {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: VecDeque::with_capacity(max_requests),
            max_requests,
            window,
        }
    }

    /// Record a request at `now` if it fits in the window
    pub fn check_at(&mut self, now: Instant) -> bool {
        while let Some(ts) = self.timestamps.front() {
            if now.duration_since(*ts) > self.window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }

        if self.timestamps.len() >= self.max_requests {
            return false;
        }
        self.timestamps.push_back(now);
        true
    }

    pub fn remaining(&self) -> usize {
        self.max_requests.saturating_sub(self.timestamps.len())
    }
}

/// Which window rejected a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitHit {
    Burst,
    Sustained,
}

/// Burst plus sustained limits for one connection
#[derive(Debug)]
pub struct MessageBudget {
    burst: SlidingWindow,
    sustained: SlidingWindow,
}

impl Default for MessageBudget {
    /// 10 messages per second, 100 per minute
    fn default() -> Self {
        Self::new(
            SlidingWindow::new(10, Duration::from_secs(1)),
            SlidingWindow::new(100, Duration::from_secs(60)),
        )
    }
}

impl MessageBudget {
    pub fn new(burst: SlidingWindow, sustained: SlidingWindow) -> Self {
        Self { burst, sustained }
    }

    pub fn check(&mut self) -> Result<(), LimitHit> {
        let now = Instant::now();
        if !self.burst.check_at(now) {
            return Err(LimitHit::Burst);
        }
        if !self.sustained.check_at(now) {
            return Err(LimitHit::Sustained);
        }
        Ok(())
    }
}

/// Dispatcher wrapper enforcing a [`MessageBudget`]
pub struct RateLimitedDispatcher<D: ?Sized> {
    budget: Mutex<MessageBudget>,
    inner: Arc<D>,
}

impl<D: MessageDispatcher + ?Sized> RateLimitedDispatcher<D> {
    pub fn new(inner: Arc<D>, budget: MessageBudget) -> Self {
        Self {
            budget: Mutex::new(budget),
            inner,
        }
    }
}

#[async_trait]
impl<D: MessageDispatcher + ?Sized> MessageDispatcher for RateLimitedDispatcher<D> {
    async fn dispatch(&self, ctx: &ClientContext, message: ClientMessage) -> Option<HubEvent> {
        metrics::websocket_messages_received();

        let verdict = self.budget.lock().await.check();
        match verdict {
            Ok(()) => self.inner.dispatch(ctx, message).await,
            Err(hit) => {
                metrics::rate_limit_hits_total("websocket");
                log_security_event(
                    "ws_rate_limited",
                    Some(ctx.user_id),
                    None,
                    &format!("{hit:?} limit exceeded by client {}", ctx.client_id),
                );
                let message = match hit {
                    LimitHit::Burst => "Rate limit exceeded. Please slow down.",
                    LimitHit::Sustained => "Too many messages. Please wait before sending more.",
                };
                Some(HubEvent::error("RATE_LIMITED", message))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slot_core::hub::{DEFAULT_CLIENT_QUEUE, HubActor};
    use uuid::Uuid;

    #[test]
    fn test_window_blocks_over_limit_and_recovers() {
        let mut window = SlidingWindow::new(2, Duration::from_millis(100));
        let start = Instant::now();

        assert!(window.check_at(start));
        assert!(window.check_at(start));
        assert!(!window.check_at(start));
        assert_eq!(window.remaining(), 0);

        let later = start + Duration::from_millis(150);
        assert!(window.check_at(later));
        assert_eq!(window.remaining(), 1);
    }

    #[test]
    fn test_budget_reports_which_limit() {
        let mut budget = MessageBudget::new(
            SlidingWindow::new(3, Duration::from_secs(1)),
            SlidingWindow::new(100, Duration::from_secs(60)),
        );
        for _ in 0..3 {
            assert!(budget.check().is_ok());
        }
        assert_eq!(budget.check(), Err(LimitHit::Burst));

        let mut budget = MessageBudget::new(
            SlidingWindow::new(100, Duration::from_secs(1)),
            SlidingWindow::new(2, Duration::from_secs(60)),
        );
        budget.check().unwrap();
        budget.check().unwrap();
        assert_eq!(budget.check(), Err(LimitHit::Sustained));
    }

    struct Echo;

    #[async_trait]
    impl MessageDispatcher for Echo {
        async fn dispatch(&self, _ctx: &ClientContext, _message: ClientMessage) -> Option<HubEvent> {
            Some(HubEvent::Pong)
        }
    }

    #[tokio::test]
    async fn test_limited_dispatcher_answers_with_error() {
        let dispatcher = RateLimitedDispatcher::new(
            Arc::new(Echo),
            MessageBudget::new(
                SlidingWindow::new(1, Duration::from_secs(60)),
                SlidingWindow::new(100, Duration::from_secs(60)),
            ),
        );
        let (_signal, disconnected) = tokio::sync::watch::channel(());
        let ctx = ClientContext {
            client_id: Uuid::new_v4(),
            user_id: 1,
            hub: HubActor::spawn(DEFAULT_CLIENT_QUEUE),
            disconnected,
        };

        assert_eq!(
            dispatcher.dispatch(&ctx, ClientMessage::Ping).await,
            Some(HubEvent::Pong)
        );
        match dispatcher.dispatch(&ctx, ClientMessage::Ping).await {
            Some(HubEvent::Error { code, .. }) => assert_eq!(code, "RATE_LIMITED"),
            other => panic!("unexpected reply {other:?}"),
        }
    }
}
