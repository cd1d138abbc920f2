//! In-process relay queue for standalone mode.
//!
//! Mirrors the delivery semantics of a hosted queue within a single process:
//! at-least-once, visibility timeout, per-receipt ack, delayed redelivery on
//! nack. Ideal for local development and testing without external
//! dependencies.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use super::{Delivery, QueueError, RelayMessage, RelayQueue, Result};

struct Message {
    body: String,
    receive_count: u32,
    visible_at: Instant,
}

#[derive(Default)]
struct State {
    queued: VecDeque<Message>,
    in_flight: HashMap<String, (Message, Instant)>,
}

impl State {
    /// Move in-flight messages whose visibility timeout lapsed back to the queue.
    fn requeue_expired(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, (_, deadline))| *deadline <= now)
            .map(|(receipt, _)| receipt.clone())
            .collect();
        for receipt in expired {
            if let Some((mut message, _)) = self.in_flight.remove(&receipt) {
                debug!(receipt = %receipt, "Visibility timeout lapsed, requeueing");
                message.visible_at = now;
                self.queued.push_back(message);
            }
        }
    }

    /// Earliest instant at which something may become receivable.
    fn next_wake(&self) -> Option<Instant> {
        let queued = self.queued.iter().map(|m| m.visible_at);
        let in_flight = self.in_flight.values().map(|(_, deadline)| *deadline);
        queued.chain(in_flight).min()
    }
}

/// In-process queue with hosted-queue delivery semantics.
pub struct ChannelQueue {
    state: Mutex<State>,
    notify: Notify,
    visibility_timeout: Duration,
    fail_on_send: RwLock<bool>,
}

impl ChannelQueue {
    /// Create a queue whose received messages stay hidden for `visibility_timeout`.
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(State::default()),
            notify: Notify::new(),
            visibility_timeout,
            fail_on_send: RwLock::new(false),
        }
    }

    /// Make `send` fail.
    pub async fn set_fail_on_send(&self, fail: bool) {
        *self.fail_on_send.write().await = fail;
    }

    /// Messages not yet acknowledged, whether queued or in flight.
    pub async fn depth(&self) -> usize {
        let state = self.state.lock().await;
        state.queued.len() + state.in_flight.len()
    }

    /// Messages currently received and awaiting ack or nack.
    pub async fn in_flight(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }

    fn take_visible(&self, state: &mut State, max: usize, now: Instant) -> Vec<Delivery> {
        let mut deliveries = Vec::new();
        let mut remaining = VecDeque::with_capacity(state.queued.len());

        while let Some(mut message) = state.queued.pop_front() {
            if deliveries.len() < max && message.visible_at <= now {
                message.receive_count += 1;
                let receipt = Uuid::new_v4().to_string();
                deliveries.push(Delivery {
                    receipt: receipt.clone(),
                    body: message.body.clone(),
                    receive_count: message.receive_count,
                });
                state
                    .in_flight
                    .insert(receipt, (message, now + self.visibility_timeout));
            } else {
                remaining.push_back(message);
            }
        }

        state.queued = remaining;
        deliveries
    }
}

impl Default for ChannelQueue {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl RelayQueue for ChannelQueue {
    async fn send(&self, message: &RelayMessage) -> Result<()> {
        if *self.fail_on_send.read().await {
            return Err(QueueError::Send("injected send failure".to_string()));
        }
        let body = message.encode()?;
        self.state.lock().await.queued.push_back(Message {
            body,
            receive_count: 0,
            visible_at: Instant::now(),
        });
        self.notify.notify_waiters();
        Ok(())
    }

    async fn receive(&self, max: usize, wait: Duration) -> Result<Vec<Delivery>> {
        if max == 0 {
            return Ok(Vec::new());
        }
        let deadline = Instant::now() + wait;

        loop {
            // Register before inspecting state so a send in between is not missed.
            let notified = self.notify.notified();

            let wake = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                state.requeue_expired(now);
                let batch = self.take_visible(&mut state, max, now);
                if !batch.is_empty() || now >= deadline {
                    return Ok(batch);
                }
                state
                    .next_wake()
                    .map_or(deadline, |next| next.min(deadline))
            };

            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep_until(wake) => {}
            }
        }
    }

    async fn ack(&self, receipt: &str) -> Result<()> {
        match self.state.lock().await.in_flight.remove(receipt) {
            Some(_) => Ok(()),
            None => Err(QueueError::UnknownReceipt(receipt.to_string())),
        }
    }

    async fn nack(&self, receipt: &str, delay: Duration) -> Result<()> {
        let mut state = self.state.lock().await;
        let (mut message, _) = state
            .in_flight
            .remove(receipt)
            .ok_or_else(|| QueueError::UnknownReceipt(receipt.to_string()))?;
        message.visible_at = Instant::now() + delay;
        state.queued.push_back(message);
        drop(state);
        self.notify.notify_waiters();
        Ok(())
    }
}
