//! Concurrent fanout of one message to every configured channel.
//!
//! Each channel runs as its own task with independent retry, backoff and
//! timeout handling; a failure on one channel never blocks or cancels
//! another. The dispatcher waits for every channel, exhausted retries
//! included, before aggregating into a single [`DispatchResult`]. It is
//! stateless across calls: idempotency-key tracking belongs to the job
//! runner.

use std::collections::BTreeMap;
use std::time::Duration;

use finpush_common::types::{ChannelConfig, ChannelType, NotificationMessage};
use futures::future::join_all;
use tokio::time::Instant;

use crate::channels::build_adapter;
use crate::error::NotifyError;
use crate::{ChannelAdapter, SendReceipt};

/// Retry policy applied independently to every channel.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt` (1-based): doubles each
    /// time, capped at `max_backoff`.
    fn backoff_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

#[derive(Debug, Clone)]
pub struct DispatchOptions {
    pub retry: RetryPolicy,
    /// Upper bound for one network call; exceeding it is a retryable failure.
    pub attempt_timeout: Duration,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

/// Outcome of a single attempt; the last attempt's outcome is the channel's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    RetryableFailure,
    FatalFailure,
}

#[derive(Debug, Clone)]
pub struct DispatchAttempt {
    /// 1-based attempt number.
    pub attempt: u32,
    pub outcome: AttemptOutcome,
    pub http_status: Option<u16>,
    pub error_detail: Option<String>,
}

/// Final outcome and full attempt history for one channel.
#[derive(Debug, Clone)]
pub struct ChannelReport {
    pub channel_id: String,
    pub channel_type: ChannelType,
    pub outcome: AttemptOutcome,
    pub attempts: Vec<DispatchAttempt>,
}

impl ChannelReport {
    pub fn succeeded(&self) -> bool {
        self.outcome == AttemptOutcome::Success
    }
}

/// Aggregate outcome across all channels.
///
/// `NoChannels` is deliberately distinct from `AllSucceeded`: dispatching
/// with zero enabled channels almost always means a configuration gap, and a
/// vacuous success would hide it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overall {
    AllSucceeded,
    PartialFailure,
    AllFailed,
    NoChannels,
}

#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub overall: Overall,
    /// Per-channel reports, keyed by channel id.
    pub channels: BTreeMap<String, ChannelReport>,
}

impl DispatchResult {
    pub fn succeeded_count(&self) -> usize {
        self.channels.values().filter(|c| c.succeeded()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.channels.len() - self.succeeded_count()
    }
}

enum ChannelSlot {
    Ready(Box<dyn ChannelAdapter>),
    /// The adapter could not be built. Recorded as a fatal configuration
    /// failure at dispatch time so the remaining channels proceed.
    Invalid {
        id: String,
        channel_type: ChannelType,
        reason: String,
    },
}

pub struct Dispatcher {
    slots: Vec<ChannelSlot>,
    options: DispatchOptions,
}

impl Dispatcher {
    /// Build adapters for every enabled channel. Disabled configs are dropped
    /// here and never dispatched to.
    pub fn from_configs(configs: &[ChannelConfig], options: DispatchOptions) -> Self {
        let slots = configs
            .iter()
            .filter(|config| config.enabled)
            .map(|config| match build_adapter(config) {
                Ok(adapter) => ChannelSlot::Ready(adapter),
                Err(e) => {
                    tracing::warn!(channel = %config.id, error = %e, "channel configuration rejected");
                    ChannelSlot::Invalid {
                        id: config.id.clone(),
                        channel_type: config.channel_type,
                        reason: e.to_string(),
                    }
                }
            })
            .collect();
        Self { slots, options }
    }

    /// Dispatcher over pre-built adapters.
    pub fn from_adapters(adapters: Vec<Box<dyn ChannelAdapter>>, options: DispatchOptions) -> Self {
        Self {
            slots: adapters.into_iter().map(ChannelSlot::Ready).collect(),
            options,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.slots.len()
    }

    /// Send `message` to every channel concurrently and wait for all of them.
    ///
    /// `deadline`, when given, bounds the whole invocation: per-attempt
    /// timeouts and backoff sleeps are clamped to the remaining budget, and a
    /// channel whose budget ran out records a retryable deadline failure.
    pub async fn dispatch(
        &self,
        message: &NotificationMessage,
        deadline: Option<Instant>,
    ) -> DispatchResult {
        let reports = join_all(
            self.slots
                .iter()
                .map(|slot| self.run_channel(slot, message, deadline)),
        )
        .await;

        let channels: BTreeMap<String, ChannelReport> = reports
            .into_iter()
            .map(|report| (report.channel_id.clone(), report))
            .collect();

        let overall = if channels.is_empty() {
            Overall::NoChannels
        } else {
            let succeeded = channels.values().filter(|c| c.succeeded()).count();
            if succeeded == channels.len() {
                Overall::AllSucceeded
            } else if succeeded == 0 {
                Overall::AllFailed
            } else {
                Overall::PartialFailure
            }
        };

        DispatchResult { overall, channels }
    }

    async fn run_channel(
        &self,
        slot: &ChannelSlot,
        message: &NotificationMessage,
        deadline: Option<Instant>,
    ) -> ChannelReport {
        let adapter = match slot {
            ChannelSlot::Ready(adapter) => adapter,
            ChannelSlot::Invalid {
                id,
                channel_type,
                reason,
            } => {
                return ChannelReport {
                    channel_id: id.clone(),
                    channel_type: *channel_type,
                    outcome: AttemptOutcome::FatalFailure,
                    attempts: vec![DispatchAttempt {
                        attempt: 1,
                        outcome: AttemptOutcome::FatalFailure,
                        http_status: None,
                        error_detail: Some(reason.clone()),
                    }],
                };
            }
        };

        let policy = &self.options.retry;
        let mut attempts = Vec::new();

        for attempt in 1..=policy.max_attempts {
            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            if remaining == Some(Duration::ZERO) {
                attempts.push(DispatchAttempt {
                    attempt,
                    outcome: AttemptOutcome::RetryableFailure,
                    http_status: None,
                    error_detail: Some(NotifyError::DeadlineExceeded.to_string()),
                });
                tracing::warn!(
                    channel = adapter.channel_id(),
                    attempt,
                    "invocation deadline exceeded, abandoning channel"
                );
                break;
            }

            let budget = match remaining {
                Some(left) => self.options.attempt_timeout.min(left),
                None => self.options.attempt_timeout,
            };

            let result: Result<SendReceipt, NotifyError> =
                match tokio::time::timeout(budget, adapter.send(message)).await {
                    Ok(result) => result,
                    Err(_) => Err(NotifyError::Timeout(budget)),
                };

            match result {
                Ok(receipt) => {
                    attempts.push(DispatchAttempt {
                        attempt,
                        outcome: AttemptOutcome::Success,
                        http_status: receipt.http_status,
                        error_detail: None,
                    });
                    tracing::info!(channel = adapter.channel_id(), attempt, "message delivered");
                    break;
                }
                Err(e) => {
                    let outcome = if e.is_retryable() {
                        AttemptOutcome::RetryableFailure
                    } else {
                        AttemptOutcome::FatalFailure
                    };
                    let hint = e.backoff_hint();
                    attempts.push(DispatchAttempt {
                        attempt,
                        outcome,
                        http_status: e.http_status(),
                        error_detail: Some(e.to_string()),
                    });

                    if outcome == AttemptOutcome::FatalFailure {
                        tracing::error!(
                            channel = adapter.channel_id(),
                            attempt,
                            error = %e,
                            "channel failed fatally, not retrying"
                        );
                        break;
                    }
                    if attempt == policy.max_attempts {
                        tracing::error!(
                            channel = adapter.channel_id(),
                            attempts = attempt,
                            error = %e,
                            "channel failed after exhausting retries"
                        );
                        break;
                    }

                    let mut delay = hint
                        .unwrap_or_else(|| policy.backoff_after(attempt))
                        .min(policy.max_backoff);
                    if let Some(d) = deadline {
                        delay = delay.min(d.saturating_duration_since(Instant::now()));
                    }
                    tracing::warn!(
                        channel = adapter.channel_id(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }

        let outcome = attempts
            .last()
            .map(|a| a.outcome)
            .unwrap_or(AttemptOutcome::RetryableFailure);
        ChannelReport {
            channel_id: adapter.channel_id().to_string(),
            channel_type: adapter.channel_type(),
            outcome,
            attempts,
        }
    }
}
