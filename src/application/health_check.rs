//! Health supervision
//!
//! A probe asks the owning node whether a channel is still there. Each probe
//! schedules the next one through the service's own request path, so a
//! supervision chain is a sequence of independent delayed requests that ends
//! when the target is gone or was force hung up.

use crate::application::call_handler::CallHandler;
use crate::application::channel_handler::ChannelHandler;
use crate::config::HealthConfig;
use crate::domain::channel::{Channel, HangupCause};
use crate::domain::ports::ServiceRequester;
use crate::domain::shared::Result;
use crate::infrastructure::metrics::Metrics;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

pub struct HealthCheck {
    channel: Arc<ChannelHandler>,
    call: Arc<CallHandler>,
    requester: Arc<dyn ServiceRequester>,
    metrics: Metrics,
    config: HealthConfig,
}

impl HealthCheck {
    pub fn new(
        channel: Arc<ChannelHandler>,
        call: Arc<CallHandler>,
        requester: Arc<dyn ServiceRequester>,
        config: HealthConfig,
    ) -> Self {
        Self {
            channel,
            call,
            requester,
            metrics: Metrics::noop(),
            config,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = metrics;
        self
    }

    fn next_retry(&self, alive: bool, retry_count: u32, target: &str) -> u32 {
        if alive {
            return 0;
        }
        self.metrics.health_check_failed(target);
        retry_count.saturating_add(1)
    }

    pub async fn channel_health_check(&self, channel_id: &str, retry_count: u32) -> Result<()> {
        let channel = match self.channel.get(channel_id).await {
            Ok(channel) => channel,
            Err(e) if e.is_not_found() => {
                debug!("Channel {} is gone, stopping health checks", channel_id);
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        if channel.is_ended() {
            return Ok(());
        }

        let alive = self.channel.probe(&channel).await;
        let retry = self.next_retry(alive, retry_count, "channel");
        if retry > self.config.max_retry {
            warn!("Channel {} failed {} health checks, hanging up", channel_id, retry);
            self.force_hangup(&channel).await;
            return Ok(());
        }

        self.requester
            .call_channel_health_check(channel_id, retry, self.config.delay())
            .await
    }

    pub async fn call_health_check(&self, call_id: Uuid, retry_count: u32) -> Result<()> {
        let call = match self.call.get(call_id).await {
            Ok(call) => call,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };
        if call.is_hungup() || call.tm_delete.is_some() {
            debug!("Call {} is over, stopping health checks", call_id);
            return Ok(());
        }

        let channel = match self.channel.get(&call.channel_id).await {
            Ok(channel) => Some(channel),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };
        let alive = match &channel {
            Some(channel) if !channel.is_ended() => self.channel.probe(channel).await,
            _ => false,
        };

        let retry = self.next_retry(alive, retry_count, "call");
        if retry > self.config.max_retry {
            warn!("Call {} failed {} health checks, hanging up", call_id, retry);
            if let Some(channel) = &channel {
                self.force_hangup(channel).await;
            }
            return self.call.settle(self.call.get(call_id).await?).await;
        }

        self.requester
            .call_health_check(call_id, retry, self.config.delay())
            .await
    }

    /// Hang the channel up on the node and record its end locally, since
    /// the node may never report it
    async fn force_hangup(&self, channel: &Channel) {
        self.channel
            .hangup_quietly(&channel.asterisk_id, &channel.id, HangupCause::NormalClearing)
            .await;
        if channel.is_ended() {
            return;
        }

        match self
            .channel
            .end(&channel.id, HangupCause::NormalClearing, Utc::now())
            .await
        {
            Ok(ended) => {
                if let Err(e) = self.call.hangup(&ended).await {
                    warn!("Could not hang up the call of channel {}: {}", channel.id, e);
                }
            }
            Err(e) => warn!("Could not end channel {}: {}", channel.id, e),
        }
    }
}
