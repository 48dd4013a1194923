use super::AriEventHandler;
use crate::domain::channel::{parse_stasis_args, HangupCause, StasisContext};
use crate::domain::shared::{DomainError, Result};
use crate::infrastructure::protocols::ari::event::{ChannelEvent, StasisStart};
use tracing::{debug, warn};

impl AriEventHandler {
    /// Entry point of every channel handed to the application
    ///
    /// The channel record may still be in flight from ChannelCreated, so its
    /// existence is awaited first. Any failure hangs the channel up.
    pub(super) async fn stasis_start(&self, e: StasisStart) -> Result<()> {
        let asterisk_id = e.header.asterisk_id.as_str();
        let channel_id = e.channel.id.as_str();

        if !self.channel.is_exist(channel_id).await {
            warn!("Channel {} entered stasis but is unknown", channel_id);
            self.channel
                .hangup_quietly(asterisk_id, channel_id, HangupCause::Interworking)
                .await;
            return Err(DomainError::NotFound(format!("channel {}", channel_id)));
        }

        let args = parse_stasis_args(&e.args);
        let channel = self
            .channel
            .set_stasis(channel_id, &e.header.application, args)
            .await?;
        let Some(context) = channel.stasis_context() else {
            self.channel
                .hangup_quietly(asterisk_id, channel_id, HangupCause::Interworking)
                .await;
            return Err(DomainError::ValidationError(format!(
                "channel {} has no known stasis context: {:?}",
                channel_id,
                channel.stasis_arg("context")
            )));
        };
        debug!("Channel {} entered stasis with context {}", channel_id, context.as_str());

        let started = match context {
            StasisContext::CallIn => self.call.start_incoming(&channel).await,
            StasisContext::CallOut => self.call.start_outgoing_leg(&channel).await,
            StasisContext::ConfIn => self.confbridge.start_context_incoming(&channel).await,
            StasisContext::CallJoin => self.call.start_join_leg(&channel).await,
            StasisContext::ExternalMedia => self.call.start_external_media(&channel).await,
        };
        if let Err(err) = started {
            self.channel
                .hangup_quietly(asterisk_id, channel_id, HangupCause::Interworking)
                .await;
            return Err(err);
        }
        Ok(())
    }

    pub(super) async fn stasis_end(&self, e: ChannelEvent) -> Result<()> {
        match self.channel.clear_stasis(&e.channel.id).await {
            Err(err) if err.is_not_found() => Ok(()),
            other => other,
        }
    }
}
