//! Flow action execution

use super::CallHandler;
use crate::domain::call::{Action, ActionType, Call, ConfbridgeJoinOption, PlayOption};
use crate::domain::channel::HangupCause;
use crate::domain::shared::Result;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// What to do after an action was executed
#[derive(Debug, PartialEq, Eq)]
enum Step {
    /// Fetch the next action right away
    Continue,
    /// An event will resume the flow
    Wait,
}

impl CallHandler {
    /// Fetch and run the call's next flow actions
    ///
    /// Actions that complete immediately are chained; the loop stops at the
    /// first action that waits for an event. A finished flow hangs the call up.
    pub async fn action_next(&self, id: Uuid) -> Result<()> {
        loop {
            let call = self.calls.call_get(id).await?;
            if call.status.is_tearing_down() {
                debug!("Call {} is {}, no next action", id, call.status.as_str());
                return Ok(());
            }

            let Some(active_flow_id) = call.active_flow_id else {
                warn!("Call {} has no active flow", id);
                return self.hanging_up(id, HangupCause::NormalClearing).await;
            };

            let action = match self
                .requester
                .active_flow_action_next(active_flow_id, call.current_action_id())
                .await
            {
                Ok(action) => action,
                Err(e) => {
                    error!("Could not get the next action of call {}: {}", id, e);
                    self.hanging_up_quietly(id, HangupCause::Interworking).await;
                    return Err(e);
                }
            };
            self.calls.call_set_action(id, action.clone()).await?;

            let Some(action) = action else {
                info!("Flow of call {} finished", id);
                return self.hanging_up(id, HangupCause::NormalClearing).await;
            };

            debug!("Call {} executes {:?} action {}", id, action.action_type, action.id);
            match self.execute(&call, &action).await {
                Ok(Step::Continue) => continue,
                Ok(Step::Wait) => return Ok(()),
                Err(e) => {
                    error!("Action {} of call {} failed: {}", action.id, id, e);
                    self.hanging_up_quietly(id, HangupCause::Interworking).await;
                    return Err(e);
                }
            }
        }
    }

    async fn execute(&self, call: &Call, action: &Action) -> Result<Step> {
        match action.action_type {
            ActionType::Answer => {
                let channel = self.channel.get(&call.channel_id).await?;
                self.channel.answer(&channel).await?;
                Ok(Step::Continue)
            }
            ActionType::ConfbridgeJoin => {
                let option: ConfbridgeJoinOption = action.parse_option()?;
                self.confbridge.join(option.confbridge_id, call.id).await?;
                Ok(Step::Wait)
            }
            ActionType::Hangup => {
                self.hanging_up(call.id, HangupCause::NormalClearing).await?;
                Ok(Step::Wait)
            }
            ActionType::Play => {
                let option: PlayOption = action.parse_option()?;
                let channel = self.channel.get(&call.channel_id).await?;
                self.ari
                    .channel_play(
                        &channel.asterisk_id,
                        &channel.id,
                        &action.id.to_string(),
                        &option.stream_urls,
                    )
                    .await?;
                Ok(Step::Wait)
            }
            ActionType::Connect | ActionType::ConferenceJoin | ActionType::Unsupported => {
                warn!(
                    "Call {} cannot execute {:?} action {}",
                    call.id, action.action_type, action.id
                );
                self.hanging_up(call.id, HangupCause::Interworking).await?;
                Ok(Step::Wait)
            }
        }
    }
}
