use super::AriEventHandler;
use crate::domain::bridge::ReferenceType;
use crate::domain::shared::{EventType, Result};
use crate::infrastructure::protocols::ari::event::{
    ContactStatusChange, PlaybackEvent, RecordingEvent,
};
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

/// Owner of a recording, decoded from `<reference_type>_<reference_id>_<recording_id>`
#[derive(Debug, Clone, Copy, PartialEq)]
struct RecordingOwner {
    reference_type: ReferenceType,
    reference_id: Uuid,
    recording_id: Uuid,
}

impl RecordingOwner {
    fn parse(name: &str) -> Option<Self> {
        let mut parts = name.splitn(3, '_');
        let reference_type = ReferenceType::parse(parts.next()?);
        let reference_id = Uuid::parse_str(parts.next()?).ok()?;
        let recording_id = Uuid::parse_str(parts.next()?).ok()?;
        Some(Self {
            reference_type,
            reference_id,
            recording_id,
        })
    }
}

impl AriEventHandler {
    pub(super) async fn playback_started(&self, e: PlaybackEvent) -> Result<()> {
        let Some(channel_id) = e.playback.channel_id() else {
            return Ok(());
        };
        match self
            .channel
            .set_playback_id(channel_id, Some(e.playback.id.clone()))
            .await
        {
            Err(err) if err.is_not_found() => Ok(()),
            other => other,
        }
    }

    pub(super) async fn playback_finished(&self, e: PlaybackEvent) -> Result<()> {
        let Some(channel_id) = e.playback.channel_id() else {
            return Ok(());
        };
        let channel = match self.channel.get(channel_id).await {
            Ok(channel) => channel,
            Err(err) if err.is_not_found() => return Ok(()),
            Err(err) => return Err(err),
        };

        self.channel.set_playback_id(channel_id, None).await?;
        self.call.playback_finished(&channel, &e.playback.id).await
    }

    pub(super) async fn recording_started(&self, e: RecordingEvent) -> Result<()> {
        let Some(owner) = RecordingOwner::parse(&e.recording.name) else {
            warn!("Unrecognized recording name {}", e.recording.name);
            return Ok(());
        };
        match owner.reference_type {
            ReferenceType::Call => {
                self.call
                    .recording_started(owner.reference_id, owner.recording_id)
                    .await
            }
            ReferenceType::Confbridge => {
                self.confbridge
                    .recording_started(owner.reference_id, owner.recording_id)
                    .await
            }
            _ => {
                debug!("Recording {} has no owner", e.recording.name);
                Ok(())
            }
        }
    }

    pub(super) async fn recording_finished(&self, e: RecordingEvent) -> Result<()> {
        let Some(owner) = RecordingOwner::parse(&e.recording.name) else {
            warn!("Unrecognized recording name {}", e.recording.name);
            return Ok(());
        };
        match owner.reference_type {
            ReferenceType::Call => self.call.recording_finished(owner.reference_id).await,
            ReferenceType::Confbridge => {
                self.confbridge
                    .recording_finished(owner.reference_id)
                    .await
            }
            _ => {
                debug!("Recording {} has no owner", e.recording.name);
                Ok(())
            }
        }
    }

    pub(super) fn contact_status_change(&self, e: ContactStatusChange) -> Result<()> {
        let payload = json!({
            "endpoint": format!("{}/{}", e.endpoint.technology, e.endpoint.resource),
            "uri": e.contact_info.uri,
            "status": e.contact_info.contact_status,
            "aor": e.contact_info.aor,
            "roundtrip_usec": e.contact_info.roundtrip_usec,
        });
        self.notifier
            .publish_event(EventType::ContactStatusChanged, payload);
        Ok(())
    }
}
