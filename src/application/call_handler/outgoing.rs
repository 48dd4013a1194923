//! Outgoing call creation

use super::CallHandler;
use crate::domain::call::{Call, CallDirection, CallType};
use crate::domain::channel::StasisContext;
use crate::domain::ports::OriginateRequest;
use crate::domain::shared::{Address, AddressType, DomainError, EventType, Result, SipUri};
use std::collections::BTreeMap;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Dial string prefix of outgoing legs
const CALL_OUT_ENDPOINT: &str = "PJSIP/call-out";

impl CallHandler {
    /// Create an outgoing call and originate its channel
    ///
    /// With a master call the new call is chained to it and is torn down
    /// together with it.
    pub async fn create_outgoing(
        &self,
        customer_id: Uuid,
        flow_id: Uuid,
        master_call_id: Option<Uuid>,
        source: Address,
        destination: Address,
    ) -> Result<Call> {
        let endpoint = self.dial_endpoint(customer_id, &destination).await?;

        let id = Uuid::new_v4();
        let channel_id = Uuid::new_v4().to_string();
        let call = Call::new(
            id,
            customer_id,
            channel_id.clone(),
            CallType::Flow,
            CallDirection::Outgoing,
            source,
            destination,
        )
        .with_flow(flow_id)
        .with_master(master_call_id);

        self.calls.call_create(&call).await?;
        let active_flow_id = self.requester.active_flow_create(id, flow_id).await?;
        self.calls.call_set_flow(id, flow_id, active_flow_id).await?;
        if let Some(master_call_id) = master_call_id {
            self.calls
                .call_add_chained_call_id(master_call_id, id)
                .await?;
        }

        let request = OriginateRequest {
            // the proxy picks a node
            asterisk_id: String::new(),
            channel_id,
            endpoint,
            app_args: format!("context={},call_id={}", StasisContext::CallOut.as_str(), id),
            variables: originate_variables(&call),
            timeout: self.routing.dial_timeout_secs,
        };
        if let Err(e) = self.ari.channel_create(&request).await {
            error!("Could not originate call {} to {}: {}", id, request.endpoint, e);
            self.abandon(&call).await;
            return Err(e);
        }

        self.metrics.call_created("outgoing");
        let call = self.calls.call_get(id).await?;
        info!(
            "Created outgoing call {} from {} to {} via {}",
            call.id, call.source, call.destination, request.endpoint
        );
        self.notify(EventType::CallCreated, &call);
        self.schedule_health_check(id).await;
        Ok(call)
    }

    /// Dial string for a destination
    async fn dial_endpoint(&self, customer_id: Uuid, destination: &Address) -> Result<String> {
        match destination.address_type {
            AddressType::Tel => Ok(format!(
                "{}/sip:{}@{}",
                CALL_OUT_ENDPOINT, destination.target, self.routing.trunk_domain
            )),
            AddressType::Sip => {
                let uri = SipUri::parse(&destination.target).map_err(|e| {
                    DomainError::ValidationError(format!("{}: {}", destination.target, e))
                })?;
                if uri.host().ends_with(&self.routing.registrar_suffix()) {
                    self.registered_contact(customer_id, uri.user()).await
                } else {
                    Ok(format!("{}/{}", CALL_OUT_ENDPOINT, uri))
                }
            }
            AddressType::Endpoint => {
                let extension = destination
                    .target
                    .split_once('@')
                    .map_or(destination.target.as_str(), |(extension, _)| extension);
                self.registered_contact(customer_id, extension).await
            }
            other => Err(DomainError::ValidationError(format!(
                "cannot dial a {} destination",
                other.as_str()
            ))),
        }
    }

    async fn registered_contact(&self, customer_id: Uuid, extension: &str) -> Result<String> {
        let contacts = self
            .requester
            .registrar_contacts_get(customer_id, extension)
            .await?;
        let contact = contacts.into_iter().next().ok_or_else(|| {
            DomainError::NotFound(format!("registered contact of {}", extension))
        })?;
        Ok(format!("{}/{}", CALL_OUT_ENDPOINT, contact))
    }

    /// Settle a call whose channel never came up
    async fn abandon(&self, call: &Call) {
        let status = call.status;
        if let Err(e) = self
            .calls
            .call_set_hangup(call.id, status.hangup_reason(), status.hangup_by())
            .await
        {
            warn!("Could not hang up abandoned call {}: {}", call.id, e);
        }
        if let Some(master_call_id) = call.master_call_id {
            if let Err(e) = self
                .calls
                .call_remove_chained_call_id(master_call_id, call.id)
                .await
            {
                warn!("Could not detach call {} from {}: {}", call.id, master_call_id, e);
            }
        }
        if let Err(e) = self.calls.call_delete(call.id).await {
            warn!("Could not delete abandoned call {}: {}", call.id, e);
        }
    }
}

fn originate_variables(call: &Call) -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            "CALLERID(all)".to_string(),
            format!("\"{}\" <{}>", call.source.name, call.source.target),
        ),
        ("CC-CALL_ID".to_string(), call.id.to_string()),
        ("CC-TYPE".to_string(), "call".to_string()),
        ("CC-DIRECTION".to_string(), "outgoing".to_string()),
    ])
}
