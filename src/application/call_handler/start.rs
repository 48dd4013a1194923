//! Incoming routing and stasis entry points

use super::CallHandler;
use crate::domain::call::{
    Action, ActionType, Call, CallDirection, CallType, ConfbridgeJoinOption, ConferenceJoinOption,
    ConnectOption,
};
use crate::domain::channel::{Channel, ChannelState, ChannelType, HangupCause};
use crate::domain::shared::{Address, AddressType, DomainError, EventType, Result};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Where an incoming call goes
#[derive(Debug, Clone, PartialEq)]
struct Route {
    customer_id: Uuid,
    flow_id: Uuid,
    call_type: CallType,
    destination: Address,
}

fn is_tel_number(target: &str) -> bool {
    target
        .strip_prefix('+')
        .is_some_and(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()))
}

impl CallHandler {
    /// Route a channel dialing in from outside
    ///
    /// An unresolvable destination hangs the channel up with "no route to
    /// destination"; any other failure, a missing `domain` argument
    /// included, is returned to the caller.
    pub async fn start_incoming(&self, channel: &Channel) -> Result<()> {
        let domain = channel.stasis_arg("domain").ok_or_else(|| {
            DomainError::ValidationError(format!("channel {} entered without a domain", channel.id))
        })?;
        let source = Address::new(AddressType::Tel, channel.source_number.clone())
            .with_name(channel.source_name.clone());

        let route = match self.route_incoming(channel, domain).await {
            Ok(route) => route,
            Err(e) if e.is_not_found() => {
                info!(
                    "No route for {} at {} on channel {}: {}",
                    channel.destination_number, domain, channel.id, e
                );
                return self
                    .channel
                    .hangup(&channel.asterisk_id, &channel.id, HangupCause::NoRouteDestination)
                    .await;
            }
            Err(e) => return Err(e),
        };

        let call = Call::new(
            Uuid::new_v4(),
            route.customer_id,
            channel.id.clone(),
            route.call_type,
            CallDirection::Incoming,
            source,
            route.destination,
        )
        .with_flow(route.flow_id);
        self.start_call(channel, call).await
    }

    /// Decision tree on the dialed domain
    async fn route_incoming(&self, channel: &Channel, domain: &str) -> Result<Route> {
        let destination = channel.destination_number.as_str();

        if domain == self.routing.conference_domain() {
            let conference_id = Uuid::parse_str(destination).map_err(|_| {
                DomainError::NotFound(format!("conference {}", destination))
            })?;
            let conference = self.requester.conference_get(conference_id).await?;
            let action = Action::new(
                ActionType::ConfbridgeJoin,
                &ConfbridgeJoinOption {
                    confbridge_id: conference.confbridge_id,
                },
            )?;
            let flow_id = self
                .requester
                .flow_create_temporary(conference.customer_id, vec![action])
                .await?;
            return Ok(Route {
                customer_id: conference.customer_id,
                flow_id,
                call_type: CallType::Conference,
                destination: Address::new(AddressType::Conference, conference.id.to_string()),
            });
        }

        if domain == self.routing.pstn_domain() {
            let number = self.requester.number_get_by_number(destination).await?;
            let flow_id = number.call_flow_id.ok_or_else(|| {
                DomainError::NotFound(format!("flow of number {}", number.number))
            })?;
            return Ok(Route {
                customer_id: number.customer_id,
                flow_id,
                call_type: CallType::Flow,
                destination: Address::new(AddressType::Tel, number.number),
            });
        }

        if let Some(prefix) = domain.strip_suffix(&self.routing.registrar_suffix()) {
            let customer_id = Uuid::parse_str(prefix)
                .map_err(|_| DomainError::NotFound(format!("customer of domain {}", domain)))?;
            return self
                .route_registrar(channel, customer_id, domain, destination)
                .await;
        }

        Err(DomainError::NotFound(format!("domain {}", domain)))
    }

    /// Calls from registered endpoints, dispatched on the destination type
    async fn route_registrar(
        &self,
        channel: &Channel,
        customer_id: Uuid,
        domain: &str,
        destination: &str,
    ) -> Result<Route> {
        let source = Address::new(
            AddressType::Endpoint,
            format!("{}@{}", channel.source_number, domain),
        )
        .with_name(channel.source_name.clone());

        let (destination, action) = if let Some(agent_id) = destination.strip_prefix("agent-") {
            let agent_id = Uuid::parse_str(agent_id)
                .map_err(|_| DomainError::NotFound(format!("agent {}", agent_id)))?;
            let address = Address::new(AddressType::Agent, agent_id.to_string());
            let action = Action::new(
                ActionType::Connect,
                &ConnectOption {
                    source,
                    destinations: vec![address.clone()],
                },
            )?;
            (address, action)
        } else if let Some(conference_id) = destination.strip_prefix("conference-") {
            let conference_id = Uuid::parse_str(conference_id)
                .map_err(|_| DomainError::NotFound(format!("conference {}", conference_id)))?;
            let action = Action::new(
                ActionType::ConferenceJoin,
                &ConferenceJoinOption { conference_id },
            )?;
            (
                Address::new(AddressType::Conference, conference_id.to_string()),
                action,
            )
        } else {
            let address = if is_tel_number(destination) {
                Address::new(AddressType::Tel, destination)
            } else {
                Address::new(AddressType::Endpoint, format!("{}@{}", destination, domain))
            };
            let action = Action::new(
                ActionType::Connect,
                &ConnectOption {
                    source,
                    destinations: vec![address.clone()],
                },
            )?;
            (address, action)
        };

        let flow_id = self
            .requester
            .flow_create_temporary(customer_id, vec![action])
            .await?;
        Ok(Route {
            customer_id,
            flow_id,
            call_type: CallType::Flow,
            destination,
        })
    }

    /// Persist a routed incoming call and run its flow
    async fn start_call(&self, channel: &Channel, call: Call) -> Result<()> {
        let flow_id = call.flow_id.ok_or_else(|| {
            DomainError::Internal(format!("call {} has no flow", call.id))
        })?;

        self.calls.call_create(&call).await?;
        let active_flow_id = self.requester.active_flow_create(call.id, flow_id).await?;
        self.calls.call_set_flow(call.id, flow_id, active_flow_id).await?;
        self.channel.set_type(&channel.id, ChannelType::Call).await?;

        self.metrics.call_created("incoming");
        let call = self.calls.call_get(call.id).await?;
        info!(
            "Created incoming call {} from {} to {} on channel {}",
            call.id, call.source, call.destination, channel.id
        );
        self.notify(EventType::CallCreated, &call);
        self.schedule_health_check(call.id).await;

        self.action_next(call.id).await
    }

    pub(crate) async fn schedule_health_check(&self, id: Uuid) {
        if let Err(e) = self
            .requester
            .call_health_check(id, 0, self.health_delay)
            .await
        {
            warn!("Could not schedule health check of call {}: {}", id, e);
        }
    }

    /// Outgoing channel answered and handed to us
    pub async fn start_outgoing_leg(&self, channel: &Channel) -> Result<()> {
        let call_id = channel.stasis_uuid("call_id")?;
        let call = self.calls.call_get(call_id).await?;
        if call.channel_id != channel.id {
            return Err(DomainError::ValidationError(format!(
                "channel {} does not belong to call {}",
                channel.id, call_id
            )));
        }
        self.channel.set_type(&channel.id, ChannelType::Call).await?;
        self.action_next(call_id).await
    }

    /// Dial-back leg of a confbridge join, placed into the call's join bridge
    pub async fn start_join_leg(&self, channel: &Channel) -> Result<()> {
        let call_id = channel.stasis_uuid("call_id")?;
        let bridge_id = channel.stasis_arg("bridge_id").ok_or_else(|| {
            DomainError::ValidationError(format!("channel {} has no bridge_id argument", channel.id))
        })?;

        self.channel.set_type(&channel.id, ChannelType::Join).await?;
        let bridge = self.bridge.get(bridge_id).await?;
        self.bridge
            .add_channel(&bridge.asterisk_id, &bridge.id, &channel.id)
            .await?;

        let call = self.calls.call_get(call_id).await?;
        let call_channel = self.channel.get(&call.channel_id).await?;
        if call_channel.state != ChannelState::Up {
            debug!("Answering channel {} of call {}", call_channel.id, call_id);
            self.channel.answer(&call_channel).await?;
        }

        if let Err(e) = self
            .requester
            .call_channel_health_check(&channel.id, 0, self.health_delay)
            .await
        {
            warn!("Could not schedule health check of channel {}: {}", channel.id, e);
        }
        Ok(())
    }

    /// External media or snoop channel joining an existing bridge
    pub async fn start_external_media(&self, channel: &Channel) -> Result<()> {
        let bridge_id = channel.stasis_arg("bridge_id").ok_or_else(|| {
            DomainError::ValidationError(format!("channel {} has no bridge_id argument", channel.id))
        })?;

        self.channel
            .set_type(&channel.id, ChannelType::External)
            .await?;
        let bridge = self.bridge.get(bridge_id).await?;
        self.bridge
            .add_channel(&bridge.asterisk_id, &bridge.id, &channel.id)
            .await
    }
}
