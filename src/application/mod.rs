//! Application layer - Use cases and application services
//!
//! Handlers orchestrate the domain entities and the outbound ports. They are
//! wired together once by [`CallCore`] and shared behind `Arc`s by the event
//! loop and the RPC server.

pub mod ari_event_handler;
pub mod bridge_handler;
pub mod call_handler;
pub mod channel_handler;
pub mod confbridge_handler;
pub mod health_check;

pub use ari_event_handler::AriEventHandler;
pub use bridge_handler::BridgeHandler;
pub use call_handler::CallHandler;
pub use channel_handler::ChannelHandler;
pub use confbridge_handler::ConfbridgeHandler;
pub use health_check::HealthCheck;

use crate::config::Config;
use crate::domain::bridge::BridgeRepository;
use crate::domain::call::CallRepository;
use crate::domain::channel::ChannelRepository;
use crate::domain::confbridge::ConfbridgeRepository;
use crate::domain::ports::{AriCommander, Notifier, ServiceRequester};
use crate::infrastructure::metrics::Metrics;
use std::sync::Arc;

/// The four stores the handlers read and write
#[derive(Clone)]
pub struct Repositories {
    pub calls: Arc<dyn CallRepository>,
    pub channels: Arc<dyn ChannelRepository>,
    pub bridges: Arc<dyn BridgeRepository>,
    pub confbridges: Arc<dyn ConfbridgeRepository>,
}

impl Repositories {
    /// All four backed by one store
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: CallRepository + ChannelRepository + BridgeRepository + ConfbridgeRepository + 'static,
    {
        Self {
            calls: store.clone(),
            channels: store.clone(),
            bridges: store.clone(),
            confbridges: store,
        }
    }
}

/// Every handler, wired
pub struct CallCore {
    pub channel: Arc<ChannelHandler>,
    pub bridge: Arc<BridgeHandler>,
    pub call: Arc<CallHandler>,
    pub confbridge: Arc<ConfbridgeHandler>,
    pub health: Arc<HealthCheck>,
    pub events: Arc<AriEventHandler>,
}

impl CallCore {
    pub fn new(
        repositories: Repositories,
        ari: Arc<dyn AriCommander>,
        requester: Arc<dyn ServiceRequester>,
        notifier: Arc<dyn Notifier>,
        metrics: Metrics,
        config: &Config,
    ) -> Self {
        let channel = Arc::new(ChannelHandler::new(
            repositories.channels,
            ari.clone(),
            config.store.exist_timeout(),
        ));
        let bridge = Arc::new(
            BridgeHandler::new(repositories.bridges, ari.clone())
                .with_exist_timeout(config.store.exist_timeout()),
        );
        let confbridge = Arc::new(ConfbridgeHandler::new(
            repositories.confbridges,
            repositories.calls.clone(),
            channel.clone(),
            bridge.clone(),
            ari.clone(),
            requester.clone(),
            notifier.clone(),
        ));
        let call = Arc::new(
            CallHandler::new(
                repositories.calls,
                channel.clone(),
                bridge.clone(),
                confbridge.clone(),
                ari,
                requester.clone(),
                notifier.clone(),
            )
            .with_metrics(metrics.clone())
            .with_routing(config.routing.clone())
            .with_health_delay(config.health.delay()),
        );
        let health = Arc::new(
            HealthCheck::new(channel.clone(), call.clone(), requester, config.health.clone())
                .with_metrics(metrics.clone()),
        );
        let events = Arc::new(
            AriEventHandler::new(
                channel.clone(),
                bridge.clone(),
                call.clone(),
                confbridge.clone(),
                notifier,
            )
            .with_metrics(metrics),
        );

        Self {
            channel,
            bridge,
            call,
            confbridge,
            health,
            events,
        }
    }
}
