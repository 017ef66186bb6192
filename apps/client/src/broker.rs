//! Broker session over MQTT
//!
//! One long-lived connection per process. Every ConnAck re-subscribes to the
//! client's request topic, every inbound publish is handed to a
//! [`MessageHandler`], and connection loss is retried forever with capped
//! backoff. Responses go out through the cloneable [`BrokerPublisher`].

use bytes::Bytes;
use netpass_common::{
    Result, TunnelError,
    constants::{
        BROKER_CHANNEL_CAPACITY, DISCONNECT_FLUSH_SECS, KEEP_ALIVE_SECS, MAX_PACKET_SIZE_BYTES,
    },
};
use rumqttc::{
    AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS, TlsConfiguration, Transport,
};
use std::{future::Future, sync::Arc, time::Duration};
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::context::ClientContext;
use crate::tls::insecure_client_config;

/// Outbound seam: anything that can deliver a payload to a topic
pub trait Publisher: Send + Sync + 'static {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> impl Future<Output = Result<()>> + Send;
}

/// Inbound seam: receives the raw payload of every request message
///
/// Called on the broker event loop; implementations must hand work off
/// instead of awaiting it.
pub trait MessageHandler: Send + Sync + 'static {
    fn on_message(&self, payload: Bytes);
}

/// Publishes at QoS 1 through the session's request queue
///
/// `publish` resolves once the packet is queued for the event loop, not when
/// the broker acknowledges it. The timeout bounds how long a caller waits for
/// room in that queue (capacity [`BROKER_CHANNEL_CAPACITY`]). The PubAck is
/// tracked by rumqttc's outgoing state. Because the session is clean, a
/// packet still unacknowledged when the connection drops is discarded on
/// reconnect, and the gateway's own request timeout answers the caller.
#[derive(Clone)]
pub struct BrokerPublisher {
    client: AsyncClient,
    timeout: Duration,
}

impl Publisher for BrokerPublisher {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        tokio::time::timeout(
            self.timeout,
            self.client
                .publish(topic, QoS::AtLeastOnce, false, payload),
        )
        .await
        .map_err(|_| TunnelError::Timeout("publish"))?
        .map_err(|e| TunnelError::BrokerError(e.to_string()))
    }
}

/// MQTT options for this client: TLS, client id, keep-alive and packet limits
pub fn mqtt_options(ctx: &ClientContext) -> Result<MqttOptions> {
    let mut options = MqttOptions::new(
        ctx.client_id(),
        ctx.config.broker_domain.as_str(),
        ctx.config.broker_port,
    );
    options
        .set_keep_alive(Duration::from_secs(KEEP_ALIVE_SECS))
        .set_clean_session(true)
        .set_max_packet_size(MAX_PACKET_SIZE_BYTES, MAX_PACKET_SIZE_BYTES)
        .set_transport(Transport::tls_with_config(TlsConfiguration::Rustls(
            insecure_client_config()?,
        )));

    Ok(options)
}

pub struct BrokerSession {
    ctx: Arc<ClientContext>,
    client: AsyncClient,
    eventloop: EventLoop,
    pending_suback: Option<oneshot::Sender<()>>,
}

impl BrokerSession {
    /// Prepare the session; the network connection is made by [`run`](Self::run)
    pub fn connect(ctx: Arc<ClientContext>) -> Result<Self> {
        let options = mqtt_options(&ctx)?;
        let (client, eventloop) = AsyncClient::new(options, BROKER_CHANNEL_CAPACITY);

        Ok(Self {
            ctx,
            client,
            eventloop,
            pending_suback: None,
        })
    }

    pub fn publisher(&self) -> BrokerPublisher {
        BrokerPublisher {
            client: self.client.clone(),
            timeout: self.ctx.config.publish_timeout,
        }
    }

    /// Drive the connection until `shutdown` flips, reconnecting as needed
    pub async fn run<H: MessageHandler>(
        mut self,
        handler: Arc<H>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let reconnect = self.ctx.config.reconnect_config.clone();
        let mut delay = reconnect.min_delay;

        info!(
            "Connecting to broker {}:{}",
            self.ctx.config.broker_domain, self.ctx.config.broker_port
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let event = tokio::select! {
                _ = shutdown.changed() => break,
                event = self.eventloop.poll() => event,
            };

            match event {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    debug!("ConnAck: {:?}", ack.code);
                    delay = reconnect.min_delay;
                    self.on_connect();
                }
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    info!("Subscription acknowledged: {:?}", ack.return_codes);
                    if let Some(tx) = self.pending_suback.take() {
                        let _ = tx.send(());
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    debug!("Message on {:?} ({} bytes)", publish.topic, publish.payload.len());
                    handler.on_message(publish.payload);
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    warn!("Broker sent DISCONNECT");
                }
                Ok(_) => {}
                Err(e) => {
                    self.pending_suback = None;
                    warn!("Broker connection lost: {}. Reconnecting in {:?}", e, delay);

                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                    delay = reconnect.next_delay(delay);
                }
            }
        }

        self.disconnect().await;
        Ok(())
    }

    /// Log the public URL and subscribe in the background
    fn on_connect(&mut self) {
        info!("Connected to broker as {}", self.ctx.client_id());
        info!("Public URL: {}", self.ctx.public_url());

        let (tx, rx) = oneshot::channel();
        self.pending_suback = Some(tx);

        let client = self.client.clone();
        let topic = self.ctx.request_topic();
        let wait = self.ctx.config.subscribe_timeout;
        tokio::spawn(async move {
            if let Err(e) = subscribe(client, &topic, wait, rx).await {
                // The next ConnAck subscribes again
                warn!("Subscription to {} not confirmed: {}", topic, e);
            }
        });
    }

    async fn disconnect(mut self) {
        info!("Disconnecting from broker");
        if let Err(e) = self.client.disconnect().await {
            error!("Failed to queue DISCONNECT: {}", e);
            return;
        }

        let flushed = tokio::time::timeout(Duration::from_secs(DISCONNECT_FLUSH_SECS), async {
            loop {
                match self.eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        })
        .await;

        if flushed.is_err() {
            debug!("DISCONNECT not flushed before shutdown");
        }
    }
}

async fn subscribe(
    client: AsyncClient,
    topic: &str,
    wait: Duration,
    suback: oneshot::Receiver<()>,
) -> Result<()> {
    tokio::time::timeout(wait, async {
        client
            .subscribe(topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| TunnelError::BrokerError(e.to_string()))?;
        suback
            .await
            .map_err(|_| TunnelError::BrokerError("connection lost before SubAck".to_string()))
    })
    .await
    .map_err(|_| TunnelError::Timeout("subscription"))?
}
