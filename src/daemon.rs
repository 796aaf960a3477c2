use crate::configuration::Configuration;
use crate::error::ConfigError;
use crate::home_assistant::{DiscoveryPayload, Topics};
use crate::registry::{self, EntityRegistry};
use crate::zpool::{self, Pool, PoolStatus, ZpoolCommand};
use log::{debug, error, info, trace, warn};
use rumqttc::{AsyncClient, ConnectReturnCode, Event, LastWill, MqttOptions, Packet, QoS};
use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::signal::unix::SignalKind;
use tokio::task;
use tokio::time::sleep;

/// Retained payloads of the availability topic
const ONLINE: &str = "online";
const OFFLINE: &str = "offline";

/// Delay window between two broker connection attempts
const BACKOFF_INITIAL: Duration = Duration::from_secs(1);
const BACKOFF_MAX: Duration = Duration::from_secs(60);

/// Size of the client queue. Once it is full, further publishes of the cycle
/// are dropped instead of blocking the poll timer.
const QUEUE_CAPACITY: usize = 64;

/// One message scheduled for the broker by a poll cycle. Everything the
/// daemon sends is retained, so late subscribers catch up immediately.
#[derive(Debug, PartialEq)]
pub struct Publication {
    pub topic: String,
    pub payload: String,
}

/// What one poll cycle sends
pub struct CyclePlan {
    /// Discovery configs not announced yet this session, paired with the
    /// identity to mark once the message is queued
    pub discovery: Vec<(String, Publication)>,

    /// Current sensor values, sent every cycle
    pub state: Vec<Publication>,
}

/// Decides what to publish for the given pool set
///
/// Every (pool, field) gets its state value. Sensors the registry has not
/// seen this session additionally get their discovery config, scheduled
/// before the state so Home Assistant knows the sensor by the time its first
/// value arrives.
pub fn plan_cycle(registry: &EntityRegistry, pools: &[Pool], topics: &Topics) -> CyclePlan {
    let mut plan = CyclePlan {
        discovery: Vec::new(),
        state: Vec::new(),
    };

    for pool in pools {
        for (field, value) in &pool.fields {
            let identity = registry::entity_id(&pool.name, field);

            if !registry.is_announced(&identity) {
                let payload = DiscoveryPayload::new(topics, &pool.name, field, value);
                plan.discovery.push((
                    identity.clone(),
                    Publication {
                        topic: topics.discovery(&identity),
                        payload: payload.to_string(),
                    },
                ));
            }

            plan.state.push(Publication {
                topic: topics.state(&pool.name, field),
                payload: value.to_string(),
            });
        }
    }

    plan
}

/// Daemon that periodically reads the pool status and reports it to MQTT
pub struct Daemon<S = ZpoolCommand> {
    config: Configuration,
    mqtt_config: MqttOptions,
    topics: Topics,
    source: S,
    registry: EntityRegistry,

    /// Bumped by the connection task on every accepted (re)connect, observed
    /// by the poll loop before it publishes. The registry itself is only
    /// touched from the publishing path.
    session: Arc<AtomicU64>,
    seen_session: u64,
}

impl Daemon {
    /// Constructs a daemon reading from the configured zpool binary
    ///
    /// Fails if the binary does not exist, there is no point in starting
    /// without a data source.
    pub fn new(config: Configuration) -> Result<Daemon, ConfigError> {
        if !Path::new(&config.zpool.command).exists() {
            return Err(ConfigError::CommandMissing(config.zpool.command.into()));
        }

        let source = ZpoolCommand::new(
            &config.zpool.command,
            &config.zpool.columns,
            Duration::from_secs(config.zpool.timeout),
        );

        Ok(Daemon::with_source(config, source))
    }
}

impl<S: PoolStatus> Daemon<S> {
    /// Constructs a daemon reading the pool status from `source`
    pub fn with_source(config: Configuration, source: S) -> Daemon<S> {
        info!("Daemon for {} starting", config.mqtt.entity);

        let topics = Topics::new(
            &config.mqtt.topic_base,
            &config.mqtt.discovery_prefix,
            &config.mqtt.entity,
            config.zpool.interval,
        );

        let mut mqtt_config =
            MqttOptions::new(&config.mqtt.entity, &config.mqtt.host, config.mqtt.port);
        mqtt_config.set_keep_alive(Duration::from_secs(30));
        if !config.mqtt.user.is_empty() {
            mqtt_config.set_credentials(&config.mqtt.user, &config.mqtt.password);
        }
        // the broker announces our death if the connection drops uncleanly
        mqtt_config.set_last_will(LastWill::new(
            topics.availability(),
            OFFLINE,
            QoS::AtLeastOnce,
            true,
        ));

        info!(
            "Connecting to MQTT broker {}:{}",
            config.mqtt.host, config.mqtt.port
        );

        Daemon {
            mqtt_config,
            topics,
            source,
            registry: EntityRegistry::new(),
            session: Arc::new(AtomicU64::new(0)),
            seen_session: 0,
            config,
        }
    }

    /// Runs the main loop that periodically sends the MQTT events
    pub async fn run(&mut self) {
        let (client, mut event_loop) = AsyncClient::new(self.mqtt_config.clone(), QUEUE_CAPACITY);

        let session = self.session.clone();
        let availability = self.topics.availability().to_string();
        let connection_client = client.clone();

        task::spawn(async move {
            let mut backoff = BACKOFF_INITIAL;
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack)))
                        if ack.code == ConnectReturnCode::Success =>
                    {
                        info!("Connected to the broker");
                        backoff = BACKOFF_INITIAL;
                        // availability goes out ahead of any sensor traffic
                        // of the new session
                        if let Err(e) = connection_client.try_publish(
                            &availability,
                            QoS::AtLeastOnce,
                            true,
                            ONLINE,
                        ) {
                            warn!("Cannot queue the availability message: {e}");
                        }
                        session.fetch_add(1, Ordering::Release);
                    }
                    Ok(notification) => trace!("MQTT notification received: {notification:?}"),
                    Err(e) => {
                        warn!("MQTT connection error: {e}, retrying in {backoff:?}");
                        sleep(backoff).await;
                        backoff = (backoff * 2).min(BACKOFF_MAX);
                    }
                }
            }
        });

        self.main_loop(client).await.unwrap_or_else(|e| {
            error!("MQTT main loop failed: {e}");
        });
    }

    /// Ticks at the configured interval until a shutdown signal arrives
    async fn main_loop(&mut self, client: AsyncClient) -> Result<(), Box<dyn Error>> {
        let sleep_period = Duration::from_secs(self.config.zpool.interval);
        let mut terminate_signal = tokio::signal::unix::signal(SignalKind::terminate())?;

        loop {
            self.poll_cycle(&client).await;

            tokio::select! {
                _ = sleep(sleep_period) => {},
                _ = tokio::signal::ctrl_c() => {
                    debug!("Ctrl-C received");
                    break;
                },
                _ = terminate_signal.recv() => {
                    debug!("Interrupt received");
                    break;
                }
            }
        }

        // graceful exit: retained offline, then give the queue a moment to
        // drain before dropping the connection
        client
            .publish(self.topics.availability(), QoS::AtLeastOnce, true, OFFLINE)
            .await?;
        sleep(Duration::from_secs(1)).await;
        client.disconnect().await?;

        Ok(())
    }

    /// One tick: read, parse, publish
    ///
    /// Any failure skips the whole tick so a partial pool set is never
    /// published; the retained values of the previous cycle stay current for
    /// subscribers.
    async fn poll_cycle(&mut self, client: &AsyncClient) {
        let raw = match self.source.fetch().await {
            Ok(raw) => raw,
            Err(e) => {
                error!("Cannot read the pool status: {e}");
                return;
            }
        };

        let pools = match zpool::parse_pools(&raw, &self.config.zpool.columns) {
            Ok(pools) => pools,
            Err(e) => {
                error!("Cannot parse the pool status: {e}");
                return;
            }
        };
        if pools.is_empty() {
            debug!("No pools reported");
        }

        self.observe_session();

        let plan = plan_cycle(&self.registry, &pools, &self.topics);
        debug!(
            "Publishing {} discovery and {} state messages",
            plan.discovery.len(),
            plan.state.len()
        );

        for (identity, message) in plan.discovery {
            if Self::try_publish(client, &message) {
                self.registry.mark_announced(identity);
            }
        }
        for message in &plan.state {
            Self::try_publish(client, message);
        }
    }

    /// Starts a fresh discovery session if the connection task reconnected
    /// since the last cycle
    fn observe_session(&mut self) {
        let current = self.session.load(Ordering::Acquire);
        if current != self.seen_session {
            debug!("New broker session, every sensor will be announced again");
            self.registry.reset_session();
            self.seen_session = current;
        }
    }

    /// Queues a retained message without waiting for the broker
    ///
    /// A full or torn-down queue drops the message: state is resent next
    /// cycle and discovery retries until its identity is marked announced.
    fn try_publish(client: &AsyncClient, message: &Publication) -> bool {
        trace!("Publishing to topic {} : {}", message.topic, message.payload);
        match client.try_publish(
            &message.topic,
            QoS::AtLeastOnce,
            true,
            message.payload.clone(),
        ) {
            Ok(()) => true,
            Err(e) => {
                warn!("Dropped message for {}: {e}", message.topic);
                false
            }
        }
    }
}
