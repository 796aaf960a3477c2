//! # mqtt-zpool-monitor
//!
//! `mqtt-zpool-monitor` reports the state of the local ZFS pools to the MQTT
//! integration of Home Assistant
//!
//!

pub use self::configuration::Configuration;
pub use self::configuration::Mqtt;
pub use self::configuration::Zpool;
pub use self::daemon::Daemon;
pub use self::home_assistant::DiscoveryPayload;
pub use self::home_assistant::KnownField;
pub use self::home_assistant::Topics;
pub use self::registry::EntityRegistry;
pub use self::zpool::Pool;
pub use self::zpool::PoolStatus;
pub use self::zpool::Value;

/// Contains the configuration stuff
pub mod configuration;
/// Contains the daemon code
pub mod daemon;
/// Contains the error types
pub mod error;
/// Contains Home Assistant discovery data
pub mod home_assistant;
/// Contains the sensor identities announced to the broker
pub mod registry;
/// Contains the pool status reading and parsing
pub mod zpool;
