use crate::registry;
use crate::zpool::Value;
use convert_case::{Case, Casing};
use serde::Serialize;
use std::fmt;
use strum_macros::EnumIter;

/// Contains the zpool columns with curated display metadata
///
/// Anything else coming out of the pool status still becomes a sensor, it
/// just falls back to a generated name with no unit or device class.
#[derive(Debug, PartialEq, EnumIter)]
pub enum KnownField {
    /// Total pool size in bytes
    Size,

    /// Allocated space in bytes
    Alloc,

    /// Free space in bytes
    Free,

    /// Checkpoint size in bytes
    Checkpoint,

    /// Expandable space in bytes
    ExpandSize,

    /// Fragmentation in %
    Frag,

    /// Used capacity in %
    Cap,

    /// Deduplication ratio
    Dedup,

    /// Pool health status text
    Health,

    /// Alternate root mount point
    AltRoot,
}

impl KnownField {
    /// Column name as reported by `zpool list`
    pub fn as_str(&self) -> &'static str {
        match self {
            KnownField::Size => "size",
            KnownField::Alloc => "alloc",
            KnownField::Free => "free",
            KnownField::Checkpoint => "ckpoint",
            KnownField::ExpandSize => "expandsz",
            KnownField::Frag => "frag",
            KnownField::Cap => "cap",
            KnownField::Dedup => "dedup",
            KnownField::Health => "health",
            KnownField::AltRoot => "altroot",
        }
    }

    /// Looks up the metadata for a column name
    pub fn from_key(key: &str) -> Option<KnownField> {
        match key {
            "size" => Some(KnownField::Size),
            "alloc" => Some(KnownField::Alloc),
            "free" => Some(KnownField::Free),
            "ckpoint" => Some(KnownField::Checkpoint),
            "expandsz" => Some(KnownField::ExpandSize),
            "frag" => Some(KnownField::Frag),
            "cap" => Some(KnownField::Cap),
            "dedup" => Some(KnownField::Dedup),
            "health" => Some(KnownField::Health),
            "altroot" => Some(KnownField::AltRoot),
            _ => None,
        }
    }

    /// Name shown in Home Assistant, prefixed with the pool name
    fn display_name(&self) -> &'static str {
        match self {
            KnownField::Size => "Size",
            KnownField::Alloc => "Allocated",
            KnownField::Free => "Free",
            KnownField::Checkpoint => "Checkpoint",
            KnownField::ExpandSize => "Expandable size",
            KnownField::Frag => "Fragmentation",
            KnownField::Cap => "Capacity",
            KnownField::Dedup => "Dedup ratio",
            KnownField::Health => "Health",
            KnownField::AltRoot => "Alt root",
        }
    }

    fn unit(&self) -> Option<&'static str> {
        match self {
            KnownField::Size
            | KnownField::Alloc
            | KnownField::Free
            | KnownField::Checkpoint
            | KnownField::ExpandSize => Some("B"),
            KnownField::Frag | KnownField::Cap => Some("%"),
            _ => None,
        }
    }

    /// See <https://www.home-assistant.io/integrations/sensor#device-class>
    fn device_class(&self) -> Option<&'static str> {
        match self {
            KnownField::Size
            | KnownField::Alloc
            | KnownField::Free
            | KnownField::Checkpoint
            | KnownField::ExpandSize => Some("data_size"),
            _ => None,
        }
    }

    /// An icon for the sensors that are too generic for a device class
    fn icon(&self) -> Option<&'static str> {
        match self {
            KnownField::Frag => Some("mdi:chart-donut"),
            KnownField::Cap => Some("mdi:gauge"),
            KnownField::Dedup => Some("mdi:content-duplicate"),
            KnownField::Health => Some("mdi:harddisk"),
            _ => None,
        }
    }
}

/// Topic layout shared by every message this daemon sends
pub struct Topics {
    base: String,
    availability: String,
    discovery_prefix: String,
    expire_after: u64,
}

impl Topics {
    /// Lays the topics out under the configured base and discovery prefix
    ///
    /// ## Example
    ///
    /// ```
    /// use mqtt_zpool_monitor::Topics;
    ///
    /// let topics = Topics::new("zpool", "homeassistant", "nas", 600);
    ///
    /// assert_eq!(topics.availability(), "zpool/nas/status");
    /// assert_eq!(topics.state("tank", "size"), "zpool/tank/size/state");
    /// assert_eq!(
    ///     topics.discovery("zpool_tank_size"),
    ///     "homeassistant/sensor/zpool_tank_size/config"
    /// );
    /// ```
    pub fn new(topic_base: &str, discovery_prefix: &str, entity: &str, interval: u64) -> Topics {
        Topics {
            base: topic_base.to_string(),
            availability: format!("{topic_base}/{entity}/status"),
            discovery_prefix: discovery_prefix.to_string(),
            // sensors outlive one missed cycle but not two
            expire_after: interval.saturating_mul(3).div_ceil(2),
        }
    }

    /// Topic carrying `online`/`offline`, with the last will attached to it
    pub fn availability(&self) -> &str {
        &self.availability
    }

    /// Topic carrying the current value of one (pool, field) sensor
    pub fn state(&self, pool: &str, field: &str) -> String {
        format!("{}/{pool}/{field}/state", self.base)
    }

    /// Topic Home Assistant watches for the sensor configuration
    pub fn discovery(&self, entity_id: &str) -> String {
        format!("{}/sensor/{entity_id}/config", self.discovery_prefix)
    }
}

/// Discovery configuration sent to Home Assistant for one sensor
#[derive(Serialize, Debug)]
pub struct DiscoveryPayload {
    /// Name shown in Home Assistant
    name: String,

    /// Stable identity of the sensor, identical across restarts
    unique_id: String,

    /// Where the sensor value is published
    state_topic: String,

    /// Where `online`/`offline` for the whole daemon is published
    availability_topic: String,

    /// Unit used in the report
    #[serde(skip_serializing_if = "Option::is_none")]
    unit_of_measurement: Option<&'static str>,

    /// Device class helps Home Assistant to know how to interpret the
    /// reported values.
    #[serde(skip_serializing_if = "Option::is_none")]
    device_class: Option<&'static str>,

    /// Describes how Home Assistant stores the data. `measurement` for
    /// numeric values, absent for status text
    #[serde(skip_serializing_if = "Option::is_none")]
    state_class: Option<&'static str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    icon: Option<&'static str>,

    /// How long to keep the value when no update arrives, in seconds
    expire_after: u64,

    /// Groups all sensors of one pool under one device card
    device: Device,
}

/// Device sent to Home Assistant, one per pool
#[derive(Serialize, Debug)]
pub struct Device {
    identifiers: Vec<String>,
    name: String,
    manufacturer: &'static str,
    model: &'static str,
}

impl DiscoveryPayload {
    /// Builds the configuration for one (pool, field) sensor
    pub fn new(topics: &Topics, pool: &str, field: &str, value: &Value) -> DiscoveryPayload {
        let known = KnownField::from_key(field);
        let display = match &known {
            Some(meta) => meta.display_name().to_string(),
            None => field.to_case(Case::Title),
        };

        DiscoveryPayload {
            name: format!("{pool} {display}"),
            unique_id: registry::entity_id(pool, field),
            state_topic: topics.state(pool, field),
            availability_topic: topics.availability().to_string(),
            unit_of_measurement: known.as_ref().and_then(KnownField::unit),
            device_class: known.as_ref().and_then(KnownField::device_class),
            state_class: value.is_numeric().then_some("measurement"),
            icon: known.as_ref().and_then(KnownField::icon),
            expire_after: topics.expire_after,
            device: Device {
                identifiers: vec![registry::device_id(pool)],
                name: pool.to_string(),
                manufacturer: "zpool",
                model: "list",
            },
        }
    }
}

impl fmt::Display for DiscoveryPayload {
    /// Formats the payload in JSON format
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let Ok(payload) = serde_json::to_string(&self) else {
            return Err(fmt::Error);
        };
        write!(f, "{payload}")
    }
}
