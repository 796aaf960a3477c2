use crate::error::ConfigError;
use serde::Deserialize;
use serde_inline_default::serde_inline_default;

/// Contains the configuration for communicating with the MQTT broker
#[serde_inline_default]
#[derive(Deserialize)]
pub struct Mqtt {
    /// Hostname or IP address. Default: localhost
    #[serde_inline_default(String::from("localhost"))]
    pub host: String,

    /// Port of the connection to the broker. Default: 1883
    #[serde_inline_default(1883)]
    pub port: u16,

    /// Username for the connection to the broker. Default: empty
    #[serde(default)]
    pub user: String,

    /// Password for the connection to the broker. Default: empty
    #[serde(default)]
    pub password: String,

    /// Prefix for the discovery topics sent to Home Assistant. Default: homeassistant
    ///
    /// This must match the configuration of the MQTT integration in Home Assistant
    ///
    /// See <https://www.home-assistant.io/integrations/mqtt#discovery-options>
    #[serde_inline_default(String::from("homeassistant"))]
    #[serde(rename = "discovery-prefix")]
    pub discovery_prefix: String,

    /// First level of the state and availability topics. Default: zpool
    #[serde_inline_default(String::from("zpool"))]
    #[serde(rename = "topic-base")]
    pub topic_base: String,

    /// Name of the device entity, used as the MQTT client id. It should be
    /// unique in Home Assistant. Default: machine hostname
    #[serde(default = "hostname")]
    pub entity: String,
}

/// Contains the configuration for reading the pool status
#[serde_inline_default]
#[derive(Deserialize)]
pub struct Zpool {
    /// Path of the zpool binary. Default: /usr/sbin/zpool
    #[serde_inline_default(String::from("/usr/sbin/zpool"))]
    pub command: String,

    /// Delay between two pool reads in seconds. Default: 600 seconds
    #[serde_inline_default(600)]
    pub interval: u64,

    /// How long a single zpool invocation may take before it is killed, in
    /// seconds. Default: 5 seconds
    #[serde_inline_default(5)]
    pub timeout: u64,

    /// Columns requested from `zpool list`, in order. The first column must
    /// be `name`. Default: the full `zpool list` column set
    #[serde_inline_default(default_columns())]
    pub columns: Vec<String>,
}

/// Contains all the configuration for `mqtt-zpool-monitor`
#[serde_inline_default]
#[derive(Deserialize)]
pub struct Configuration {
    /// Contains the configuration for communicating with the MQTT broker
    pub mqtt: Mqtt,

    /// Contains the configuration for reading the pool status
    pub zpool: Zpool,

    /// Sets the verbosity of the logs.
    ///  * 1 => Error
    ///  * 2 => Warning
    ///  * 3 => Info
    ///  * 4 => Debug
    ///  * 5 => Trace
    #[serde_inline_default(2)]
    #[serde(rename = "log-verbosity")]
    pub log_verbosity: usize,
}

fn hostname() -> String {
    sysinfo::System::host_name().expect("Cannot read hostname")
}

/// Column set of a plain `zpool list`, matching zfs 2.x
fn default_columns() -> Vec<String> {
    [
        "name", "size", "alloc", "free", "ckpoint", "expandsz", "frag", "cap", "dedup", "health",
        "altroot",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Configuration {
    /// Load the configuration from a file
    ///
    /// ## Example
    ///
    /// ```
    /// use mqtt_zpool_monitor::Configuration;
    ///
    /// let config = Configuration::load("conf/mqtt-zpool-monitor.conf").expect("Cannot load configuration");
    ///
    /// assert_eq!(config.mqtt.host, "localhost");
    /// ```
    pub fn load(path: &str) -> Result<Configuration, ConfigError> {
        let config: Configuration = toml::from_str(std::fs::read_to_string(path)?.as_str())?;

        if config.zpool.columns.first().map(String::as_str) != Some("name") {
            return Err(ConfigError::ColumnsWithoutName);
        }

        Ok(config)
    }
}
