use mqtt_zpool_monitor::configuration::Configuration;
use mqtt_zpool_monitor::daemon::plan_cycle;
use mqtt_zpool_monitor::error::SourceError;
use mqtt_zpool_monitor::registry::EntityRegistry;
use mqtt_zpool_monitor::zpool::{PoolStatus, parse_pools};
use mqtt_zpool_monitor::{Topics, Value};
use serde_json::Value as Json;
use std::error::Error;

/// Stands in for the zpool binary
struct FakeStatus(Result<&'static str, fn() -> SourceError>);

impl PoolStatus for FakeStatus {
    async fn fetch(&self) -> Result<String, SourceError> {
        match &self.0 {
            Ok(raw) => Ok(raw.to_string()),
            Err(make) => Err(make()),
        }
    }
}

fn topics(conf: &Configuration) -> Topics {
    Topics::new(
        &conf.mqtt.topic_base,
        &conf.mqtt.discovery_prefix,
        &conf.mqtt.entity,
        conf.zpool.interval,
    )
}

const FULL_LIST: &str = "tank\t996432412672\t120259084288\t876173328384\t-\t-\t4\t12\t1.00x\tONLINE\t-\n\
    backup\t498216206336\t249108103168\t249108103168\t-\t-\t11\t50\t1.00x\tDEGRADED\t-\n";

/// A short column set with an unset marker: one pool, two sensors
#[tokio::test]
async fn test_first_cycle_announces_and_reports() -> Result<(), Box<dyn Error>> {
    let mut conf = Configuration::load("conf/mqtt-zpool-monitor.conf")?;
    conf.mqtt.entity = String::from("test_entity");
    conf.zpool.columns = ["name", "size", "ckpoint", "health"]
        .into_iter()
        .map(String::from)
        .collect();

    let source = FakeStatus(Ok("pool1\t1.2G\t-\tONLINE\n"));
    let raw = source.fetch().await?;
    let pools = parse_pools(&raw, &conf.zpool.columns)?;

    assert_eq!(pools.len(), 1);
    assert_eq!(pools[0].name, "pool1");
    assert_eq!(pools[0].fields["size"], Value::Text(String::from("1.2G")));
    assert_eq!(
        pools[0].fields["health"],
        Value::Text(String::from("ONLINE"))
    );
    // the unset checkpoint column does not become a sensor
    assert_eq!(pools[0].fields.len(), 2);

    let mut registry = EntityRegistry::new();
    let topics = topics(&conf);

    let plan = plan_cycle(&registry, &pools, &topics);
    assert_eq!(plan.discovery.len(), 2);
    assert_eq!(plan.state.len(), 2);

    let health_state = &plan.state[0];
    assert_eq!(health_state.topic, "zpool/pool1/health/state");
    assert_eq!(health_state.payload, "ONLINE");
    assert_eq!(plan.state[1].topic, "zpool/pool1/size/state");
    assert_eq!(plan.state[1].payload, "1.2G");

    // discovery goes to the shared prefix and points back at the state topic
    let (identity, config) = &plan.discovery[0];
    assert_eq!(identity, "zpool_pool1_health");
    assert_eq!(
        config.topic,
        "homeassistant/sensor/zpool_pool1_health/config"
    );
    let json: Json = serde_json::from_str(&config.payload)?;
    assert_eq!(json["unique_id"], "zpool_pool1_health");
    assert_eq!(json["state_topic"], "zpool/pool1/health/state");
    assert_eq!(json["availability_topic"], "zpool/test_entity/status");
    assert_eq!(json["device"]["identifiers"][0], "zpool_pool1");

    // second cycle with an unchanged field set: no discovery traffic
    for (identity, _) in plan.discovery {
        registry.mark_announced(identity);
    }
    let plan = plan_cycle(&registry, &pools, &topics);
    assert!(plan.discovery.is_empty());
    assert_eq!(plan.state.len(), 2);

    Ok(())
}

/// Discovery is re-announced exactly once per identity after a reconnect
#[test]
fn test_reconnect_republishes_discovery_once() -> Result<(), Box<dyn Error>> {
    let conf = Configuration::load("conf/mqtt-zpool-monitor.conf")?;
    let topics = topics(&conf);
    let pools = parse_pools(FULL_LIST, &conf.zpool.columns)?;

    let mut registry = EntityRegistry::new();

    let first = plan_cycle(&registry, &pools, &topics);
    // two pools with 7 set fields each
    assert_eq!(first.discovery.len(), 14);
    for (identity, _) in &first.discovery {
        registry.mark_announced(identity.clone());
    }
    assert!(plan_cycle(&registry, &pools, &topics).discovery.is_empty());

    // the broker went away and came back
    registry.reset_session();

    let second = plan_cycle(&registry, &pools, &topics);
    assert_eq!(second.discovery.len(), first.discovery.len());
    for ((first_id, _), (second_id, _)) in first.discovery.iter().zip(&second.discovery) {
        // identities are stable across sessions
        assert_eq!(first_id, second_id);
    }

    for (identity, _) in &second.discovery {
        registry.mark_announced(identity.clone());
    }
    assert!(plan_cycle(&registry, &pools, &topics).discovery.is_empty());

    Ok(())
}

/// Pools with different field sets each get their own sensors and device
#[test]
fn test_heterogeneous_pools_get_separate_devices() -> Result<(), Box<dyn Error>> {
    let conf = Configuration::load("conf/mqtt-zpool-monitor.conf")?;
    let topics = topics(&conf);

    let raw = "tank\t10\t4\t6\t-\t-\t1\t40\t1.00\tONLINE\t-\n\
        old\t10\t4\t6\t-\t-\t1\t40\t1.00\tDEGRADED\t/mnt\n";
    let pools = parse_pools(raw, &conf.zpool.columns)?;

    let registry = EntityRegistry::new();
    let plan = plan_cycle(&registry, &pools, &topics);

    // the altroot sensor exists for the degraded pool only
    let altroots: Vec<&str> = plan
        .state
        .iter()
        .filter(|message| message.topic.ends_with("/altroot/state"))
        .map(|message| message.topic.as_str())
        .collect();
    assert_eq!(altroots, ["zpool/old/altroot/state"]);

    let devices: Vec<String> = plan
        .discovery
        .iter()
        .map(|(_, message)| {
            let json: Json = serde_json::from_str(&message.payload)?;
            Ok::<String, serde_json::Error>(json["device"]["identifiers"][0].to_string())
        })
        .collect::<Result<_, _>>()?;
    assert!(devices.contains(&String::from("\"zpool_tank\"")));
    assert!(devices.contains(&String::from("\"zpool_old\"")));

    Ok(())
}

/// An empty read is a valid cycle of zero pools and publishes nothing
#[test]
fn test_empty_read_publishes_nothing() -> Result<(), Box<dyn Error>> {
    let conf = Configuration::load("conf/mqtt-zpool-monitor.conf")?;
    let topics = topics(&conf);

    let pools = parse_pools("", &conf.zpool.columns)?;
    assert!(pools.is_empty());

    let registry = EntityRegistry::new();
    let plan = plan_cycle(&registry, &pools, &topics);
    assert!(plan.discovery.is_empty());
    assert!(plan.state.is_empty());

    Ok(())
}

/// A failing source surfaces as an error, not as an empty pool set
#[tokio::test]
async fn test_failing_source_is_an_error() {
    let source = FakeStatus(Err(|| {
        SourceError::Timeout(std::time::Duration::from_secs(5))
    }));

    let result = source.fetch().await;
    assert!(matches!(result, Err(SourceError::Timeout(_))));
}
