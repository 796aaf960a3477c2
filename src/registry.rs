use std::collections::HashSet;

/// Stable identity of one (pool, field) sensor
///
/// The identity doubles as the Home Assistant `unique_id` and the discovery
/// topic segment, so it must come out identical on every run for the hub to
/// keep its entity history attached.
///
/// ## Example
///
/// ```
/// use mqtt_zpool_monitor::registry;
///
/// assert_eq!(registry::entity_id("tank", "size"), "zpool_tank_size");
/// assert_eq!(registry::entity_id("My Pool", "health"), "zpool_my_pool_health");
/// ```
pub fn entity_id(pool: &str, field: &str) -> String {
    format!("zpool_{}_{}", slug(pool), slug(field))
}

/// Identity of the device card grouping every sensor of one pool
///
/// ## Example
///
/// ```
/// use mqtt_zpool_monitor::registry;
///
/// assert_eq!(registry::device_id("tank"), "zpool_tank");
/// ```
pub fn device_id(pool: &str) -> String {
    format!("zpool_{}", slug(pool))
}

/// Lowercases and maps every run of non-alphanumeric characters to a single
/// underscore, which keeps the result safe inside an MQTT topic level
fn slug(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut gap = false;

    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            if gap && !out.is_empty() {
                out.push('_');
            }
            gap = false;
            out.push(c.to_ascii_lowercase());
        } else {
            gap = true;
        }
    }

    out
}

/// Remembers which sensors were already announced to Home Assistant during
/// the current broker session
///
/// Discovery messages are retained by the broker, so one announcement per
/// session is enough. The set starts over on every reconnect: if the broker
/// kept its retained state the repeat is cheap, and if it lost it the repeat
/// is what brings the entities back.
///
/// ## Example
///
/// ```
/// use mqtt_zpool_monitor::registry::EntityRegistry;
///
/// let mut registry = EntityRegistry::new();
/// let id = mqtt_zpool_monitor::registry::entity_id("tank", "size");
///
/// assert!(!registry.is_announced(&id));
/// registry.mark_announced(id.clone());
/// assert!(registry.is_announced(&id));
///
/// registry.reset_session();
/// assert!(!registry.is_announced(&id));
/// ```
#[derive(Debug, Default)]
pub struct EntityRegistry {
    announced: HashSet<String>,
}

impl EntityRegistry {
    pub fn new() -> EntityRegistry {
        Default::default()
    }

    /// Returns `true` if the identity was announced in this session
    pub fn is_announced(&self, identity: &str) -> bool {
        self.announced.contains(identity)
    }

    /// Records that the discovery config for the identity went out
    pub fn mark_announced(&mut self, identity: String) {
        self.announced.insert(identity);
    }

    /// Forgets every announcement. Called once per successful (re)connect,
    /// before anything is published on the new session.
    pub fn reset_session(&mut self) {
        self.announced.clear();
    }
}
