use crate::error::{ParseError, SourceError};
use log::debug;
use std::collections::BTreeMap;
use std::fmt;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

/// Marker zpool prints for a column that has no value on this pool
const UNSET: &str = "-";

/// One value reported for a pool
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn is_numeric(&self) -> bool {
        !matches!(self, Value::Text(_))
    }
}

impl fmt::Display for Value {
    /// Formats the value the way it is published on the state topic
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Integer(value) => write!(f, "{value}"),
            Value::Float(value) => write!(f, "{value}"),
            Value::Text(value) => f.write_str(value),
        }
    }
}

/// Status of one pool for one read cycle
///
/// The fields are an open map keyed by column name, so a column added by a
/// newer zfs or requested through the configuration shows up as a sensor
/// without a code change. Columns reported as unset (`-`) are absent from the
/// map, which is why two pools of the same system can expose different field
/// sets.
#[derive(Debug, Clone, PartialEq)]
pub struct Pool {
    pub name: String,
    pub fields: BTreeMap<String, Value>,
}

/// Where the raw pool status text comes from
///
/// The real implementation runs the zpool binary; tests substitute canned
/// output.
#[allow(async_fn_in_trait)]
pub trait PoolStatus {
    /// Performs one pool-status read and returns the raw text
    async fn fetch(&self) -> Result<String, SourceError>;
}

/// Reads the pool status by running `zpool list -Hp`
pub struct ZpoolCommand {
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl ZpoolCommand {
    /// Prepares the command line for the configured binary and column set
    pub fn new(command: &str, columns: &[String], timeout: Duration) -> ZpoolCommand {
        ZpoolCommand {
            command: command.to_string(),
            args: vec![
                String::from("list"),
                String::from("-Hp"),
                String::from("-o"),
                columns.join(","),
            ],
            timeout,
        }
    }
}

impl PoolStatus for ZpoolCommand {
    async fn fetch(&self) -> Result<String, SourceError> {
        debug!("Running {} {}", self.command, self.args.join(" "));

        let child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(SourceError::Spawn)?;

        // kill_on_drop reaps the child if the timeout wins the race
        let output = match timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output.map_err(SourceError::Spawn)?,
            Err(_) => return Err(SourceError::Timeout(self.timeout)),
        };

        if !output.status.success() {
            return Err(SourceError::Failed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8(output.stdout)?)
    }
}

/// Parses the output of one `zpool list -Hp` invocation
///
/// `columns` is the column set the command was asked for, name first. Each
/// non-empty line must carry at least that many values; extra trailing
/// columns are kept under `colN` keys so they still surface as sensors.
/// An empty output is a valid read of zero pools.
pub fn parse_pools(raw: &str, columns: &[String]) -> Result<Vec<Pool>, ParseError> {
    let mut pools: Vec<Pool> = Vec::new();

    for (index, line) in raw.lines().enumerate() {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        let number = index + 1;

        // -H separates with tabs; also accept aligned output pasted by hand
        let parts: Vec<&str> = if line.contains('\t') {
            line.split('\t').map(str::trim).collect()
        } else {
            line.split_whitespace().collect()
        };

        if parts.len() < columns.len() {
            return Err(ParseError::ColumnCount {
                line: number,
                expected: columns.len(),
                found: parts.len(),
            });
        }

        let name = parts[0];
        if name.is_empty() {
            return Err(ParseError::EmptyName { line: number });
        }
        if pools.iter().any(|pool| pool.name == name) {
            return Err(ParseError::DuplicatePool {
                line: number,
                name: name.to_string(),
            });
        }

        let mut fields = BTreeMap::new();
        for (position, part) in parts.iter().enumerate().skip(1) {
            if *part == UNSET || part.is_empty() {
                continue;
            }
            let key = match columns.get(position) {
                Some(column) => column.clone(),
                None => format!("col{}", position + 1),
            };
            fields.insert(key.clone(), normalize(&key, part));
        }

        pools.push(Pool {
            name: name.to_string(),
            fields,
        });
    }

    Ok(pools)
}

/// Converts a raw column value into a typed one
///
/// Values that fit neither shape are kept verbatim, never dropped.
fn normalize(key: &str, raw: &str) -> Value {
    // dedup is printed as a ratio, sometimes with a trailing multiplier sign
    let raw = if key == "dedup" {
        raw.trim_end_matches(['x', 'X'])
    } else {
        raw
    };

    if let Ok(value) = raw.parse::<i64>() {
        return Value::Integer(value);
    }
    if let Ok(value) = raw.parse::<f64>() {
        return Value::Float(value);
    }
    // tolerate a locale decimal comma, e.g. "1,00"
    if raw.matches(',').count() == 1
        && !raw.contains('.')
        && let Ok(value) = raw.replace(',', ".").parse::<f64>()
    {
        return Value::Float(value);
    }

    Value::Text(raw.to_string())
}
