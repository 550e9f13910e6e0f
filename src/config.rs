use anyhow::{Context, Result, bail};
use std::str::FromStr;
use std::time::Duration;

/// The fixed payload written to every client.
pub const RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\n\r\nhello world\r\n";

pub const DEFAULT_LISTEN: &str = "0.0.0.0:1729";
pub const DEFAULT_POOL_SIZE: usize = 10;
pub const DEFAULT_MAX_THREADS: usize = 10;
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(10);
pub const DEFAULT_BUFFER_SIZE: usize = 1024;
pub const DEFAULT_PROCESSING_DELAY: Duration = Duration::from_secs(1);

const ENV_PREFIX: &str = "TURNSTILE_";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: String,
    /// Number of workers, and so the cap on connections being processed at once.
    pub pool_size: usize,
    /// Admission gate capacity: dispatch tasks allowed between accept and enqueue.
    pub max_threads: usize,
    /// Job queue capacity; defaults to `pool_size`.
    pub queue_capacity: usize,
    /// Shared read/write deadline, measured from the moment a worker picks the
    /// connection up.
    pub deadline: Duration,
    pub buffer_size: usize,
    pub processing_delay: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            pool_size: DEFAULT_POOL_SIZE,
            max_threads: DEFAULT_MAX_THREADS,
            queue_capacity: DEFAULT_POOL_SIZE,
            deadline: DEFAULT_DEADLINE,
            buffer_size: DEFAULT_BUFFER_SIZE,
            processing_delay: DEFAULT_PROCESSING_DELAY,
        }
    }
}

impl ServerConfig {
    /// Defaults, overridden by `TURNSTILE_*` variables and finally by the
    /// first command line argument for the listen address.
    pub fn from_env() -> Result<Self> {
        let listen = std::env::args().nth(1);

        Self::from_lookup(listen, |key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(listen: Option<String>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup(&format!("{ENV_PREFIX}LISTEN")) {
            config.listen = addr;
        }
        if let Some(addr) = listen {
            config.listen = addr;
        }

        if let Some(n) = parse_var::<usize, _>(&lookup, "POOL_SIZE")? {
            config.pool_size = n;
            config.queue_capacity = n;
        }
        if let Some(n) = parse_var::<usize, _>(&lookup, "MAX_THREADS")? {
            config.max_threads = n;
        }
        if let Some(n) = parse_var::<usize, _>(&lookup, "QUEUE_CAPACITY")? {
            config.queue_capacity = n;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "DEADLINE_MS")? {
            config.deadline = Duration::from_millis(ms);
        }
        if let Some(n) = parse_var::<usize, _>(&lookup, "BUFFER_SIZE")? {
            config.buffer_size = n;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "PROCESSING_DELAY_MS")? {
            config.processing_delay = Duration::from_millis(ms);
        }

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("pool_size", self.pool_size),
            ("max_threads", self.max_threads),
            ("queue_capacity", self.queue_capacity),
            ("buffer_size", self.buffer_size),
        ] {
            if value == 0 {
                bail!("{name} must be greater than zero");
            }
        }

        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    let key = format!("{ENV_PREFIX}{name}");

    match lookup(&key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = ServerConfig::from_lookup(None, lookup(&[])).unwrap();

        assert_eq!(config.listen, "0.0.0.0:1729");
        assert_eq!(config.pool_size, 10);
        assert_eq!(config.max_threads, 10);
        assert_eq!(config.queue_capacity, 10);
        assert_eq!(config.deadline, Duration::from_secs(10));
        assert_eq!(config.buffer_size, 1024);
        assert_eq!(config.processing_delay, Duration::from_secs(1));
    }

    #[test]
    fn queue_follows_pool_size_unless_set() {
        let config =
            ServerConfig::from_lookup(None, lookup(&[("TURNSTILE_POOL_SIZE", "4")])).unwrap();
        assert_eq!(config.queue_capacity, 4);

        let config = ServerConfig::from_lookup(
            None,
            lookup(&[
                ("TURNSTILE_POOL_SIZE", "4"),
                ("TURNSTILE_QUEUE_CAPACITY", "2"),
            ]),
        )
        .unwrap();
        assert_eq!(config.pool_size, 4);
        assert_eq!(config.queue_capacity, 2);
    }

    #[test]
    fn argument_wins_over_env() {
        let config = ServerConfig::from_lookup(
            Some("127.0.0.1:9000".into()),
            lookup(&[("TURNSTILE_LISTEN", "127.0.0.1:8000")]),
        )
        .unwrap();

        assert_eq!(config.listen, "127.0.0.1:9000");
    }

    #[test]
    fn bad_values_are_rejected() {
        let err = ServerConfig::from_lookup(None, lookup(&[("TURNSTILE_DEADLINE_MS", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("TURNSTILE_DEADLINE_MS"));

        let err = ServerConfig::from_lookup(None, lookup(&[("TURNSTILE_MAX_THREADS", "0")]))
            .unwrap_err();
        assert!(err.to_string().contains("max_threads"));
    }
}
