/// Chat hub configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string. When unset, presence is kept in memory.
    pub database_url: Option<String>,
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Capacity of each connection's outbound buffer. A client whose buffer is
    /// full when a broadcast arrives is dropped.
    pub client_buffer: usize,
    /// Also mark a user offline when the hub drops them as a slow consumer.
    pub offline_on_evict: bool,
    /// Largest inbound frame accepted from a client, in bytes.
    pub max_message_bytes: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Every variable is optional. A value that fails to parse is logged and
    /// replaced by the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            database_url: lookup("DATABASE_URL").filter(|s| !s.is_empty()),
            port: parsed_var(&lookup, "PORT", str::parse::<u16>).unwrap_or(defaults.port),
            client_buffer: parsed_var(&lookup, "HUB_CLIENT_BUFFER", str::parse::<usize>)
                .unwrap_or(defaults.client_buffer)
                .max(1),
            offline_on_evict: parsed_var(&lookup, "HUB_OFFLINE_ON_EVICT", parse_flag)
                .unwrap_or(defaults.offline_on_evict),
            max_message_bytes: parsed_var(&lookup, "MAX_MESSAGE_BYTES", str::parse::<usize>)
                .unwrap_or(defaults.max_message_bytes),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            port: 4010,
            client_buffer: 1,
            offline_on_evict: false,
            max_message_bytes: 64 * 1024,
        }
    }
}

/// Parse a variable if it is set. Unset yields `None` quietly; a bad value
/// yields `None` with a warning.
fn parsed_var<T, E: std::fmt::Display>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    parse: impl Fn(&str) -> Result<T, E>,
) -> Option<T> {
    let raw = lookup(name)?;
    match parse(raw.trim()) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(var = name, value = %raw, %err, "invalid value, using default");
            None
        }
    }
}

fn parse_flag(value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(format!("expected a boolean, got {value:?}")),
    }
}
