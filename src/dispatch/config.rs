use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Hard cap on one outbound attempt, connect through body read.
    pub timeout_secs: u64,
    /// Stored response bodies are cut to this many characters.
    pub response_body_limit: usize,
}

impl DeliveryConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("RELAY_DELIVERY_TIMEOUT_SECS")
            && let Ok(parsed) = value.parse::<u64>()
        {
            config.timeout_secs = parsed.max(1);
        }
        if let Ok(value) = std::env::var("RELAY_RESPONSE_BODY_LIMIT")
            && let Ok(parsed) = value.parse::<usize>()
        {
            config.response_body_limit = parsed;
        }

        config
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            response_body_limit: 1000,
        }
    }
}
