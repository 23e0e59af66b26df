use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    /// Shared secret the payment provider signs webhook payloads with.
    pub webhook_secret: String,
    pub gateway_url: String,
    pub gateway_key: String,
    /// Grace window before the sweeper cancels an unpaid PENDING booking.
    pub sweep_grace_minutes: i64,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let webhook_secret = env::var("PAYMENT_WEBHOOK_SECRET")?;
        let gateway_url = env::var("PAYMENT_GATEWAY_URL")
            .unwrap_or_else(|_| "https://api.stripe.com".to_string());
        let gateway_key = env::var("PAYMENT_GATEWAY_KEY")?;
        let sweep_grace_minutes = env::var("SWEEP_GRACE_MINUTES")
            .ok()
            .and_then(|m| m.parse::<i64>().ok())
            .unwrap_or(15);
        Ok(Self {
            database_url,
            host,
            port,
            webhook_secret,
            gateway_url,
            gateway_key,
            sweep_grace_minutes,
        })
    }
}
