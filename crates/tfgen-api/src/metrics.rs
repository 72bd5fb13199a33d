//! Prometheus registry for the `/metrics` endpoint.

use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, Registry, TextEncoder};

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static CHAT_REQUESTS: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new("tfgen_chat_requests_total", "Chat turns processed").unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

pub static DEPLOYMENT_PLANS: Lazy<IntCounter> = Lazy::new(|| {
    let counter =
        IntCounter::new("tfgen_deployment_plans_total", "Deployment plans started").unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

pub fn encode() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).to_string())
}
