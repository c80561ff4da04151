// src/config.rs
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use log::warn;

use crate::writer::RetryPolicy;

const DEFAULT_PORT: u16 = 3500;
const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

#[derive(Debug, Clone)]
pub struct Config {
    /// WebSocket listen address (`NFC_BIND_ADDR`)
    pub bind_address: SocketAddr,
    /// `NFC_CAPABILITY_READ_ATTEMPTS` / `NFC_PAGE_WRITE_ATTEMPTS`
    pub retry_policy: RetryPolicy,
    /// PC/SC status change wait (`NFC_POLL_INTERVAL_MS`)
    pub poll_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            retry_policy: RetryPolicy::default(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let retry = defaults.retry_policy;

        Self {
            bind_address: parse_or(&lookup, "NFC_BIND_ADDR", defaults.bind_address),
            retry_policy: RetryPolicy {
                capability_read_attempts: parse_or(
                    &lookup,
                    "NFC_CAPABILITY_READ_ATTEMPTS",
                    retry.capability_read_attempts,
                )
                .max(1),
                page_write_attempts: parse_or(
                    &lookup,
                    "NFC_PAGE_WRITE_ATTEMPTS",
                    retry.page_write_attempts,
                )
                .max(1),
            },
            poll_interval: Duration::from_millis(parse_or(
                &lookup,
                "NFC_POLL_INTERVAL_MS",
                DEFAULT_POLL_INTERVAL_MS,
            )),
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("ignoring invalid {key}={raw:?}, using {default}");
            default
        }),
        None => default,
    }
}
