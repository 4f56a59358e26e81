//! Rate limiter for login attempts
//!
//! Slows down credential stuffing:
//! - 5 failed attempts per email per 15 minutes
//! - 10 login requests per IP address per minute

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::net::IpAddr;
use tokio::sync::RwLock;

const MAX_FAILED_ATTEMPTS: usize = 5;
const FAILED_ATTEMPT_WINDOW_MINUTES: i64 = 15;
const MAX_IP_REQUESTS: usize = 10;
const IP_WINDOW_MINUTES: i64 = 1;

/// Sliding-window login limiter kept in process memory
#[derive(Default)]
pub struct LoginRateLimiter {
    /// Failed login timestamps by normalized email
    email_attempts: RwLock<HashMap<String, Vec<DateTime<Utc>>>>,
    /// Login request timestamps by client IP
    ip_attempts: RwLock<HashMap<IpAddr, Vec<DateTime<Utc>>>>,
}

fn email_key(email: &str) -> String {
    email.trim().to_lowercase()
}

impl LoginRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the email has too many recent failures
    pub async fn is_email_limited(&self, email: &str) -> bool {
        let cutoff = Utc::now() - Duration::minutes(FAILED_ATTEMPT_WINDOW_MINUTES);
        let mut attempts = self.email_attempts.write().await;

        match attempts.get_mut(&email_key(email)) {
            Some(times) => {
                times.retain(|time| *time > cutoff);
                times.len() >= MAX_FAILED_ATTEMPTS
            }
            None => false,
        }
    }

    pub async fn record_failed_attempt(&self, email: &str) {
        let mut attempts = self.email_attempts.write().await;
        attempts.entry(email_key(email)).or_default().push(Utc::now());
    }

    /// Forget failures after a successful login
    pub async fn clear_email_attempts(&self, email: &str) {
        let mut attempts = self.email_attempts.write().await;
        attempts.remove(&email_key(email));
    }

    /// Whether the IP has sent too many login requests recently
    pub async fn is_ip_limited(&self, ip: IpAddr) -> bool {
        let cutoff = Utc::now() - Duration::minutes(IP_WINDOW_MINUTES);
        let mut attempts = self.ip_attempts.write().await;

        match attempts.get_mut(&ip) {
            Some(times) => {
                times.retain(|time| *time > cutoff);
                times.len() >= MAX_IP_REQUESTS
            }
            None => false,
        }
    }

    pub async fn record_ip_request(&self, ip: IpAddr) {
        let mut attempts = self.ip_attempts.write().await;
        attempts.entry(ip).or_default().push(Utc::now());
    }

    /// Drop expired timestamps and empty keys; run periodically
    pub async fn cleanup(&self) {
        let now = Utc::now();
        let email_cutoff = now - Duration::minutes(FAILED_ATTEMPT_WINDOW_MINUTES);
        let ip_cutoff = now - Duration::minutes(IP_WINDOW_MINUTES);

        {
            let mut attempts = self.email_attempts.write().await;
            attempts.retain(|_, times| {
                times.retain(|time| *time > email_cutoff);
                !times.is_empty()
            });
        }

        let mut attempts = self.ip_attempts.write().await;
        attempts.retain(|_, times| {
            times.retain(|time| *time > ip_cutoff);
            !times.is_empty()
        });
    }

    /// Number of emails and IPs currently tracked
    pub async fn tracked(&self) -> (usize, usize) {
        (
            self.email_attempts.read().await.len(),
            self.ip_attempts.read().await.len(),
        )
    }
}
