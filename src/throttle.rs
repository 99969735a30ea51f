use std::{convert::Infallible, net::SocketAddr, num::NonZeroU32};

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::request::Parts,
};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};

use crate::error::AppError;

/// Per-client request budget for the movie read endpoints. Keys are client
/// addresses; state lives in process memory and resets on restart.
pub struct ClientThrottle {
    limiter: DefaultKeyedRateLimiter<String>,
}

impl ClientThrottle {
    pub fn new(per_minute: u32) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(per_minute.max(1)).unwrap());
        Self { limiter: RateLimiter::keyed(quota) }
    }

    pub fn check(&self, client: &str) -> Result<(), AppError> {
        if self.limiter.check_key(&client.to_string()).is_err() {
            tracing::debug!(client = %client, "request throttled");
            return Err(AppError::RateLimited);
        }
        Ok(())
    }
}

/// Client identity used as the throttle key: first hop of X-Forwarded-For
/// when present, otherwise the peer socket address.
pub struct ClientAddr(pub String);

impl<S> FromRequestParts<S> for ClientAddr
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(forwarded) =
            parts.headers.get("x-forwarded-for").and_then(|v| v.to_str().ok())
        {
            if let Some(first) = forwarded.split(',').next() {
                let first = first.trim();
                if !first.is_empty() {
                    return Ok(ClientAddr(first.to_string()));
                }
            }
        }

        let addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Ok(ClientAddr(addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denies_after_budget_exhausted() {
        let throttle = ClientThrottle::new(2);

        assert!(throttle.check("10.0.0.1").is_ok());
        assert!(throttle.check("10.0.0.1").is_ok());
        assert!(matches!(throttle.check("10.0.0.1"), Err(AppError::RateLimited)));
    }

    #[test]
    fn budgets_are_per_client() {
        let throttle = ClientThrottle::new(1);

        assert!(throttle.check("10.0.0.1").is_ok());
        assert!(throttle.check("10.0.0.2").is_ok());
        assert!(throttle.check("10.0.0.1").is_err());
    }

    #[test]
    fn readmits_once_the_window_passes() {
        // A one-per-second quota replenishes a cell every second.
        let throttle = ClientThrottle {
            limiter: RateLimiter::keyed(Quota::per_second(NonZeroU32::new(1).unwrap())),
        };

        assert!(throttle.check("10.0.0.1").is_ok());
        assert!(throttle.check("10.0.0.1").is_err());

        std::thread::sleep(std::time::Duration::from_millis(1_050));
        assert!(throttle.check("10.0.0.1").is_ok());
    }
}
