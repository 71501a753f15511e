use async_trait::async_trait;
use std::net::Ipv4Addr;
use tokio::sync::Mutex;

use crate::Result;
use crate::traits::PublicIpLookup;

/// Explicit cache handle for the public IP address
///
/// The first [`get`](Self::get) performs the lookup; later calls return the
/// cached answer until [`refresh`](Self::refresh) or [`clear`](Self::clear).
/// The lock is held across the lookup, so concurrent callers trigger at most
/// one request.
pub struct PublicIpCache {
    lookup: Box<dyn PublicIpLookup>,
    cached: Mutex<Option<Ipv4Addr>>,
}

impl PublicIpCache {
    pub fn new(lookup: Box<dyn PublicIpLookup>) -> Self {
        Self {
            lookup,
            cached: Mutex::new(None),
        }
    }

    pub async fn get(&self) -> Result<Ipv4Addr> {
        let mut cached = self.cached.lock().await;
        if let Some(ip) = *cached {
            tracing::trace!("Public IP cache hit: {}", ip);
            return Ok(ip);
        }
        let ip = self.lookup.current_ipv4().await?;
        tracing::debug!("Public IP resolved: {}", ip);
        *cached = Some(ip);
        Ok(ip)
    }

    /// Discard the cached value and look the address up again
    pub async fn refresh(&self) -> Result<Ipv4Addr> {
        let mut cached = self.cached.lock().await;
        let ip = self.lookup.current_ipv4().await?;
        *cached = Some(ip);
        Ok(ip)
    }

    pub async fn clear(&self) {
        *self.cached.lock().await = None;
    }
}

#[async_trait]
impl PublicIpLookup for PublicIpCache {
    async fn current_ipv4(&self) -> Result<Ipv4Addr> {
        self.get().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLookup {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl PublicIpLookup for CountingLookup {
        async fn current_ipv4(&self) -> Result<Ipv4Addr> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Ipv4Addr::new(203, 0, 113, n as u8))
        }
    }

    #[tokio::test]
    async fn get_refresh_clear() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = PublicIpCache::new(Box::new(CountingLookup {
            calls: calls.clone(),
        }));

        assert_eq!(cache.get().await.unwrap(), Ipv4Addr::new(203, 0, 113, 0));
        assert_eq!(cache.get().await.unwrap(), Ipv4Addr::new(203, 0, 113, 0));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert_eq!(cache.refresh().await.unwrap(), Ipv4Addr::new(203, 0, 113, 1));
        assert_eq!(cache.get().await.unwrap(), Ipv4Addr::new(203, 0, 113, 1));

        cache.clear().await;
        assert_eq!(cache.current_ipv4().await.unwrap(), Ipv4Addr::new(203, 0, 113, 2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
