use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use super::host::RemoteHost;
use super::session::{HostTarget, SessionFactory};
use crate::error::Result;

/// Keeps at most one connected [`RemoteHost`] per `(address, os_user)`.
pub struct HostPool {
    factory: Arc<dyn SessionFactory>,
    hosts: Mutex<HashMap<(String, String), Arc<RemoteHost>>>,
    secrets: Vec<String>,
}

impl HostPool {
    pub fn new(factory: Arc<dyn SessionFactory>) -> Self {
        Self {
            factory,
            hosts: Mutex::new(HashMap::new()),
            secrets: Vec::new(),
        }
    }

    /// Secrets registered on every host this pool hands out.
    pub fn with_secrets<I, S>(mut self, secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.secrets.extend(secrets.into_iter().map(Into::into));
        self
    }

    pub fn factory(&self) -> Arc<dyn SessionFactory> {
        Arc::clone(&self.factory)
    }

    /// Return the connected host for `target`, opening it on first use.
    pub async fn get(&self, target: &HostTarget) -> Result<Arc<RemoteHost>> {
        let mut hosts = self.hosts.lock().await;
        if let Some(host) = hosts.get(&target.pair()) {
            if host.target().ssh_key_path == target.ssh_key_path {
                return Ok(Arc::clone(host));
            }
            tracing::warn!(host = %target, "Key changed for pooled host, reconnecting");
            host.close().await?;
        }

        let host = RemoteHost::new(target.clone(), Arc::clone(&self.factory));
        for secret in &self.secrets {
            host.register_secret(secret);
        }
        host.connect().await?;
        let host = Arc::new(host);
        hosts.insert(target.pair(), Arc::clone(&host));
        Ok(host)
    }

    /// Close every session. Errors are logged; the first one is returned.
    pub async fn close_all(&self) -> Result<()> {
        let mut hosts = self.hosts.lock().await;
        let mut first_err = None;
        for (_, host) in hosts.drain() {
            if let Err(e) = host.close().await {
                tracing::warn!(host = %host.target(), error = %e, "Failed to close session");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub async fn len(&self) -> usize {
        self.hosts.lock().await.len()
    }
}
