use super::RecordStore;
use crate::error::Result;
use async_trait::async_trait;
use etcd_client::Client;
use log::{debug, info};

/// Record store on the etcd v3 KV API.
///
/// The underlying gRPC channel is shared; each call works on a cheap
/// clone of the KV client, so the store can be used from many tasks.
/// Keys are written rooted at `/`, the layout SkyDNS and the CoreDNS etcd
/// plugin read (and what the etcd v2 keys API produced implicitly).
pub struct EtcdStore {
    client: Client,
}

impl EtcdStore {
    pub async fn connect(endpoint: &str) -> Result<Self> {
        let client = Client::connect([endpoint], None).await?;
        info!("Etcd client connected to: {}", endpoint);
        Ok(Self { client })
    }
}

#[async_trait]
impl RecordStore for EtcdStore {
    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut kv = self.client.kv_client();
        kv.put(storage_key(key), value, None).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut kv = self.client.kv_client();
        let resp = kv.delete(storage_key(key), None).await?;
        if resp.deleted() == 0 {
            debug!("Key {} was already absent", key);
        }
        Ok(())
    }
}

/// `key` with a leading `/`.
fn storage_key(key: &str) -> String {
    if key.starts_with('/') {
        key.to_string()
    } else {
        format!("/{}", key)
    }
}
