//! HTTP health probe.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::jsonrpc::JsonRpcClient;
use crate::domain::{RpcError, RuntimeError};
use crate::ports::HealthProbe;

const HEALTH_PATH: &str = "/ext/health";

#[derive(Debug, Deserialize)]
struct HealthReply {
    healthy: bool,
}

/// Calls `health.health` on `<uri>/ext/health`.
#[derive(Debug, Clone)]
pub struct HttpHealthProbe {
    client: Client,
}

impl HttpHealthProbe {
    pub fn new(timeout: Duration) -> Result<Self, RuntimeError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(2))
            .build()
            .map_err(|e| RuntimeError::HealthTransport(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn check(&self, uri: &str) -> Result<bool, RuntimeError> {
        let endpoint = format!("{}{HEALTH_PATH}", uri.trim_end_matches('/'));
        let rpc = JsonRpcClient::with_client(self.client.clone(), endpoint);
        match rpc.call::<_, HealthReply>("health.health", json!({})).await {
            Ok(reply) => Ok(reply.healthy),
            // Still booting
            Err(RpcError::Connection(_)) => Ok(false),
            Err(RpcError::Parse(reason)) => Err(RuntimeError::MalformedHealth(reason)),
            Err(e) => Err(RuntimeError::HealthTransport(e.to_string())),
        }
    }
}
