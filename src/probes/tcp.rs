use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;

use super::{Probe, ProbeVerdict};

/// Healthy iff a TCP connect succeeds within the timeout
pub struct TcpProbe {
    address: String,
}

impl TcpProbe {
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
        }
    }
}

#[async_trait]
impl Probe for TcpProbe {
    fn kind(&self) -> &'static str {
        "tcp"
    }

    async fn probe(&self, timeout: Duration) -> ProbeVerdict {
        match tokio::time::timeout(timeout, TcpStream::connect(&self.address)).await {
            Ok(Ok(_stream)) => ProbeVerdict::healthy(),
            Ok(Err(e)) => ProbeVerdict::unhealthy(format!("connect to {} failed: {}", self.address, e)),
            Err(_) => ProbeVerdict::unknown(format!(
                "connect to {} timed out after {}ms",
                self.address,
                timeout.as_millis()
            )),
        }
    }
}
