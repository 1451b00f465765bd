//! Scale commands, with dry-run suppression

use super::{async_trait, GatewayClient, ScaleExecutor};
use crate::models::ScaleCommand;
use crate::observability::StructuredLogger;

/// What happened to a scale command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleResult {
    /// Dry-run mode: only logged
    DryRun,
    /// Sent; the gateway answered with this status code
    Sent { status: u16 },
    /// Not delivered
    Failed,
}

impl ScaleResult {
    pub fn label(&self) -> &'static str {
        match self {
            ScaleResult::DryRun => "dry_run",
            ScaleResult::Sent { .. } => "sent",
            ScaleResult::Failed => "failed",
        }
    }
}

/// Issues `POST system/scale-function/{name}` unless running dry
pub struct ScaleClient {
    gateway: GatewayClient,
    dry_run: bool,
    logger: StructuredLogger,
}

impl ScaleClient {
    pub fn new(gateway: GatewayClient, dry_run: bool) -> Self {
        let logger = StructuredLogger::new(gateway.base_url().as_str());
        Self {
            gateway,
            dry_run,
            logger,
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}

#[async_trait]
impl ScaleExecutor for ScaleClient {
    async fn send_scale_event(&self, name: &str, replicas: u64) -> ScaleResult {
        if self.dry_run {
            self.logger.log_dry_run_scale(name, replicas);
            return ScaleResult::DryRun;
        }

        let url = match self.gateway.endpoint(&format!("system/scale-function/{name}")) {
            Ok(url) => url,
            Err(e) => {
                self.logger.log_scale_failed(name, replicas, &e.to_string());
                return ScaleResult::Failed;
            }
        };

        let command = ScaleCommand::new(name, replicas);
        let sent = self
            .gateway
            .authorize(self.gateway.client.post(url))
            .json(&command)
            .send()
            .await;

        match sent {
            // Body is ignored
            Ok(response) => {
                let status = response.status().as_u16();
                self.logger.log_scale(name, replicas, status);
                ScaleResult::Sent { status }
            }
            Err(e) => {
                self.logger.log_scale_failed(name, replicas, &e.to_string());
                ScaleResult::Failed
            }
        }
    }
}
