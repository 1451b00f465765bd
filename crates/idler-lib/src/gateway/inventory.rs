//! Function inventory and gateway info

use super::{async_trait, FunctionInventory, GatewayClient};
use crate::error::RequestError;
use crate::models::{FunctionDescriptor, GatewayInfo};

impl GatewayClient {
    /// Gateway release and SHA, used once at startup as a connectivity check
    pub async fn version(&self) -> Result<GatewayInfo, RequestError> {
        self.get_json("system/info").await
    }
}

#[async_trait]
impl FunctionInventory for GatewayClient {
    async fn list_functions(&self) -> Result<Vec<FunctionDescriptor>, RequestError> {
        self.get_json("system/functions").await
    }

    async fn get_replicas(&self, name: &str) -> Result<FunctionDescriptor, RequestError> {
        self.get_json(&format!("system/function/{name}")).await
    }
}
