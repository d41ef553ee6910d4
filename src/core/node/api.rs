use reqwest;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use super::models::Constants;
use super::models::HeaderInfo;
use super::models::RawBakingRight;
use super::models::RawDelegate;
use super::models::RawEndorsingRight;
use super::models::StringMutez;
use super::NodeError;
use crate::core::types::Address;
use crate::core::types::CycleIndex;
use crate::core::types::Level;
use crate::core::types::Mutez;
use crate::core::types::RawBlock;

#[derive(Debug, Clone)]
pub struct NodeAPI {
    url: String,
    qry_head_header: String,
}

impl NodeAPI {
    pub fn new(url: &str) -> Self {
        tracing::event!(tracing::Level::INFO, url);
        Self {
            url: String::from(url),
            qry_head_header: format!("{}/chains/main/blocks/head/header", url),
        }
    }

    /// Get header of current head (trimmed down version)
    pub async fn head_header(&self) -> Result<HeaderInfo, NodeError> {
        self.get_json(&self.qry_head_header).await
    }

    /// Get block from a level or hash
    pub async fn block(&self, id: &str) -> Result<RawBlock, NodeError> {
        let url = format!("{}/chains/main/blocks/{}", self.url, id);
        self.get_json(&url).await
    }

    /// Get baking rights matching `query`
    pub async fn baking_rights(&self, query: &str) -> Result<Vec<RawBakingRight>, NodeError> {
        let url = format!(
            "{}/chains/main/blocks/head/helpers/baking_rights?{}",
            self.url, query
        );
        self.get_json(&url).await
    }

    /// Get endorsing rights of a whole cycle
    pub async fn endorsing_rights(
        &self,
        cycle: CycleIndex,
    ) -> Result<Vec<RawEndorsingRight>, NodeError> {
        let url = format!(
            "{}/chains/main/blocks/head/helpers/endorsing_rights?cycle={}",
            self.url, cycle
        );
        self.get_json(&url).await
    }

    pub async fn constants(&self, level: Level) -> Result<Constants, NodeError> {
        let url = format!("{}/chains/main/blocks/{}/context/constants", self.url, level);
        self.get_json(&url).await
    }

    pub async fn delegate(&self, level: Level, address: &Address) -> Result<RawDelegate, NodeError> {
        let url = format!(
            "{}/chains/main/blocks/{}/context/delegates/{}",
            self.url, level, address
        );
        self.get_json(&url).await
    }

    pub async fn balance(&self, level: Level, address: &Address) -> Result<Mutez, NodeError> {
        let url = format!(
            "{}/chains/main/blocks/{}/context/contracts/{}/balance",
            self.url, level, address
        );
        let balance: StringMutez = self.get_json(&url).await?;
        Ok(balance.0)
    }
}

impl NodeAPI {
    /// Send a GET request
    async fn get(&self, url: &str) -> Result<reqwest::Response, NodeError> {
        tracing::trace!("GET {url}");
        let response = reqwest::get(url)
            .await
            .map_err(|_| NodeError::NodeUnreachable)?;

        match response.status() {
            StatusCode::OK => Ok(response),
            StatusCode::BAD_REQUEST => Err(NodeError::API400BadRequest(url.to_string())),
            StatusCode::NOT_FOUND => Err(NodeError::API404Notfound(url.to_string())),
            _ => Err(NodeError::APIError(url.to_string())),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, NodeError> {
        self.get(url)
            .await?
            .json()
            .await
            .map_err(|_| NodeError::DeserializationError(url.to_string()))
    }
}
