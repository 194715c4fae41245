//! Alfresco connector: walks a repository path via Alfresco's public REST
//! API, sharing the recursive walk in [`super::http_walk`] with the CMIS
//! connector (SPEC_FULL §4.1: Alfresco's REST API is a superset CMIS browses
//! through; the two connectors differ only in base-path conventions and
//! response-shape parsing).

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::config::AlfrescoConnectorConfig;
use crate::models::SourceItem;

use super::http_walk::{walk, RemoteNode, RepositoryWalker};
use super::Connector;

const ROOT_ALIAS: &str = "-root-";

pub struct AlfrescoConnector {
    config: AlfrescoConnectorConfig,
    client: reqwest::Client,
}

impl AlfrescoConnector {
    pub fn new(config: AlfrescoConnectorConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn base_url(&self) -> String {
        format!(
            "{}/alfresco/api/-default-/public/alfresco/versions/1",
            self.config.url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl Connector for AlfrescoConnector {
    fn name(&self) -> &str {
        "alfresco"
    }

    async fn scan(&self) -> Result<Vec<SourceItem>> {
        walk(self).await
    }
}

#[async_trait]
impl RepositoryWalker for AlfrescoConnector {
    fn root_folder_id(&self) -> &str {
        ROOT_ALIAS
    }

    async fn list_children(&self, folder_id: &str) -> Result<Vec<RemoteNode>> {
        let url = format!("{}/nodes/{}/children", self.base_url(), folder_id);
        let mut query = vec![("include", "properties")];
        if folder_id == ROOT_ALIAS {
            query.push(("relativePath", self.config.path.as_str()));
        }

        let resp = self
            .client
            .get(&url)
            .query(&query)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .send()
            .await
            .context("Alfresco children request failed")?;

        if !resp.status().is_success() {
            bail!("Alfresco children request for {} returned {}", folder_id, resp.status());
        }

        let body: Value = resp.json().await.context("invalid Alfresco JSON response")?;
        let entries = body
            .pointer("/list/entries")
            .and_then(|e| e.as_array())
            .cloned()
            .unwrap_or_default();

        let mut nodes = Vec::new();
        for wrapped in entries {
            let entry = wrapped.get("entry").unwrap_or(&Value::Null);
            let id = entry.get("id").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let name = entry
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            if id.is_empty() || name.is_empty() {
                continue;
            }

            let is_folder = entry.get("isFolder").and_then(|v| v.as_bool()).unwrap_or(false);
            let mime = entry
                .pointer("/content/mimeType")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());
            let updated_at = entry
                .get("modifiedAt")
                .and_then(|v| v.as_str())
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc));

            nodes.push(RemoteNode {
                id,
                name,
                is_folder,
                mime,
                updated_at,
            });
        }

        Ok(nodes)
    }

    async fn fetch_content(&self, node: &RemoteNode) -> Result<Vec<u8>> {
        let url = format!("{}/nodes/{}/content", self.base_url(), node.id);
        let resp = self
            .client
            .get(&url)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .send()
            .await
            .context("Alfresco content request failed")?;

        if !resp.status().is_success() {
            bail!("Alfresco content request for {} returned {}", node.id, resp.status());
        }

        Ok(resp.bytes().await?.to_vec())
    }
}
