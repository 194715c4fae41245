//! Shared recursive folder-walking logic for the CMIS and Alfresco
//! connectors, which differ only in base-path conventions and response-shape
//! parsing (SPEC_FULL §4.1: "implemented as two thin connectors sharing one
//! HTTP-walking helper").

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::SourceItem;

use super::mime_for_extension;

/// One child of a folder, as reported by a repository's listing endpoint.
pub struct RemoteNode {
    pub id: String,
    pub name: String,
    pub is_folder: bool,
    pub mime: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Repository-specific listing/fetch operations. The walk itself (recursion,
/// extension filtering, temp-file-free in-memory fetch, item construction)
/// is shared; only these two calls differ per repository.
#[async_trait]
pub trait RepositoryWalker: Send + Sync {
    fn root_folder_id(&self) -> &str;
    async fn list_children(&self, folder_id: &str) -> Result<Vec<RemoteNode>>;
    async fn fetch_content(&self, node: &RemoteNode) -> Result<Vec<u8>>;
}

pub async fn walk(walker: &dyn RepositoryWalker) -> Result<Vec<SourceItem>> {
    let mut items = Vec::new();
    let mut stack = vec![walker.root_folder_id().to_string()];

    while let Some(folder_id) = stack.pop() {
        let children = walker
            .list_children(&folder_id)
            .await
            .with_context(|| format!("listing children of {}", folder_id))?;

        for node in children {
            if node.is_folder {
                stack.push(node.id.clone());
                continue;
            }

            let ext = node
                .name
                .rfind('.')
                .map(|i| node.name[i..].to_lowercase())
                .unwrap_or_default();
            let mime_from_ext = mime_for_extension(&ext).map(|m| m.to_string());
            let Some(mime) = node
                .mime
                .clone()
                .filter(|m| !m.is_empty())
                .or(mime_from_ext)
            else {
                continue;
            };

            let bytes = match walker.fetch_content(&node).await {
                Ok(b) => b,
                Err(e) => {
                    tracing::warn!(node_id = %node.id, error = %e, "skipping unreachable document");
                    continue;
                }
            };

            items.push(SourceItem {
                display_name: node.name.clone(),
                source_id: node.id.clone(),
                mime,
                bytes,
                updated_at: node.updated_at,
            });
        }
    }

    items.sort_by(|a, b| a.source_id.cmp(&b.source_id));
    Ok(items)
}
