//! Build metadata retrieval
//!
//! The build provider notifies with a relative link to the build resource;
//! the resource carries the link the compiled binary can be streamed from.

use crate::config::ProviderConfig;
use crate::error::FetchError;
use crate::retry::{RetryPolicy, with_retry};
use crate::types::BuildMetadata;
use crate::utils::filename_from_url;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

/// Source of build metadata
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Resolve a build-detail link into the binary's download location
    async fn fetch(&self, build_detail_link: &str) -> Result<BuildMetadata, FetchError>;
}

/// Build resource as returned by the provider API (only what we read)
#[derive(Debug, Deserialize)]
struct BuildResource {
    #[serde(default)]
    links: BuildResourceLinks,
}

#[derive(Debug, Default, Deserialize)]
struct BuildResourceLinks {
    #[serde(default)]
    download_primary: Option<DownloadLink>,
}

#[derive(Debug, Deserialize)]
struct DownloadLink {
    href: String,
}

/// Unity Cloud Build API client
pub struct UnityCloudBuild {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    retry: Arc<dyn RetryPolicy>,
}

impl UnityCloudBuild {
    /// Create a client for the configured API root
    pub fn new(client: reqwest::Client, config: &ProviderConfig, retry: Arc<dyn RetryPolicy>) -> Self {
        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            retry,
        }
    }

    /// API root joined with a relative build-detail link
    pub fn resource_url(&self, build_detail_link: &str) -> String {
        format!(
            "{}/{}",
            self.api_base,
            build_detail_link.trim_start_matches('/')
        )
    }

    async fn fetch_once(&self, url: &str) -> Result<BuildMetadata, FetchError> {
        let response = self
            .client
            .get(url)
            .header("Authorization", format!("Basic {}", self.api_key))
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;

        parse_build_resource(url, &body)
    }
}

#[async_trait]
impl MetadataProvider for UnityCloudBuild {
    async fn fetch(&self, build_detail_link: &str) -> Result<BuildMetadata, FetchError> {
        let url = self.resource_url(build_detail_link);
        tracing::info!(url = %url, "fetching build details");

        let metadata = with_retry(self.retry.as_ref(), "fetch_build_details", || {
            self.fetch_once(&url)
        })
        .await?;

        tracing::info!(
            url = %url,
            download_url = %metadata.download_url,
            filename = %metadata.filename,
            "build details fetched"
        );
        Ok(metadata)
    }
}

/// Extract download location and filename from a build resource body
fn parse_build_resource(url: &str, body: &[u8]) -> Result<BuildMetadata, FetchError> {
    let decode = |reason: String| FetchError::Decode {
        url: url.to_string(),
        reason,
    };

    let resource: BuildResource =
        serde_json::from_slice(body).map_err(|e| decode(format!("invalid JSON: {}", e)))?;

    let href = resource
        .links
        .download_primary
        .map(|link| link.href)
        .filter(|href| !href.is_empty())
        .ok_or_else(|| decode("missing links.download_primary.href".to_string()))?;

    let download_url = url::Url::parse(&href)
        .map_err(|e| decode(format!("invalid download link {:?}: {}", href, e)))?;

    let filename = filename_from_url(&download_url)
        .ok_or_else(|| decode(format!("download link {:?} has no filename", href)))?;

    Ok(BuildMetadata {
        download_url,
        filename,
    })
}
