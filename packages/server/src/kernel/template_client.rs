//! HTTP client for the template server.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::kernel::jobs::PreviewJob;
use crate::kernel::traits::BaseTemplateFetcher;

/// Request body for the template server. The job's params travel through
/// untouched; the template server decides what they mean.
#[derive(Debug, Serialize)]
struct TemplateRequest<'a> {
    job_id: Uuid,
    params: &'a serde_json::Value,
}

/// Fetches template artifacts over HTTP and writes them to the job workspace.
pub struct HttpTemplateFetcher {
    base_url: String,
    client: reqwest::Client,
}

impl HttpTemplateFetcher {
    pub fn new(base_url: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { base_url, client })
    }
}

#[async_trait]
impl BaseTemplateFetcher for HttpTemplateFetcher {
    async fn fetch(&self, job: &PreviewJob, destination: &Path) -> Result<()> {
        let request = TemplateRequest {
            job_id: job.id,
            params: &job.params,
        };

        let response = self
            .client
            .post(format!("{}/template", self.base_url))
            .json(&request)
            .send()
            .await
            .context("template server request failed")?
            .error_for_status()
            .context("template server returned an error")?;

        let bytes = response
            .bytes()
            .await
            .context("reading template artifact body")?;

        tokio::fs::write(destination, &bytes)
            .await
            .with_context(|| format!("writing template to {}", destination.display()))?;

        debug!(
            job_id = %job.id,
            bytes = bytes.len(),
            path = %destination.display(),
            "template downloaded"
        );
        Ok(())
    }
}
