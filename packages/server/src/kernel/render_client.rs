//! HTTP client for the render server.
//!
//! The render server wraps the actual typesetting tool; this client posts a
//! job descriptor and waits for the render to finish. The request carries its
//! own timeout (configured, typically minutes) because renders are slow and a
//! wedged render server must not hold a connection forever.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::kernel::jobs::PreviewJob;
use crate::kernel::traits::BaseScriptRunner;
use crate::kernel::workspace::JobWorkspace;

/// Job descriptor posted to the render server.
#[derive(Debug, Serialize)]
struct RenderRequest<'a> {
    job_id: Uuid,
    params: &'a serde_json::Value,
    template_path: PathBuf,
    output_path: PathBuf,
}

pub struct RenderServerClient {
    base_url: String,
    client: reqwest::Client,
    workspace: JobWorkspace,
}

impl RenderServerClient {
    pub fn new(base_url: String, timeout: Duration, workspace: JobWorkspace) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url,
            client,
            workspace,
        })
    }
}

#[async_trait]
impl BaseScriptRunner for RenderServerClient {
    async fn run_script(&self, job: &PreviewJob) -> Result<()> {
        let request = RenderRequest {
            job_id: job.id,
            params: &job.params,
            template_path: self.workspace.template_path(job.id),
            output_path: self.workspace.output_path(job.id),
        };

        let response = self
            .client
            .post(format!("{}/render", self.base_url))
            .json(&request)
            .send()
            .await
            .context("render server request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("render server returned {status}: {body}");
        }

        debug!(job_id = %job.id, "render finished");
        Ok(())
    }
}
