//! On-disk layout for per-job artifacts.
//!
//! Each job owns exactly two files: the downloaded template
//! (`idml/preview-<id>.idml`) and the rendered preview (`pdf/preview-<id>.pdf`).

use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::fs;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct JobWorkspace {
    template_dir: PathBuf,
    output_dir: PathBuf,
}

impl JobWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            template_dir: root.join("idml"),
            output_dir: root.join("pdf"),
        }
    }

    /// Create the template and output directories if they are missing.
    pub async fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.template_dir, &self.output_dir] {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("creating workspace directory {}", dir.display()))?;
        }
        Ok(())
    }

    /// Where a job's template artifact is downloaded to.
    pub fn template_path(&self, job_id: Uuid) -> PathBuf {
        self.template_dir.join(format!("preview-{job_id}.idml"))
    }

    /// Where a job's rendered preview lands.
    pub fn output_path(&self, job_id: Uuid) -> PathBuf {
        self.output_dir.join(format!("preview-{job_id}.pdf"))
    }

    /// Remove a job's artifacts. Missing files are fine (the job may never
    /// have reached the step that creates them).
    pub async fn remove_job_files(&self, job_id: Uuid) -> Result<()> {
        for path in [self.template_path(job_id), self.output_path(job_id)] {
            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("removing job artifact {}", path.display()))
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_workspace() -> JobWorkspace {
        JobWorkspace::new(std::env::temp_dir().join(format!("preview-ws-{}", Uuid::new_v4())))
    }

    #[test]
    fn paths_are_per_job() {
        let workspace = temp_workspace();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        assert_ne!(workspace.template_path(a), workspace.template_path(b));
        assert!(workspace
            .template_path(a)
            .to_string_lossy()
            .ends_with(&format!("preview-{a}.idml")));
        assert!(workspace
            .output_path(a)
            .to_string_lossy()
            .ends_with(&format!("preview-{a}.pdf")));
    }

    #[tokio::test]
    async fn remove_job_files_tolerates_missing_artifacts() {
        let workspace = temp_workspace();
        workspace.ensure_dirs().await.unwrap();

        // Nothing was ever written for this job.
        workspace.remove_job_files(Uuid::new_v4()).await.unwrap();

        // One artifact present, the other missing.
        let job_id = Uuid::new_v4();
        fs::write(workspace.template_path(job_id), b"template")
            .await
            .unwrap();
        workspace.remove_job_files(job_id).await.unwrap();
        assert!(fs::metadata(workspace.template_path(job_id)).await.is_err());
    }
}
