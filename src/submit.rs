//! Job submission against the cluster API
//!
//! A thin seam over `Api<Job>::create`: the [`JobSubmitter`] trait lets the
//! launchers and the control loop be tested with a mock, while the real
//! implementation shares one `kube::Client` across every concurrent launch.
//! Submission failures are returned to the caller; there is no retry, and
//! the popped profile is not reinstated on the queue.

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use kube::api::{Api, PostParams};
use kube::{Client, ResourceExt};
use tracing::info;

#[cfg(test)]
use mockall::automock;

use crate::job::build_job;
use crate::Result;

/// Environment variable selecting the namespace jobs are created in.
pub const NAMESPACE_ENV_VAR: &str = "METADATA_NAMESPACE";

const DEFAULT_NAMESPACE: &str = "default";

/// Trait abstracting job creation on the container platform
#[cfg_attr(test, automock)]
#[async_trait]
pub trait JobSubmitter: Send + Sync {
    /// Build a job descriptor for `image_name` named `job_name` and create it.
    async fn submit(&self, image_name: &str, job_name: &str) -> Result<()>;
}

/// Production submitter creating batch Jobs through the Kubernetes API.
pub struct KubeJobSubmitter {
    client: Client,
    namespace: String,
}

impl KubeJobSubmitter {
    /// Create a submitter targeting the given namespace.
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    /// Create a submitter with the namespace taken from `METADATA_NAMESPACE`,
    /// falling back to the platform default.
    pub fn from_env(client: Client) -> Self {
        let namespace = resolve_namespace(std::env::var(NAMESPACE_ENV_VAR).ok());
        Self::new(client, namespace)
    }

    /// The namespace this submitter creates jobs in.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

fn resolve_namespace(from_env: Option<String>) -> String {
    from_env
        .filter(|ns| !ns.is_empty())
        .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string())
}

#[async_trait]
impl JobSubmitter for KubeJobSubmitter {
    async fn submit(&self, image_name: &str, job_name: &str) -> Result<()> {
        let job = build_job(image_name, job_name, &self.namespace);
        let jobs: Api<Job> = Api::namespaced(self.client.clone(), &self.namespace);
        let created = jobs.create(&PostParams::default(), &job).await?;
        info!(job = %created.name_any(), namespace = %self.namespace, "Created job");
        Ok(())
    }
}
