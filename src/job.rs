//! Kubernetes Job construction
//!
//! Builds the batch Job descriptor submitted for every launch. Workers and
//! the evaluator share the same shape; only the image and the job name
//! differ. The job name encodes the launch: the dispatched container reads
//! it back through the `PROFILE` environment variable to learn which
//! profile it is processing.

use std::collections::BTreeMap;

use chrono::Utc;
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, LocalObjectReference, PodSpec, PodTemplateSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Name of the single container in every launched job
const CONTAINER_NAME: &str = "mmf";

/// Image pull secret referenced by every launched pod
const IMAGE_PULL_SECRET: &str = "aws-creds";

/// Environment variable carrying the job name to the dispatched container
const PROFILE_ENV_VAR: &str = "PROFILE";

/// Current wall-clock time as whole unix seconds.
///
/// Job names embed this; uniqueness relies on the profile queue popping each
/// ID at most once, so two launches for the same profile never share a second.
pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}

/// Derive the job name for a worker launch.
pub fn worker_job_name(unix_secs: i64, match_object_id: &str, profile_id: &str) -> String {
    format!("{unix_secs}.{match_object_id}.{profile_id}")
}

/// Derive the job name for an evaluator launch.
pub fn evaluator_job_name(unix_secs: i64) -> String {
    format!("{unix_secs}.evaluator")
}

/// Build the Job descriptor for a single launch.
///
/// The job:
/// - runs one completion of a single container with the given image
/// - never restarts its pod
/// - always pulls the image
/// - passes the job name to the container via `PROFILE`
/// - references the `aws-creds` image pull secret
pub fn build_job(image_name: &str, job_name: &str, namespace: &str) -> Job {
    let mut labels = BTreeMap::new();
    labels.insert("app".to_string(), "mmf".to_string());

    let mut annotations = BTreeMap::new();
    // Placeholder: params can land here later and be read through the
    // downward API; nothing consumes it today.
    annotations.insert("profile".to_string(), "placeholder".to_string());

    let container = Container {
        name: CONTAINER_NAME.to_string(),
        image: Some(image_name.to_string()),
        image_pull_policy: Some("Always".to_string()),
        env: Some(vec![EnvVar {
            name: PROFILE_ENV_VAR.to_string(),
            value: Some(job_name.to_string()),
            ..Default::default()
        }]),
        ..Default::default()
    };

    Job {
        metadata: ObjectMeta {
            name: Some(job_name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: Some(JobSpec {
            completions: Some(1),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    annotations: Some(annotations),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    restart_policy: Some("Never".to_string()),
                    image_pull_secrets: Some(vec![LocalObjectReference {
                        name: IMAGE_PULL_SECRET.to_string(),
                    }]),
                    containers: vec![container],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}
