//! Fire-and-forget launch tasks
//!
//! The control loop spawns one [`launch_worker`] task per dequeued profile
//! and one [`launch_evaluator`] task per trigger. Neither is awaited: the
//! loop moves on to its next tick while launches resolve images and talk to
//! the cluster API in the background. Each task receives a cancellation
//! token; it is never signalled in normal operation, but a launch abandons
//! pending work if it arrives (e.g. during shutdown).

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::job::{evaluator_job_name, unix_now, worker_job_name};
use crate::metrics::EvalReason;
use crate::orchestrator::Context;
use crate::profile::{resolve_images, split_profile_id};

/// Launch the matchmaking-function job(s) for one dequeued profile.
///
/// Resolves the profile payload to an image list (falling back to the
/// configured defaults on any failure) and submits one job per image. The
/// in-flight counter is the loop's business, not ours: it was already
/// incremented when this task was spawned.
pub async fn launch_worker(ctx: Arc<Context>, profile_id: String, cancel: CancellationToken) {
    if cancel.is_cancelled() {
        debug!(profile = %profile_id, "Worker launch cancelled before start");
        return;
    }

    let (match_object_id, config_id) = match split_profile_id(&profile_id) {
        Ok(parts) => parts,
        Err(err) => {
            // The queue already consumed this ID; all we can do is count it.
            ctx.metrics.record_mmf_failure();
            error!(error = %err, "Dropping malformed profile id");
            return;
        }
    };
    let job_name = worker_job_name(unix_now(), match_object_id, config_id);

    let payload = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            debug!(job = %job_name, "Worker launch cancelled");
            return;
        }
        result = ctx.store.read(config_id) => match result {
            Ok(Some(payload)) => Some(payload),
            Ok(None) => {
                warn!(
                    profile = %config_id,
                    "Profile not found in state storage - attempting to run default mmf container"
                );
                None
            }
            Err(err) => {
                warn!(
                    error = %err,
                    profile = %config_id,
                    "Failure retrieving profile from state storage - attempting to run default mmf container"
                );
                None
            }
        },
    };

    let images = resolve_images(
        payload.as_deref(),
        &ctx.config.jsonkeys.mmf_images,
        &ctx.default_mmf_images,
    );

    info!(
        job = %job_name,
        profile = %config_id,
        images = ?images,
        "Attempting to create mmf job"
    );

    for image in images {
        if cancel.is_cancelled() {
            debug!(job = %job_name, "Worker launch cancelled mid-submission");
            return;
        }
        match ctx.jobs.submit(&image, &job_name).await {
            Ok(()) => ctx.metrics.record_mmf_job(),
            Err(err) => {
                ctx.metrics.record_mmf_failure();
                error!(
                    error = %err,
                    job = %job_name,
                    image = %image,
                    "MMF job submission failure"
                );
            }
        }
    }
}

/// Launch the evaluator job with the configured evaluator image.
pub async fn launch_evaluator(ctx: Arc<Context>, reason: EvalReason, cancel: CancellationToken) {
    let job_name = evaluator_job_name(unix_now());
    info!(
        job = %job_name,
        image = %ctx.evaluator_image,
        reason = reason.as_str(),
        "Attempting to create evaluator job"
    );

    if cancel.is_cancelled() {
        debug!(job = %job_name, "Evaluator launch cancelled");
        return;
    }

    match ctx.jobs.submit(&ctx.evaluator_image, &job_name).await {
        Ok(()) => ctx.metrics.record_eval_job(reason),
        Err(err) => {
            ctx.metrics.record_eval_failure(reason);
            error!(
                error = %err,
                job = %job_name,
                "Evaluator job submission failure"
            );
        }
    }
}
