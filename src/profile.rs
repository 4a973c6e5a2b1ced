//! Profile ID parsing and image resolution
//!
//! A profile ID has the form `<matchObjectID>.<profileID>`: the first half
//! names the eventual result slot, the second names the configuration
//! payload in state storage. Splitting on the first `.` is the only parsing
//! the orchestrator performs on it.
//!
//! Image resolution is fail-soft by design: the queue has already consumed
//! the ID by the time the payload is read, so a bad payload produces a
//! launch with the default images rather than a silently dropped profile.

use serde_json::Value;
use tracing::warn;

use crate::{Error, Result};

/// Split a profile ID into its match-object and profile halves.
pub fn split_profile_id(profile_id: &str) -> Result<(&str, &str)> {
    profile_id
        .split_once('.')
        .ok_or_else(|| Error::InvalidProfileId(profile_id.to_string()))
}

/// Resolve the worker images for a profile payload.
///
/// `payload` is the raw profile document, or `None` when it could not be
/// read (the caller has already logged why). The value at the dotted
/// `images_path` may be a single image reference or an array of them; any
/// other shape falls back to `defaults`.
///
/// When the payload carries an array, only the LAST image is launched and a
/// warning is emitted: running one job per image needs a per-image proposal
/// ID so the workers don't overwrite each other's proposals, which the
/// platform does not generate yet.
pub fn resolve_images(payload: Option<&str>, images_path: &str, defaults: &[String]) -> Vec<String> {
    let Some(payload) = payload else {
        return defaults.to_vec();
    };

    let doc: Value = match serde_json::from_str(payload) {
        Ok(doc) => doc,
        Err(err) => {
            warn!(
                error = %err,
                "Profile payload is not valid JSON - attempting to run default mmf container"
            );
            return defaults.to_vec();
        }
    };

    match value_at_path(&doc, images_path) {
        Some(Value::String(image)) => vec![image.clone()],
        Some(Value::Array(images)) => match images.last().and_then(Value::as_str) {
            Some(last) => {
                warn!(
                    count = images.len(),
                    image = %last,
                    "Profile specifies multiple mmf container images (NYI), running only the last image provided"
                );
                vec![last.to_string()]
            }
            None => {
                warn!(
                    path = %images_path,
                    "Profile image list carries no usable reference - attempting to run default mmf container"
                );
                defaults.to_vec()
            }
        },
        Some(_) | None => {
            warn!(
                path = %images_path,
                "Profile did not contain a mmf container image name - attempting to run default mmf container"
            );
            defaults.to_vec()
        }
    }
}

/// Walk a dotted key path through nested JSON objects.
fn value_at_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(root, |value, segment| value.get(segment))
}
