//! Tag transformation applied before Register.
//!
//! Deployments commonly merge provider-wide default tags into every request
//! or strip tags the backend manages itself. The controller runs the
//! configured [`TagTransform`] on the request tags exactly once, before the
//! first Register attempt, so every retry sends the same tag set.

use tether_types::Tags;

/// Rewrites request tags before they are sent to the backend.
pub trait TagTransform: Send + Sync {
    fn apply(&self, tags: &Tags) -> Tags;
}

/// Sends tags unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughTags;

impl TagTransform for PassthroughTags {
    fn apply(&self, tags: &Tags) -> Tags {
        tags.clone()
    }
}

/// Merges a set of default tags under the request tags.
///
/// Request tags win on key collisions.
#[derive(Debug, Clone, Default)]
pub struct DefaultTags {
    defaults: Tags,
}

impl DefaultTags {
    pub fn new(defaults: Tags) -> Self {
        Self { defaults }
    }
}

impl TagTransform for DefaultTags {
    fn apply(&self, tags: &Tags) -> Tags {
        let mut merged = self.defaults.clone();
        merged.extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }
}
