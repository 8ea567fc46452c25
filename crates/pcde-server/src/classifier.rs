//! Path-based request classification.
//!
//! A request matches when its final path segment equals the configured
//! resource type and the segment `marker_offset` positions before it equals
//! the marker token, e.g. `/fhir/PCDE/Task` for resource type `Task`,
//! marker `PCDE` and offset 1. Both comparisons are exact and case-sensitive.
//! The body is never touched here.

/// Matches request paths against one resource type / marker pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMatcher {
    resource_type: String,
    marker: String,
    marker_offset: usize,
}

impl PathMatcher {
    /// Matcher whose marker sits immediately before the resource type segment.
    pub fn new(resource_type: impl Into<String>, marker: impl Into<String>) -> Self {
        Self::with_offset(resource_type, marker, 1)
    }

    pub fn with_offset(
        resource_type: impl Into<String>,
        marker: impl Into<String>,
        marker_offset: usize,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            marker: marker.into(),
            marker_offset,
        }
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn marker_offset(&self) -> usize {
        self.marker_offset
    }

    /// Decide whether `path` (without query string) is covered by this matcher.
    ///
    /// Paths shorter than the required segment count never match.
    pub fn matches(&self, path: &str) -> bool {
        if self.marker_offset == 0 {
            return false;
        }

        let path = path.strip_prefix('/').unwrap_or(path);
        let segments: Vec<&str> = path.split('/').collect();

        let Some(last) = segments.len().checked_sub(1) else {
            return false;
        };
        let Some(marker_idx) = last.checked_sub(self.marker_offset) else {
            return false;
        };

        segments[last] == self.resource_type && segments[marker_idx] == self.marker
    }
}
