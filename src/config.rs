//! Configuration for preview rendering

use serde::Deserialize;
use std::env;

use crate::error::{PreviewError, Result};

/// Longest edge of a preview bitmap, in device-independent units
pub const DEFAULT_PREVIEW_EDGE: f32 = 240.0;

/// Timeout for opening and unlocking a document
pub const DEFAULT_OPEN_TIMEOUT_SECS: u64 = 30;

/// Missing fields take their defaults when deserialized
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Bounding edge the page is scaled to fit, preserving aspect ratio
    pub preview_edge: f32,
    /// Render every page in the background once the document is open
    pub prefetch: bool,
    /// Maximum cached pages; `None` keeps every page
    pub cache_capacity: Option<usize>,
    pub open_timeout_secs: u64,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        PreviewConfig {
            preview_edge: DEFAULT_PREVIEW_EDGE,
            prefetch: true,
            cache_capacity: None,
            open_timeout_secs: DEFAULT_OPEN_TIMEOUT_SECS,
        }
    }
}

impl PreviewConfig {
    /// Read configuration from `PREVIEW_*` environment variables.
    ///
    /// Unparseable values fall back to the defaults; the result is validated.
    pub fn from_env() -> Result<Self> {
        let defaults = PreviewConfig::default();

        let config = PreviewConfig {
            preview_edge: env::var("PREVIEW_EDGE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.preview_edge),
            prefetch: match env::var("PREVIEW_PREFETCH")
                .unwrap_or_else(|_| "true".to_string())
                .to_ascii_lowercase()
                .as_str()
            {
                "0" | "false" | "no" | "off" => false,
                _ => true,
            },
            cache_capacity: env::var("PREVIEW_CACHE_CAPACITY")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .filter(|&n| n > 0),
            open_timeout_secs: env::var("PREVIEW_OPEN_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.open_timeout_secs),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.preview_edge.is_finite() || self.preview_edge <= 0.0 {
            return Err(PreviewError::Config(format!(
                "preview edge must be positive, got {}",
                self.preview_edge
            )));
        }
        if self.cache_capacity == Some(0) {
            return Err(PreviewError::Config(
                "cache capacity must be at least 1 page".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_prefetch(mut self, prefetch: bool) -> Self {
        self.prefetch = prefetch;
        self
    }

    pub fn with_preview_edge(mut self, edge: f32) -> Self {
        self.preview_edge = edge;
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = Some(capacity);
        self
    }
}
