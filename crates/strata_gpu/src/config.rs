//! Renderer configuration and environment overrides

use strata_core::IntSize;

fn env_i32(name: &str) -> Option<i32> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<i32>().ok())
}

fn env_bool(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .and_then(|v| match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
}

/// Configuration for creating a renderer
#[derive(Clone, Debug, PartialEq)]
pub struct RendererConfig {
    /// Texture dimension above which the high-precision texture coordinate
    /// program variants are selected
    pub highp_threshold_min: i32,
    /// Allow partial swaps when the output surface supports them
    pub partial_swap_allowed: bool,
    /// Clear the root render pass before drawing it
    pub should_clear_root_render_pass: bool,
    /// Clear opaque render passes to blue so undrawn regions stand out
    ///
    /// Opaque passes are otherwise left uncleared since their quads cover
    /// every pixel.
    pub debug_clear_root: bool,
    /// Extra pixels added to every render-pass texture allocation
    pub enlarge_pass_textures: IntSize,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            highp_threshold_min: 2048,
            partial_swap_allowed: true,
            should_clear_root_render_pass: true,
            debug_clear_root: false,
            enlarge_pass_textures: IntSize::ZERO,
        }
    }
}

impl RendererConfig {
    /// Apply `STRATA_*` environment overrides
    ///
    /// Env:
    /// - STRATA_HIGHP_THRESHOLD=4096
    /// - STRATA_PARTIAL_SWAP=0
    /// - STRATA_CLEAR_ROOT=0
    /// - STRATA_DEBUG_CLEAR=1
    /// - STRATA_ENLARGE_PASS_TEXTURES=16
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_i32("STRATA_HIGHP_THRESHOLD") {
            self.highp_threshold_min = v.max(0);
        }
        if let Some(v) = env_bool("STRATA_PARTIAL_SWAP") {
            self.partial_swap_allowed = v;
        }
        if let Some(v) = env_bool("STRATA_CLEAR_ROOT") {
            self.should_clear_root_render_pass = v;
        }
        if let Some(v) = env_bool("STRATA_DEBUG_CLEAR") {
            self.debug_clear_root = v;
        }
        if let Some(v) = env_i32("STRATA_ENLARGE_PASS_TEXTURES") {
            let v = v.max(0);
            self.enlarge_pass_textures = IntSize::new(v, v);
        }
        self
    }
}

pub(crate) fn log_renderer_config(config: &RendererConfig) {
    tracing::info!(
        "renderer config: highp_threshold_min={}, partial_swap_allowed={}, clear_root={}, debug_clear_root={}, enlarge_pass_textures={}x{}",
        config.highp_threshold_min,
        config.partial_swap_allowed,
        config.should_clear_root_render_pass,
        config.debug_clear_root,
        config.enlarge_pass_textures.width,
        config.enlarge_pass_textures.height
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_compositor_settings() {
        let config = RendererConfig::default();
        assert_eq!(config.highp_threshold_min, 2048);
        assert!(config.partial_swap_allowed);
        assert!(config.should_clear_root_render_pass);
        assert!(!config.debug_clear_root);
        assert_eq!(config.enlarge_pass_textures, IntSize::ZERO);
    }

    #[test]
    fn unparsable_bool_is_ignored() {
        assert_eq!(env_bool("STRATA_TEST_UNSET_VARIABLE"), None);
    }
}
