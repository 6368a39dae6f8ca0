//! Device configuration.
//!
//! [`DeviceOptions`] is a builder handed to device creation. A few settings
//! can also be overridden from the environment via [`DeviceOptions::from_env`]:
//!
//! | Variable | Values |
//! |---|---|
//! | `REDLILIUM_HAL_VALIDATION` | `strict`, `lenient` |
//! | `REDLILIUM_HAL_PIPELINE_CACHE` | `0` / `1` |

/// Native API family a device is backed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Modern explicit API with descriptor sets and image layouts.
    Vulkan,
    /// Vendor-specific API with per-class argument tables.
    Metal,
    /// Legacy immediate-mode API with register slots.
    Direct3D11,
    /// Context-based legacy API driven from a dedicated worker thread.
    OpenGl,
}

impl BackendKind {
    /// All backends.
    pub const ALL: [Self; 4] = [Self::Vulkan, Self::Metal, Self::Direct3D11, Self::OpenGl];

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Vulkan => "vulkan",
            Self::Metal => "metal",
            Self::Direct3D11 => "d3d11",
            Self::OpenGl => "opengl",
        }
    }

    /// Whether command lists are recorded into a replay log instead of a
    /// native command buffer.
    pub fn uses_deferred_execution(&self) -> bool {
        matches!(self, Self::OpenGl)
    }

    /// Whether the backend tracks image layouts explicitly.
    pub fn tracks_image_layouts(&self) -> bool {
        matches!(self, Self::Vulkan)
    }
}

/// How unresolved binding names are handled when a pipeline is realized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationMode {
    /// Unresolved names are treated as unused binding points.
    Lenient,
    /// Unresolved names fail realization with a diagnostic.
    Strict,
}

impl Default for ValidationMode {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Strict
        } else {
            Self::Lenient
        }
    }
}

impl ValidationMode {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "strict" => Some(Self::Strict),
            "lenient" => Some(Self::Lenient),
            _ => None,
        }
    }
}

/// Device creation options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceOptions {
    /// Binding validation policy.
    pub validation: ValidationMode,
    /// Share identical pipelines through the device cache.
    pub pipeline_cache: bool,
    /// Initial entry capacity of deferred command logs.
    pub command_log_capacity: usize,
    /// Debug label for logs.
    pub label: Option<String>,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self {
            validation: ValidationMode::default(),
            pipeline_cache: true,
            command_log_capacity: 256,
            label: None,
        }
    }
}

impl DeviceOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Default options with environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().apply_env()
    }

    /// Apply environment overrides to these options.
    pub fn apply_env(self) -> Self {
        self.apply_overrides(
            std::env::var("REDLILIUM_HAL_VALIDATION").ok().as_deref(),
            std::env::var("REDLILIUM_HAL_PIPELINE_CACHE").ok().as_deref(),
        )
    }

    fn apply_overrides(mut self, validation: Option<&str>, pipeline_cache: Option<&str>) -> Self {
        if let Some(value) = validation {
            match ValidationMode::parse(value) {
                Some(mode) => self.validation = mode,
                None => log::warn!("Ignoring unknown REDLILIUM_HAL_VALIDATION value {value:?}"),
            }
        }
        if let Some(value) = pipeline_cache {
            self.pipeline_cache = !matches!(value.trim(), "0" | "false" | "off");
        }
        self
    }

    /// Set the validation mode.
    pub fn with_validation(mut self, validation: ValidationMode) -> Self {
        self.validation = validation;
        self
    }

    /// Enable or disable the pipeline cache.
    pub fn with_pipeline_cache(mut self, enabled: bool) -> Self {
        self.pipeline_cache = enabled;
        self
    }

    /// Set the initial deferred command log capacity.
    pub fn with_command_log_capacity(mut self, capacity: usize) -> Self {
        self.command_log_capacity = capacity;
        self
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let options = DeviceOptions::new()
            .with_validation(ValidationMode::Lenient)
            .with_pipeline_cache(false)
            .with_label("main");
        assert_eq!(options.validation, ValidationMode::Lenient);
        assert!(!options.pipeline_cache);
        assert_eq!(options.label.as_deref(), Some("main"));
    }

    #[test]
    fn test_overrides() {
        let options = DeviceOptions::new()
            .with_validation(ValidationMode::Lenient)
            .apply_overrides(Some("STRICT"), Some("0"));
        assert_eq!(options.validation, ValidationMode::Strict);
        assert!(!options.pipeline_cache);

        let options = DeviceOptions::new()
            .with_validation(ValidationMode::Strict)
            .apply_overrides(Some("bogus"), None);
        assert_eq!(options.validation, ValidationMode::Strict);
        assert!(options.pipeline_cache);
    }

    #[test]
    fn test_backend_kinds() {
        assert!(BackendKind::OpenGl.uses_deferred_execution());
        assert!(!BackendKind::Metal.uses_deferred_execution());
        assert!(BackendKind::Vulkan.tracks_image_layouts());
        assert_eq!(BackendKind::ALL.len(), 4);
    }
}
