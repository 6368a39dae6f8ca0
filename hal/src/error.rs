//! HAL error types.
//!
//! Errors fall into three families:
//!
//! - [`UsageError`]: the caller violated an API contract. Always reported
//!   immediately, at the call that broke the contract.
//! - [`BackendError`]: the native driver failed (out of memory, link failure,
//!   lost device). Carries the backend's diagnostic text and is never retried.
//! - [`HalError::SwapchainOutOfDate`] / [`HalError::SurfaceLost`]: the only
//!   recoverable errors. Callers resize or recreate the swapchain and retry.

use thiserror::Error;

use crate::types::ResourceKind;

/// Convenience alias used throughout the crate.
pub type HalResult<T> = Result<T, HalError>;

/// Top-level error returned by every fallible HAL operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HalError {
    /// The caller violated an API contract.
    #[error(transparent)]
    Usage(#[from] UsageError),
    /// The native backend failed.
    #[error(transparent)]
    Backend(#[from] BackendError),
    /// The swapchain no longer matches its surface and must be resized.
    #[error("swapchain is out of date")]
    SwapchainOutOfDate,
    /// The presentation surface is gone and must be recreated.
    #[error("presentation surface lost")]
    SurfaceLost,
}

impl HalError {
    /// Returns true if the caller may retry after resizing or recreating the
    /// swapchain.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::SwapchainOutOfDate | Self::SurfaceLost)
    }

    /// Shorthand for [`UsageError::InvalidState`].
    pub(crate) fn invalid_state(msg: impl Into<String>) -> Self {
        Self::Usage(UsageError::InvalidState(msg.into()))
    }

    /// Shorthand for [`UsageError::InvalidParameter`].
    pub(crate) fn invalid_parameter(msg: impl Into<String>) -> Self {
        Self::Usage(UsageError::InvalidParameter(msg.into()))
    }
}

/// Contract violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    /// An operation was issued in the wrong lifecycle state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// A resource set does not match the pipeline layout at that slot.
    #[error("resource set layout is incompatible with pipeline layout at set {set}")]
    IncompatibleLayout { set: u32 },
    /// Wrong number of arguments (resources or dynamic offsets).
    #[error("expected {expected} {what}, got {found}")]
    ArgumentCount {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    /// The set index is not covered by the bound pipeline.
    #[error("resource set index {index} out of range (pipeline has {count} sets)")]
    SetIndexOutOfRange { index: u32, count: u32 },
    /// A bound resource does not fit the layout element kind.
    #[error("slot {slot} expects {expected:?}, got {found}")]
    ResourceKindMismatch {
        slot: u32,
        expected: ResourceKind,
        found: &'static str,
    },
    /// A layout element name could not be found in the linked program.
    #[error("unable to resolve binding `{name}`; available names: [{}]", .available.join(", "))]
    UnresolvedBinding { name: String, available: Vec<String> },
    /// A parameter is out of range or otherwise malformed.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// The resource was disposed before this use.
    #[error("resource {0} has been disposed")]
    ResourceDisposed(String),
    /// The resource (or subresource) is already mapped.
    #[error("subresource {subresource} is already mapped")]
    AlreadyMapped { subresource: u32 },
    /// The operation requires a device feature that is not enabled.
    #[error("feature not supported: {0}")]
    FeatureNotSupported(&'static str),
}

/// Native driver failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Device memory exhausted.
    #[error("out of device memory")]
    OutOfMemory,
    /// The device was lost.
    #[error("device lost")]
    DeviceLost,
    /// Program linking failed.
    #[error("shader link failed: {0}")]
    ShaderLinkFailed(String),
    /// The driver rejected a resource.
    #[error("resource creation failed: {0}")]
    ResourceCreationFailed(String),
    /// The driver does not support the request.
    #[error("unsupported by backend: {0}")]
    Unsupported(String),
    /// The context worker thread is gone.
    #[error("context worker thread terminated")]
    WorkerLost,
    /// Anything else the driver reports.
    #[error("internal backend error: {0}")]
    Internal(String),
}
