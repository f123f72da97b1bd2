// Graphics module - backend selection and dispatch
//
// Backends form a closed set. Config strings are validated into
// `BackendKind` before they reach the factory; an unknown name is an error,
// never a silently absent backend.

pub mod vulkan;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::Config;
use crate::error::GraphicsError;
use crate::window::WindowBridge;

pub use vulkan::VulkanBackend;

/// Graphics APIs the factory can build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Vulkan,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vulkan => write!(f, "Vulkan"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = GraphicsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "vulkan" => Ok(BackendKind::Vulkan),
            other => Err(GraphicsError::unsupported(other)),
        }
    }
}

/// Tagged dispatch over the concrete backends.
pub enum Backend {
    Vulkan(VulkanBackend),
}

impl Backend {
    /// Wait for the previous frame on this slot, acquire a swapchain image,
    /// and record its commands. A stale swapchain is rebuilt here and the
    /// frame is skipped.
    pub fn begin_frame(&mut self) -> Result<(), GraphicsError> {
        match self {
            Backend::Vulkan(backend) => backend.begin_frame(),
        }
    }

    /// Submit the recorded commands and present the acquired image, then
    /// advance the in-flight frame index.
    pub fn end_frame(&mut self) -> Result<(), GraphicsError> {
        match self {
            Backend::Vulkan(backend) => backend.end_frame(),
        }
    }

    /// Release every GPU resource in reverse-dependency order. The backend
    /// must not be used afterwards.
    pub fn shutdown(&mut self) {
        match self {
            Backend::Vulkan(backend) => backend.shutdown(),
        }
    }
}

/// Builds and initializes the backend for `kind`, presenting to the window
/// behind `bridge`.
pub fn create_backend(
    kind: BackendKind,
    bridge: Arc<dyn WindowBridge>,
    config: &Config,
) -> Result<Backend, GraphicsError> {
    log::info!("Creating {kind} backend");
    match kind {
        BackendKind::Vulkan => Ok(Backend::Vulkan(VulkanBackend::initialize(bridge, config)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_known_names_case_insensitively() {
        assert_eq!("vulkan".parse::<BackendKind>().unwrap(), BackendKind::Vulkan);
        assert_eq!("Vulkan".parse::<BackendKind>().unwrap(), BackendKind::Vulkan);
        assert_eq!("VULKAN".parse::<BackendKind>().unwrap(), BackendKind::Vulkan);
    }

    #[test]
    fn kind_rejects_unknown_names() {
        for name in ["opengl", "metal", ""] {
            match name.parse::<BackendKind>() {
                Err(GraphicsError::UnsupportedBackend(kind)) => assert_eq!(kind, name),
                other => panic!("expected UnsupportedBackend for {name:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn kind_displays_its_api_name() {
        assert_eq!(BackendKind::Vulkan.to_string(), "Vulkan");
    }
}
