// Error taxonomy for the graphics backend.
//
// Every variant here is fatal to the operation that produced it;
// presentation staleness (out-of-date / suboptimal swapchains) is recovered
// internally and never surfaces as an error. The constructors log at error
// level before the value propagates, so a fatal condition always reaches
// the log even when the caller only reports a boolean failure.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphicsError {
    /// Vulkan library loading or instance creation failed, or an operation
    /// was attempted against a backend stage that does not exist yet.
    #[error("graphics initialization failed: {0}")]
    Init(String),

    /// No physical device passed the queue/extension/swapchain checks, or
    /// logical device creation failed.
    #[error("device selection failed: {0}")]
    NoSuitableDevice(String),

    /// Surface creation failed or the window system cannot support
    /// presentation.
    #[error("presentation surface error: {0}")]
    Surface(String),

    /// A swapchain, image view, render pass, framebuffer, command pool,
    /// command buffer, or sync object could not be created.
    #[error("graphics resource creation failed: {0}")]
    ResourceCreation(String),

    /// Recording, submission, presentation, or a synchronization wait
    /// failed for a reason other than swapchain staleness.
    #[error("frame submission failed: {0}")]
    Frame(String),

    /// The factory was asked for a backend kind it does not implement.
    #[error("unsupported graphics backend \"{0}\"")]
    UnsupportedBackend(String),
}

impl GraphicsError {
    fn logged(self) -> Self {
        log::error!("{self}");
        self
    }

    pub fn init(msg: impl Into<String>) -> Self {
        Self::Init(msg.into()).logged()
    }

    pub fn no_suitable_device(msg: impl Into<String>) -> Self {
        Self::NoSuitableDevice(msg.into()).logged()
    }

    pub fn surface(msg: impl Into<String>) -> Self {
        Self::Surface(msg.into()).logged()
    }

    pub fn resource(msg: impl Into<String>) -> Self {
        Self::ResourceCreation(msg.into()).logged()
    }

    pub fn frame(msg: impl Into<String>) -> Self {
        Self::Frame(msg.into()).logged()
    }

    pub fn unsupported(kind: impl Into<String>) -> Self {
        Self::UnsupportedBackend(kind.into()).logged()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_failing_stage() {
        let err = GraphicsError::ResourceCreation("creating render pass".into());
        assert_eq!(
            err.to_string(),
            "graphics resource creation failed: creating render pass"
        );

        let err = GraphicsError::UnsupportedBackend("opengl".into());
        assert_eq!(err.to_string(), "unsupported graphics backend \"opengl\"");
    }
}
