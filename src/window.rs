// Window-system bridge for the graphics backend.
//
// The backend needs exactly four things from whatever owns the window: the
// instance extensions presentation requires, a surface bound to an
// instance, the current framebuffer size, and a way to wait out a
// zero-area window. It holds the bridge as a shared handle and never
// destroys the window behind it.

use std::ffi::c_char;
use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use winit::window::Window;

use crate::error::GraphicsError;

pub trait WindowBridge {
    /// Instance-level extensions the window system needs for presentation.
    fn required_extensions(&self) -> Result<Vec<*const c_char>, GraphicsError>;

    /// Create a presentation surface tied to the window.
    fn create_surface(
        &self,
        entry: &ash::Entry,
        instance: &ash::Instance,
    ) -> Result<vk::SurfaceKHR, GraphicsError>;

    /// Current framebuffer size in pixels.
    fn framebuffer_size(&self) -> (u32, u32);

    /// Block until window-system activity may have changed the framebuffer.
    fn wait_events(&self);
}

/// Bridge over a winit window.
pub struct WinitBridge {
    window: Arc<Window>,
}

impl WinitBridge {
    pub fn new(window: Arc<Window>) -> Self {
        Self { window }
    }
}

impl WindowBridge for WinitBridge {
    fn required_extensions(&self) -> Result<Vec<*const c_char>, GraphicsError> {
        let display = self.window.raw_display_handle();

        let extensions = ash_window::enumerate_required_extensions(display)
            .map_err(|e| GraphicsError::surface(format!("querying surface extensions: {e}")))?;

        Ok(extensions.to_vec())
    }

    fn create_surface(
        &self,
        entry: &ash::Entry,
        instance: &ash::Instance,
    ) -> Result<vk::SurfaceKHR, GraphicsError> {
        let display = self.window.raw_display_handle();
        let window = self.window.raw_window_handle();

        unsafe {
            ash_window::create_surface(entry, instance, display, window, None)
                .map_err(|e| GraphicsError::surface(format!("creating window surface: {e}")))
        }
    }

    fn framebuffer_size(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }

    fn wait_events(&self) {
        // inner_size() queries the platform handle directly, so restoring
        // from minimization becomes visible without pumping the event loop;
        // yielding between polls is enough.
        std::thread::sleep(Duration::from_millis(16));
    }
}
