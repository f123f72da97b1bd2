// Lumen - minimal Vulkan presentation engine
//
// The library side holds the graphics backend: device/queue selection,
// swapchain lifecycle, per-frame synchronization, and command
// recording/submission/presentation. The binary in main.rs hosts it in a
// winit event loop; nothing in here owns a window.

pub mod config;
pub mod error;
pub mod graphics;
pub mod window;
