// Vulkan backend
//
// Composes device selection, the swapchain, command recording, and frame
// synchronization behind the initialize / begin_frame / end_frame /
// shutdown facade.
//
// Resource lifetimes form a chain: instance -> surface -> device ->
// swapchain set -> command buffers -> sync objects. Initialization walks
// the chain forward; shutdown (and Drop, for partially built backends)
// walks it backward. The swapchain set and command buffers are the only
// links rebuilt when the surface goes stale.

pub mod commands;
pub mod device;
pub mod swapchain;
pub mod sync;

use std::sync::Arc;

use ash::extensions::ext::DebugUtils;
use ash::extensions::khr;
use ash::vk;

use crate::config::Config;
use crate::error::GraphicsError;
use crate::window::WindowBridge;

use device::QueueFamilyIndices;
use swapchain::SwapchainState;
use sync::{FrameSync, MAX_FRAMES_IN_FLIGHT};

pub struct VulkanBackend {
    bridge: Arc<dyn WindowBridge>,
    clear_color: [f32; 4],

    entry: Option<ash::Entry>,
    instance: Option<ash::Instance>,
    debug: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
    surface_loader: Option<khr::Surface>,
    surface: vk::SurfaceKHR,

    physical_device: vk::PhysicalDevice,
    queue_families: QueueFamilyIndices,
    device: Option<ash::Device>,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,

    swapchain: Option<SwapchainState>,
    command_pool: vk::CommandPool,
    command_buffers: Vec<vk::CommandBuffer>,

    frame_sync: Vec<FrameSync>,
    /// Index into the in-flight ring, advanced after every completed frame.
    current_frame: usize,
    /// Swapchain image acquired by the last begin_frame; None when that
    /// frame was skipped because the swapchain was stale.
    current_image: Option<u32>,
}

impl VulkanBackend {
    /// Build the full presentation pipeline. Stages run in dependency
    /// order; a failing stage propagates its error and whatever was
    /// already created is released when the half-built backend drops.
    pub fn initialize(
        bridge: Arc<dyn WindowBridge>,
        config: &Config,
    ) -> Result<Self, GraphicsError> {
        log::info!("Initializing Vulkan backend");

        let mut backend = Self {
            bridge,
            clear_color: config.graphics.clear_color,
            entry: None,
            instance: None,
            debug: None,
            surface_loader: None,
            surface: vk::SurfaceKHR::null(),
            physical_device: vk::PhysicalDevice::null(),
            queue_families: QueueFamilyIndices::default(),
            device: None,
            graphics_queue: vk::Queue::null(),
            present_queue: vk::Queue::null(),
            swapchain: None,
            command_pool: vk::CommandPool::null(),
            command_buffers: Vec::new(),
            frame_sync: Vec::new(),
            current_frame: 0,
            current_image: None,
        };

        let enable_validation = cfg!(debug_assertions) && config.debug.validation_layers;

        backend.create_instance(&config.window.title, enable_validation)?;
        if enable_validation {
            backend.create_debug_messenger()?;
        }
        backend.create_surface()?;
        backend.pick_physical_device()?;
        backend.create_logical_device()?;
        backend.create_swapchain()?;
        backend.create_command_pool()?;
        backend.create_command_buffers()?;
        backend.create_sync_objects()?;

        log::info!("Vulkan backend initialized");
        Ok(backend)
    }

    // =========================================================================
    // Initialization stages
    // =========================================================================

    fn create_instance(
        &mut self,
        app_name: &str,
        enable_validation: bool,
    ) -> Result<(), GraphicsError> {
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| GraphicsError::init(format!("loading Vulkan library: {e}")))?;

        let mut extensions = self.bridge.required_extensions()?;
        if enable_validation {
            extensions.push(DebugUtils::name().as_ptr());
        }

        let instance =
            device::create_instance(&entry, app_name, &extensions, enable_validation)?;

        self.entry = Some(entry);
        self.instance = Some(instance);
        Ok(())
    }

    fn create_debug_messenger(&mut self) -> Result<(), GraphicsError> {
        let entry = self
            .entry
            .as_ref()
            .ok_or_else(|| GraphicsError::init("debug messenger before instance"))?;
        let instance = self
            .instance
            .as_ref()
            .ok_or_else(|| GraphicsError::init("debug messenger before instance"))?;

        self.debug = Some(device::create_debug_messenger(entry, instance)?);
        Ok(())
    }

    fn create_surface(&mut self) -> Result<(), GraphicsError> {
        let entry = self
            .entry
            .as_ref()
            .ok_or_else(|| GraphicsError::init("surface requested before instance"))?;
        let instance = self
            .instance
            .as_ref()
            .ok_or_else(|| GraphicsError::init("surface requested before instance"))?;

        self.surface_loader = Some(khr::Surface::new(entry, instance));
        self.surface = self.bridge.create_surface(entry, instance)?;
        Ok(())
    }

    fn pick_physical_device(&mut self) -> Result<(), GraphicsError> {
        let instance = self
            .instance
            .as_ref()
            .ok_or_else(|| GraphicsError::init("device selection before instance"))?;
        let surface_loader = self
            .surface_loader
            .as_ref()
            .ok_or_else(|| GraphicsError::init("device selection before surface"))?;

        let (physical_device, queue_families) =
            device::pick_physical_device(instance, surface_loader, self.surface)?;

        self.physical_device = physical_device;
        self.queue_families = queue_families;
        Ok(())
    }

    fn create_logical_device(&mut self) -> Result<(), GraphicsError> {
        let instance = self
            .instance
            .as_ref()
            .ok_or_else(|| GraphicsError::init("logical device before instance"))?;

        let (device, graphics_queue, present_queue) =
            device::create_logical_device(instance, self.physical_device, &self.queue_families)?;

        self.device = Some(device);
        self.graphics_queue = graphics_queue;
        self.present_queue = present_queue;
        Ok(())
    }

    fn create_swapchain(&mut self) -> Result<(), GraphicsError> {
        let instance = self
            .instance
            .as_ref()
            .ok_or_else(|| GraphicsError::init("swapchain before instance"))?;
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| GraphicsError::init("swapchain before device"))?;
        let surface_loader = self
            .surface_loader
            .as_ref()
            .ok_or_else(|| GraphicsError::init("swapchain before surface"))?;

        let state = swapchain::create(
            instance,
            device,
            self.physical_device,
            surface_loader,
            self.surface,
            &self.queue_families,
            self.bridge.framebuffer_size(),
        )?;

        self.swapchain = Some(state);
        Ok(())
    }

    fn create_command_pool(&mut self) -> Result<(), GraphicsError> {
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| GraphicsError::init("command pool before device"))?;
        let graphics_family = self
            .queue_families
            .graphics_family
            .ok_or_else(|| GraphicsError::init("command pool before queue selection"))?;

        self.command_pool = commands::create_command_pool(device, graphics_family)?;
        Ok(())
    }

    fn create_command_buffers(&mut self) -> Result<(), GraphicsError> {
        let image_count = self
            .swapchain
            .as_ref()
            .map(|s| s.images.len())
            .ok_or_else(|| GraphicsError::init("command buffers before swapchain"))?;
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| GraphicsError::init("command buffers before device"))?;

        commands::allocate_command_buffers(
            device,
            self.command_pool,
            &mut self.command_buffers,
            image_count,
        )
    }

    fn create_sync_objects(&mut self) -> Result<(), GraphicsError> {
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| GraphicsError::init("sync objects before device"))?;

        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            let sync = FrameSync::new(device)?;
            self.frame_sync.push(sync);
        }
        Ok(())
    }

    // =========================================================================
    // Frame loop
    // =========================================================================

    /// Wait for this slot's previous frame, acquire the next swapchain
    /// image, and record its commands. A stale swapchain triggers
    /// recreation and skips the frame: nothing is recorded and the paired
    /// end_frame submits nothing.
    pub fn begin_frame(&mut self) -> Result<(), GraphicsError> {
        self.current_image = None;

        let device = self
            .device
            .as_ref()
            .ok_or_else(|| GraphicsError::init("begin_frame before initialize"))?;
        let sync = self
            .frame_sync
            .get(self.current_frame)
            .ok_or_else(|| GraphicsError::init("begin_frame before sync objects"))?;
        let swapchain = self
            .swapchain
            .as_ref()
            .ok_or_else(|| GraphicsError::init("begin_frame before swapchain"))?;

        unsafe {
            device
                .wait_for_fences(&[sync.in_flight], true, u64::MAX)
                .map_err(|e| GraphicsError::frame(format!("waiting for frame fence: {e}")))?;
        }

        let acquired = unsafe {
            swapchain.loader.acquire_next_image(
                swapchain.swapchain,
                u64::MAX,
                sync.image_available,
                vk::Fence::null(),
            )
        };

        // Suboptimal acquires are tolerated; the image is still usable and
        // present will flag staleness if it matters.
        let image_index = match acquired {
            Ok((index, _suboptimal)) => index,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::debug!("Swapchain out of date at acquire, recreating");
                self.recreate_swapchain()?;
                return Ok(());
            }
            Err(e) => {
                return Err(GraphicsError::frame(format!(
                    "acquiring swapchain image: {e}"
                )))
            }
        };

        // Reset only once an image is in hand: a skipped frame must leave
        // the fence signaled for the next begin_frame on this slot.
        unsafe {
            device
                .reset_fences(&[sync.in_flight])
                .map_err(|e| GraphicsError::frame(format!("resetting frame fence: {e}")))?;
        }

        commands::record_command_buffer(
            device,
            self.command_buffers[image_index as usize],
            swapchain.render_pass,
            swapchain.framebuffers[image_index as usize],
            swapchain.extent,
            self.clear_color,
        )?;

        self.current_image = Some(image_index);
        Ok(())
    }

    /// Submit the recorded commands and present the acquired image.
    /// Staleness reported by present is recovered by recreation; any other
    /// failure is fatal. The frame index advances afterwards.
    pub fn end_frame(&mut self) -> Result<(), GraphicsError> {
        // begin_frame skipped this frame; there is nothing to submit.
        let Some(image_index) = self.current_image.take() else {
            return Ok(());
        };

        let device = self
            .device
            .as_ref()
            .ok_or_else(|| GraphicsError::init("end_frame before initialize"))?;
        let sync = self
            .frame_sync
            .get(self.current_frame)
            .ok_or_else(|| GraphicsError::init("end_frame before sync objects"))?;
        let swapchain = self
            .swapchain
            .as_ref()
            .ok_or_else(|| GraphicsError::init("end_frame before swapchain"))?;

        let wait_semaphores = [sync.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [self.command_buffers[image_index as usize]];
        let signal_semaphores = [sync.render_finished];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            device
                .queue_submit(self.graphics_queue, &[submit_info.build()], sync.in_flight)
                .map_err(|e| GraphicsError::frame(format!("submitting draw commands: {e}")))?;
        }

        let swapchains = [swapchain.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let presented = unsafe {
            swapchain
                .loader
                .queue_present(self.present_queue, &present_info)
        };

        match presented {
            Ok(false) => {}
            // Ok(true) is the suboptimal case; both it and OUT_OF_DATE are
            // ordinary resize signals, not failures.
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::debug!("Swapchain stale at present, recreating");
                self.recreate_swapchain()?;
            }
            Err(e) => {
                return Err(GraphicsError::frame(format!(
                    "presenting swapchain image: {e}"
                )))
            }
        }

        self.current_frame = sync::advance_frame(self.current_frame);
        Ok(())
    }

    // =========================================================================
    // Recreation
    // =========================================================================

    /// Tear down and rebuild everything sized from the swapchain. Sync
    /// objects are frame-slot-scoped and survive untouched.
    fn recreate_swapchain(&mut self) -> Result<(), GraphicsError> {
        // A zero-area framebuffer (minimized window) cannot back a
        // swapchain; wait until the window has area again.
        let (mut width, mut height) = self.bridge.framebuffer_size();
        while width == 0 || height == 0 {
            self.bridge.wait_events();
            (width, height) = self.bridge.framebuffer_size();
        }

        let device = self
            .device
            .as_ref()
            .ok_or_else(|| GraphicsError::init("recreation before device"))?;

        unsafe {
            device
                .device_wait_idle()
                .map_err(|e| GraphicsError::frame(format!("waiting for device idle: {e}")))?;
        }

        if let Some(mut old) = self.swapchain.take() {
            old.destroy(device);
        }

        self.create_swapchain()?;
        self.create_command_buffers()?;

        if let Some(state) = &self.swapchain {
            log::info!(
                "Swapchain recreated: {}x{}, {} images",
                state.extent.width,
                state.extent.height,
                state.images.len()
            );
        }
        Ok(())
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Destroy every resource in reverse-dependency order. Idempotent via
    /// the taken Options; Drop calls it for backends that were never shut
    /// down explicitly, including half-initialized ones.
    pub fn shutdown(&mut self) {
        if let Some(device) = self.device.take() {
            // Quiesce the GPU before destroying anything it may touch.
            if let Err(e) = unsafe { device.device_wait_idle() } {
                log::warn!("device_wait_idle failed during shutdown: {e}");
            }

            if let Some(mut swapchain) = self.swapchain.take() {
                swapchain.destroy(&device);
            }

            unsafe {
                if self.command_pool != vk::CommandPool::null() {
                    // Destroying the pool frees its buffers with it.
                    device.destroy_command_pool(self.command_pool, None);
                    self.command_pool = vk::CommandPool::null();
                }
                self.command_buffers.clear();

                for sync in self.frame_sync.drain(..) {
                    sync.destroy(&device);
                }

                device.destroy_device(None);
            }
        }

        if let Some(instance) = self.instance.take() {
            unsafe {
                if self.surface != vk::SurfaceKHR::null() {
                    if let Some(loader) = &self.surface_loader {
                        loader.destroy_surface(self.surface, None);
                    }
                    self.surface = vk::SurfaceKHR::null();
                }

                if let Some((debug_utils, messenger)) = self.debug.take() {
                    debug_utils.destroy_debug_utils_messenger(messenger, None);
                }

                instance.destroy_instance(None);
            }
            log::info!("Vulkan backend shut down");
        }

        self.surface_loader = None;
        self.entry = None;
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        self.shutdown();
    }
}
