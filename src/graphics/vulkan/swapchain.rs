// Swapchain - window presentation
//
// Owns the swapchain together with everything sized from its image count:
// image views, the shared render pass, and one framebuffer per image. The
// whole set is recreated wholesale when the surface goes stale; it is never
// resized in place.

use ash::extensions::khr;
use ash::vk;

use super::device::{self, QueueFamilyIndices};
use crate::error::GraphicsError;

pub struct SwapchainState {
    pub loader: khr::Swapchain,
    pub swapchain: vk::SwapchainKHR,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub render_pass: vk::RenderPass,
    pub framebuffers: Vec<vk::Framebuffer>,
}

/// Prefer 8-bit sRGB BGRA with an sRGB-nonlinear color space; otherwise the
/// first supported format. Deterministic, never an error.
pub(crate) fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .unwrap_or(formats[0])
}

/// Prefer mailbox (triple-buffered, low latency); fall back to FIFO, which
/// the presentation contract guarantees.
pub(crate) fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// A definite current extent is used verbatim; otherwise the framebuffer
/// size is clamped into the surface's supported range.
pub(crate) fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    framebuffer_size: (u32, u32),
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let (width, height) = framebuffer_size;
    vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One image over the minimum, clamped to the cap when the surface has one
/// (max_image_count == 0 means uncapped).
pub(crate) fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let mut count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 && count > capabilities.max_image_count {
        count = capabilities.max_image_count;
    }
    count
}

/// Create the swapchain and its dependent resources for the current
/// surface state. Capabilities are re-queried here; they may have changed
/// since device selection.
pub fn create(
    instance: &ash::Instance,
    device: &ash::Device,
    physical_device: vk::PhysicalDevice,
    surface_loader: &khr::Surface,
    surface: vk::SurfaceKHR,
    indices: &QueueFamilyIndices,
    framebuffer_size: (u32, u32),
) -> Result<SwapchainState, GraphicsError> {
    let support = device::query_swapchain_support(surface_loader, physical_device, surface)?;
    if support.formats.is_empty() {
        return Err(GraphicsError::resource("surface reports no formats"));
    }

    let surface_format = choose_surface_format(&support.formats);
    let present_mode = choose_present_mode(&support.present_modes);
    let extent = choose_extent(&support.capabilities, framebuffer_size);
    let image_count = choose_image_count(&support.capabilities);

    let graphics_family = indices
        .graphics_family
        .ok_or_else(|| GraphicsError::resource("graphics queue family unresolved"))?;
    let present_family = indices
        .present_family
        .ok_or_else(|| GraphicsError::resource("present queue family unresolved"))?;

    let queue_family_indices = [graphics_family, present_family];
    let mut create_info = vk::SwapchainCreateInfoKHR::builder()
        .surface(surface)
        .min_image_count(image_count)
        .image_format(surface_format.format)
        .image_color_space(surface_format.color_space)
        .image_extent(extent)
        .image_array_layers(1)
        .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
        .pre_transform(support.capabilities.current_transform)
        .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
        .present_mode(present_mode)
        .clipped(true);

    // The two queues touch the images concurrently only when they belong to
    // different families.
    create_info = if graphics_family != present_family {
        create_info
            .image_sharing_mode(vk::SharingMode::CONCURRENT)
            .queue_family_indices(&queue_family_indices)
    } else {
        create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
    };

    let loader = khr::Swapchain::new(instance, device);
    let swapchain = unsafe { loader.create_swapchain(&create_info, None) }
        .map_err(|e| GraphicsError::resource(format!("creating swapchain: {e}")))?;

    // The driver may allocate more images than requested; always re-query.
    let images = match unsafe { loader.get_swapchain_images(swapchain) } {
        Ok(images) => images,
        Err(e) => {
            unsafe { loader.destroy_swapchain(swapchain, None) };
            return Err(GraphicsError::resource(format!(
                "querying swapchain images: {e}"
            )));
        }
    };

    log::info!(
        "Created swapchain: {}x{}, {} images, {:?}",
        extent.width,
        extent.height,
        images.len(),
        present_mode
    );

    let mut state = SwapchainState {
        loader,
        swapchain,
        format: surface_format.format,
        extent,
        images,
        image_views: Vec::new(),
        render_pass: vk::RenderPass::null(),
        framebuffers: Vec::new(),
    };

    if let Err(err) = state.create_dependents(device) {
        state.destroy(device);
        return Err(err);
    }

    Ok(state)
}

impl SwapchainState {
    /// Image views, render pass, and framebuffers, in that order. Each
    /// resource lands in `self` as soon as it exists so a failure part-way
    /// leaves nothing untracked.
    fn create_dependents(&mut self, device: &ash::Device) -> Result<(), GraphicsError> {
        for &image in &self.images {
            let view = create_image_view(device, image, self.format)?;
            self.image_views.push(view);
        }

        self.render_pass = create_render_pass(device, self.format)?;

        for &view in &self.image_views {
            let framebuffer = create_framebuffer(device, self.render_pass, view, self.extent)?;
            self.framebuffers.push(framebuffer);
        }

        Ok(())
    }

    /// Destroy in strict reverse-creation order: framebuffers, image views,
    /// the swapchain, then the render pass. Safe on a partially built state.
    pub fn destroy(&mut self, device: &ash::Device) {
        unsafe {
            for framebuffer in self.framebuffers.drain(..) {
                device.destroy_framebuffer(framebuffer, None);
            }
            for view in self.image_views.drain(..) {
                device.destroy_image_view(view, None);
            }
            if self.swapchain != vk::SwapchainKHR::null() {
                self.loader.destroy_swapchain(self.swapchain, None);
                self.swapchain = vk::SwapchainKHR::null();
            }
            if self.render_pass != vk::RenderPass::null() {
                device.destroy_render_pass(self.render_pass, None);
                self.render_pass = vk::RenderPass::null();
            }
        }
        self.images.clear();
    }
}

fn create_image_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
) -> Result<vk::ImageView, GraphicsError> {
    let create_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });

    unsafe { device.create_image_view(&create_info, None) }
        .map_err(|e| GraphicsError::resource(format!("creating image view: {e}")))
}

/// Single color attachment, cleared on load, stored, handed to the
/// presentation engine at the end of the pass.
fn create_render_pass(
    device: &ash::Device,
    format: vk::Format,
) -> Result<vk::RenderPass, GraphicsError> {
    let color_attachment = vk::AttachmentDescription::builder()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
        .build();

    let color_ref = vk::AttachmentReference::builder()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .build();

    let subpass = vk::SubpassDescription::builder()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(std::slice::from_ref(&color_ref))
        .build();

    let attachments = [color_attachment];
    let create_info = vk::RenderPassCreateInfo::builder()
        .attachments(&attachments)
        .subpasses(std::slice::from_ref(&subpass));

    unsafe { device.create_render_pass(&create_info, None) }
        .map_err(|e| GraphicsError::resource(format!("creating render pass: {e}")))
}

fn create_framebuffer(
    device: &ash::Device,
    render_pass: vk::RenderPass,
    view: vk::ImageView,
    extent: vk::Extent2D,
) -> Result<vk::Framebuffer, GraphicsError> {
    let attachments = [view];
    let create_info = vk::FramebufferCreateInfo::builder()
        .render_pass(render_pass)
        .attachments(&attachments)
        .width(extent.width)
        .height(extent.height)
        .layers(1);

    unsafe { device.create_framebuffer(&create_info, None) }
        .map_err(|e| GraphicsError::resource(format!("creating framebuffer: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    fn capabilities(
        min_count: u32,
        max_count: u32,
        current: (u32, u32),
        min_extent: (u32, u32),
        max_extent: (u32, u32),
    ) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min_count,
            max_image_count: max_count,
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: min_extent.0,
                height: min_extent.1,
            },
            max_image_extent: vk::Extent2D {
                width: max_extent.0,
                height: max_extent.1,
            },
            ..Default::default()
        }
    }

    #[test]
    fn format_prefers_srgb_bgra8() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];

        let chosen = choose_surface_format(&formats);
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn format_falls_back_to_first_entry() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::R16G16B16A16_SFLOAT, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];

        let chosen = choose_surface_format(&formats);
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn format_selection_is_idempotent() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];

        let first = choose_surface_format(&formats);
        let second = choose_surface_format(&formats);
        assert_eq!(first.format, second.format);
        assert_eq!(first.color_space, second.color_space);
    }

    #[test]
    fn present_mode_prefers_mailbox() {
        let modes = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
        ];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn present_mode_falls_back_to_fifo() {
        let modes = [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO_RELAXED];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn definite_current_extent_is_used_verbatim() {
        let caps = capabilities(2, 0, (800, 600), (1, 1), (4096, 4096));
        let extent = choose_extent(&caps, (1920, 1080));
        assert_eq!(extent.width, 800);
        assert_eq!(extent.height, 600);
    }

    #[test]
    fn indefinite_extent_clamps_framebuffer_size() {
        // u32::MAX width means the surface lets the swapchain pick.
        let caps = capabilities(2, 0, (u32::MAX, u32::MAX), (200, 200), (1000, 1000));

        let inside = choose_extent(&caps, (800, 600));
        assert_eq!((inside.width, inside.height), (800, 600));

        let oversized = choose_extent(&caps, (5000, 4000));
        assert_eq!((oversized.width, oversized.height), (1000, 1000));

        let undersized = choose_extent(&caps, (10, 10));
        assert_eq!((undersized.width, undersized.height), (200, 200));
    }

    #[test]
    fn image_count_is_min_plus_one_when_uncapped() {
        let caps = capabilities(2, 0, (800, 600), (1, 1), (4096, 4096));
        assert_eq!(choose_image_count(&caps), 3);
    }

    #[test]
    fn image_count_respects_the_cap() {
        let caps = capabilities(2, 2, (800, 600), (1, 1), (4096, 4096));
        assert_eq!(choose_image_count(&caps), 2);
    }
}
