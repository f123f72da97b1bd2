// Command pool and per-image command buffers.

use ash::vk;

use crate::error::GraphicsError;

/// One pool per device, against the graphics queue family. Individual
/// buffers may be reset and re-recorded every frame.
pub fn create_command_pool(
    device: &ash::Device,
    graphics_family: u32,
) -> Result<vk::CommandPool, GraphicsError> {
    let create_info = vk::CommandPoolCreateInfo::builder()
        .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
        .queue_family_index(graphics_family);

    unsafe { device.create_command_pool(&create_info, None) }
        .map_err(|e| GraphicsError::resource(format!("creating command pool: {e}")))
}

/// Allocate exactly one primary buffer per swapchain image, freeing any
/// previous allocation first so the call is safe after a swapchain
/// recreation.
pub fn allocate_command_buffers(
    device: &ash::Device,
    pool: vk::CommandPool,
    buffers: &mut Vec<vk::CommandBuffer>,
    image_count: usize,
) -> Result<(), GraphicsError> {
    if !buffers.is_empty() {
        unsafe { device.free_command_buffers(pool, buffers) };
        buffers.clear();
    }

    let alloc_info = vk::CommandBufferAllocateInfo::builder()
        .command_pool(pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(image_count as u32);

    let allocated = unsafe { device.allocate_command_buffers(&alloc_info) }
        .map_err(|e| GraphicsError::resource(format!("allocating command buffers: {e}")))?;

    buffers.extend(allocated);
    Ok(())
}

/// Record the frame's commands for one swapchain image: a render pass over
/// the full extent that clears to `clear_color`. Draw calls belong to a
/// higher layer; the pass body stays empty here.
pub fn record_command_buffer(
    device: &ash::Device,
    buffer: vk::CommandBuffer,
    render_pass: vk::RenderPass,
    framebuffer: vk::Framebuffer,
    extent: vk::Extent2D,
    clear_color: [f32; 4],
) -> Result<(), GraphicsError> {
    let begin_info = vk::CommandBufferBeginInfo::builder();

    let clear_values = [vk::ClearValue {
        color: vk::ClearColorValue {
            float32: clear_color,
        },
    }];

    let pass_info = vk::RenderPassBeginInfo::builder()
        .render_pass(render_pass)
        .framebuffer(framebuffer)
        .render_area(vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        })
        .clear_values(&clear_values);

    unsafe {
        device
            .begin_command_buffer(buffer, &begin_info)
            .map_err(|e| GraphicsError::frame(format!("beginning command buffer: {e}")))?;

        device.cmd_begin_render_pass(buffer, &pass_info, vk::SubpassContents::INLINE);
        device.cmd_end_render_pass(buffer);

        device
            .end_command_buffer(buffer)
            .map_err(|e| GraphicsError::frame(format!("ending command buffer: {e}")))?;
    }

    Ok(())
}
