// Synchronization primitives
//
// One FrameSync per in-flight frame slot. The slots are scoped to the
// frame pipeline depth, not to the swapchain: recreating the swapchain
// leaves them untouched.

use ash::vk;

use crate::error::GraphicsError;

/// Number of frames the CPU may record ahead of the GPU.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Per-slot sync objects for the acquire -> submit -> present protocol.
pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight: vk::Fence,
}

impl FrameSync {
    pub fn new(device: &ash::Device) -> Result<Self, GraphicsError> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        // Created signaled so the first wait on this slot returns at once.
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

        unsafe {
            let image_available = device
                .create_semaphore(&semaphore_info, None)
                .map_err(|e| GraphicsError::resource(format!("creating semaphore: {e}")))?;

            let render_finished = match device.create_semaphore(&semaphore_info, None) {
                Ok(semaphore) => semaphore,
                Err(e) => {
                    device.destroy_semaphore(image_available, None);
                    return Err(GraphicsError::resource(format!("creating semaphore: {e}")));
                }
            };

            let in_flight = match device.create_fence(&fence_info, None) {
                Ok(fence) => fence,
                Err(e) => {
                    device.destroy_semaphore(image_available, None);
                    device.destroy_semaphore(render_finished, None);
                    return Err(GraphicsError::resource(format!("creating fence: {e}")));
                }
            };

            Ok(Self {
                image_available,
                render_finished,
                in_flight,
            })
        }
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_semaphore(self.image_available, None);
            device.destroy_semaphore(self.render_finished, None);
            device.destroy_fence(self.in_flight, None);
        }
    }
}

/// Next slot in the in-flight ring.
pub fn advance_frame(current: usize) -> usize {
    (current + 1) % MAX_FRAMES_IN_FLIGHT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_index_wraps_modulo_ring_size() {
        let mut current = 0;
        for completed_pairs in 1..=7 {
            current = advance_frame(current);
            assert_eq!(current, completed_pairs % MAX_FRAMES_IN_FLIGHT);
        }
    }
}
