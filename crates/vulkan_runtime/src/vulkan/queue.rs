//! Graphics/present queue with a persistent submit fence
//!
//! Every submission signals the same fence. `submit`, `present` and
//! `wait_idle` observe that fence before moving on, so at most one batch of
//! work is ever in flight.

use ash::{vk, Device};
use std::cell::Cell;
use crate::vulkan::commands::CommandBuffer;
use crate::vulkan::swapchain::Swapchain;
use crate::vulkan::sync::{Fence, Semaphore};
use crate::vulkan::{VulkanError, VulkanResult};

/// Stage a frame first writes the acquired swapchain image in
pub const ACQUIRE_WAIT_STAGE: vk::PipelineStageFlags = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;

/// Split `(semaphore, stage)` pairs into the parallel arrays of a submit
pub fn split_waits(
    waits: &[(vk::Semaphore, vk::PipelineStageFlags)],
) -> (Vec<vk::Semaphore>, Vec<vk::PipelineStageFlags>) {
    waits.iter().copied().unzip()
}

/// The single queue used for graphics, transfers and presentation
pub struct Queue {
    device: Device,
    queue: vk::Queue,
    family_index: u32,
    present_semaphore: Semaphore,
    submit_fence: Fence,
    fence_pending: Cell<bool>,
}

impl Queue {
    /// Wrap queue 0 of `family_index`
    pub fn new(device: Device, family_index: u32) -> VulkanResult<Self> {
        let queue = unsafe { device.get_device_queue(family_index, 0) };
        let present_semaphore = Semaphore::new(device.clone())?;
        let submit_fence = Fence::new(device.clone(), false)?;

        Ok(Self {
            device,
            queue,
            family_index,
            present_semaphore,
            submit_fence,
            fence_pending: Cell::new(false),
        })
    }

    /// Submit recorded command buffers
    ///
    /// Each wait semaphore holds back the stage paired with it, so a swapchain
    /// acquire pairs with [`ACQUIRE_WAIT_STAGE`]. The persistent fence is
    /// signaled once the batch retires; if the previous batch has not been
    /// observed yet this call blocks on it first.
    pub fn submit(
        &self,
        command_buffers: &[&CommandBuffer],
        waits: &[(vk::Semaphore, vk::PipelineStageFlags)],
        signal_semaphores: &[vk::Semaphore],
    ) -> VulkanResult<()> {
        if let Some(buffer) = command_buffers.iter().find(|cb| !cb.is_executable()) {
            return Err(VulkanError::invalid(format!(
                "command buffer {:?} submitted in state {:?}",
                buffer.handle(),
                buffer.state()
            )));
        }

        self.retire_pending()?;

        let handles: Vec<vk::CommandBuffer> = command_buffers.iter().map(|cb| cb.handle()).collect();
        let (wait_semaphores, wait_stages) = split_waits(waits);

        let submit_info = vk::SubmitInfo::builder()
            .command_buffers(&handles)
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .signal_semaphores(signal_semaphores);

        unsafe {
            self.device
                .queue_submit(self.queue, &[submit_info.build()], self.submit_fence.handle())
                .map_err(VulkanError::Api)?;
        }
        self.fence_pending.set(true);
        Ok(())
    }

    /// Present the swapchain's current image
    ///
    /// Blocks until the last submission has retired, then presents gated on
    /// [`Queue::present_semaphore`].
    pub fn present(&self, swapchain: &Swapchain) -> VulkanResult<()> {
        self.retire_pending()?;

        let wait_semaphores = [self.present_semaphore.handle()];
        let swapchains = [swapchain.handle()];
        let image_indices = [swapchain.current_buffer()];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let suboptimal = unsafe {
            swapchain.loader()
                .queue_present(self.queue, &present_info)
                .map_err(VulkanError::Api)?
        };
        if suboptimal {
            log::debug!("Swapchain is suboptimal for the surface");
        }
        Ok(())
    }

    /// Block until all work on the queue has finished
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe {
            self.device.queue_wait_idle(self.queue).map_err(VulkanError::Api)?;
        }
        self.retire_pending()
    }

    /// Semaphore the final submission of a frame must signal before present
    pub fn present_semaphore(&self) -> vk::Semaphore {
        self.present_semaphore.handle()
    }

    /// Get the queue handle
    pub fn handle(&self) -> vk::Queue {
        self.queue
    }

    /// Queue family the queue was created from
    pub fn family_index(&self) -> u32 {
        self.family_index
    }

    fn retire_pending(&self) -> VulkanResult<()> {
        if self.fence_pending.get() {
            self.submit_fence.wait_signaled()?;
            self.submit_fence.reset()?;
            self.fence_pending.set(false);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn test_wait_stages_follow_their_semaphores() {
        let acquire = vk::Semaphore::from_raw(1);
        let gbuffer = vk::Semaphore::from_raw(2);
        let (semaphores, stages) = split_waits(&[
            (acquire, ACQUIRE_WAIT_STAGE),
            (gbuffer, vk::PipelineStageFlags::FRAGMENT_SHADER),
        ]);

        assert_eq!(semaphores, vec![acquire, gbuffer]);
        assert_eq!(
            stages,
            vec![
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
            ]
        );
        assert!(!stages.contains(&vk::PipelineStageFlags::BOTTOM_OF_PIPE));
    }

    #[test]
    fn test_no_waits() {
        let (semaphores, stages) = split_waits(&[]);
        assert!(semaphores.is_empty());
        assert!(stages.is_empty());
    }
}
