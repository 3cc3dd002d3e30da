//! Deferred shading: fill a G-buffer, then light it in a full-screen pass

use ash::vk;
use vulkan_runtime::prelude::*;
use vulkan_runtime_samples::{checker_material, load_config, SampleError, Window};

fn main() -> Result<(), SampleError> {
    env_logger::init();
    run().map_err(|e| {
        log::error!("deferred sample failed: {}", e);
        e
    })
}

fn run() -> Result<(), SampleError> {
    let config = load_config("vk_deferred")?;
    let mut window = Window::new(&config.app_name, config.width, config.height)?;
    let mut ctx = RenderContext::new(&window, &config)?;

    let gbuffer = GBuffer::new(&ctx)?;

    let (_texture, material) = checker_material(&ctx)?;
    let mut scene = Scene::new();
    let cube = scene.add_mesh(Mesh::cube(&ctx)?);
    scene.meshes[cube].set_material(0, &material)?;

    let mut camera = Camera::default();
    let extent = ctx.extent();
    camera.set_viewport_size(extent.width, extent.height);

    let mut renderers = Renderers::new(&ctx, &camera, &LightUniform::default())?;
    renderers
        .add(MeshRenderer::new(&ctx, MeshPass::Fill, gbuffer.render_pass())?)
        .add(GBufferRenderer::new(&ctx, &gbuffer)?);

    let mut command_buffers = ctx.command_pool().create_command_buffers(2)?;
    let gbuffer_done = Semaphore::new(ctx.raw_device().clone())?;
    let gbuffer_clear = ClearValues::default();
    let main_clear = ClearValues {
        color: [0.0, 1.0, 0.0, 1.0],
        ..ClearValues::default()
    };

    while window.poll() {
        ctx.swapchain_mut().acquire_next_image()?;
        let queue = ctx.device().queue();

        let fill = &mut command_buffers[0];
        fill.begin()?
            .begin_render_pass(gbuffer.framebuffer(), &gbuffer_clear, ClearFlags::all())
            .set_viewport(gbuffer.framebuffer().rect())
            .set_scissor(gbuffer.framebuffer().rect());
        renderers.render_target(fill, PassTarget::GBuffer, &scene);
        fill.end_render_pass().end()?;

        queue.submit(
            &[&command_buffers[0]],
            &[(ctx.swapchain().acquire_semaphore(), ACQUIRE_WAIT_STAGE)],
            &[gbuffer_done.handle()],
        )?;

        let lighting = &mut command_buffers[1];
        lighting
            .begin()?
            .begin_render_pass(ctx.swapchain().current_framebuffer(), &main_clear, ClearFlags::all())
            .set_viewport(ctx.full_rect())
            .set_scissor(ctx.full_rect());
        renderers.render_target(lighting, PassTarget::Swapchain, &scene);
        lighting.end_render_pass().end()?;

        queue.submit(
            &[&command_buffers[1]],
            &[(gbuffer_done.handle(), vk::PipelineStageFlags::FRAGMENT_SHADER)],
            &[queue.present_semaphore()],
        )?;
        queue.present(ctx.swapchain())?;
        queue.wait_idle()?;
    }

    ctx.device().wait_idle()?;
    ctx.command_pool().destroy_command_buffers(command_buffers)?;
    log::info!("deferred sample finished");
    Ok(())
}
