//! Forward-shaded textured cube

use nalgebra::{Matrix4, Vector3};
use std::time::Instant;
use vulkan_runtime::prelude::*;
use vulkan_runtime_samples::{checker_material, load_config, SampleError, Window};

fn main() -> Result<(), SampleError> {
    env_logger::init();
    run().map_err(|e| {
        log::error!("cube sample failed: {}", e);
        e
    })
}

fn run() -> Result<(), SampleError> {
    let config = load_config("vk_cube")?;
    let mut window = Window::new(&config.app_name, config.width, config.height)?;
    let mut ctx = RenderContext::new(&window, &config)?;

    let (_texture, material) = checker_material(&ctx)?;
    let mut scene = Scene::new();
    let cube = scene.add_mesh(Mesh::cube(&ctx)?);
    scene.meshes[cube].set_material(0, &material)?;

    let mut camera = Camera::default();
    let extent = ctx.extent();
    camera.set_viewport_size(extent.width, extent.height);

    let mut renderers = Renderers::new(&ctx, &camera, &LightUniform::default())?;
    renderers.add(MeshRenderer::new(&ctx, MeshPass::Forward, ctx.main_render_pass())?);

    let mut command_buffers = ctx.command_pool().create_command_buffers(1)?;
    let clear = ClearValues::default();
    let started = Instant::now();

    while window.poll() {
        let angle = started.elapsed().as_secs_f32() * 0.5;
        let world = Matrix4::from_axis_angle(&Vector3::y_axis(), angle);
        scene.meshes[cube].set_world(ctx.device(), &world)?;

        ctx.swapchain_mut().acquire_next_image()?;

        let command_buffer = &mut command_buffers[0];
        command_buffer
            .begin()?
            .begin_render_pass(ctx.swapchain().current_framebuffer(), &clear, ClearFlags::all())
            .set_viewport(ctx.full_rect())
            .set_scissor(ctx.full_rect());
        renderers.render_target(command_buffer, PassTarget::Swapchain, &scene);
        command_buffer.end_render_pass().end()?;

        let queue = ctx.device().queue();
        queue.submit(
            &[&command_buffers[0]],
            &[(ctx.swapchain().acquire_semaphore(), ACQUIRE_WAIT_STAGE)],
            &[queue.present_semaphore()],
        )?;
        queue.present(ctx.swapchain())?;
        queue.wait_idle()?;
    }

    ctx.device().wait_idle()?;
    ctx.command_pool().destroy_command_buffers(command_buffers)?;
    log::info!("cube sample finished");
    Ok(())
}
