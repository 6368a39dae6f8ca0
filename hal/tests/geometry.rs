//! Vertex input, indexed and instanced draws, depth testing and resolves.

mod common;

use std::sync::Arc;

use redlilium_hal::{
    BackendKind, BufferDescription, BufferUsage, Color, DepthStencilState, FramebufferAttachment,
    FramebufferDescription, GraphicsDevice, GraphicsPipelineDescription, HalError, IndexFormat, MapMode,
    OutputDescription, ResourceFactory, Texture, TextureDescription, TextureFormat, TextureUsage,
    VertexElementFormat, VertexLayout,
};
use rstest::rstest;

const SIZE: u32 = 8;
const WHITE: [u8; 4] = [255, 255, 255, 255];
const BLACK: [u8; 4] = [0, 0, 0, 255];

fn color_target(device: &Arc<GraphicsDevice>) -> Arc<Texture> {
    device
        .create_texture(&TextureDescription::new_2d(
            SIZE,
            SIZE,
            TextureFormat::Rgba8Unorm,
            TextureUsage::RENDER_TARGET | TextureUsage::STAGING,
        ))
        .unwrap()
}

fn read_pixels(device: &Arc<GraphicsDevice>, texture: &Arc<Texture>) -> Vec<[u8; 4]> {
    let mapped = device.map(texture, MapMode::Read).unwrap();
    mapped
        .data()
        .chunks_exact(4)
        .map(|p| [p[0], p[1], p[2], p[3]])
        .collect()
}

/// A quad over NDC `x in [-1, -0.5]`, drawn twice with 16-bit indices; the
/// second instance lands on `x in [0, 0.5]`.
#[rstest]
#[case::vulkan(BackendKind::Vulkan)]
#[case::metal(BackendKind::Metal)]
#[case::d3d11(BackendKind::Direct3D11)]
#[case::opengl(BackendKind::OpenGl)]
fn test_indexed_instanced_draw(#[case] kind: BackendKind) {
    let gpu = common::gpu();
    let device = common::device(&gpu, kind);

    let corners: [[f32; 2]; 4] = [[-1.0, -1.0], [-0.5, -1.0], [-0.5, 1.0], [-1.0, 1.0]];
    let vertices = device
        .create_buffer(&BufferDescription::new(32, BufferUsage::VERTEX))
        .unwrap();
    device.update_buffer(&vertices, 0, bytemuck::cast_slice(&corners)).unwrap();
    let indices = device
        .create_buffer(&BufferDescription::new(12, BufferUsage::INDEX))
        .unwrap();
    device
        .update_buffer(&indices, 0, bytemuck::cast_slice(&[0u16, 1, 2, 0, 2, 3]))
        .unwrap();

    let pipeline = device
        .create_pipeline(
            &GraphicsPipelineDescription::new(
                "shifted",
                "varying_color",
                OutputDescription::color(TextureFormat::Rgba8Unorm),
            )
            .with_vertex_layout(VertexLayout::packed(&[("position", VertexElementFormat::Float2)]))
            .into(),
        )
        .unwrap();
    let target = color_target(&device);
    let framebuffer = device
        .create_framebuffer(&FramebufferDescription::new(vec![FramebufferAttachment::new(Arc::clone(
            &target,
        ))]))
        .unwrap();

    let mut list = device.create_command_list().unwrap();
    list.begin().unwrap();
    list.set_framebuffer(&framebuffer).unwrap();
    list.clear_color_target(0, Color::BLACK).unwrap();
    list.set_pipeline(&pipeline).unwrap();
    assert!(list.draw_indexed(6).is_err());
    list.set_vertex_buffer(0, &vertices, 0).unwrap();
    list.set_index_buffer(&indices, IndexFormat::U16, 0).unwrap();
    list.draw_indexed_instanced(6, 2, 0, 0, 0).unwrap();
    list.end().unwrap();
    device.submit_commands_blocking(&mut list).unwrap();

    for (index, pixel) in read_pixels(&device, &target).iter().enumerate() {
        let x = index as u32 % SIZE;
        let expected = if matches!(x, 0 | 1 | 4 | 5) { WHITE } else { BLACK };
        assert_eq!(*pixel, expected, "pixel {index} on {kind:?}");
    }
}

#[rstest]
#[case::vulkan_tested(BackendKind::Vulkan, true)]
#[case::vulkan_untested(BackendKind::Vulkan, false)]
#[case::opengl_tested(BackendKind::OpenGl, true)]
#[case::opengl_untested(BackendKind::OpenGl, false)]
fn test_depth_test_keeps_nearest(#[case] kind: BackendKind, #[case] depth_test: bool) {
    let gpu = common::gpu();
    let device = common::device(&gpu, kind);

    let target = color_target(&device);
    let depth = device
        .create_texture(&TextureDescription::new_2d(
            SIZE,
            SIZE,
            TextureFormat::Depth32Float,
            TextureUsage::DEPTH_STENCIL,
        ))
        .unwrap();
    let framebuffer = device
        .create_framebuffer(
            &FramebufferDescription::new(vec![FramebufferAttachment::new(Arc::clone(&target))])
                .with_depth(FramebufferAttachment::new(Arc::clone(&depth))),
        )
        .unwrap();
    let state = if depth_test {
        DepthStencilState::LESS_EQUAL
    } else {
        DepthStencilState::DISABLED
    };
    let pipeline = device
        .create_pipeline(
            &GraphicsPipelineDescription::new(
                "layered",
                "varying_color",
                OutputDescription::color(TextureFormat::Rgba8Unorm).with_depth(TextureFormat::Depth32Float),
            )
            .with_depth_stencil(state)
            .into(),
        )
        .unwrap();

    let mut list = device.create_command_list().unwrap();
    list.begin().unwrap();
    list.set_framebuffer(&framebuffer).unwrap();
    list.clear_color_target(0, Color::BLACK).unwrap();
    list.clear_depth_stencil(1.0, 0).unwrap();
    list.set_pipeline(&pipeline).unwrap();
    list.draw_instanced(3, 2, 0, 0).unwrap();
    list.end().unwrap();
    device.submit_commands_blocking(&mut list).unwrap();

    // Instance 1 is drawn last but lies behind instance 0.
    let expected = if depth_test { [0, 255, 0, 255] } else { [255, 0, 0, 255] };
    assert!(read_pixels(&device, &target).iter().all(|p| *p == expected));
}

#[rstest]
#[case::vulkan(BackendKind::Vulkan)]
#[case::opengl(BackendKind::OpenGl)]
fn test_clear_depth_requires_depth_target(#[case] kind: BackendKind) {
    let gpu = common::gpu();
    let device = common::device(&gpu, kind);
    let target = color_target(&device);
    let framebuffer = device
        .create_framebuffer(&FramebufferDescription::new(vec![FramebufferAttachment::new(target)]))
        .unwrap();

    let mut list = device.create_command_list().unwrap();
    list.begin().unwrap();
    list.set_framebuffer(&framebuffer).unwrap();
    assert!(list.clear_depth_stencil(1.0, 0).is_err());
    assert!(list.clear_color_target(1, Color::WHITE).is_err());
}

#[rstest]
#[case::vulkan(BackendKind::Vulkan)]
#[case::metal(BackendKind::Metal)]
#[case::d3d11(BackendKind::Direct3D11)]
#[case::opengl(BackendKind::OpenGl)]
fn test_resolve_multisampled_target(#[case] kind: BackendKind) {
    let gpu = common::gpu();
    let device = common::device(&gpu, kind);

    let multisampled = device
        .create_texture(
            &TextureDescription::new_2d(SIZE, SIZE, TextureFormat::Rgba8Unorm, TextureUsage::RENDER_TARGET)
                .with_sample_count(4),
        )
        .unwrap();
    let resolved = color_target(&device);
    let framebuffer = device
        .create_framebuffer(&FramebufferDescription::new(vec![FramebufferAttachment::new(Arc::clone(
            &multisampled,
        ))]))
        .unwrap();

    let mut list = device.create_command_list().unwrap();
    list.begin().unwrap();
    assert!(list.resolve_texture(&resolved, &multisampled).is_err());
    list.set_framebuffer(&framebuffer).unwrap();
    list.clear_color_target(0, Color::BLUE).unwrap();
    list.resolve_texture(&multisampled, &resolved).unwrap();
    list.end().unwrap();
    device.submit_commands_blocking(&mut list).unwrap();

    assert!(read_pixels(&device, &resolved).iter().all(|p| *p == [0, 0, 255, 255]));
}

/// Fetching past the end of a vertex buffer only fails once the GPU runs
/// the draw; the next wait reports it, once.
#[rstest]
#[case::vulkan(BackendKind::Vulkan)]
#[case::metal(BackendKind::Metal)]
#[case::d3d11(BackendKind::Direct3D11)]
#[case::opengl(BackendKind::OpenGl)]
fn test_execution_failure_reported_by_next_wait(#[case] kind: BackendKind) {
    let gpu = common::gpu();
    let device = common::device(&gpu, kind);

    let vertices = device
        .create_buffer(&BufferDescription::new(32, BufferUsage::VERTEX))
        .unwrap();
    let pipeline = device
        .create_pipeline(
            &GraphicsPipelineDescription::new(
                "shifted",
                "varying_color",
                OutputDescription::color(TextureFormat::Rgba8Unorm),
            )
            .with_vertex_layout(VertexLayout::packed(&[("position", VertexElementFormat::Float2)]))
            .into(),
        )
        .unwrap();
    let target = color_target(&device);
    let framebuffer = device
        .create_framebuffer(&FramebufferDescription::new(vec![FramebufferAttachment::new(target)]))
        .unwrap();

    let record = |vertex_count: u32| {
        let mut list = device.create_command_list().unwrap();
        list.begin().unwrap();
        list.set_framebuffer(&framebuffer).unwrap();
        list.set_pipeline(&pipeline).unwrap();
        list.set_vertex_buffer(0, &vertices, 0).unwrap();
        list.draw(vertex_count).unwrap();
        list.end().unwrap();
        list
    };

    // Four vertices fit the buffer, six do not.
    let fence = device.create_fence(false).unwrap();
    let mut list = record(6);
    device.submit_commands(&mut list, Some(&fence)).unwrap();
    assert!(matches!(device.wait_for_fence(&fence, None), Err(HalError::Backend(_))));
    device.wait_for_idle().unwrap();

    let mut list = record(6);
    device.submit_commands(&mut list, None).unwrap();
    assert!(matches!(device.wait_for_idle(), Err(HalError::Backend(_))));
    device.wait_for_idle().unwrap();

    let mut list = record(4);
    device.submit_commands_blocking(&mut list).unwrap();
}
