//! Draws, transfers and command ordering across backends.

mod common;

use std::sync::Arc;

use redlilium_hal::{
    BackendKind, BindableResource, BufferDescription, BufferUsage, Color, Extent3d, FramebufferAttachment,
    FramebufferDescription, GraphicsDevice, GraphicsPipelineDescription, MapMode, OutputDescription,
    ResourceFactory, ResourceKind, ResourceLayoutDescription, ResourceLayoutElement, ShaderStages,
    TextureDescription, TextureFormat, TextureLocation, TextureUsage,
};
use rstest::rstest;

const SIZE: u32 = 8;

fn render_target(device: &Arc<GraphicsDevice>) -> Arc<redlilium_hal::Texture> {
    device
        .create_texture(&TextureDescription::new_2d(
            SIZE,
            SIZE,
            TextureFormat::Rgba8Unorm,
            TextureUsage::RENDER_TARGET | TextureUsage::STAGING,
        ))
        .unwrap()
}

/// Pipeline running `vertex` and shading with the `tint` uniform, and a set
/// binding `tint`.
fn solid_pipeline(
    device: &Arc<GraphicsDevice>,
    vertex: &str,
    tint: [f32; 4],
) -> (Arc<redlilium_hal::Pipeline>, Arc<redlilium_hal::ResourceSet>) {
    let tint_buffer = device
        .create_buffer(&BufferDescription::new(16, BufferUsage::UNIFORM))
        .unwrap();
    device.update_buffer(&tint_buffer, 0, bytemuck::cast_slice(&tint)).unwrap();

    let layout = device
        .create_resource_layout(&ResourceLayoutDescription::new(vec![ResourceLayoutElement::new(
            "tint",
            ResourceKind::UniformBuffer,
            ShaderStages::FRAGMENT,
        )]))
        .unwrap();
    let set = device
        .create_resource_set(&layout, &[BindableResource::Buffer(tint_buffer)])
        .unwrap();
    let pipeline = device
        .create_pipeline(
            &GraphicsPipelineDescription::new(vertex, "solid", OutputDescription::color(TextureFormat::Rgba8Unorm))
                .with_resource_layout(layout)
                .with_label("solid")
                .into(),
        )
        .unwrap();
    (pipeline, set)
}

/// Clear to `clear`, then run `vertices` of `vertex` shaded with `tint`.
fn draw_over_clear(device: &Arc<GraphicsDevice>, vertex: &str, vertices: u32, clear: Color, tint: [f32; 4]) -> Vec<u8> {
    let target = render_target(device);
    let framebuffer = device
        .create_framebuffer(&FramebufferDescription::new(vec![FramebufferAttachment::new(Arc::clone(
            &target,
        ))]))
        .unwrap();
    let (pipeline, set) = solid_pipeline(device, vertex, tint);

    let mut list = device.create_command_list().unwrap();
    list.begin().unwrap();
    list.push_debug_group("solid pass").unwrap();
    list.set_framebuffer(&framebuffer).unwrap();
    list.clear_color_target(0, clear).unwrap();
    list.set_pipeline(&pipeline).unwrap();
    list.set_resource_set(0, &set, &[]).unwrap();
    list.draw(vertices).unwrap();
    list.pop_debug_group().unwrap();
    list.end().unwrap();
    device.submit_commands_blocking(&mut list).unwrap();

    let mapped = device.map(&target, MapMode::Read).unwrap();
    mapped.data().to_vec()
}

/// Clear to black, then cover the target with `tint`.
fn draw_solid(device: &Arc<GraphicsDevice>, tint: [f32; 4]) -> Vec<u8> {
    draw_over_clear(device, "fullscreen", 3, Color::BLACK, tint)
}

#[rstest]
#[case::vulkan(BackendKind::Vulkan)]
#[case::metal(BackendKind::Metal)]
#[case::d3d11(BackendKind::Direct3D11)]
#[case::opengl(BackendKind::OpenGl)]
fn test_draw_covers_target(#[case] kind: BackendKind) {
    let gpu = common::gpu();
    let device = common::device(&gpu, kind);

    let pixels = draw_solid(&device, [0.0, 1.0, 0.0, 1.0]);
    assert_eq!(pixels.len(), (SIZE * SIZE * 4) as usize);
    for pixel in pixels.chunks_exact(4) {
        assert_eq!(pixel, &[0, 255, 0, 255]);
    }
}

#[rstest]
#[case::vulkan(BackendKind::Vulkan)]
#[case::opengl(BackendKind::OpenGl)]
fn test_draw_requires_framebuffer(#[case] kind: BackendKind) {
    let gpu = common::gpu();
    let device = common::device(&gpu, kind);
    let (pipeline, set) = solid_pipeline(&device, "fullscreen", [1.0; 4]);

    let mut list = device.create_command_list().unwrap();
    list.begin().unwrap();
    list.set_pipeline(&pipeline).unwrap();
    list.set_resource_set(0, &set, &[]).unwrap();
    assert!(list.draw(3).is_err());
    assert!(list.clear_color_target(0, Color::WHITE).is_err());
}

/// The clear is replayed before the draw, so red survives only outside the
/// covered left half.
#[rstest]
#[case::opengl(BackendKind::OpenGl)]
#[case::vulkan(BackendKind::Vulkan)]
fn test_clear_then_partial_draw(#[case] kind: BackendKind) {
    let gpu = common::gpu();
    let device = common::device(&gpu, kind);

    let pixels = draw_over_clear(&device, "left_half", 6, Color::RED, [0.0, 0.0, 1.0, 1.0]);
    for (index, pixel) in pixels.chunks_exact(4).enumerate() {
        let x = index as u32 % SIZE;
        let expected: &[u8] = if x < SIZE / 2 { &[0, 0, 255, 255] } else { &[255, 0, 0, 255] };
        assert_eq!(pixel, expected, "pixel {index} on {kind:?}");
    }
}

/// Updates and copies recorded into one list land in recording order.
fn ordered_transfers(device: &Arc<GraphicsDevice>) -> Vec<u8> {
    let staging = BufferUsage::STAGING;
    let scratch = device.create_buffer(&BufferDescription::new(16, staging)).unwrap();
    let result = device.create_buffer(&BufferDescription::new(48, staging)).unwrap();

    let mut list = device.create_command_list().unwrap();
    list.begin().unwrap();
    for (round, value) in [1u8, 2, 3].into_iter().enumerate() {
        list.update_buffer(&scratch, 0, &[value; 16]).unwrap();
        list.copy_buffer(&scratch, 0, &result, round as u64 * 16, 16).unwrap();
    }
    list.insert_debug_marker("transfers done").unwrap();
    list.end().unwrap();
    device.submit_commands_blocking(&mut list).unwrap();

    let mapped = device.map(&result, MapMode::Read).unwrap();
    mapped.data().to_vec()
}

#[rstest]
#[case::vulkan(BackendKind::Vulkan)]
#[case::metal(BackendKind::Metal)]
#[case::d3d11(BackendKind::Direct3D11)]
#[case::opengl(BackendKind::OpenGl)]
fn test_commands_execute_in_recording_order(#[case] kind: BackendKind) {
    let gpu = common::gpu();
    let device = common::device(&gpu, kind);

    let data = ordered_transfers(&device);
    let mut expected = vec![1u8; 16];
    expected.extend([2u8; 16]);
    expected.extend([3u8; 16]);
    assert_eq!(data, expected);
}

fn texture_copy(device: &Arc<GraphicsDevice>) -> Vec<u8> {
    let desc = TextureDescription::new_2d(4, 4, TextureFormat::R8Unorm, TextureUsage::SAMPLED | TextureUsage::STAGING);
    let source = device.create_texture(&desc).unwrap();
    let destination = device.create_texture(&desc).unwrap();
    let texels: Vec<u8> = (1..=16).collect();
    device.update_texture(&source, 0, 0, &texels).unwrap();

    let mut list = device.create_command_list().unwrap();
    list.begin().unwrap();
    list.copy_texture(
        &TextureLocation::new(Arc::clone(&source)).with_origin(1, 1, 0),
        &TextureLocation::new(Arc::clone(&destination)).with_origin(2, 2, 0),
        Extent3d::new_2d(2, 2),
    )
    .unwrap();
    list.end().unwrap();
    device.submit_commands_blocking(&mut list).unwrap();

    let mapped = device.map(&destination, MapMode::Read).unwrap();
    mapped.data().to_vec()
}

#[test]
fn test_backends_produce_identical_results() {
    let mut results = Vec::new();
    for kind in BackendKind::ALL {
        let gpu = common::gpu();
        let device = common::device(&gpu, kind);
        results.push((
            kind,
            draw_solid(&device, [1.0, 0.0, 1.0, 1.0]),
            ordered_transfers(&device),
            texture_copy(&device),
        ));
        device.wait_for_idle().unwrap();
    }

    let (_, pixels, transfers, copy) = &results[0];
    assert_eq!(
        copy,
        &vec![0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 6, 7, 0, 0, 10, 11],
    );
    for (kind, other_pixels, other_transfers, other_copy) in &results[1..] {
        assert_eq!(other_pixels, pixels, "{kind:?} rendering differs from Vulkan");
        assert_eq!(other_transfers, transfers, "{kind:?} transfers differ from Vulkan");
        assert_eq!(other_copy, copy, "{kind:?} texture copy differs from Vulkan");
    }
}
