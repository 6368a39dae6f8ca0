//! Compute dispatch through every backend of the soft driver.

mod common;

use std::sync::Arc;

use glam::UVec3;
use redlilium_hal::{
    BackendKind, BindableResource, BufferDescription, BufferRange, BufferUsage, ComputePipelineDescription,
    MapMode, ResourceFactory, ResourceKind, ResourceLayoutDescription, ResourceLayoutElement, ShaderStages,
    TextureDescription, TextureFormat, TextureUsage, TextureViewDescription,
};
use redlilium_hal::resources::DeviceResource;
use rstest::rstest;

const VOLUME: u32 = 32;
const FILL: f32 = 42.42;

#[rstest]
#[case::vulkan(BackendKind::Vulkan)]
#[case::metal(BackendKind::Metal)]
#[case::d3d11(BackendKind::Direct3D11)]
#[case::opengl(BackendKind::OpenGl)]
fn test_compute_fills_volume(#[case] kind: BackendKind) {
    let gpu = common::gpu();
    let device = common::device(&gpu, kind);

    let params = device
        .create_buffer(&BufferDescription::new(16, BufferUsage::UNIFORM).with_label("params"))
        .unwrap();
    device
        .update_buffer(&params, 0, bytemuck::bytes_of(&[FILL, 0.0, 0.0, 0.0]))
        .unwrap();

    let volume = device
        .create_texture(
            &TextureDescription::new_3d(
                VOLUME,
                VOLUME,
                VOLUME,
                TextureFormat::R32Float,
                TextureUsage::STORAGE | TextureUsage::STAGING,
            )
            .with_label("volume"),
        )
        .unwrap();
    let view = device
        .create_texture_view(&volume, &TextureViewDescription::new())
        .unwrap();

    let layout = device
        .create_resource_layout(&ResourceLayoutDescription::new(vec![
            ResourceLayoutElement::new("params", ResourceKind::UniformBuffer, ShaderStages::COMPUTE),
            ResourceLayoutElement::new("volume", ResourceKind::TextureReadWrite, ShaderStages::COMPUTE),
        ]))
        .unwrap();
    let set = device
        .create_resource_set(
            &layout,
            &[BindableResource::Buffer(Arc::clone(&params)), BindableResource::TextureView(view)],
        )
        .unwrap();
    let pipeline = device
        .create_pipeline(
            &ComputePipelineDescription::new("fill_volume", common::FILL_WORKGROUP)
                .with_resource_layout(Arc::clone(&layout))
                .into(),
        )
        .unwrap();

    let mut list = device.create_command_list().unwrap();
    list.begin().unwrap();
    list.set_pipeline(&pipeline).unwrap();
    list.set_resource_set(0, &set, &[]).unwrap();
    list.dispatch(
        VOLUME / common::FILL_WORKGROUP[0],
        VOLUME / common::FILL_WORKGROUP[1],
        VOLUME,
    )
    .unwrap();
    list.end().unwrap();
    device.submit_commands_blocking(&mut list).unwrap();

    let mapped = device.map(&volume, MapMode::Read).unwrap();
    let texels = mapped.read_as::<f32>();
    assert_eq!(texels.len(), (VOLUME * VOLUME * VOLUME) as usize);
    for d in 0..VOLUME {
        let expected = FILL * (d as f32 + 1.0);
        for y in 0..VOLUME {
            for x in 0..VOLUME {
                let value = texels[common::texel_index(UVec3::new(x, y, d), VOLUME, VOLUME)];
                assert_eq!(value, expected, "texel ({x}, {y}, {d}) on {kind:?}");
            }
        }
    }
    device.unmap(mapped).unwrap();
}

fn copy_window_pipeline(
    device: &Arc<redlilium_hal::GraphicsDevice>,
    dynamic: bool,
) -> (Arc<redlilium_hal::ResourceLayout>, Arc<redlilium_hal::Pipeline>) {
    let mut source = ResourceLayoutElement::new("source", ResourceKind::StructuredBufferReadOnly, ShaderStages::COMPUTE);
    if dynamic {
        source = source.dynamic();
    }
    let layout = device
        .create_resource_layout(&ResourceLayoutDescription::new(vec![
            source,
            ResourceLayoutElement::new("destination", ResourceKind::StructuredBufferReadWrite, ShaderStages::COMPUTE),
        ]))
        .unwrap();
    let pipeline = device
        .create_pipeline(
            &ComputePipelineDescription::new("copy_window", [64, 1, 1])
                .with_resource_layout(Arc::clone(&layout))
                .into(),
        )
        .unwrap();
    (layout, pipeline)
}

/// Source holds `0..256`; binding it at byte 256 must expose `64..128`.
#[rstest]
#[case::vulkan(BackendKind::Vulkan, false)]
#[case::metal(BackendKind::Metal, false)]
#[case::d3d11(BackendKind::Direct3D11, false)]
#[case::opengl(BackendKind::OpenGl, false)]
#[case::vulkan_dynamic(BackendKind::Vulkan, true)]
#[case::metal_dynamic(BackendKind::Metal, true)]
#[case::d3d11_dynamic(BackendKind::Direct3D11, true)]
#[case::opengl_dynamic(BackendKind::OpenGl, true)]
fn test_buffer_window_offset(#[case] kind: BackendKind, #[case] dynamic: bool) {
    let gpu = common::gpu();
    let device = common::device(&gpu, kind);

    let values: Vec<u32> = (0..256).collect();
    let source = device
        .create_buffer(&BufferDescription::new(1024, BufferUsage::STRUCTURED_READ_ONLY).with_stride(4))
        .unwrap();
    device.update_buffer(&source, 0, bytemuck::cast_slice(&values)).unwrap();
    let destination = device
        .create_buffer(
            &BufferDescription::new(256, BufferUsage::STRUCTURED_READ_WRITE | BufferUsage::STAGING).with_stride(4),
        )
        .unwrap();

    let (layout, pipeline) = copy_window_pipeline(&device, dynamic);
    // The dynamic case reaches the same window through its offset.
    let (base, offsets) = if dynamic { (0, vec![256]) } else { (256, Vec::new()) };
    let window = BufferRange::new(Arc::clone(&source), base, 256);
    let set = device
        .create_resource_set(
            &layout,
            &[
                BindableResource::BufferRange(window),
                BindableResource::Buffer(Arc::clone(&destination)),
            ],
        )
        .unwrap();

    let mut list = device.create_command_list().unwrap();
    list.begin().unwrap();
    list.set_pipeline(&pipeline).unwrap();
    list.set_resource_set(0, &set, &offsets).unwrap();
    list.dispatch(1, 1, 1).unwrap();
    list.end().unwrap();
    device.submit_commands_blocking(&mut list).unwrap();

    let mapped = device.map(&destination, MapMode::Read).unwrap();
    assert_eq!(mapped.read_as::<u32>(), (64..128).collect::<Vec<u32>>());
}

#[rstest]
#[case::vulkan(BackendKind::Vulkan)]
#[case::opengl(BackendKind::OpenGl)]
fn test_misaligned_dynamic_offset_rejected(#[case] kind: BackendKind) {
    let gpu = common::gpu();
    let device = common::device(&gpu, kind);
    let source = device
        .create_buffer(&BufferDescription::new(1024, BufferUsage::STRUCTURED_READ_ONLY).with_stride(4))
        .unwrap();
    let destination = device
        .create_buffer(&BufferDescription::new(256, BufferUsage::STRUCTURED_READ_WRITE).with_stride(4))
        .unwrap();
    let (layout, pipeline) = copy_window_pipeline(&device, true);
    let set = device
        .create_resource_set(
            &layout,
            &[
                BindableResource::BufferRange(BufferRange::new(source, 0, 256)),
                BindableResource::Buffer(destination),
            ],
        )
        .unwrap();

    let mut list = device.create_command_list().unwrap();
    list.begin().unwrap();
    list.set_pipeline(&pipeline).unwrap();
    assert!(list.set_resource_set(0, &set, &[4]).is_err());
    assert!(list.set_resource_set(0, &set, &[]).is_err());
    list.set_resource_set(0, &set, &[64]).unwrap();
}

/// Equal descriptions share one native pipeline, but each handle keeps its
/// own lifetime.
#[rstest]
#[case::vulkan(BackendKind::Vulkan)]
#[case::metal(BackendKind::Metal)]
#[case::opengl(BackendKind::OpenGl)]
fn test_equal_pipelines_dispose_independently(#[case] kind: BackendKind) {
    let gpu = common::gpu();
    let device = common::device(&gpu, kind);

    let values: Vec<u32> = (0..64).collect();
    let source = device
        .create_buffer(&BufferDescription::new(256, BufferUsage::STRUCTURED_READ_ONLY).with_stride(4))
        .unwrap();
    device.update_buffer(&source, 0, bytemuck::cast_slice(&values)).unwrap();
    let destination = device
        .create_buffer(
            &BufferDescription::new(256, BufferUsage::STRUCTURED_READ_WRITE | BufferUsage::STAGING).with_stride(4),
        )
        .unwrap();

    let (layout, first) = copy_window_pipeline(&device, false);
    let (_, second) = copy_window_pipeline(&device, false);
    assert_ne!(first.id(), second.id());
    device.prepare_pipeline(&first).unwrap();
    device.prepare_pipeline(&second).unwrap();
    assert_eq!(device.cached_pipelines(), 1);

    let set = device
        .create_resource_set(
            &layout,
            &[BindableResource::Buffer(source), BindableResource::Buffer(Arc::clone(&destination))],
        )
        .unwrap();
    device.wait_for_idle().unwrap();
    let live = gpu.live_objects();

    first.dispose();
    device.wait_for_idle().unwrap();
    assert!(first.is_disposed());
    assert!(!second.is_disposed());
    assert_eq!(gpu.live_objects(), live);

    let mut list = device.create_command_list().unwrap();
    list.begin().unwrap();
    assert!(list.set_pipeline(&first).is_err());
    list.set_pipeline(&second).unwrap();
    list.set_resource_set(0, &set, &[]).unwrap();
    list.dispatch(1, 1, 1).unwrap();
    list.end().unwrap();
    device.submit_commands_blocking(&mut list).unwrap();
    drop(list);

    let mapped = device.map(&destination, MapMode::Read).unwrap();
    assert_eq!(mapped.read_as::<u32>(), values);
    device.unmap(mapped).unwrap();

    second.dispose();
    device.wait_for_idle().unwrap();
    assert_eq!(device.cached_pipelines(), 0);
    assert_eq!(gpu.live_objects(), live - 1);
}
