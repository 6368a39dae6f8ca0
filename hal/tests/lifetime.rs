//! Deferred disposal, fences and resource set validation.

mod common;

use std::sync::Arc;
use std::time::Duration;

use redlilium_hal::native::RawObject;
use redlilium_hal::resources::DeviceResource;
use redlilium_hal::{
    BackendKind, BindableResource, BufferDescription, BufferUsage, HalError, ResourceFactory, ResourceKind,
    ResourceLayoutDescription, ResourceLayoutElement, SamplerDescription, ShaderStages, UsageError,
};
use rstest::rstest;

#[rstest]
#[case::vulkan(BackendKind::Vulkan)]
#[case::metal(BackendKind::Metal)]
#[case::d3d11(BackendKind::Direct3D11)]
#[case::opengl(BackendKind::OpenGl)]
fn test_disposal_waits_for_gpu(#[case] kind: BackendKind) {
    let gpu = common::gpu();
    let device = common::device(&gpu, kind);
    let buffer = device
        .create_buffer(&BufferDescription::new(64, BufferUsage::STAGING))
        .unwrap();
    let raw = RawObject::Buffer(buffer.raw_handle());
    let fence = device.create_fence(false).unwrap();

    gpu.pause();
    let mut list = device.create_command_list().unwrap();
    list.begin().unwrap();
    list.update_buffer(&buffer, 0, &[7; 64]).unwrap();
    list.end().unwrap();
    let value = device.submit_commands(&mut list, Some(&fence)).unwrap();
    assert_eq!(device.last_submission(), value);

    buffer.dispose();
    assert!(buffer.is_disposed());
    assert_eq!(device.poll_disposals(), 0);
    assert_eq!(device.pending_disposals(), 1);
    assert!(!device.wait_for_fence(&fence, Some(Duration::from_millis(10))).unwrap());
    assert!(gpu.is_live(raw));

    gpu.resume();
    assert!(device.wait_for_fence(&fence, None).unwrap());
    device.wait_for_idle().unwrap();
    assert_eq!(device.pending_disposals(), 0);
    assert!(gpu.is_destroyed(raw));
    assert!(device.completed_submission() >= value);
}

#[rstest]
#[case::vulkan(BackendKind::Vulkan)]
#[case::opengl(BackendKind::OpenGl)]
fn test_disposal_in_retirement_order(#[case] kind: BackendKind) {
    let gpu = common::gpu();
    let device = common::device(&gpu, kind);
    let early = device
        .create_buffer(&BufferDescription::new(16, BufferUsage::STAGING))
        .unwrap();
    let late = device
        .create_buffer(&BufferDescription::new(16, BufferUsage::STAGING))
        .unwrap();

    // Retired with nothing in flight: eligible at once.
    early.dispose();
    assert_eq!(device.poll_disposals(), 1);

    gpu.pause();
    let mut list = device.create_command_list().unwrap();
    list.begin().unwrap();
    list.update_buffer(&late, 0, &[1; 16]).unwrap();
    list.end().unwrap();
    device.submit_commands(&mut list, None).unwrap();
    late.dispose();
    assert_eq!(device.poll_disposals(), 0);

    gpu.resume();
    device.wait_for_idle().unwrap();
    assert!(gpu.is_destroyed(RawObject::Buffer(early.raw_handle())));
    assert!(gpu.is_destroyed(RawObject::Buffer(late.raw_handle())));
}

/// An open recording keeps a disposed resource alive until it has been
/// submitted and executed.
#[rstest]
#[case::vulkan(BackendKind::Vulkan)]
#[case::d3d11(BackendKind::Direct3D11)]
#[case::opengl(BackendKind::OpenGl)]
fn test_dispose_while_recording_waits_for_submission(#[case] kind: BackendKind) {
    let gpu = common::gpu();
    let device = common::device(&gpu, kind);
    let buffer = device
        .create_buffer(&BufferDescription::new(16, BufferUsage::STAGING))
        .unwrap();
    let raw = RawObject::Buffer(buffer.raw_handle());

    let mut list = device.create_command_list().unwrap();
    list.begin().unwrap();
    list.update_buffer(&buffer, 0, &[3; 16]).unwrap();
    buffer.dispose();

    device.wait_for_idle().unwrap();
    assert_eq!(device.pending_disposals(), 1);
    assert!(gpu.is_live(raw));

    list.end().unwrap();
    device.submit_commands(&mut list, None).unwrap();
    device.wait_for_idle().unwrap();
    assert_eq!(device.pending_disposals(), 0);
    assert!(gpu.is_destroyed(raw));
}

#[rstest]
#[case::vulkan(BackendKind::Vulkan)]
#[case::metal(BackendKind::Metal)]
#[case::d3d11(BackendKind::Direct3D11)]
#[case::opengl(BackendKind::OpenGl)]
fn test_dispose_and_wait_are_idempotent(#[case] kind: BackendKind) {
    let gpu = common::gpu();
    let device = common::device(&gpu, kind);
    let buffer = device
        .create_buffer(&BufferDescription::new(16, BufferUsage::STAGING))
        .unwrap();
    let live_before = gpu.live_objects();

    buffer.dispose();
    buffer.dispose();
    device.wait_for_idle().unwrap();
    device.wait_for_idle().unwrap();

    assert_eq!(device.pending_disposals(), 0);
    assert_eq!(gpu.live_objects(), live_before - 1);
    let err = device.update_buffer(&buffer, 0, &[0; 4]).unwrap_err();
    assert!(matches!(err, HalError::Usage(UsageError::ResourceDisposed(_))));
}

#[rstest]
#[case::vulkan(BackendKind::Vulkan)]
#[case::opengl(BackendKind::OpenGl)]
fn test_disposed_resource_cannot_be_recorded(#[case] kind: BackendKind) {
    let gpu = common::gpu();
    let device = common::device(&gpu, kind);
    let buffer = device
        .create_buffer(&BufferDescription::new(16, BufferUsage::STAGING))
        .unwrap();
    buffer.dispose();

    let mut list = device.create_command_list().unwrap();
    list.begin().unwrap();
    let err = list.update_buffer(&buffer, 0, &[0; 16]).unwrap_err();
    assert!(matches!(err, HalError::Usage(UsageError::ResourceDisposed(_))));
}

#[rstest]
#[case::vulkan(BackendKind::Vulkan)]
#[case::metal(BackendKind::Metal)]
#[case::d3d11(BackendKind::Direct3D11)]
#[case::opengl(BackendKind::OpenGl)]
fn test_resource_set_kind_mismatch(#[case] kind: BackendKind) {
    let gpu = common::gpu();
    let device = common::device(&gpu, kind);
    let layout = device
        .create_resource_layout(&ResourceLayoutDescription::new(vec![
            ResourceLayoutElement::new("params", ResourceKind::UniformBuffer, ShaderStages::COMPUTE),
            ResourceLayoutElement::new("linear", ResourceKind::Sampler, ShaderStages::COMPUTE),
        ]))
        .unwrap();
    let sampler = device.create_sampler(&SamplerDescription::linear()).unwrap();
    let uniform = device
        .create_buffer(&BufferDescription::new(16, BufferUsage::UNIFORM))
        .unwrap();

    let err = device
        .create_resource_set(
            &layout,
            &[BindableResource::Sampler(Arc::clone(&sampler)), BindableResource::Sampler(Arc::clone(&sampler))],
        )
        .unwrap_err();
    assert_eq!(
        err,
        HalError::Usage(UsageError::ResourceKindMismatch {
            slot: 0,
            expected: ResourceKind::UniformBuffer,
            found: "sampler",
        })
    );

    let err = device
        .create_resource_set(&layout, &[BindableResource::Buffer(Arc::clone(&uniform))])
        .unwrap_err();
    assert!(matches!(
        err,
        HalError::Usage(UsageError::ArgumentCount {
            expected: 2,
            found: 1,
            ..
        })
    ));

    device
        .create_resource_set(
            &layout,
            &[BindableResource::Buffer(uniform), BindableResource::Sampler(sampler)],
        )
        .unwrap();
}

#[rstest]
#[case::vulkan(BackendKind::Vulkan)]
#[case::opengl(BackendKind::OpenGl)]
fn test_fence_reset_and_reuse(#[case] kind: BackendKind) {
    let gpu = common::gpu();
    let device = common::device(&gpu, kind);
    let fence = device.create_fence(true).unwrap();
    assert!(device.wait_for_fence(&fence, Some(Duration::ZERO)).unwrap());

    device.reset_fence(&fence).unwrap();
    assert!(!fence.is_signaled());
    assert!(!device.wait_for_fence(&fence, Some(Duration::ZERO)).unwrap());

    let mut list = device.create_command_list().unwrap();
    list.begin().unwrap();
    list.end().unwrap();
    device.submit_commands(&mut list, Some(&fence)).unwrap();
    assert!(device.wait_for_fences(&[&fence], true, None).unwrap());
}

#[test]
fn test_resources_from_another_device_rejected() {
    let gpu = common::gpu();
    let first = common::device(&gpu, BackendKind::Vulkan);
    let second = common::device(&gpu, BackendKind::Vulkan);
    let buffer = first
        .create_buffer(&BufferDescription::new(16, BufferUsage::STAGING))
        .unwrap();
    assert!(second.update_buffer(&buffer, 0, &[0; 16]).is_err());
}

#[rstest]
#[case::vulkan(BackendKind::Vulkan)]
#[case::opengl(BackendKind::OpenGl)]
fn test_debug_names_reach_driver(#[case] kind: BackendKind) {
    let gpu = common::gpu();
    let device = common::device(&gpu, kind);
    let buffer = device
        .create_buffer(&BufferDescription::new(16, BufferUsage::STAGING).with_label("staging"))
        .unwrap();
    let raw = RawObject::Buffer(buffer.raw_handle());

    device.wait_for_idle().unwrap();
    assert_eq!(gpu.object_label(raw).as_deref(), Some("staging"));

    buffer.set_name("readback");
    device.wait_for_idle().unwrap();
    assert_eq!(buffer.name().as_deref(), Some("readback"));
    assert_eq!(gpu.object_label(raw).as_deref(), Some("readback"));
}
