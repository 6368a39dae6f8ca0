//! Presentation to headless surfaces.

mod common;

use std::sync::Arc;

use redlilium_hal::resources::DeviceResource;
use redlilium_hal::soft::HeadlessSurface;
use redlilium_hal::{
    BackendKind, Color, GraphicsDevice, HalError, ImageLayout, ResourceFactory, Swapchain, SwapchainDescription,
    SwapchainState, TextureFormat,
};
use rstest::rstest;

fn render_frame(device: &Arc<GraphicsDevice>, swapchain: &mut Swapchain, color: Color) {
    swapchain.acquire_next_image().unwrap();
    let framebuffer = Arc::clone(swapchain.framebuffer().unwrap());

    let mut list = device.create_command_list().unwrap();
    list.begin().unwrap();
    list.set_framebuffer(&framebuffer).unwrap();
    list.clear_color_target(0, color).unwrap();
    list.end().unwrap();
    device.submit_commands(&mut list, None).unwrap();
    swapchain.present().unwrap();
}

#[rstest]
#[case::vulkan(BackendKind::Vulkan)]
#[case::metal(BackendKind::Metal)]
#[case::d3d11(BackendKind::Direct3D11)]
#[case::opengl(BackendKind::OpenGl)]
fn test_present_then_resize(#[case] kind: BackendKind) {
    let gpu = common::gpu();
    let device = common::device(&gpu, kind);
    let surface = HeadlessSurface::new(16, 8);
    let mut swapchain = device
        .create_swapchain(&SwapchainDescription::new(surface.clone(), 16, 8))
        .unwrap();
    assert_eq!(swapchain.state(), SwapchainState::Active);

    render_frame(&device, &mut swapchain, Color::WHITE);
    device.wait_for_idle().unwrap();
    let frame = surface.last_frame().unwrap();
    assert_eq!((frame.width, frame.height), (16, 8));
    assert_eq!(frame.format, TextureFormat::Bgra8Unorm);
    assert!(frame.data.iter().all(|b| *b == 255));

    surface.set_extent(32, 16);
    assert_eq!(swapchain.acquire_next_image().unwrap_err(), HalError::SwapchainOutOfDate);

    swapchain.resize(32, 16).unwrap();
    assert_eq!((swapchain.width(), swapchain.height()), (32, 16));
    render_frame(&device, &mut swapchain, Color::RED);
    device.wait_for_idle().unwrap();

    assert_eq!(surface.presented_count(), 2);
    let frame = surface.last_frame().unwrap();
    assert_eq!((frame.width, frame.height), (32, 16));
    for pixel in frame.data.chunks_exact(4) {
        assert_eq!(pixel, &[0, 0, 255, 255]);
    }
}

#[rstest]
#[case::vulkan(BackendKind::Vulkan)]
#[case::opengl(BackendKind::OpenGl)]
fn test_lost_surface_is_recoverable_error(#[case] kind: BackendKind) {
    let gpu = common::gpu();
    let device = common::device(&gpu, kind);
    let surface = HeadlessSurface::new(8, 8);
    let mut swapchain = device
        .create_swapchain(&SwapchainDescription::new(surface.clone(), 8, 8))
        .unwrap();

    surface.lose();
    let err = swapchain.acquire_next_image().unwrap_err();
    assert_eq!(err, HalError::SurfaceLost);
    assert!(err.is_recoverable());
}

#[rstest]
#[case::vulkan(BackendKind::Vulkan)]
#[case::metal(BackendKind::Metal)]
fn test_image_layouts_tracked_on_vulkan_only(#[case] kind: BackendKind) {
    let gpu = common::gpu();
    let device = common::device(&gpu, kind);
    let surface = HeadlessSurface::new(4, 4);
    let mut swapchain = device
        .create_swapchain(&SwapchainDescription::new(surface, 4, 4))
        .unwrap();
    assert!(swapchain.image_count() >= 2);

    let index = swapchain.acquire_next_image().unwrap();
    let tracked = kind.tracks_image_layouts();
    let expected = |layout| if tracked { Some(layout) } else { None };
    assert_eq!(swapchain.image_layout(index), expected(ImageLayout::ColorAttachment));

    swapchain.present().unwrap();
    assert_eq!(swapchain.image_layout(index), expected(ImageLayout::PresentSrc));
    if tracked {
        let raw = swapchain.current_texture().unwrap().raw_handle();
        assert_eq!(gpu.texture_layout(raw), Some(ImageLayout::PresentSrc));
    }
}

#[rstest]
#[case::vulkan(BackendKind::Vulkan)]
#[case::opengl(BackendKind::OpenGl)]
fn test_swapchain_misuse(#[case] kind: BackendKind) {
    let gpu = common::gpu();
    let device = common::device(&gpu, kind);
    let surface = HeadlessSurface::new(4, 4);
    let mut swapchain = device
        .create_swapchain(&SwapchainDescription::new(surface.clone(), 4, 4).with_depth(TextureFormat::Depth32Float))
        .unwrap();
    assert!(swapchain.depth_texture().is_some());

    assert!(swapchain.present().is_err());
    assert!(swapchain.resize(0, 4).is_err());

    swapchain.dispose();
    swapchain.dispose();
    assert!(swapchain.is_disposed());
    assert!(swapchain.framebuffer().is_none());
    assert!(swapchain.acquire_next_image().is_err());
    assert_eq!(surface.presented_count(), 0);
}

#[rstest]
#[case::vulkan(BackendKind::Vulkan)]
#[case::metal(BackendKind::Metal)]
#[case::opengl(BackendKind::OpenGl)]
fn test_resize_round_trip_recreates_targets(#[case] kind: BackendKind) {
    let gpu = common::gpu();
    let device = common::device(&gpu, kind);
    let surface = HeadlessSurface::new(16, 8);
    let mut swapchain = device
        .create_swapchain(&SwapchainDescription::new(surface.clone(), 16, 8).with_depth(TextureFormat::Depth32Float))
        .unwrap();
    let original_depth = Arc::clone(swapchain.depth_texture().unwrap());
    let original_framebuffer = Arc::clone(swapchain.framebuffer_at(0).unwrap());

    surface.set_extent(32, 16);
    swapchain.resize(32, 16).unwrap();
    surface.set_extent(16, 8);
    swapchain.resize(16, 8).unwrap();

    assert!(original_depth.is_disposed());
    assert!(original_framebuffer.is_disposed());
    let depth = swapchain.depth_texture().unwrap();
    assert_ne!(depth.id(), original_depth.id());
    assert_eq!((depth.width(), depth.height()), (16, 8));
    for index in 0..swapchain.image_count() {
        let framebuffer = swapchain.framebuffer_at(index).unwrap();
        assert_eq!((framebuffer.width(), framebuffer.height()), (16, 8));
        assert_eq!(framebuffer.depth_target().map(|t| t.id()), Some(depth.id()));
    }

    render_frame(&device, &mut swapchain, Color::GREEN);
    device.wait_for_idle().unwrap();
    let frame = surface.last_frame().unwrap();
    assert_eq!((frame.width, frame.height), (16, 8));
}

/// A rebuild that fails leaves the swapchain empty but resizable.
#[rstest]
#[case::vulkan(BackendKind::Vulkan)]
#[case::opengl(BackendKind::OpenGl)]
fn test_failed_resize_can_be_retried(#[case] kind: BackendKind) {
    let gpu = common::gpu();
    let device = common::device(&gpu, kind);
    let surface = HeadlessSurface::new(8, 8);
    let mut swapchain = device
        .create_swapchain(&SwapchainDescription::new(surface.clone(), 8, 8).with_depth(TextureFormat::Depth32Float))
        .unwrap();

    let too_wide = device.limits().max_texture_dimension + 1;
    assert!(swapchain.resize(too_wide, 1).is_err());
    assert_eq!(swapchain.state(), SwapchainState::Uninitialized);
    assert_eq!(swapchain.image_count(), 0);
    assert!(swapchain.framebuffer().is_none());
    assert!(swapchain.depth_texture().is_none());
    assert!(swapchain.acquire_next_image().is_err());

    swapchain.resize(8, 8).unwrap();
    assert_eq!(swapchain.state(), SwapchainState::Active);
    assert!(swapchain.depth_texture().is_some());
    render_frame(&device, &mut swapchain, Color::WHITE);
    device.wait_for_idle().unwrap();
    assert_eq!(surface.presented_count(), 1);
}
