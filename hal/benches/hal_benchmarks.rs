use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use glam::Vec4;

use redlilium_hal::soft::{KernelLibrary, ProgramInterface, SoftGpu};
use redlilium_hal::{
    BackendKind, BindableResource, Buffer, BufferDescription, BufferUsage, ComputePipelineDescription, DeviceOptions,
    GraphicsDevice, Pipeline, ResourceFactory, ResourceKind, ResourceLayout, ResourceLayoutDescription,
    ResourceLayoutElement, ResourceSet, ShaderStages, TextureDescription, TextureFormat, TextureUsage,
    TextureViewDescription,
};

const SIZE: u32 = 64;

fn kernels() -> KernelLibrary {
    KernelLibrary::new().with_compute(
        "fill",
        ProgramInterface::new().uniform_block("params", 16).image("target"),
        |invocation, resources| {
            let value = resources.uniform::<f32>("params").unwrap_or(1.0);
            resources.store("target", invocation.global_id, Vec4::splat(value));
        },
    )
}

struct Scene {
    device: Arc<GraphicsDevice>,
    params: Arc<Buffer>,
    layout: Arc<ResourceLayout>,
    pipeline: Arc<Pipeline>,
    set: Arc<ResourceSet>,
    resources: Vec<BindableResource>,
}

fn scene(gpu: &SoftGpu, kind: BackendKind) -> Scene {
    let device = gpu.create_device(kind, DeviceOptions::default()).unwrap();
    let params = device
        .create_buffer(&BufferDescription::new(16, BufferUsage::UNIFORM))
        .unwrap();
    let target = device
        .create_texture(&TextureDescription::new_2d(
            SIZE,
            SIZE,
            TextureFormat::R32Float,
            TextureUsage::STORAGE,
        ))
        .unwrap();
    let view = device
        .create_texture_view(&target, &TextureViewDescription::new())
        .unwrap();
    let layout = device
        .create_resource_layout(&ResourceLayoutDescription::new(vec![
            ResourceLayoutElement::new("params", ResourceKind::UniformBuffer, ShaderStages::COMPUTE),
            ResourceLayoutElement::new("target", ResourceKind::TextureReadWrite, ShaderStages::COMPUTE),
        ]))
        .unwrap();
    let resources = vec![BindableResource::Buffer(Arc::clone(&params)), BindableResource::TextureView(view)];
    let set = device.create_resource_set(&layout, &resources).unwrap();
    let pipeline = device
        .create_pipeline(
            &ComputePipelineDescription::new("fill", [8, 8, 1])
                .with_resource_layout(Arc::clone(&layout))
                .into(),
        )
        .unwrap();
    Scene {
        device,
        params,
        layout,
        pipeline,
        set,
        resources,
    }
}

// ---------------------------------------------------------------------------
// Command recording
// ---------------------------------------------------------------------------

fn bench_record(c: &mut Criterion, name: &str, kind: BackendKind) {
    let gpu = SoftGpu::new(kernels());
    let scene = scene(&gpu, kind);
    c.bench_function(name, |b| {
        b.iter(|| {
            let mut list = scene.device.create_command_list().unwrap();
            list.begin().unwrap();
            list.set_pipeline(&scene.pipeline).unwrap();
            for _ in 0..64 {
                list.set_resource_set(0, &scene.set, &[]).unwrap();
                list.update_buffer(&scene.params, 0, &[0; 16]).unwrap();
            }
            list.end().unwrap();
            black_box(&list);
        });
    });
}

fn bench_record_native(c: &mut Criterion) {
    bench_record(c, "record_64_binds_vulkan", BackendKind::Vulkan);
}

fn bench_record_gl(c: &mut Criterion) {
    bench_record(c, "record_64_binds_opengl", BackendKind::OpenGl);
}

// ---------------------------------------------------------------------------
// Resource sets
// ---------------------------------------------------------------------------

fn bench_resource_set_creation(c: &mut Criterion) {
    let gpu = SoftGpu::new(kernels());
    let scene = scene(&gpu, BackendKind::Vulkan);
    c.bench_function("resource_set_create_2_elements", |b| {
        b.iter(|| {
            let set = scene
                .device
                .create_resource_set(&scene.layout, &scene.resources)
                .unwrap();
            black_box(&set);
        });
    });
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

fn bench_dispatch(c: &mut Criterion, name: &str, kind: BackendKind) {
    let gpu = SoftGpu::new(kernels());
    let scene = scene(&gpu, kind);
    c.bench_function(name, |b| {
        b.iter(|| {
            let mut list = scene.device.create_command_list().unwrap();
            list.begin().unwrap();
            list.set_pipeline(&scene.pipeline).unwrap();
            list.set_resource_set(0, &scene.set, &[]).unwrap();
            list.dispatch(SIZE / 8, SIZE / 8, 1).unwrap();
            list.end().unwrap();
            scene.device.submit_commands_blocking(&mut list).unwrap();
            black_box(scene.device.completed_submission());
        });
    });
}

fn bench_dispatch_native(c: &mut Criterion) {
    bench_dispatch(c, "dispatch_64x64_vulkan", BackendKind::Vulkan);
}

fn bench_dispatch_gl(c: &mut Criterion) {
    bench_dispatch(c, "dispatch_64x64_opengl", BackendKind::OpenGl);
}

criterion_group!(
    benches,
    bench_record_native,
    bench_record_gl,
    bench_resource_set_creation,
    bench_dispatch_native,
    bench_dispatch_gl,
);

criterion_main!(benches);
