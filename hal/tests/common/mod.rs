//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use glam::{UVec3, Vec4};
use redlilium_hal::soft::{KernelLibrary, ProgramInterface, SoftGpu, VertexOutput};
use redlilium_hal::{BackendKind, DeviceOptions, GraphicsDevice};

pub const FILL_WORKGROUP: [u32; 3] = [16, 16, 1];

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Kernels used across the tests.
///
/// - `fill_volume`: writes `fill * (z + 1)` into every texel of `volume`,
///   `fill` being the first float of `params`.
/// - `copy_window`: copies `source[i]` to `destination[i]`.
/// - `fullscreen` / `solid`: one triangle covering the target, shaded with
///   the color in `tint`.
/// - `left_half`: two triangles (six vertices) covering `x < 0` in NDC.
/// - `shifted`: the `position` attribute moved right by one NDC unit per
///   instance.
/// - `layered`: a full-target triangle per instance, instance 0 green at
///   depth 0.25, later instances red at depth 0.75.
/// - `varying_color`: outputs the interpolated varying.
pub fn kernels() -> KernelLibrary {
    KernelLibrary::new()
        .with_compute(
            "fill_volume",
            ProgramInterface::new().uniform_block("params", 16).image("volume"),
            |invocation, resources| {
                let fill = resources.uniform::<f32>("params").unwrap_or(0.0);
                let id = invocation.global_id;
                resources.store("volume", id, Vec4::splat(fill * (id.z as f32 + 1.0)));
            },
        )
        .with_compute(
            "copy_window",
            ProgramInterface::new().storage_block("source").storage_block("destination"),
            |invocation, resources| {
                let index = invocation.global_id.x as usize;
                if let Some(value) = resources.read::<u32>("source", index) {
                    resources.write("destination", index, value);
                }
            },
        )
        .with_vertex("fullscreen", ProgramInterface::new(), |input, _| {
            let position = match input.vertex_index {
                0 => Vec4::new(-1.0, -1.0, 0.0, 1.0),
                1 => Vec4::new(3.0, -1.0, 0.0, 1.0),
                _ => Vec4::new(-1.0, 3.0, 0.0, 1.0),
            };
            VertexOutput::new(position)
        })
        .with_vertex("left_half", ProgramInterface::new(), |input, _| {
            let (x, y) = match input.vertex_index {
                0 | 3 => (-1.0, -1.0),
                1 => (0.0, -1.0),
                2 | 4 => (0.0, 1.0),
                _ => (-1.0, 1.0),
            };
            VertexOutput::new(Vec4::new(x, y, 0.0, 1.0))
        })
        .with_vertex("shifted", ProgramInterface::new(), |input, _| {
            let position = input.attribute("position");
            let x = position.x + input.instance_index as f32;
            VertexOutput::new(Vec4::new(x, position.y, 0.0, 1.0)).with_varying(Vec4::ONE)
        })
        .with_vertex("layered", ProgramInterface::new(), |input, _| {
            let (x, y) = match input.vertex_index {
                0 => (-1.0, -1.0),
                1 => (3.0, -1.0),
                _ => (-1.0, 3.0),
            };
            let (depth, color) = if input.instance_index == 0 {
                (0.25, Vec4::new(0.0, 1.0, 0.0, 1.0))
            } else {
                (0.75, Vec4::new(1.0, 0.0, 0.0, 1.0))
            };
            VertexOutput::new(Vec4::new(x, y, depth, 1.0)).with_varying(color)
        })
        .with_fragment("varying_color", ProgramInterface::new(), |input, _| Some(input.varying))
        .with_fragment(
            "solid",
            ProgramInterface::new().uniform_block("tint", 16),
            |_, resources| {
                let color = resources.uniform::<[f32; 4]>("tint")?;
                Some(Vec4::from_array(color))
            },
        )
}

pub fn gpu() -> SoftGpu {
    SoftGpu::new(kernels())
}

pub fn device(gpu: &SoftGpu, kind: BackendKind) -> Arc<GraphicsDevice> {
    init_logging();
    gpu.create_device(kind, DeviceOptions::default())
        .expect("soft device creation")
}

/// Index of texel `coord` in a tightly packed `width x height x depth`
/// volume.
pub fn texel_index(coord: UVec3, width: u32, height: u32) -> usize {
    ((coord.z * height + coord.y) * width + coord.x) as usize
}
