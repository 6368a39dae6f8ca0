//! Triangle, line and point rasterization.
//!
//! Window coordinates are y-down on every backend: NDC `(-1, 1)` maps to
//! the top-left corner of the viewport. NDC depth runs `0..1`. Edges are
//! inclusive, so pixels on an edge shared by two triangles are shaded
//! twice. Primitives with a vertex at or behind the eye (`w <= 0`) are
//! dropped rather than clipped.

use std::collections::HashMap;

use glam::{Vec2, Vec3, Vec4};

use super::format;
use super::kernel::{
    Bindings, FragmentInput, FragmentKernel, GraphicsState, LinkedProgram, LinkedStages, ShaderResources,
    VertexInput, VertexKernel, VertexOutput,
};
use super::memory::Store;
use crate::error::BackendError;
use crate::native::{NativeAttachment, NativeRenderTargets};
use crate::types::{
    BlendAttachment, BlendFactor, BlendOperation, ColorWriteMask, CullMode, FrontFace, IndexFormat, PolygonFill,
    PrimitiveTopology, ScissorRect, TextureFormat, VertexElementFormat, Viewport,
};

/// Pipeline-independent state a draw reads.
pub(crate) struct RenderState<'a> {
    pub targets: &'a NativeRenderTargets,
    pub viewport: Option<Viewport>,
    pub scissor: Option<ScissorRect>,
    /// Slot to `(buffer, offset)`.
    pub vertex_buffers: &'a HashMap<u32, (u64, u64)>,
    /// `(buffer, format, offset)`.
    pub index_buffer: Option<(u64, IndexFormat, u64)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DrawCall {
    pub count: u32,
    pub instance_count: u32,
    pub first: u32,
    pub vertex_offset: i32,
    pub first_instance: u32,
    pub indexed: bool,
}

/// A color or depth target moved out of the store for the draw.
struct Target {
    attachment: NativeAttachment,
    format: TextureFormat,
    width: u32,
    data: Vec<u8>,
}

impl Target {
    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * self.format.block_size() as usize
    }

    fn load(&self, x: u32, y: u32) -> Vec4 {
        let offset = self.offset(x, y);
        let size = self.format.block_size() as usize;
        format::decode(self.format, &self.data[offset..offset + size])
    }

    fn store(&mut self, x: u32, y: u32, value: Vec4) {
        let offset = self.offset(x, y);
        let size = self.format.block_size() as usize;
        format::encode(self.format, value, &mut self.data[offset..offset + size]);
    }
}

/// Vertex after the viewport transform.
#[derive(Debug, Clone, Copy)]
struct ScreenVertex {
    /// Window position.
    position: Vec2,
    /// Window depth.
    depth: f32,
    /// `1 / w`.
    inverse_w: f32,
    /// NDC position, for facing.
    ndc: Vec2,
    varying: Vec4,
}

enum Primitive {
    Point(usize),
    Line([usize; 2]),
    Triangle([usize; 3]),
}

fn assemble(topology: PrimitiveTopology, count: usize) -> Vec<Primitive> {
    match topology {
        PrimitiveTopology::PointList => (0..count).map(Primitive::Point).collect(),
        PrimitiveTopology::LineList => (0..count / 2).map(|i| Primitive::Line([2 * i, 2 * i + 1])).collect(),
        PrimitiveTopology::LineStrip => (1..count).map(|i| Primitive::Line([i - 1, i])).collect(),
        PrimitiveTopology::TriangleList => (0..count / 3)
            .map(|i| Primitive::Triangle([3 * i, 3 * i + 1, 3 * i + 2]))
            .collect(),
        PrimitiveTopology::TriangleStrip => (2..count)
            .map(|i| {
                // Odd triangles swap their first two vertices to keep winding.
                if i % 2 == 0 {
                    Primitive::Triangle([i - 2, i - 1, i])
                } else {
                    Primitive::Triangle([i - 1, i - 2, i])
                }
            })
            .collect(),
    }
}

fn read_attribute(format: VertexElementFormat, bytes: &[u8]) -> Vec4 {
    let float = |i: usize| -> f32 { bytemuck::pod_read_unaligned(&bytes[i * 4..i * 4 + 4]) };
    let uint = |i: usize| -> f32 { bytemuck::pod_read_unaligned::<u32>(&bytes[i * 4..i * 4 + 4]) as f32 };
    match format {
        VertexElementFormat::Float1 => Vec4::new(float(0), 0.0, 0.0, 1.0),
        VertexElementFormat::Float2 => Vec4::new(float(0), float(1), 0.0, 1.0),
        VertexElementFormat::Float3 => Vec4::new(float(0), float(1), float(2), 1.0),
        VertexElementFormat::Float4 => Vec4::new(float(0), float(1), float(2), float(3)),
        VertexElementFormat::UInt1 => Vec4::new(uint(0), 0.0, 0.0, 1.0),
        VertexElementFormat::UInt2 => Vec4::new(uint(0), uint(1), 0.0, 1.0),
        VertexElementFormat::UInt4 => Vec4::new(uint(0), uint(1), uint(2), uint(3)),
        VertexElementFormat::Byte4Norm => Vec4::new(
            bytes[0] as f32 / 255.0,
            bytes[1] as f32 / 255.0,
            bytes[2] as f32 / 255.0,
            bytes[3] as f32 / 255.0,
        ),
    }
}

/// Vertex indices of a draw, in submission order.
fn vertex_indices(store: &Store, state: &RenderState<'_>, call: &DrawCall) -> Result<Vec<u32>, BackendError> {
    if !call.indexed {
        return Ok((call.first..call.first + call.count).collect());
    }
    let (buffer, format, offset) = state
        .index_buffer
        .ok_or_else(|| BackendError::Internal("indexed draw without an index buffer".into()))?;
    let size = format.size();
    let data = store
        .buffer(buffer)?
        .range(offset + call.first as u64 * size, call.count as u64 * size)?;
    Ok(data
        .chunks_exact(size as usize)
        .map(|chunk| {
            let index = match format {
                IndexFormat::U16 => bytemuck::pod_read_unaligned::<u16>(chunk) as i64,
                IndexFormat::U32 => bytemuck::pod_read_unaligned::<u32>(chunk) as i64,
            };
            (index + call.vertex_offset as i64).max(0) as u32
        })
        .collect())
}

fn shade_vertex(
    store: &Store,
    bindings: &Bindings,
    graphics: &GraphicsState,
    state: &RenderState<'_>,
    kernel: &VertexKernel,
    vertex_index: u32,
    instance_index: u32,
) -> Result<VertexOutput, BackendError> {
    let mut attributes = Vec::new();
    for (slot, layout) in graphics.vertex_layouts.iter().enumerate() {
        let Some((buffer, offset)) = state.vertex_buffers.get(&(slot as u32)) else {
            continue;
        };
        let element = match layout.instance_step_rate {
            0 => vertex_index,
            rate => instance_index / rate,
        };
        let base = offset + element as u64 * layout.stride as u64;
        let data = &store.buffer(*buffer)?.data;
        for attribute in &layout.elements {
            let start = (base + attribute.offset as u64) as usize;
            let bytes = data
                .get(start..start + attribute.format.size() as usize)
                .ok_or_else(|| BackendError::Internal(format!("vertex {vertex_index} fetch outside buffer")))?;
            attributes.push((attribute.name.as_str(), read_attribute(attribute.format, bytes)));
        }
    }
    let input = VertexInput {
        vertex_index,
        instance_index,
        attributes,
    };
    Ok(kernel(&input, &ShaderResources::shared(store, bindings)))
}

fn blend_factor(factor: BlendFactor, source: Vec4, destination: Vec4, constant: Vec4) -> Vec4 {
    match factor {
        BlendFactor::Zero => Vec4::ZERO,
        BlendFactor::One => Vec4::ONE,
        BlendFactor::SourceAlpha => Vec4::splat(source.w),
        BlendFactor::InverseSourceAlpha => Vec4::splat(1.0 - source.w),
        BlendFactor::DestinationAlpha => Vec4::splat(destination.w),
        BlendFactor::InverseDestinationAlpha => Vec4::splat(1.0 - destination.w),
        BlendFactor::SourceColor => source,
        BlendFactor::InverseSourceColor => Vec4::ONE - source,
        BlendFactor::DestinationColor => destination,
        BlendFactor::InverseDestinationColor => Vec4::ONE - destination,
        BlendFactor::BlendFactor => constant,
        BlendFactor::InverseBlendFactor => Vec4::ONE - constant,
    }
}

fn blend_operation(operation: BlendOperation, source: Vec4, destination: Vec4, fs: Vec4, fd: Vec4) -> Vec4 {
    match operation {
        BlendOperation::Add => source * fs + destination * fd,
        BlendOperation::Subtract => source * fs - destination * fd,
        BlendOperation::ReverseSubtract => destination * fd - source * fs,
        BlendOperation::Minimum => source.min(destination),
        BlendOperation::Maximum => source.max(destination),
    }
}

fn blend(attachment: &BlendAttachment, source: Vec4, destination: Vec4, constant: Vec4) -> Vec4 {
    let blended = if attachment.enabled {
        let color = blend_operation(
            attachment.color_operation,
            source,
            destination,
            blend_factor(attachment.source_color, source, destination, constant),
            blend_factor(attachment.destination_color, source, destination, constant),
        );
        let alpha = blend_operation(
            attachment.alpha_operation,
            source,
            destination,
            blend_factor(attachment.source_alpha, source, destination, constant),
            blend_factor(attachment.destination_alpha, source, destination, constant),
        );
        color.truncate().extend(alpha.w)
    } else {
        source
    };

    let mask = attachment.write_mask;
    let pick = |bit: ColorWriteMask, new: f32, old: f32| if mask.contains(bit) { new } else { old };
    Vec4::new(
        pick(ColorWriteMask::RED, blended.x, destination.x),
        pick(ColorWriteMask::GREEN, blended.y, destination.y),
        pick(ColorWriteMask::BLUE, blended.z, destination.z),
        pick(ColorWriteMask::ALPHA, blended.w, destination.w),
    )
}

/// Per-fragment state of one draw.
struct FragmentStage<'a> {
    resources: ShaderResources<'a>,
    kernel: &'a FragmentKernel,
    graphics: &'a GraphicsState,
    colors: Vec<Target>,
    depth: Option<Target>,
    depth_range: (f32, f32),
    /// Inclusive-exclusive pixel bounds `[x0, y0, x1, y1]`.
    bounds: [u32; 4],
}

impl FragmentStage<'_> {
    fn contains(&self, x: i64, y: i64) -> bool {
        let [x0, y0, x1, y1] = self.bounds;
        x >= x0 as i64 && y >= y0 as i64 && x < x1 as i64 && y < y1 as i64
    }

    fn shade(&mut self, x: i64, y: i64, depth: f32, varying: Vec4, front_facing: bool) {
        if !self.contains(x, y) {
            return;
        }
        let (x, y) = (x as u32, y as u32);
        let (near, far) = self.depth_range;
        let (low, high) = (near.min(far), near.max(far));
        let depth = if self.graphics.rasterizer.depth_clip {
            if depth < low || depth > high {
                return;
            }
            depth
        } else {
            depth.clamp(low, high)
        };

        let depth_state = self.graphics.depth_stencil;
        if let Some(target) = &self.depth {
            if depth_state.depth_test && !depth_state.comparison.passes(depth, target.load(x, y).x) {
                return;
            }
        }

        let input = FragmentInput {
            position: Vec4::new(x as f32 + 0.5, y as f32 + 0.5, depth, 1.0),
            varying,
            front_facing,
        };
        let Some(color) = (self.kernel)(&input, &self.resources) else {
            return;
        };

        if let Some(target) = &mut self.depth {
            if depth_state.depth_write {
                target.store(x, y, Vec4::new(depth, 0.0, 0.0, 1.0));
            }
        }
        let constant = Vec4::from_array(self.graphics.blend.blend_factor.to_array());
        for (index, target) in self.colors.iter_mut().enumerate() {
            let attachment = self.graphics.blend.attachment(index);
            let destination = target.load(x, y);
            target.store(x, y, blend(&attachment, color, destination, constant));
        }
    }

    fn point(&mut self, v: &ScreenVertex) {
        let p = v.position.floor();
        self.shade(p.x as i64, p.y as i64, v.depth, v.varying, true);
    }

    fn line(&mut self, a: &ScreenVertex, b: &ScreenVertex) {
        let delta = b.position - a.position;
        let steps = delta.abs().max_element().ceil().max(1.0) as u32;
        for step in 0..=steps {
            let t = step as f32 / steps as f32;
            let p = a.position.lerp(b.position, t).floor();
            let depth = a.depth + (b.depth - a.depth) * t;
            self.shade(p.x as i64, p.y as i64, depth, a.varying.lerp(b.varying, t), true);
        }
    }

    fn triangle(&mut self, v: [&ScreenVertex; 3]) {
        let ndc_area = edge(v[0].ndc, v[1].ndc, v[2].ndc);
        if ndc_area == 0.0 {
            return;
        }
        let counter_clockwise = ndc_area > 0.0;
        let front_facing = match self.graphics.rasterizer.front_face {
            FrontFace::CounterClockwise => counter_clockwise,
            FrontFace::Clockwise => !counter_clockwise,
        };
        match self.graphics.rasterizer.cull_mode {
            CullMode::Front if front_facing => return,
            CullMode::Back if !front_facing => return,
            _ => {}
        }

        if self.graphics.rasterizer.fill == PolygonFill::Wireframe {
            self.line(v[0], v[1]);
            self.line(v[1], v[2]);
            self.line(v[2], v[0]);
            return;
        }

        let [p0, p1, p2] = [v[0].position, v[1].position, v[2].position];
        let area = edge(p0, p1, p2);
        let [x0, y0, x1, y1] = self.bounds;
        let min = p0.min(p1).min(p2).floor().max(Vec2::new(x0 as f32, y0 as f32));
        let max = p0.max(p1).max(p2).ceil().min(Vec2::new(x1 as f32, y1 as f32));

        for y in min.y as i64..max.y as i64 {
            for x in min.x as i64..max.x as i64 {
                let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                let weights = Vec3::new(edge(p1, p2, p), edge(p2, p0, p), edge(p0, p1, p)) / area;
                if weights.min_element() < 0.0 {
                    continue;
                }
                let depth = weights.dot(Vec3::new(v[0].depth, v[1].depth, v[2].depth));
                let perspective = weights * Vec3::new(v[0].inverse_w, v[1].inverse_w, v[2].inverse_w);
                let varying = (v[0].varying * perspective.x + v[1].varying * perspective.y + v[2].varying * perspective.z)
                    / (perspective.x + perspective.y + perspective.z);
                self.shade(x, y, depth, varying, front_facing);
            }
        }
    }
}

/// Twice the signed area of `(a, b, c)`.
fn edge(a: Vec2, b: Vec2, c: Vec2) -> f32 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

fn take_target(store: &mut Store, attachment: NativeAttachment) -> Result<Target, BackendError> {
    let texture = store.texture(attachment.texture.0)?;
    let format = texture.format();
    let width = texture.extent(attachment.mip_level).width;
    let data = store.take_subresource(attachment)?;
    Ok(Target {
        attachment,
        format,
        width,
        data,
    })
}

/// Execute one draw into the render targets.
pub(crate) fn draw(
    store: &mut Store,
    program: &LinkedProgram,
    bindings: &Bindings,
    state: &RenderState<'_>,
    call: &DrawCall,
) -> Result<(), BackendError> {
    crate::profile_scope!("soft_draw");

    let (LinkedStages::Graphics { vertex, fragment }, Some(graphics)) = (&program.stages, &program.graphics) else {
        return Err(BackendError::Internal("draw with a compute pipeline bound".into()));
    };
    let (width, height) = (state.targets.width, state.targets.height);
    let viewport = state.viewport.unwrap_or_else(|| Viewport::full(width, height));

    let indices = vertex_indices(store, state, call)?;
    let mut instances = Vec::with_capacity(call.instance_count as usize);
    for instance in call.first_instance..call.first_instance + call.instance_count {
        let mut screen = Vec::with_capacity(indices.len());
        for &index in &indices {
            let output = shade_vertex(store, bindings, graphics, state, vertex.as_ref(), index, instance)?;
            let w = output.position.w;
            let ndc = output.position.truncate() / w;
            screen.push((
                w > 0.0,
                ScreenVertex {
                    position: Vec2::new(
                        viewport.x + (ndc.x + 1.0) * 0.5 * viewport.width,
                        viewport.y + (1.0 - ndc.y) * 0.5 * viewport.height,
                    ),
                    depth: viewport.min_depth + ndc.z * (viewport.max_depth - viewport.min_depth),
                    inverse_w: 1.0 / w,
                    ndc: ndc.truncate(),
                    varying: output.varying,
                },
            ));
        }
        instances.push(screen);
    }

    let mut colors = Vec::with_capacity(state.targets.colors.len());
    for attachment in &state.targets.colors {
        match take_target(store, *attachment) {
            Ok(target) => colors.push(target),
            Err(e) => {
                for target in colors {
                    store.put_subresource(target.attachment, target.data);
                }
                return Err(e);
            }
        }
    }
    let depth = match state.targets.depth.map(|attachment| take_target(store, attachment)).transpose() {
        Ok(depth) => depth,
        Err(e) => {
            for target in colors {
                store.put_subresource(target.attachment, target.data);
            }
            return Err(e);
        }
    };

    let mut bounds = [0, 0, width, height];
    if let (true, Some(scissor)) = (graphics.rasterizer.scissor_test, state.scissor) {
        bounds = [
            scissor.x.min(width),
            scissor.y.min(height),
            scissor.x.saturating_add(scissor.width).min(width),
            scissor.y.saturating_add(scissor.height).min(height),
        ];
    }

    let mut stage = FragmentStage {
        resources: ShaderResources::shared(store, bindings),
        kernel: fragment.as_ref(),
        graphics,
        colors,
        depth,
        depth_range: (viewport.min_depth, viewport.max_depth),
        bounds,
    };
    let primitives = assemble(graphics.topology, indices.len());
    for screen in &instances {
        for primitive in &primitives {
            match *primitive {
                Primitive::Point(a) if screen[a].0 => stage.point(&screen[a].1),
                Primitive::Line([a, b]) if screen[a].0 && screen[b].0 => stage.line(&screen[a].1, &screen[b].1),
                Primitive::Triangle([a, b, c]) if screen[a].0 && screen[b].0 && screen[c].0 => {
                    stage.triangle([&screen[a].1, &screen[b].1, &screen[c].1])
                }
                _ => {}
            }
        }
    }

    let FragmentStage { colors, depth, .. } = stage;
    for target in colors.into_iter().chain(depth) {
        store.put_subresource(target.attachment, target.data);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_assembly_keeps_winding() {
        let primitives = assemble(PrimitiveTopology::TriangleStrip, 4);
        let triangles: Vec<[usize; 3]> = primitives
            .into_iter()
            .filter_map(|p| match p {
                Primitive::Triangle(t) => Some(t),
                _ => None,
            })
            .collect();
        assert_eq!(triangles, vec![[0, 1, 2], [2, 1, 3]]);
    }

    #[test]
    fn test_alpha_blend() {
        let attachment = BlendAttachment::ALPHA_BLEND;
        let result = blend(&attachment, Vec4::new(1.0, 0.0, 0.0, 0.25), Vec4::new(0.0, 0.0, 1.0, 1.0), Vec4::ZERO);
        assert!((result.x - 0.25).abs() < 1e-6);
        assert!((result.z - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_write_mask_keeps_destination() {
        let mut attachment = BlendAttachment::OVERRIDE;
        attachment.write_mask = ColorWriteMask::RED;
        let result = blend(&attachment, Vec4::ONE, Vec4::ZERO, Vec4::ZERO);
        assert_eq!(result, Vec4::new(1.0, 0.0, 0.0, 0.0));
    }

    #[test]
    fn test_attribute_formats() {
        let bytes = [255u8, 0, 51, 255];
        assert_eq!(
            read_attribute(VertexElementFormat::Byte4Norm, &bytes),
            Vec4::new(1.0, 0.0, 0.2, 1.0)
        );
        let bytes = bytemuck::bytes_of(&[1.5f32, 2.0]).to_vec();
        assert_eq!(read_attribute(VertexElementFormat::Float2, &bytes), Vec4::new(1.5, 2.0, 0.0, 1.0));
    }
}
