//! Command execution shared by the explicit and context soft devices.

use glam::{UVec3, Vec4};

use super::format;
use super::kernel::{Bindings, ComputeInvocation, LinkedProgram, LinkedStages, ShaderResources};
use super::memory::{SoftTexture, Store};
use crate::error::BackendError;
use crate::native::{NativeAttachment, NativeTextureRegion};
use crate::types::{Color, Extent3d};

/// Fill a whole subresource with one encoded texel.
fn fill(store: &mut Store, attachment: NativeAttachment, value: Vec4) -> Result<(), BackendError> {
    let texture = store.texture_mut(attachment.texture.0)?;
    let format = texture.format();
    let mut block = vec![0u8; format.block_size() as usize];
    format::encode(format, value, &mut block);
    let data = texture.subresource_mut(attachment.mip_level, attachment.array_layer)?;
    for texel in data.chunks_exact_mut(block.len()) {
        texel.copy_from_slice(&block);
    }
    Ok(())
}

pub(crate) fn clear_color(store: &mut Store, attachment: NativeAttachment, color: Color) -> Result<(), BackendError> {
    fill(store, attachment, Vec4::from_array(color.to_array()))
}

pub(crate) fn clear_depth(store: &mut Store, attachment: NativeAttachment, depth: f32) -> Result<(), BackendError> {
    fill(store, attachment, Vec4::new(depth, 0.0, 0.0, 1.0))
}

pub(crate) fn update_buffer(store: &mut Store, buffer: u64, offset: u64, data: &[u8]) -> Result<(), BackendError> {
    store
        .buffer_mut(buffer)?
        .range_mut(offset, data.len() as u64)?
        .copy_from_slice(data);
    Ok(())
}

pub(crate) fn read_buffer(store: &Store, buffer: u64, offset: u64, len: u64) -> Result<Vec<u8>, BackendError> {
    Ok(store.buffer(buffer)?.range(offset, len)?.to_vec())
}

pub(crate) fn copy_buffer(
    store: &mut Store,
    source: u64,
    source_offset: u64,
    destination: u64,
    destination_offset: u64,
    size: u64,
) -> Result<(), BackendError> {
    let data = read_buffer(store, source, source_offset, size)?;
    update_buffer(store, destination, destination_offset, &data)
}

/// Byte ranges `(subresource offset, packed offset)` of every row of a
/// region, `row_len` bytes each.
fn region_rows(
    texture: &SoftTexture,
    region: &NativeTextureRegion,
    extent: Extent3d,
) -> Result<(usize, Vec<(usize, usize)>), BackendError> {
    let size = texture.extent(region.mip_level);
    let [x, y, z] = region.origin;
    let fits = |origin: u32, len: u32, limit: u32| origin.checked_add(len).is_some_and(|end| end <= limit);
    if !fits(x, extent.width, size.width) || !fits(y, extent.height, size.height) || !fits(z, extent.depth, size.depth)
    {
        return Err(BackendError::Internal(format!(
            "region {:?}+{}x{}x{} outside mip {} of {}x{}x{}",
            region.origin, extent.width, extent.height, extent.depth, region.mip_level, size.width, size.height,
            size.depth
        )));
    }
    let block = texture.format().block_size() as usize;
    let row_len = extent.width as usize * block;
    let mut rows = Vec::with_capacity((extent.height * extent.depth) as usize);
    for slice in 0..extent.depth as usize {
        for row in 0..extent.height as usize {
            let texel = ((z as usize + slice) * size.height as usize + y as usize + row) * size.width as usize
                + x as usize;
            rows.push((texel * block, (slice * extent.height as usize + row) * row_len));
        }
    }
    Ok((row_len, rows))
}

/// Write packed texels into a region.
pub(crate) fn update_texture(
    store: &mut Store,
    region: NativeTextureRegion,
    extent: Extent3d,
    data: &[u8],
) -> Result<(), BackendError> {
    let texture = store.texture_mut(region.texture.0)?;
    let (row_len, rows) = region_rows(texture, &region, extent)?;
    let needed = row_len * rows.len();
    if data.len() < needed {
        return Err(BackendError::Internal(format!(
            "texture update needs {needed} bytes, got {}",
            data.len()
        )));
    }
    let target = texture.subresource_mut(region.mip_level, region.array_layer)?;
    for (texel, packed) in rows {
        target[texel..texel + row_len].copy_from_slice(&data[packed..packed + row_len]);
    }
    Ok(())
}

/// Read a region as packed texels.
pub(crate) fn read_region(
    store: &Store,
    region: NativeTextureRegion,
    extent: Extent3d,
) -> Result<Vec<u8>, BackendError> {
    let texture = store.texture(region.texture.0)?;
    let (row_len, rows) = region_rows(texture, &region, extent)?;
    let source = texture.subresource(region.mip_level, region.array_layer)?;
    let mut data = vec![0u8; row_len * rows.len()];
    for (texel, packed) in rows {
        data[packed..packed + row_len].copy_from_slice(&source[texel..texel + row_len]);
    }
    Ok(data)
}

pub(crate) fn read_texture(store: &Store, texture: u64, mip_level: u32, array_layer: u32) -> Result<Vec<u8>, BackendError> {
    Ok(store.texture(texture)?.subresource(mip_level, array_layer)?.to_vec())
}

pub(crate) fn write_texture(
    store: &mut Store,
    texture: u64,
    mip_level: u32,
    array_layer: u32,
    data: &[u8],
) -> Result<(), BackendError> {
    let target = store.texture_mut(texture)?.subresource_mut(mip_level, array_layer)?;
    if target.len() != data.len() {
        return Err(BackendError::Internal(format!(
            "subresource holds {} bytes, got {}",
            target.len(),
            data.len()
        )));
    }
    target.copy_from_slice(data);
    Ok(())
}

pub(crate) fn copy_texture(
    store: &mut Store,
    source: NativeTextureRegion,
    destination: NativeTextureRegion,
    extent: Extent3d,
) -> Result<(), BackendError> {
    let (from, to) = (store.texture(source.texture.0)?.format(), store.texture(destination.texture.0)?.format());
    if from.block_size() != to.block_size() {
        return Err(BackendError::Internal(format!("cannot copy {from:?} texels into {to:?}")));
    }
    let data = read_region(store, source, extent)?;
    update_texture(store, destination, extent, &data)
}

/// Multisampled soft textures hold one sample per texel, so a resolve is a
/// copy of the first subresource.
pub(crate) fn resolve(
    store: &mut Store,
    source: NativeAttachment,
    destination: NativeAttachment,
) -> Result<(), BackendError> {
    let data = read_texture(store, source.texture.0, source.mip_level, source.array_layer)?;
    write_texture(store, destination.texture.0, destination.mip_level, destination.array_layer, &data)
}

/// Run every invocation of a dispatch, workgroup by workgroup.
pub(crate) fn dispatch(
    store: &mut Store,
    program: &LinkedProgram,
    bindings: &Bindings,
    groups: [u32; 3],
) -> Result<(), BackendError> {
    crate::profile_scope!("soft_dispatch");

    let LinkedStages::Compute { body, workgroup_size } = &program.stages else {
        return Err(BackendError::Internal("dispatch with a graphics pipeline bound".into()));
    };
    let local_size = UVec3::from_array(*workgroup_size);
    let mut resources = ShaderResources::exclusive(store, bindings);

    for gz in 0..groups[2] {
        for gy in 0..groups[1] {
            for gx in 0..groups[0] {
                let workgroup_id = UVec3::new(gx, gy, gz);
                for lz in 0..local_size.z {
                    for ly in 0..local_size.y {
                        for lx in 0..local_size.x {
                            let local_id = UVec3::new(lx, ly, lz);
                            let invocation = ComputeInvocation {
                                global_id: workgroup_id * local_size + local_id,
                                local_id,
                                workgroup_id,
                            };
                            body(&invocation, &mut resources);
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::native::RawTexture;
    use crate::soft::kernel::{Bound, KernelLibrary, ProgramInterface};
    use crate::soft::memory::{SoftBuffer, SoftObject};
    use crate::types::{
        BufferDescription, BufferUsage, ComputePipelineDescription, TextureDescription, TextureFormat,
        TextureUsage,
    };

    fn texture(store: &mut Store, width: u32, height: u32) -> u64 {
        let desc = TextureDescription::new_2d(width, height, TextureFormat::R8Unorm, TextureUsage::SAMPLED);
        store.insert(SoftObject::Texture(SoftTexture::new(&desc).unwrap()))
    }

    fn region(texture: u64, origin: [u32; 3]) -> NativeTextureRegion {
        NativeTextureRegion {
            texture: RawTexture(texture),
            mip_level: 0,
            array_layer: 0,
            origin,
        }
    }

    #[test]
    fn test_update_and_copy_texture_region() {
        let mut store = Store::default();
        let source = texture(&mut store, 4, 4);
        let destination = texture(&mut store, 4, 4);

        update_texture(&mut store, region(source, [1, 1, 0]), Extent3d::new_2d(2, 2), &[1, 2, 3, 4]).unwrap();
        copy_texture(
            &mut store,
            region(source, [1, 1, 0]),
            region(destination, [0, 0, 0]),
            Extent3d::new_2d(2, 2),
        )
        .unwrap();

        let data = read_texture(&store, destination, 0, 0).unwrap();
        assert_eq!(&data[0..2], &[1, 2]);
        assert_eq!(&data[4..6], &[3, 4]);
        assert_eq!(data.iter().filter(|b| **b != 0).count(), 4);
    }

    #[test]
    fn test_region_outside_mip_rejected() {
        let mut store = Store::default();
        let id = texture(&mut store, 4, 4);
        let result = update_texture(&mut store, region(id, [3, 0, 0]), Extent3d::new_2d(2, 1), &[0, 0]);
        assert!(result.is_err());
    }

    #[rstest]
    #[case::x([u32::MAX, 0, 0])]
    #[case::y([0, u32::MAX, 0])]
    #[case::z([0, 0, u32::MAX])]
    fn test_region_origin_overflow_rejected(#[case] origin: [u32; 3]) {
        let mut store = Store::default();
        let id = texture(&mut store, 4, 4);
        let result = update_texture(&mut store, region(id, origin), Extent3d::new(1, 1, 1), &[0]);
        assert!(result.is_err());
        assert!(read_texture(&store, id, 0, 0).unwrap().iter().all(|b| *b == 0));
    }

    #[test]
    fn test_clear_fills_every_texel() {
        let mut store = Store::default();
        let id = texture(&mut store, 3, 2);
        let attachment = NativeAttachment {
            texture: RawTexture(id),
            mip_level: 0,
            array_layer: 0,
        };
        clear_color(&mut store, attachment, Color::WHITE).unwrap();
        assert_eq!(read_texture(&store, id, 0, 0).unwrap(), vec![255; 6]);
    }

    #[test]
    fn test_dispatch_covers_every_invocation() {
        let library = KernelLibrary::new().with_compute(
            "count",
            ProgramInterface::new().storage_block("out"),
            |invocation, resources| {
                let index = (invocation.global_id.y * 8 + invocation.global_id.x) as usize;
                resources.write("out", index, index as u32 + 1);
            },
        );
        let program = library
            .link(&ComputePipelineDescription::new("count", [4, 2, 1]).into())
            .unwrap();

        let mut store = Store::default();
        let buffer = store.insert(SoftObject::Buffer(SoftBuffer::new(&BufferDescription::new(
            256,
            BufferUsage::STRUCTURED_READ_WRITE,
        ))));
        let mut bindings = Bindings::new();
        bindings.insert("out".into(), Bound::Buffer { buffer, offset: 0, size: 256 });

        dispatch(&mut store, &program, &bindings, [2, 4, 1]).unwrap();

        let data = read_buffer(&store, buffer, 0, 256).unwrap();
        let values: Vec<u32> = data
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(values, (1..=64).collect::<Vec<u32>>());
    }
}
