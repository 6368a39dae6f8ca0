//! Object store of the software driver.
//!
//! Every native object lives in one [`Store`] keyed by its handle value.
//! Handles share a single id space, so a destroyed handle is never reused.

use std::collections::{HashMap, HashSet};

use glam::{UVec3, Vec4};

use super::explicit::SoftPipeline;
use super::format;
use super::gl::SoftProgram;
use super::surface::SoftSwapchain;
use crate::error::BackendError;
use crate::native::{NativeAttachment, NativeDescriptorWrite, NativeViewRange, RawObject};
use crate::types::{BufferDescription, Extent3d, ImageLayout, SamplerDescription, TextureDescription, TextureFormat};

pub(crate) struct SoftBuffer {
    pub desc: BufferDescription,
    pub data: Vec<u8>,
}

impl SoftBuffer {
    pub fn new(desc: &BufferDescription) -> Self {
        Self {
            desc: desc.clone(),
            data: vec![0; desc.size as usize],
        }
    }

    /// Bytes `offset..offset + len`, or an error when out of range.
    pub fn range(&self, offset: u64, len: u64) -> Result<&[u8], BackendError> {
        let (start, end) = checked_range(offset, len, self.data.len())?;
        Ok(&self.data[start..end])
    }

    pub fn range_mut(&mut self, offset: u64, len: u64) -> Result<&mut [u8], BackendError> {
        let (start, end) = checked_range(offset, len, self.data.len())?;
        Ok(&mut self.data[start..end])
    }
}

fn checked_range(offset: u64, len: u64, size: usize) -> Result<(usize, usize), BackendError> {
    let end = offset
        .checked_add(len)
        .filter(|end| *end <= size as u64)
        .ok_or_else(|| BackendError::Internal(format!("range {offset}+{len} outside buffer of {size} bytes")))?;
    Ok((offset as usize, end as usize))
}

pub(crate) struct SoftTexture {
    pub desc: TextureDescription,
    /// Tightly packed texels, indexed `mip + layer * mip_levels`.
    pub subresources: Vec<Vec<u8>>,
    pub layout: ImageLayout,
}

impl SoftTexture {
    pub fn new(desc: &TextureDescription) -> Result<Self, BackendError> {
        format::check_supported(desc.format)?;
        let mut subresources = Vec::with_capacity(desc.subresource_count() as usize);
        for _layer in 0..desc.array_layers {
            for mip in 0..desc.mip_levels {
                subresources.push(vec![0; desc.subresource_size(mip) as usize]);
            }
        }
        Ok(Self {
            desc: desc.clone(),
            subresources,
            layout: ImageLayout::Undefined,
        })
    }

    pub fn format(&self) -> TextureFormat {
        self.desc.format
    }

    pub fn extent(&self, mip_level: u32) -> Extent3d {
        self.desc.mip_extent(mip_level)
    }

    fn index(&self, mip_level: u32, array_layer: u32) -> Result<usize, BackendError> {
        if mip_level >= self.desc.mip_levels || array_layer >= self.desc.array_layers {
            return Err(BackendError::Internal(format!(
                "subresource (mip {mip_level}, layer {array_layer}) out of range"
            )));
        }
        Ok(self.desc.subresource_index(mip_level, array_layer) as usize)
    }

    pub fn subresource(&self, mip_level: u32, array_layer: u32) -> Result<&[u8], BackendError> {
        let index = self.index(mip_level, array_layer)?;
        Ok(&self.subresources[index])
    }

    pub fn subresource_mut(&mut self, mip_level: u32, array_layer: u32) -> Result<&mut Vec<u8>, BackendError> {
        let index = self.index(mip_level, array_layer)?;
        Ok(&mut self.subresources[index])
    }

    /// Byte offset of a texel within its subresource, `None` outside.
    pub fn texel_offset(&self, mip_level: u32, coord: UVec3) -> Option<usize> {
        let extent = self.extent(mip_level);
        if coord.x >= extent.width || coord.y >= extent.height || coord.z >= extent.depth {
            return None;
        }
        let texel = (coord.z as usize * extent.height as usize + coord.y as usize) * extent.width as usize
            + coord.x as usize;
        Some(texel * self.desc.format.block_size() as usize)
    }

    pub fn load(&self, mip_level: u32, array_layer: u32, coord: UVec3) -> Option<Vec4> {
        let offset = self.texel_offset(mip_level, coord)?;
        let data = self.subresource(mip_level, array_layer).ok()?;
        let size = self.desc.format.block_size() as usize;
        Some(format::decode(self.desc.format, &data[offset..offset + size]))
    }

    pub fn store(&mut self, mip_level: u32, array_layer: u32, coord: UVec3, value: Vec4) -> bool {
        let Some(offset) = self.texel_offset(mip_level, coord) else {
            return false;
        };
        let (format, size) = (self.desc.format, self.desc.format.block_size() as usize);
        match self.subresource_mut(mip_level, array_layer) {
            Ok(data) => {
                format::encode(format, value, &mut data[offset..offset + size]);
                true
            }
            Err(_) => false,
        }
    }
}

pub(crate) struct SoftView {
    pub texture: u64,
    pub range: NativeViewRange,
}

pub(crate) enum SoftObject {
    Buffer(SoftBuffer),
    Texture(SoftTexture),
    View(SoftView),
    Sampler(SamplerDescription),
    DescriptorSet(Vec<NativeDescriptorWrite>),
    Pipeline(SoftPipeline),
    Program(SoftProgram),
    Swapchain(SoftSwapchain),
}

impl SoftObject {
    fn kind(&self) -> &'static str {
        match self {
            Self::Buffer(_) => "buffer",
            Self::Texture(_) => "texture",
            Self::View(_) => "texture view",
            Self::Sampler(_) => "sampler",
            Self::DescriptorSet(_) => "descriptor set",
            Self::Pipeline(_) => "pipeline",
            Self::Program(_) => "program",
            Self::Swapchain(_) => "swapchain",
        }
    }
}

/// Handle value of any raw object.
pub(crate) fn object_id(object: RawObject) -> u64 {
    match object {
        RawObject::Buffer(raw) => raw.0,
        RawObject::Texture(raw) => raw.0,
        RawObject::TextureView(raw) => raw.0,
        RawObject::Sampler(raw) => raw.0,
        RawObject::DescriptorSet(raw) => raw.0,
        RawObject::Pipeline(raw) => raw.0,
        RawObject::Program(raw) => raw.0,
    }
}

macro_rules! accessors {
    ($($get:ident, $get_mut:ident => $variant:ident($ty:ty), $what:literal;)*) => {
        $(
            #[allow(dead_code)]
            pub fn $get(&self, id: u64) -> Result<&$ty, BackendError> {
                match self.objects.get(&id) {
                    Some(SoftObject::$variant(object)) => Ok(object),
                    other => Err(Self::mismatch($what, id, other)),
                }
            }

            #[allow(dead_code)]
            pub fn $get_mut(&mut self, id: u64) -> Result<&mut $ty, BackendError> {
                match self.objects.get_mut(&id) {
                    Some(SoftObject::$variant(object)) => Ok(object),
                    other => Err(Self::mismatch($what, id, other.map(|o| &*o))),
                }
            }
        )*
    };
}

#[derive(Default)]
pub(crate) struct Store {
    objects: HashMap<u64, SoftObject>,
    labels: HashMap<u64, String>,
    destroyed: HashSet<u64>,
    next_id: u64,
}

impl Store {
    pub fn insert(&mut self, object: SoftObject) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        log::trace!("soft: created {} #{id}", object.kind());
        self.objects.insert(id, object);
        id
    }

    pub fn remove(&mut self, id: u64) -> Option<SoftObject> {
        let object = self.objects.remove(&id)?;
        self.labels.remove(&id);
        self.destroyed.insert(id);
        Some(object)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.objects.contains_key(&id)
    }

    pub fn is_destroyed(&self, id: u64) -> bool {
        self.destroyed.contains(&id)
    }

    pub fn live_count(&self) -> usize {
        self.objects.len()
    }

    pub fn set_label(&mut self, id: u64, label: &str) {
        if self.objects.contains_key(&id) {
            self.labels.insert(id, label.to_string());
        }
    }

    pub fn label(&self, id: u64) -> Option<&str> {
        self.labels.get(&id).map(String::as_str)
    }

    fn mismatch(what: &str, id: u64, found: Option<&SoftObject>) -> BackendError {
        match found {
            Some(object) => BackendError::Internal(format!("handle #{id} is a {}, not a {what}", object.kind())),
            None => BackendError::Internal(format!("unknown {what} handle #{id}")),
        }
    }

    accessors! {
        buffer, buffer_mut => Buffer(SoftBuffer), "buffer";
        texture, texture_mut => Texture(SoftTexture), "texture";
        view, view_mut => View(SoftView), "texture view";
        sampler, sampler_mut => Sampler(SamplerDescription), "sampler";
        descriptor_set, descriptor_set_mut => DescriptorSet(Vec<NativeDescriptorWrite>), "descriptor set";
        pipeline, pipeline_mut => Pipeline(SoftPipeline), "pipeline";
        program, program_mut => Program(SoftProgram), "program";
        swapchain, swapchain_mut => Swapchain(SoftSwapchain), "swapchain";
    }

    /// Move a subresource out for exclusive writing. Pair with
    /// [`put_subresource`](Self::put_subresource).
    pub fn take_subresource(&mut self, attachment: NativeAttachment) -> Result<Vec<u8>, BackendError> {
        let texture = self.texture_mut(attachment.texture.0)?;
        Ok(std::mem::take(texture.subresource_mut(attachment.mip_level, attachment.array_layer)?))
    }

    pub fn put_subresource(&mut self, attachment: NativeAttachment, data: Vec<u8>) {
        if let Ok(texture) = self.texture_mut(attachment.texture.0) {
            if let Ok(slot) = texture.subresource_mut(attachment.mip_level, attachment.array_layer) {
                *slot = data;
            }
        }
    }
}
