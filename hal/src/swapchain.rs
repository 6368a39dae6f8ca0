//! Swapchain and per-image framebuffer management.
//!
//! A [`Swapchain`] owns the presentable images of a surface, one
//! [`Framebuffer`] per image and an optional depth texture shared by all of
//! them.
//!
//! # Example
//!
//! ```ignore
//! let desc = SwapchainDescription::new(surface, 1280, 720).with_depth(TextureFormat::Depth32Float);
//! let mut swapchain = device.create_swapchain(&desc)?;
//!
//! // In render loop:
//! match swapchain.acquire_next_image() {
//!     Ok(_) => {}
//!     Err(e) if e.is_recoverable() => {
//!         let (width, height) = surface.extent();
//!         swapchain.resize(width, height)?;
//!         continue;
//!     }
//!     Err(e) => return Err(e),
//! }
//! if let Some(framebuffer) = swapchain.framebuffer() {
//!     list.set_framebuffer(framebuffer)?;
//! }
//! // ... record and submit ...
//! swapchain.present()?;
//! ```

use std::sync::Arc;

use crate::device::{DeviceBackend, GraphicsDevice};
use crate::error::{HalError, HalResult};
use crate::factory::ResourceFactory;
use crate::native::{GlContext, NativeSwapchainDesc, RawSwapchain};
use crate::resources::{DeviceResource, Framebuffer, Texture, TextureOrigin};
use crate::types::{
    FramebufferAttachment, FramebufferDescription, ImageLayout, SwapchainDescription, TextureDescription,
    TextureUsage,
};

/// Swapchain images requested with vsync on.
const VSYNC_IMAGE_COUNT: u32 = 3;
/// Swapchain images requested with vsync off.
const IMMEDIATE_IMAGE_COUNT: u32 = 2;

/// Lifecycle of a [`Swapchain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwapchainState {
    Uninitialized,
    Active,
    Resizing,
    Destroyed,
}

/// How frames reach the surface.
enum Presenter {
    /// Driver swapchain of an explicit backend.
    Native(RawSwapchain),
    /// Offscreen back buffer copied to the surface by the GL context thread.
    BackBuffer,
}

/// Presentable images of a surface with their framebuffers.
pub struct Swapchain {
    device: Arc<GraphicsDevice>,
    description: SwapchainDescription,
    state: SwapchainState,
    presenter: Option<Presenter>,
    images: Vec<Arc<Texture>>,
    framebuffers: Vec<Arc<Framebuffer>>,
    depth: Option<Arc<Texture>>,
    /// Tracked layout per image, on backends with explicit image layouts.
    layouts: Vec<ImageLayout>,
    current_image: u32,
    acquired: bool,
}

impl Swapchain {
    pub(crate) fn new(device: Arc<GraphicsDevice>, description: SwapchainDescription) -> HalResult<Self> {
        if description.width == 0 || description.height == 0 {
            return Err(HalError::invalid_parameter(format!(
                "swapchain extent {}x{} has a zero dimension",
                description.width, description.height
            )));
        }
        if description.color_format.is_depth_stencil() {
            return Err(HalError::invalid_parameter(format!(
                "swapchain color format {:?} is a depth format",
                description.color_format
            )));
        }
        if let Some(depth) = description.depth_format {
            if !depth.is_depth_stencil() {
                return Err(HalError::invalid_parameter(format!(
                    "swapchain depth format {depth:?} is not a depth format"
                )));
            }
        }

        let mut swapchain = Self {
            device,
            description,
            state: SwapchainState::Uninitialized,
            presenter: None,
            images: Vec::new(),
            framebuffers: Vec::new(),
            depth: None,
            layouts: Vec::new(),
            current_image: 0,
            acquired: false,
        };
        swapchain.build()?;
        swapchain.state = SwapchainState::Active;
        log::debug!(
            "Created swapchain {}x{} with {} images",
            swapchain.width(),
            swapchain.height(),
            swapchain.image_count()
        );
        Ok(swapchain)
    }

    pub fn state(&self) -> SwapchainState {
        self.state
    }

    pub fn description(&self) -> &SwapchainDescription {
        &self.description
    }

    pub fn width(&self) -> u32 {
        self.description.width
    }

    pub fn height(&self) -> u32 {
        self.description.height
    }

    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    /// Index of the most recently acquired image.
    pub fn current_image_index(&self) -> u32 {
        self.current_image
    }

    /// Framebuffer of the current image. `None` once destroyed.
    pub fn framebuffer(&self) -> Option<&Arc<Framebuffer>> {
        self.framebuffers.get(self.current_image as usize)
    }

    pub fn framebuffer_at(&self, index: u32) -> Option<&Arc<Framebuffer>> {
        self.framebuffers.get(index as usize)
    }

    /// Color texture of the current image.
    pub fn current_texture(&self) -> Option<&Arc<Texture>> {
        self.images.get(self.current_image as usize)
    }

    pub fn depth_texture(&self) -> Option<&Arc<Texture>> {
        self.depth.as_ref()
    }

    /// Tracked layout of image `index`. `None` on backends without explicit
    /// image layouts.
    pub fn image_layout(&self, index: u32) -> Option<ImageLayout> {
        self.layouts.get(index as usize).copied()
    }

    /// Acquire the next image to render into.
    ///
    /// Fails with [`HalError::SwapchainOutOfDate`] or
    /// [`HalError::SurfaceLost`] when the surface changed; resize and retry.
    pub fn acquire_next_image(&mut self) -> HalResult<u32> {
        crate::profile_function!();
        self.ensure_active()?;

        let index = match self.presenter.as_ref() {
            Some(Presenter::Native(raw)) => {
                let native = self
                    .device
                    .native()
                    .ok_or_else(|| HalError::invalid_state("native swapchain on a deferred backend"))?;
                native.acquire_next_image(*raw).map_err(|e| self.report(e))?
            }
            Some(Presenter::BackBuffer) => {
                self.check_surface().map_err(|e| self.report(e))?;
                0
            }
            None => return Err(HalError::invalid_state("swapchain has no presenter")),
        };
        if index >= self.image_count() {
            return Err(HalError::invalid_state(format!(
                "driver returned image {index} of {}",
                self.image_count()
            )));
        }

        self.transition(index, ImageLayout::ColorAttachment)?;
        self.current_image = index;
        self.acquired = true;
        Ok(index)
    }

    /// Present the current image.
    pub fn present(&mut self) -> HalResult<()> {
        crate::profile_function!();
        self.ensure_active()?;
        if !self.acquired {
            return Err(HalError::invalid_state("present without an acquired image"));
        }
        self.acquired = false;
        let index = self.current_image;

        let native_raw = match &self.presenter {
            Some(Presenter::Native(raw)) => Some(*raw),
            Some(Presenter::BackBuffer) => None,
            None => return Err(HalError::invalid_state("swapchain has no presenter")),
        };

        if let Some(raw) = native_raw {
            self.transition(index, ImageLayout::PresentSrc)?;
            let native = self
                .device
                .native()
                .ok_or_else(|| HalError::invalid_state("native swapchain on a deferred backend"))?;
            return native.present(raw, index).map_err(|e| self.report(e));
        }

        self.check_surface().map_err(|e| self.report(e))?;
        let DeviceBackend::Deferred(worker) = self.device.backend_impl() else {
            return Err(HalError::invalid_state("back buffer presentation on a native backend"));
        };
        let surface = Arc::clone(&self.description.surface);
        let back_buffer = self.images[index as usize].raw_handle();
        worker.execute(Box::new(move |ctx: &mut dyn GlContext| {
            if let Err(e) = ctx.swap_buffers(&surface, back_buffer) {
                log::error!("Swap buffers failed: {e}");
            }
        }))?;
        Ok(())
    }

    /// Recreate the swapchain at a new extent.
    ///
    /// Waits for the device to go idle. Framebuffers and textures handed
    /// out before the resize are disposed. If the new images cannot be
    /// created the swapchain is left [`SwapchainState::Uninitialized`] with
    /// no images, and a later resize may retry.
    pub fn resize(&mut self, width: u32, height: u32) -> HalResult<()> {
        let previous = self.state;
        if !matches!(previous, SwapchainState::Active | SwapchainState::Uninitialized) {
            return Err(HalError::invalid_state(format!("cannot resize a swapchain that is {previous:?}")));
        }
        if width == 0 || height == 0 {
            return Err(HalError::invalid_parameter(format!(
                "swapchain extent {width}x{height} has a zero dimension"
            )));
        }
        log::debug!(
            "Resizing swapchain {}x{} -> {width}x{height}",
            self.description.width,
            self.description.height
        );

        self.state = SwapchainState::Resizing;
        if let Err(e) = self.device.wait_for_idle() {
            self.state = previous;
            return Err(e);
        }
        self.release();
        self.description.width = width;
        self.description.height = height;
        if let Err(e) = self.build() {
            log::warn!("Swapchain rebuild at {width}x{height} failed: {e}");
            self.release();
            self.state = SwapchainState::Uninitialized;
            return Err(e);
        }
        self.state = SwapchainState::Active;
        Ok(())
    }

    /// Destroy the swapchain. Repeated calls are ignored.
    pub fn dispose(&mut self) {
        if self.state == SwapchainState::Destroyed {
            return;
        }
        if let Err(e) = self.device.wait_for_idle() {
            log::error!("Swapchain destruction: wait for idle failed: {e}");
        }
        self.release();
        self.state = SwapchainState::Destroyed;
        log::debug!("Destroyed swapchain");
    }

    pub fn is_disposed(&self) -> bool {
        self.state == SwapchainState::Destroyed
    }

    fn ensure_active(&self) -> HalResult<()> {
        match self.state {
            SwapchainState::Active => Ok(()),
            state => Err(HalError::invalid_state(format!("swapchain is {state:?}"))),
        }
    }

    fn report(&self, error: HalError) -> HalError {
        if error.is_recoverable() {
            log::warn!("Swapchain needs recreation: {error}");
        }
        error
    }

    fn check_surface(&self) -> HalResult<()> {
        let surface = &self.description.surface;
        if surface.is_lost() {
            return Err(HalError::SurfaceLost);
        }
        if surface.extent() != (self.description.width, self.description.height) {
            return Err(HalError::SwapchainOutOfDate);
        }
        Ok(())
    }

    /// Create images, the depth texture and framebuffers for the current
    /// description.
    fn build(&mut self) -> HalResult<()> {
        let desc = &self.description;
        let color_desc = TextureDescription::new_2d(
            desc.width,
            desc.height,
            desc.color_format,
            TextureUsage::RENDER_TARGET,
        )
        .with_label("swapchain image");

        match self.device.backend_impl() {
            DeviceBackend::Native(native) => {
                let image_count = if desc.vsync {
                    VSYNC_IMAGE_COUNT
                } else {
                    IMMEDIATE_IMAGE_COUNT
                };
                let raw = native.create_swapchain(
                    &desc.surface,
                    &NativeSwapchainDesc {
                        width: desc.width,
                        height: desc.height,
                        format: desc.color_format,
                        image_count,
                        vsync: desc.vsync,
                    },
                )?;
                self.presenter = Some(Presenter::Native(raw));
                let images = native.swapchain_images(raw)?;
                self.images = images
                    .into_iter()
                    .map(|image| {
                        Arc::new(Texture::new(
                            Arc::clone(&self.device),
                            color_desc.clone(),
                            image,
                            TextureOrigin::Swapchain,
                        ))
                    })
                    .collect();
            }
            DeviceBackend::Deferred(_) => {
                self.images = vec![self.device.create_texture(&color_desc)?];
                self.presenter = Some(Presenter::BackBuffer);
            }
        }

        let tracks_layouts = self.device.backend().tracks_image_layouts();
        self.layouts = if tracks_layouts {
            vec![ImageLayout::Undefined; self.images.len()]
        } else {
            Vec::new()
        };

        self.depth = match self.description.depth_format {
            Some(format) => Some(
                self.device.create_texture(
                    &TextureDescription::new_2d(
                        self.description.width,
                        self.description.height,
                        format,
                        TextureUsage::DEPTH_STENCIL,
                    )
                    .with_label("swapchain depth"),
                )?,
            ),
            None => None,
        };

        self.framebuffers = self
            .images
            .iter()
            .map(|image| {
                let mut fb = FramebufferDescription::new(vec![FramebufferAttachment::new(Arc::clone(image))]);
                if let Some(depth) = &self.depth {
                    fb = fb.with_depth(FramebufferAttachment::new(Arc::clone(depth)));
                }
                self.device.create_framebuffer(&fb)
            })
            .collect::<HalResult<_>>()?;
        self.current_image = 0;
        self.acquired = false;
        Ok(())
    }

    /// Dispose framebuffers and textures and destroy the native swapchain.
    /// The device must be idle.
    fn release(&mut self) {
        for framebuffer in self.framebuffers.drain(..) {
            framebuffer.dispose();
        }
        if let Some(depth) = self.depth.take() {
            depth.dispose();
        }
        for image in self.images.drain(..) {
            image.dispose();
        }
        self.layouts.clear();
        self.acquired = false;

        if let Some(Presenter::Native(raw)) = self.presenter.take() {
            if let Some(native) = self.device.native() {
                native.destroy_swapchain(raw);
            }
        }
        self.device.poll_disposals();
    }

    /// Move image `index` to `layout` on backends with explicit layouts.
    fn transition(&mut self, index: u32, layout: ImageLayout) -> HalResult<()> {
        let Some(current) = self.layouts.get(index as usize).copied() else {
            return Ok(());
        };
        if current == layout {
            return Ok(());
        }
        let native = self
            .device
            .native()
            .ok_or_else(|| HalError::invalid_state("layout tracking on a deferred backend"))?;
        let image = &self.images[index as usize];

        let mut commands = native.create_command_buffer()?;
        commands.transition_texture(image.raw_handle(), current, layout);
        self.device.submit_native_commands(commands, &[image.core()])?;
        self.layouts[index as usize] = layout;
        log::trace!("Swapchain image {index}: {current:?} -> {layout:?}");
        Ok(())
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for Swapchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Swapchain")
            .field("state", &self.state)
            .field("width", &self.description.width)
            .field("height", &self.description.height)
            .field("images", &self.images.len())
            .field("current_image", &self.current_image)
            .finish()
    }
}

static_assertions::assert_impl_all!(Swapchain: Send, Sync);
