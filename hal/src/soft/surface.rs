//! Headless presentation.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::native::NativeSurface;
use crate::types::TextureFormat;

/// A frame received by a [`HeadlessSurface`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentedFrame {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    /// Tightly packed texels.
    pub data: Vec<u8>,
}

#[derive(Debug)]
struct SurfaceState {
    width: u32,
    height: u32,
    lost: bool,
    presented: u64,
    last_frame: Option<PresentedFrame>,
}

/// A window-less surface that keeps the last presented frame.
///
/// Resizing the surface makes swapchains built for the old extent report
/// out-of-date on their next acquire or present.
#[derive(Debug)]
pub struct HeadlessSurface {
    state: Mutex<SurfaceState>,
}

impl HeadlessSurface {
    pub fn new(width: u32, height: u32) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SurfaceState {
                width,
                height,
                lost: false,
                presented: 0,
                last_frame: None,
            }),
        })
    }

    /// Simulate a window resize.
    pub fn set_extent(&self, width: u32, height: u32) {
        let mut state = self.state.lock();
        state.width = width;
        state.height = height;
    }

    /// Simulate the window system destroying the surface.
    pub fn lose(&self) {
        self.state.lock().lost = true;
    }

    pub fn presented_count(&self) -> u64 {
        self.state.lock().presented
    }

    pub fn last_frame(&self) -> Option<PresentedFrame> {
        self.state.lock().last_frame.clone()
    }
}

impl NativeSurface for HeadlessSurface {
    fn extent(&self) -> (u32, u32) {
        let state = self.state.lock();
        (state.width, state.height)
    }

    fn is_lost(&self) -> bool {
        self.state.lock().lost
    }

    fn receive_frame(&self, width: u32, height: u32, format: TextureFormat, data: &[u8]) {
        let mut state = self.state.lock();
        state.presented += 1;
        state.last_frame = Some(PresentedFrame {
            width,
            height,
            format,
            data: data.to_vec(),
        });
    }
}

/// Swapchain object of the explicit soft devices.
pub(crate) struct SoftSwapchain {
    pub surface: Arc<dyn NativeSurface>,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    /// Texture handles, owned by the swapchain.
    pub images: Vec<u64>,
    /// Next image handed out by acquire.
    pub next: u32,
}

impl SoftSwapchain {
    /// Whether the surface still matches the extent this swapchain was
    /// built for.
    pub fn matches_surface(&self) -> bool {
        self.surface.extent() == (self.width, self.height)
    }
}

static_assertions::assert_impl_all!(HeadlessSurface: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_surface_keeps_last_frame() {
        let surface = HeadlessSurface::new(2, 1);
        surface.receive_frame(2, 1, TextureFormat::R8Unorm, &[1, 2]);
        surface.receive_frame(2, 1, TextureFormat::R8Unorm, &[3, 4]);
        assert_eq!(surface.presented_count(), 2);
        assert_eq!(surface.last_frame().map(|f| f.data), Some(vec![3, 4]));
    }

    #[test]
    fn test_lost_and_resized() {
        let surface = HeadlessSurface::new(4, 4);
        assert!(!surface.is_lost());
        surface.set_extent(8, 2);
        surface.lose();
        assert_eq!(surface.extent(), (8, 2));
        assert!(surface.is_lost());
    }
}
