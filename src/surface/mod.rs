//! Native render surface and its event bridge.
//!
//! A [`RenderSurface`] owns a child window, its graphics context and at most
//! one native image, and runs a background thread that drains window-system
//! events for as long as the surface lives. The window system itself sits
//! behind the [`WindowSystem`] trait: the production implementation is
//! [`X11Connection`](x11::X11Connection) (feature `x11`), and the test suite
//! uses a counting mock.
//!
//! Drawing converts a [`PreparedImage`] into a [`NativeFrame`], 32 bits per
//! pixel in the server's byte order, independent of the protocol layout the
//! pipeline produced.
//!
//! Lifecycle:
//!
//! ```text
//! new() ──► Created/Idle ──draw()──► Drawing ──draw()──► ... ──drop──► Destroyed
//! ```
//!
//! On drop the event thread is stopped and joined first, then the image, the
//! graphics context and the window are released, in that order.

#[cfg(all(feature = "x11", target_os = "linux"))]
pub mod x11;

use crate::imaging::PreparedImage;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

/// How long the event thread sleeps between polls. Bounds how long drop
/// waits for it.
pub const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Window-system identifier of a window.
pub type WindowId = u64;

#[derive(Error, Debug)]
pub enum SurfaceError {
    #[error("Cannot connect to display: {0}")]
    Connection(String),
    #[error("Window creation failed: {0}")]
    Window(String),
    #[error("Unsupported visual: {0}")]
    Visual(String),
    #[error("Image creation failed: {0}")]
    Image(String),
    #[error("Failed to start event thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Position and size of a window in pixels, relative to its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Geometry {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Events the bridge cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowEvent {
    /// Part of the window needs repainting.
    Expose,
    /// The window was resized or moved.
    Configure { width: u32, height: u32 },
    Key { keycode: u32 },
    Button { button: u32 },
}

/// Byte order of pixel data on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    /// Little-endian: bytes are blue, green, red, pad.
    #[default]
    LsbFirst,
    /// Big-endian: bytes are pad, red, green, blue.
    MsbFirst,
}

/// Pixel layout a window system's images use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeFormat {
    pub byte_order: ByteOrder,
    /// Visual depth (24 or 32).
    pub depth: u8,
}

impl NativeFormat {
    pub const BITS_PER_PIXEL: u8 = 32;

    pub fn stride(&self, width: u32) -> usize {
        width as usize * (Self::BITS_PER_PIXEL as usize / 8)
    }
}

impl Default for NativeFormat {
    fn default() -> Self {
        Self {
            byte_order: ByteOrder::LsbFirst,
            depth: 24,
        }
    }
}

/// Pixels in a window system's native layout, ready to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeFrame {
    pub width: u32,
    pub height: u32,
    pub stride: usize,
    pub format: NativeFormat,
    pub data: Vec<u8>,
}

impl NativeFrame {
    /// Repack a prepared buffer as 32-bit native pixels. The pad byte carries
    /// alpha when the buffer has one and is opaque otherwise.
    pub fn from_prepared(prepared: &PreparedImage, format: NativeFormat) -> Self {
        let rgba = prepared.image().to_rgba8();
        let (width, height) = rgba.dimensions();
        let mut data = Vec::with_capacity(format.stride(width) * height as usize);
        for px in rgba.pixels() {
            let [r, g, b, a] = px.0;
            match format.byte_order {
                ByteOrder::LsbFirst => data.extend_from_slice(&[b, g, r, a]),
                ByteOrder::MsbFirst => data.extend_from_slice(&[a, r, g, b]),
            }
        }
        Self {
            width,
            height,
            stride: format.stride(width),
            format,
            data,
        }
    }
}

/// The native windowing operations a [`RenderSurface`] needs.
///
/// Implementations are shared between the drawing thread and the event
/// thread, so they must be `Send + Sync`. Only `poll_event` is called from
/// the event thread.
pub trait WindowSystem: Send + Sync + 'static {
    type Gc: Send;
    type Image: Send;

    fn native_format(&self) -> NativeFormat;

    /// Create and map a child window of `parent`.
    fn create_window(&self, parent: WindowId, geometry: Geometry)
    -> Result<WindowId, SurfaceError>;

    fn create_gc(&self, window: WindowId) -> Result<Self::Gc, SurfaceError>;

    fn create_image(&self, frame: NativeFrame) -> Result<Self::Image, SurfaceError>;

    /// Blit `image` at the window origin.
    fn put_image(&self, window: WindowId, gc: &Self::Gc, image: &Self::Image);

    fn destroy_image(&self, image: Self::Image);

    fn free_gc(&self, gc: Self::Gc);

    fn destroy_window(&self, window: WindowId);

    /// Next pending event for `window`, without blocking.
    fn poll_event(&self, window: WindowId) -> Option<WindowEvent>;
}

/// State the event thread shares with the surface.
#[derive(Debug)]
struct EventState {
    stop: AtomicBool,
    damaged: AtomicBool,
    width: AtomicU32,
    height: AtomicU32,
}

/// A child window showing one prepared image at a time.
pub struct RenderSurface<W: WindowSystem> {
    system: Arc<W>,
    window: WindowId,
    origin: (i32, i32),
    gc: Option<W::Gc>,
    image: Option<W::Image>,
    state: Arc<EventState>,
    event_task: Option<JoinHandle<()>>,
}

impl<W: WindowSystem> RenderSurface<W> {
    /// Create a child window of `parent` and start its event thread.
    pub fn new(system: Arc<W>, parent: WindowId, geometry: Geometry) -> Result<Self, SurfaceError> {
        let window = system.create_window(parent, geometry)?;
        let gc = match system.create_gc(window) {
            Ok(gc) => gc,
            Err(e) => {
                system.destroy_window(window);
                return Err(e);
            }
        };

        let state = Arc::new(EventState {
            stop: AtomicBool::new(false),
            damaged: AtomicBool::new(false),
            width: AtomicU32::new(geometry.width),
            height: AtomicU32::new(geometry.height),
        });

        let spawned = {
            let system = Arc::clone(&system);
            let state = Arc::clone(&state);
            thread::Builder::new()
                .name(format!("cellframe-events-{window:x}"))
                .spawn(move || run_event_loop(&*system, window, &state))
        };
        let event_task = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                system.free_gc(gc);
                system.destroy_window(window);
                return Err(e.into());
            }
        };

        log::debug!("created window {window:#x} under {parent:#x} at {geometry:?}");
        Ok(Self {
            system,
            window,
            origin: (geometry.x, geometry.y),
            gc: Some(gc),
            image: None,
            state,
            event_task: Some(event_task),
        })
    }

    pub fn window(&self) -> WindowId {
        self.window
    }

    /// True until the first successful draw.
    pub fn is_idle(&self) -> bool {
        self.image.is_none()
    }

    /// Last geometry seen, updated by configure events.
    pub fn geometry(&self) -> Geometry {
        Geometry {
            x: self.origin.0,
            y: self.origin.1,
            width: self.state.width.load(Ordering::Acquire),
            height: self.state.height.load(Ordering::Acquire),
        }
    }

    /// Show `prepared`, replacing whatever was drawn before.
    pub fn draw(&mut self, prepared: &PreparedImage) -> Result<(), SurfaceError> {
        let frame = NativeFrame::from_prepared(prepared, self.system.native_format());
        if let Some(previous) = self.image.take() {
            self.system.destroy_image(previous);
        }
        let image = self.system.create_image(frame)?;
        self.image = Some(image);
        self.state.damaged.store(false, Ordering::Release);
        self.blit();
        log::debug!(
            "drew {} ({}x{}) into window {:#x}",
            prepared.filename().display(),
            prepared.width(),
            prepared.height(),
            self.window
        );
        Ok(())
    }

    /// Re-blit the current image if the window was exposed since the last
    /// blit. Returns whether anything was drawn.
    pub fn redraw_if_damaged(&self) -> bool {
        if self.image.is_none() || !self.state.damaged.swap(false, Ordering::AcqRel) {
            return false;
        }
        self.blit();
        true
    }

    fn blit(&self) {
        if let (Some(gc), Some(image)) = (&self.gc, &self.image) {
            self.system.put_image(self.window, gc, image);
        }
    }
}

impl<W: WindowSystem> Drop for RenderSurface<W> {
    fn drop(&mut self) {
        self.state.stop.store(true, Ordering::Release);
        if let Some(handle) = self.event_task.take()
            && handle.join().is_err()
        {
            log::error!("event thread for window {:#x} panicked", self.window);
        }
        if let Some(image) = self.image.take() {
            self.system.destroy_image(image);
        }
        if let Some(gc) = self.gc.take() {
            self.system.free_gc(gc);
        }
        self.system.destroy_window(self.window);
        log::debug!("destroyed window {:#x}", self.window);
    }
}

fn run_event_loop<W: WindowSystem>(system: &W, window: WindowId, state: &EventState) {
    while !state.stop.load(Ordering::Acquire) {
        while let Some(event) = system.poll_event(window) {
            match event {
                WindowEvent::Expose => state.damaged.store(true, Ordering::Release),
                WindowEvent::Configure { width, height } => {
                    state.width.store(width, Ordering::Release);
                    state.height.store(height, Ordering::Release);
                }
                WindowEvent::Key { keycode } => log::debug!("key {keycode} in {window:#x}"),
                WindowEvent::Button { button } => {
                    log::debug!("button {button} in {window:#x}")
                }
            }
        }
        thread::sleep(EVENT_POLL_INTERVAL);
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::dimensions::Dimensions;
    use image::{DynamicImage, RgbImage, RgbaImage};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU64, AtomicUsize};
    use std::time::Instant;

    /// Window system that hands out numbered handles and counts the live ones.
    /// Uses Mutex and atomics so it is Sync and can be polled from the event
    /// thread.
    #[derive(Default)]
    pub struct MockWindowSystem {
        pub byte_order: ByteOrder,
        pub operations: Mutex<Vec<RecordedOp>>,
        pub events: Mutex<VecDeque<(WindowId, WindowEvent)>>,
        pub frames: Mutex<Vec<NativeFrame>>,
        pub live_windows: AtomicUsize,
        pub live_gcs: AtomicUsize,
        pub live_images: AtomicUsize,
        pub polls: AtomicUsize,
        next_handle: AtomicU64,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        CreateWindow { parent: WindowId, geometry: Geometry },
        CreateGc(u64),
        CreateImage(u64),
        PutImage(u64),
        DestroyImage(u64),
        FreeGc(u64),
        DestroyWindow(WindowId),
    }

    impl MockWindowSystem {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_byte_order(byte_order: ByteOrder) -> Self {
            Self {
                byte_order,
                ..Self::default()
            }
        }

        pub fn push_event(&self, window: WindowId, event: WindowEvent) {
            self.events.lock().unwrap().push_back((window, event));
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }

        fn record(&self, op: RecordedOp) {
            self.operations.lock().unwrap().push(op);
        }

        fn handle(&self) -> u64 {
            self.next_handle.fetch_add(1, Ordering::Relaxed) + 1
        }
    }

    impl WindowSystem for MockWindowSystem {
        type Gc = u64;
        type Image = u64;

        fn native_format(&self) -> NativeFormat {
            NativeFormat {
                byte_order: self.byte_order,
                depth: 24,
            }
        }

        fn create_window(
            &self,
            parent: WindowId,
            geometry: Geometry,
        ) -> Result<WindowId, SurfaceError> {
            self.live_windows.fetch_add(1, Ordering::SeqCst);
            self.record(RecordedOp::CreateWindow { parent, geometry });
            Ok(self.handle())
        }

        fn create_gc(&self, _window: WindowId) -> Result<u64, SurfaceError> {
            self.live_gcs.fetch_add(1, Ordering::SeqCst);
            let gc = self.handle();
            self.record(RecordedOp::CreateGc(gc));
            Ok(gc)
        }

        fn create_image(&self, frame: NativeFrame) -> Result<u64, SurfaceError> {
            self.live_images.fetch_add(1, Ordering::SeqCst);
            let image = self.handle();
            self.frames.lock().unwrap().push(frame);
            self.record(RecordedOp::CreateImage(image));
            Ok(image)
        }

        fn put_image(&self, _window: WindowId, _gc: &u64, image: &u64) {
            self.record(RecordedOp::PutImage(*image));
        }

        fn destroy_image(&self, image: u64) {
            self.live_images.fetch_sub(1, Ordering::SeqCst);
            self.record(RecordedOp::DestroyImage(image));
        }

        fn free_gc(&self, gc: u64) {
            self.live_gcs.fetch_sub(1, Ordering::SeqCst);
            self.record(RecordedOp::FreeGc(gc));
        }

        fn destroy_window(&self, window: WindowId) {
            self.live_windows.fetch_sub(1, Ordering::SeqCst);
            self.record(RecordedOp::DestroyWindow(window));
        }

        fn poll_event(&self, window: WindowId) -> Option<WindowEvent> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            let mut events = self.events.lock().unwrap();
            let pos = events.iter().position(|(w, _)| *w == window)?;
            events.remove(pos).map(|(_, e)| e)
        }
    }

    fn prepared(image: DynamicImage) -> PreparedImage {
        PreparedImage::new("/tmp/test.png", Dimensions::default(), image)
    }

    fn rgba_1x1(px: [u8; 4]) -> PreparedImage {
        prepared(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            1,
            1,
            image::Rgba(px),
        )))
    }

    fn geometry() -> Geometry {
        Geometry {
            x: 80,
            y: 40,
            width: 320,
            height: 200,
        }
    }

    /// Poll `condition` until it holds or a second passes.
    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(1);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    #[test]
    fn create_then_drop_releases_everything() {
        let system = Arc::new(MockWindowSystem::new());
        let surface = RenderSurface::new(Arc::clone(&system), 7, geometry()).unwrap();
        assert!(surface.is_idle());
        assert_eq!(system.live_windows.load(Ordering::SeqCst), 1);
        assert_eq!(system.live_gcs.load(Ordering::SeqCst), 1);

        let started = Instant::now();
        drop(surface);
        assert!(started.elapsed() < Duration::from_millis(500));

        assert_eq!(system.live_windows.load(Ordering::SeqCst), 0);
        assert_eq!(system.live_gcs.load(Ordering::SeqCst), 0);
        assert_eq!(system.live_images.load(Ordering::SeqCst), 0);
        assert_eq!(Arc::strong_count(&system), 1, "event thread still holds the system");
    }

    #[test]
    fn window_is_a_child_of_parent() {
        let system = Arc::new(MockWindowSystem::new());
        let _surface = RenderSurface::new(Arc::clone(&system), 7, geometry()).unwrap();
        assert_eq!(
            system.get_operations()[0],
            RecordedOp::CreateWindow {
                parent: 7,
                geometry: geometry()
            }
        );
    }

    #[test]
    fn drop_releases_in_order() {
        let system = Arc::new(MockWindowSystem::new());
        let mut surface = RenderSurface::new(Arc::clone(&system), 1, geometry()).unwrap();
        surface.draw(&rgba_1x1([1, 2, 3, 4])).unwrap();
        let window = surface.window();
        drop(surface);

        let ops = system.get_operations();
        let tail: Vec<_> = ops[ops.len() - 3..].to_vec();
        assert!(matches!(tail[0], RecordedOp::DestroyImage(_)));
        assert!(matches!(tail[1], RecordedOp::FreeGc(_)));
        assert_eq!(tail[2], RecordedOp::DestroyWindow(window));
    }

    #[test]
    fn event_thread_polls_until_dropped() {
        let system = Arc::new(MockWindowSystem::new());
        let surface = RenderSurface::new(Arc::clone(&system), 1, geometry()).unwrap();
        assert!(wait_for(|| system.polls.load(Ordering::SeqCst) >= 2));
        drop(surface);
        let after_drop = system.polls.load(Ordering::SeqCst);
        thread::sleep(EVENT_POLL_INTERVAL * 3);
        assert_eq!(system.polls.load(Ordering::SeqCst), after_drop);
    }

    // =========================================================================
    // Drawing
    // =========================================================================

    #[test]
    fn draw_replaces_previous_image() {
        let system = Arc::new(MockWindowSystem::new());
        let mut surface = RenderSurface::new(Arc::clone(&system), 1, geometry()).unwrap();

        surface.draw(&rgba_1x1([1, 2, 3, 4])).unwrap();
        assert!(!surface.is_idle());
        surface.draw(&rgba_1x1([5, 6, 7, 8])).unwrap();
        assert_eq!(system.live_images.load(Ordering::SeqCst), 1);

        let ops = system.get_operations();
        let first = ops
            .iter()
            .position(|op| matches!(op, RecordedOp::CreateImage(_)))
            .unwrap();
        let RecordedOp::CreateImage(first_id) = ops[first] else {
            unreachable!()
        };
        let destroyed = ops
            .iter()
            .position(|op| *op == RecordedOp::DestroyImage(first_id))
            .unwrap();
        let second = ops
            .iter()
            .rposition(|op| matches!(op, RecordedOp::CreateImage(_)))
            .unwrap();
        assert!(destroyed < second, "old image must be released first");
    }

    #[test]
    fn draw_blits_new_image() {
        let system = Arc::new(MockWindowSystem::new());
        let mut surface = RenderSurface::new(Arc::clone(&system), 1, geometry()).unwrap();
        surface.draw(&rgba_1x1([1, 2, 3, 4])).unwrap();
        let ops = system.get_operations();
        let RecordedOp::CreateImage(id) = ops[ops.len() - 2] else {
            panic!("expected image creation before blit: {ops:?}");
        };
        assert_eq!(ops[ops.len() - 1], RecordedOp::PutImage(id));
    }

    #[test]
    fn expose_triggers_redraw() {
        let system = Arc::new(MockWindowSystem::new());
        let mut surface = RenderSurface::new(Arc::clone(&system), 1, geometry()).unwrap();
        assert!(!surface.redraw_if_damaged());
        surface.draw(&rgba_1x1([1, 2, 3, 4])).unwrap();

        system.push_event(surface.window(), WindowEvent::Expose);
        assert!(wait_for(|| surface.redraw_if_damaged()));
        assert!(!surface.redraw_if_damaged());
    }

    #[test]
    fn configure_updates_geometry() {
        let system = Arc::new(MockWindowSystem::new());
        let surface = RenderSurface::new(Arc::clone(&system), 1, geometry()).unwrap();
        assert_eq!(surface.geometry(), geometry());

        system.push_event(
            surface.window(),
            WindowEvent::Configure {
                width: 640,
                height: 480,
            },
        );
        assert!(wait_for(|| surface.geometry().width == 640));
        assert_eq!(surface.geometry().height, 480);
        assert_eq!((surface.geometry().x, surface.geometry().y), (80, 40));
    }

    #[test]
    fn events_for_other_windows_are_left_alone() {
        let system = Arc::new(MockWindowSystem::new());
        let surface = RenderSurface::new(Arc::clone(&system), 1, geometry()).unwrap();
        system.push_event(surface.window() + 100, WindowEvent::Expose);
        assert!(wait_for(|| system.polls.load(Ordering::SeqCst) >= 3));
        assert_eq!(system.events.lock().unwrap().len(), 1);
    }

    // =========================================================================
    // Native frames
    // =========================================================================

    #[test]
    fn lsb_first_frame_is_bgra() {
        let frame = NativeFrame::from_prepared(&rgba_1x1([1, 2, 3, 4]), NativeFormat::default());
        assert_eq!(frame.data, vec![3, 2, 1, 4]);
        assert_eq!(frame.stride, 4);
    }

    #[test]
    fn msb_first_frame_is_argb() {
        let format = NativeFormat {
            byte_order: ByteOrder::MsbFirst,
            depth: 32,
        };
        let frame = NativeFrame::from_prepared(&rgba_1x1([1, 2, 3, 4]), format);
        assert_eq!(frame.data, vec![4, 1, 2, 3]);
    }

    #[test]
    fn rgb_frame_is_opaque_with_full_stride() {
        let img = prepared(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            3,
            2,
            image::Rgb([10, 20, 30]),
        )));
        let frame = NativeFrame::from_prepared(&img, NativeFormat::default());
        assert_eq!(frame.stride, 3 * NativeFormat::BITS_PER_PIXEL as usize / 8);
        assert_eq!(frame.stride, 12);
        assert_eq!(frame.data.len(), 12 * 2);
        assert_eq!(&frame.data[..4], &[30, 20, 10, 255]);
    }

    #[test]
    fn draw_uses_system_byte_order() {
        let system = Arc::new(MockWindowSystem::with_byte_order(ByteOrder::MsbFirst));
        let mut surface = RenderSurface::new(Arc::clone(&system), 1, geometry()).unwrap();
        surface.draw(&rgba_1x1([1, 2, 3, 4])).unwrap();
        assert_eq!(system.frames.lock().unwrap()[0].data, vec![4, 1, 2, 3]);
    }
}
