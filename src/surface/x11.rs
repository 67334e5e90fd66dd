//! Xlib window system.
//!
//! One display connection is shared by the drawing thread and every event
//! thread, so the connection calls `XInitThreads` before opening the display.

use super::{
    ByteOrder, Geometry, NativeFormat, NativeFrame, SurfaceError, WindowEvent, WindowId,
    WindowSystem,
};
use std::ffi::{CString, c_char, c_int, c_long, c_uint};
use std::ptr;
use ::x11::xlib;

const EVENT_MASK: c_long = xlib::ExposureMask
    | xlib::StructureNotifyMask
    | xlib::KeyPressMask
    | xlib::ButtonPressMask;

/// An open Xlib display.
pub struct X11Connection {
    display: *mut xlib::Display,
    screen: c_int,
    format: NativeFormat,
}

// SAFETY: Xlib serializes access internally once XInitThreads has run,
// which `open` guarantees before the display exists.
unsafe impl Send for X11Connection {}
unsafe impl Sync for X11Connection {}

/// Graphics context handle.
pub struct X11Gc(xlib::GC);

// SAFETY: a GC is only used through the thread-safe display.
unsafe impl Send for X11Gc {}

/// An `XImage` whose pixel memory is owned on the Rust side.
pub struct X11Image {
    image: *mut xlib::XImage,
    width: u32,
    height: u32,
    _pixels: Vec<u8>,
}

// SAFETY: the image is only touched through the thread-safe display.
unsafe impl Send for X11Image {}

impl X11Connection {
    /// Connect to `display_name`, or `$DISPLAY` when `None`.
    pub fn open(display_name: Option<&str>) -> Result<Self, SurfaceError> {
        let name = display_name
            .map(CString::new)
            .transpose()
            .map_err(|e| SurfaceError::Connection(e.to_string()))?;

        // SAFETY: plain Xlib calls; the returned display is checked for null.
        let display = unsafe {
            xlib::XInitThreads();
            xlib::XOpenDisplay(name.as_ref().map_or(ptr::null(), |n| n.as_ptr()))
        };
        if display.is_null() {
            return Err(SurfaceError::Connection(
                display_name.unwrap_or("$DISPLAY").to_string(),
            ));
        }

        // SAFETY: display is a live connection.
        let (screen, depth, order) = unsafe {
            let screen = xlib::XDefaultScreen(display);
            (
                screen,
                xlib::XDefaultDepth(display, screen),
                xlib::XImageByteOrder(display),
            )
        };
        if depth != 24 && depth != 32 {
            // SAFETY: nothing else references the display yet.
            unsafe { xlib::XCloseDisplay(display) };
            return Err(SurfaceError::Visual(format!("depth {depth}")));
        }
        let byte_order = if order == xlib::MSBFirst {
            ByteOrder::MsbFirst
        } else {
            ByteOrder::LsbFirst
        };

        log::debug!("X11 display open: depth {depth}, {byte_order:?}");
        Ok(Self {
            display,
            screen,
            format: NativeFormat {
                byte_order,
                depth: depth as u8,
            },
        })
    }

    pub fn root_window(&self) -> WindowId {
        // SAFETY: display is live for the lifetime of self.
        unsafe { xlib::XRootWindow(self.display, self.screen) as WindowId }
    }
}

impl Drop for X11Connection {
    fn drop(&mut self) {
        // SAFETY: every surface holds an Arc to the connection, so none is
        // left using the display here.
        unsafe { xlib::XCloseDisplay(self.display) };
    }
}

impl WindowSystem for X11Connection {
    type Gc = X11Gc;
    type Image = X11Image;

    fn native_format(&self) -> NativeFormat {
        self.format
    }

    fn create_window(
        &self,
        parent: WindowId,
        geometry: Geometry,
    ) -> Result<WindowId, SurfaceError> {
        // SAFETY: display is live; the new window id is checked.
        let window = unsafe {
            let black = xlib::XBlackPixel(self.display, self.screen);
            let window = xlib::XCreateSimpleWindow(
                self.display,
                parent as xlib::Window,
                geometry.x,
                geometry.y,
                geometry.width.max(1) as c_uint,
                geometry.height.max(1) as c_uint,
                0,
                black,
                black,
            );
            if window != 0 {
                xlib::XSelectInput(self.display, window, EVENT_MASK);
                xlib::XMapRaised(self.display, window);
                xlib::XFlush(self.display);
            }
            window
        };
        if window == 0 {
            return Err(SurfaceError::Window(format!("parent {parent:#x}")));
        }
        Ok(window as WindowId)
    }

    fn create_gc(&self, window: WindowId) -> Result<X11Gc, SurfaceError> {
        // SAFETY: display and window are live; no GC values are passed.
        let gc = unsafe {
            xlib::XCreateGC(self.display, window as xlib::Window, 0, ptr::null_mut())
        };
        if gc.is_null() {
            return Err(SurfaceError::Window("XCreateGC failed".to_string()));
        }
        Ok(X11Gc(gc))
    }

    fn create_image(&self, frame: NativeFrame) -> Result<X11Image, SurfaceError> {
        let NativeFrame {
            width,
            height,
            stride,
            mut data,
            ..
        } = frame;
        // SAFETY: `data` holds stride * height bytes and outlives the
        // XImage, which is detached from it before destruction.
        let image = unsafe {
            xlib::XCreateImage(
                self.display,
                xlib::XDefaultVisual(self.display, self.screen),
                self.format.depth as c_uint,
                xlib::ZPixmap,
                0,
                data.as_mut_ptr() as *mut c_char,
                width as c_uint,
                height as c_uint,
                NativeFormat::BITS_PER_PIXEL as c_int,
                stride as c_int,
            )
        };
        if image.is_null() {
            return Err(SurfaceError::Image(format!("{width}x{height}")));
        }
        Ok(X11Image {
            image,
            width,
            height,
            _pixels: data,
        })
    }

    fn put_image(&self, window: WindowId, gc: &X11Gc, image: &X11Image) {
        // SAFETY: all handles are live and owned by the calling surface.
        unsafe {
            xlib::XPutImage(
                self.display,
                window as xlib::Window,
                gc.0,
                image.image,
                0,
                0,
                0,
                0,
                image.width as c_uint,
                image.height as c_uint,
            );
            xlib::XFlush(self.display);
        }
    }

    fn destroy_image(&self, image: X11Image) {
        // SAFETY: detach the Rust-owned pixels so Xlib frees only the header.
        unsafe {
            (*image.image).data = ptr::null_mut();
            xlib::XDestroyImage(image.image);
        }
    }

    fn free_gc(&self, gc: X11Gc) {
        // SAFETY: gc was created on this display and is released once.
        unsafe { xlib::XFreeGC(self.display, gc.0) };
    }

    fn destroy_window(&self, window: WindowId) {
        // SAFETY: window was created on this display and is destroyed once.
        unsafe {
            xlib::XDestroyWindow(self.display, window as xlib::Window);
            xlib::XFlush(self.display);
        }
    }

    fn poll_event(&self, window: WindowId) -> Option<WindowEvent> {
        // SAFETY: XEvent is plain data; XCheckWindowEvent fills it on success.
        let event = unsafe {
            let mut event: xlib::XEvent = std::mem::zeroed();
            if xlib::XCheckWindowEvent(
                self.display,
                window as xlib::Window,
                EVENT_MASK,
                &mut event,
            ) == 0
            {
                return None;
            }
            event
        };
        match event.get_type() {
            xlib::Expose => Some(WindowEvent::Expose),
            xlib::ConfigureNotify => {
                let configure = xlib::XConfigureEvent::from(event);
                Some(WindowEvent::Configure {
                    width: configure.width.max(0) as u32,
                    height: configure.height.max(0) as u32,
                })
            }
            xlib::KeyPress => Some(WindowEvent::Key {
                keycode: xlib::XKeyEvent::from(event).keycode,
            }),
            xlib::ButtonPress => Some(WindowEvent::Button {
                button: xlib::XButtonEvent::from(event).button,
            }),
            // Other structure events (map, reparent) carry nothing we use
            _ => self.poll_event(window),
        }
    }
}
