//! rollcall-hw: webcam capture and frame conversion.
//!
//! Provides V4L2-based camera access and conversion of the negotiated
//! pixel format to RGB frames.

pub mod camera;
pub mod frame;

pub use camera::{
    Camera, CameraError, CameraStream, DeviceInfo, FrameSource, PixelFormat, DEFAULT_READ_TIMEOUT,
};
pub use frame::Frame;
