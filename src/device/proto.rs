//! Hand-written message types for the emulator control protocol.
//!
//! Mirrors the subset of `android.emulation.control.EmulatorController` that
//! the bridge actually calls (screenshots, touch, mouse, clipboard). Field
//! tags match `emulator_controller.proto` exactly; unknown fields in server
//! responses are skipped by prost, so the full messages need not be modeled.

/// One touch point. A multi-touch event carries the union of all
/// currently-down points; a point with `pressure` 0 is a release.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Touch {
    #[prost(int32, tag = "1")]
    pub x: i32,
    #[prost(int32, tag = "2")]
    pub y: i32,
    #[prost(int32, tag = "3")]
    pub identifier: i32,
    #[prost(int32, tag = "4")]
    pub pressure: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct TouchEvent {
    #[prost(message, repeated, tag = "1")]
    pub touches: Vec<Touch>,
    #[prost(int32, tag = "2")]
    pub display: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct MouseEvent {
    #[prost(int32, tag = "1")]
    pub x: i32,
    #[prost(int32, tag = "2")]
    pub y: i32,
    #[prost(int32, tag = "3")]
    pub buttons: i32,
    #[prost(int32, tag = "4")]
    pub display: i32,
}

/// Requested or reported image encoding. `width`/`height` of 0 mean native
/// resolution.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ImageFormat {
    #[prost(enumeration = "ImgFormat", tag = "1")]
    pub format: i32,
    #[prost(uint32, tag = "3")]
    pub width: u32,
    #[prost(uint32, tag = "4")]
    pub height: u32,
    #[prost(uint32, tag = "5")]
    pub display: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, prost::Enumeration)]
#[repr(i32)]
pub enum ImgFormat {
    Png = 0,
    Rgba8888 = 1,
    Rgb888 = 2,
}

/// A single screen frame. `image` holds the raw encoded bytes, forwarded to
/// the browser unwrapped.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Image {
    #[prost(message, optional, tag = "1")]
    pub format: Option<ImageFormat>,
    #[prost(bytes = "vec", tag = "4")]
    pub image: Vec<u8>,
    #[prost(uint32, tag = "5")]
    pub seq: u32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ClipData {
    #[prost(string, tag = "1")]
    pub text: String,
}

/// Wire-compatible with `google.protobuf.Empty`.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Empty {}
