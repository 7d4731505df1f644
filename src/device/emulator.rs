//! gRPC channel to the Android emulator's control endpoint.
//!
//! [`EmulatorChannel`] holds two independent lazy connections to the same
//! endpoint: a stream connection for the high-bandwidth screenshot stream and
//! an input connection for low-latency touch/mouse/clipboard calls, so a
//! saturated frame stream cannot queue behind input RPCs (or vice versa).
//!
//! A channel is never repaired in place. On transport failure the
//! [`crate::reconnect`] task builds a replacement and swaps the shared
//! reference; subscriptions against the old channel are canceled first.

use tonic::client::Grpc;
use tonic::codec::{ProstCodec, Streaming};
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};
use tonic::{Request, Status};
use tracing::warn;

use super::proto::{ClipData, Empty, Image, ImageFormat, ImgFormat, MouseEvent, TouchEvent};

/// Full gRPC method path for the emulator controller service.
macro_rules! method_path {
    ($method:literal) => {
        concat!("/android.emulation.control.EmulatorController/", $method)
    };
}

/// Logical screen size of the device, discovered once per channel lifetime
/// and shared read-only afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Default for Dimensions {
    fn default() -> Self {
        // Fallback when the discovery probe fails; matches a common phone AVD.
        Self {
            width: 1080,
            height: 2400,
        }
    }
}

impl Dimensions {
    /// Extract the device size from a screenshot reply, keeping the default
    /// for any axis the emulator reported as zero.
    #[must_use]
    pub fn from_image(image: &Image) -> Self {
        let mut dims = Self::default();
        if let Some(format) = &image.format {
            if format.width > 0 {
                dims.width = format.width;
            }
            if format.height > 0 {
                dims.height = format.height;
            }
        }
        dims
    }

    /// Requested stream width: 0 (native, fastest) when the shorter screen
    /// dimension is already at or below `max_width`, otherwise downscale.
    pub fn stream_width(self, max_width: u32) -> u32 {
        if self.width.min(self.height) <= max_width {
            0
        } else {
            max_width
        }
    }
}

/// The control connection to the emulator.
pub struct EmulatorChannel {
    stream: Channel,
    input: Channel,
}

impl EmulatorChannel {
    /// Build a channel against `addr` (`host:port`). Connections are lazy:
    /// this never blocks, and transport errors surface on first use.
    pub fn connect(addr: &str) -> Result<Self, tonic::transport::Error> {
        let endpoint = Endpoint::from_shared(format!("http://{addr}"))?;
        Ok(Self {
            stream: endpoint.connect_lazy(),
            input: endpoint.connect_lazy(),
        })
    }

    async fn unary<M1, M2>(channel: &Channel, method: &'static str, msg: M1) -> Result<M2, Status>
    where
        M1: prost::Message + Send + 'static,
        M2: prost::Message + Default + Send + 'static,
    {
        let mut grpc = Grpc::new(channel.clone());
        grpc.ready()
            .await
            .map_err(|e| Status::unavailable(format!("emulator channel not ready: {e}")))?;
        let codec: ProstCodec<M1, M2> = ProstCodec::default();
        let path = PathAndQuery::from_static(method);
        Ok(grpc.unary(Request::new(msg), path, codec).await?.into_inner())
    }

    /// Open the server-side screenshot stream at the given output width
    /// (0 = native).
    pub async fn stream_screenshot(&self, width: u32) -> Result<Streaming<Image>, Status> {
        let mut grpc = Grpc::new(self.stream.clone());
        grpc.ready()
            .await
            .map_err(|e| Status::unavailable(format!("emulator channel not ready: {e}")))?;
        let codec: ProstCodec<ImageFormat, Image> = ProstCodec::default();
        let path = PathAndQuery::from_static(method_path!("streamScreenshot"));
        let req = ImageFormat {
            format: ImgFormat::Png as i32,
            width,
            height: 0,
            display: 0,
        };
        Ok(grpc
            .server_streaming(Request::new(req), path, codec)
            .await?
            .into_inner())
    }

    /// One-shot screenshot; `width`/`height` 0 requests native size.
    pub async fn get_screenshot(&self, width: u32, height: u32) -> Result<Image, Status> {
        let req = ImageFormat {
            format: ImgFormat::Png as i32,
            width,
            height,
            display: 0,
        };
        Self::unary(&self.stream, method_path!("getScreenshot"), req).await
    }

    pub async fn send_touch(&self, event: TouchEvent) -> Result<(), Status> {
        let _: Empty = Self::unary(&self.input, method_path!("sendTouch"), event).await?;
        Ok(())
    }

    pub async fn send_mouse(&self, event: MouseEvent) -> Result<(), Status> {
        let _: Empty = Self::unary(&self.input, method_path!("sendMouse"), event).await?;
        Ok(())
    }

    pub async fn set_clipboard(&self, text: String) -> Result<(), Status> {
        let _: Empty = Self::unary(&self.input, method_path!("setClipboard"), ClipData { text }).await?;
        Ok(())
    }

    pub async fn get_clipboard(&self) -> Result<String, Status> {
        let clip: ClipData = Self::unary(&self.input, method_path!("getClipboard"), Empty {}).await?;
        Ok(clip.text)
    }

    /// Probe the device's native screen size with a full-resolution
    /// screenshot. Falls back to [`Dimensions::default`] when the probe
    /// fails, matching the bridge's permissive startup behavior.
    pub async fn discover_dimensions(&self) -> Dimensions {
        match self.get_screenshot(0, 0).await {
            Ok(image) => Dimensions::from_image(&image),
            Err(e) => {
                warn!("Dimension probe failed, using defaults: {e}");
                Dimensions::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_width_native_below_threshold() {
        let d = Dimensions {
            width: 480,
            height: 800,
        };
        assert_eq!(d.stream_width(540), 0);
    }

    #[test]
    fn test_stream_width_downscaled() {
        let d = Dimensions {
            width: 1080,
            height: 2400,
        };
        assert_eq!(d.stream_width(540), 540);
    }

    #[test]
    fn test_stream_width_uses_shorter_dimension() {
        // Landscape device: height is the shorter side.
        let d = Dimensions {
            width: 2400,
            height: 540,
        };
        assert_eq!(d.stream_width(540), 0);
    }

    #[test]
    fn test_service_path() {
        assert_eq!(
            method_path!("sendTouch"),
            "/android.emulation.control.EmulatorController/sendTouch"
        );
    }
}
