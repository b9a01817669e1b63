//! JPEG encoding and multipart framing for HTTP transport.

use actix_web::web::Bytes;
use anyhow::{Result, anyhow};
use image::{ImageBuffer, Rgb, codecs::jpeg::JpegEncoder};
use video_ingest::Frame;

pub(crate) const DEFAULT_JPEG_QUALITY: u8 = 95;
pub(crate) const MULTIPART_BOUNDARY: &str = "frame";
pub(crate) const MULTIPART_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Encode a BGR frame as JPEG.
pub(crate) fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>> {
    let width = u32::try_from(frame.width).map_err(|_| anyhow!("negative frame width"))?;
    let height = u32::try_from(frame.height).map_err(|_| anyhow!("negative frame height"))?;
    let rgb = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_vec(width, height, bgr_to_rgb(&frame.data))
        .ok_or_else(|| anyhow!("failed to convert frame into image buffer"))?;

    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
        .encode_image(&rgb)
        .map_err(|err| anyhow!("JPEG encode failed: {err}"))?;
    Ok(buffer)
}

/// One `multipart/x-mixed-replace` part carrying a JPEG.
pub(crate) fn multipart_part(jpeg: &[u8]) -> Bytes {
    let mut payload = Vec::with_capacity(jpeg.len() + 64);
    payload.extend_from_slice(b"--");
    payload.extend_from_slice(MULTIPART_BOUNDARY.as_bytes());
    payload.extend_from_slice(b"\r\nContent-Type: image/jpeg\r\n\r\n");
    payload.extend_from_slice(jpeg);
    payload.extend_from_slice(b"\r\n");
    Bytes::from(payload)
}

fn bgr_to_rgb(input: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(input.len());
    for chunk in input.chunks_exact(3) {
        output.extend_from_slice(&[chunk[2], chunk[1], chunk[0]]);
    }
    output
}
