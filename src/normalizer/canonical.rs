use crate::{
    config::NormalizerConfig,
    error::{PipelineError, Result},
    models::CanonicalImage,
};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

/// Decodes with the declared format first and falls back to sniffing the
/// magic bytes when the declaration is missing or wrong.
pub fn decode(bytes: &[u8], declared_mime: Option<&str>) -> Result<DynamicImage> {
    if bytes.is_empty() {
        return Err(PipelineError::UnsupportedFormat("image is empty".into()));
    }

    if let Some(format) = declared_mime.and_then(format_for_mime) {
        match image::load_from_memory_with_format(bytes, format) {
            Ok(image) => return Ok(image),
            Err(e) => log::debug!(
                "Declared format {:?} did not decode ({}), sniffing instead",
                format,
                e
            ),
        }
    }

    let format = image::guess_format(bytes)
        .map_err(|e| PipelineError::UnsupportedFormat(format!("unrecognised image data: {}", e)))?;
    image::load_from_memory_with_format(bytes, format)
        .map_err(|e| PipelineError::UnsupportedFormat(format!("{:?} decode failed: {}", format, e)))
}

pub fn format_for_mime(mime: &str) -> Option<ImageFormat> {
    let essence = mime.split(';').next().unwrap_or(mime).trim();
    ImageFormat::from_mime_type(essence)
}

/// Drops any alpha channel by compositing onto an opaque `fill`.
///
/// Palette images have already been expanded to RGB or RGBA by the decoder
/// depending on whether they carried transparency, so only `has_alpha`
/// matters here.
pub fn flatten_alpha(image: &DynamicImage, fill: [u8; 3]) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }

    let rgba = image.to_rgba8();
    let mut flattened = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = u16::from(pixel[3]);
        let blend = |channel: u8, background: u8| -> u8 {
            ((u16::from(channel) * alpha + u16::from(background) * (255 - alpha)) / 255) as u8
        };
        flattened.put_pixel(
            x,
            y,
            Rgb([
                blend(pixel[0], fill[0]),
                blend(pixel[1], fill[1]),
                blend(pixel[2], fill[2]),
            ]),
        );
    }
    flattened
}

/// Flattens and JPEG-encodes `image` with the fixed canonical settings.
/// The same input and config always produce the same bytes.
pub fn encode_canonical(image: &DynamicImage, config: &NormalizerConfig) -> Result<CanonicalImage> {
    let rgb = flatten_alpha(image, config.background_fill);
    let (width, height) = rgb.dimensions();

    let mut bytes = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut bytes, config.jpeg_quality);
    encoder
        .encode_image(&rgb)
        .map_err(|e| PipelineError::UnsupportedFormat(format!("JPEG encode failed: {}", e)))?;

    if bytes.len() > config.max_output_bytes {
        return Err(PipelineError::PayloadTooLarge(format!(
            "canonical image is {} bytes, limit is {}",
            bytes.len(),
            config.max_output_bytes
        )));
    }

    Ok(CanonicalImage::from_jpeg(bytes, width, height))
}
