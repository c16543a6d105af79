//! Output format handling service
//!
//! Encodes composited frames into bytes for the streaming relay and knows
//! which formats can carry the alpha channel.

use crate::{
    config::OutputFormat,
    error::{BgRemovalError, Result},
    types::OutputImage,
};
use image::{codecs::jpeg::JpegEncoder, DynamicImage, ImageFormat, RgbImage};
use std::io::Cursor;

/// Service for encoding output images
pub struct OutputFormatHandler;

impl OutputFormatHandler {
    /// Encode an output image into `format`
    ///
    /// JPEG has no alpha channel: transparent pixels are flattened onto
    /// black, so background areas of a preview render black.
    ///
    /// # Examples
    /// ```rust
    /// use video_bgremove::{config::OutputFormat, services::OutputFormatHandler, types::OutputImage};
    /// use image::RgbaImage;
    ///
    /// let image = OutputImage::Transparent(RgbaImage::new(8, 8));
    /// let bytes = OutputFormatHandler::encode(&image, OutputFormat::Png, 80)?;
    /// assert_eq!(&bytes[1..4], b"PNG");
    /// # Ok::<(), video_bgremove::BgRemovalError>(())
    /// ```
    pub fn encode(image: &OutputImage, format: OutputFormat, jpeg_quality: u8) -> Result<Vec<u8>> {
        let mut buffer = Cursor::new(Vec::new());

        match format {
            OutputFormat::Png => {
                image.to_dynamic().write_to(&mut buffer, ImageFormat::Png)?;
            }
            OutputFormat::Jpeg => {
                let rgb = Self::flatten(image);
                let mut encoder = JpegEncoder::new_with_quality(&mut buffer, jpeg_quality.min(100));
                encoder.encode_image(&rgb)?;
            }
            OutputFormat::WebP => {
                #[cfg(feature = "webp-support")]
                {
                    image.to_dynamic().write_to(&mut buffer, ImageFormat::WebP)?;
                }
                #[cfg(not(feature = "webp-support"))]
                {
                    return Err(BgRemovalError::invalid_config(
                        "WebP output requires the webp-support feature",
                    ));
                }
            }
        }

        Ok(buffer.into_inner())
    }

    /// Drop the alpha channel, premultiplying so transparent pixels become black
    fn flatten(image: &OutputImage) -> RgbImage {
        match image {
            OutputImage::Opaque(rgb) => rgb.clone(),
            OutputImage::Transparent(rgba) => {
                RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
                    let p = rgba.get_pixel(x, y);
                    let alpha = u16::from(p[3]);
                    let channel = |c: u8| ((u16::from(c) * alpha + 127) / 255) as u8;
                    image::Rgb([channel(p[0]), channel(p[1]), channel(p[2])])
                })
            }
        }
    }

    /// Decode bytes produced by [`OutputFormatHandler::encode`]
    pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
        image::load_from_memory(bytes).map_err(BgRemovalError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgba, RgbaImage};

    fn half_transparent() -> OutputImage {
        OutputImage::Transparent(RgbaImage::from_fn(16, 16, |x, _| {
            if x < 8 {
                Rgba([200, 100, 50, 255])
            } else {
                Rgba([0, 0, 0, 0])
            }
        }))
    }

    #[test]
    fn test_png_preserves_alpha() {
        let bytes = OutputFormatHandler::encode(&half_transparent(), OutputFormat::Png, 80).unwrap();
        let decoded = OutputFormatHandler::decode(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (16, 16));
        assert_eq!(decoded.get_pixel(0, 0), Rgba([200, 100, 50, 255]));
        assert_eq!(decoded.get_pixel(15, 15)[3], 0);
    }

    #[test]
    fn test_jpeg_background_renders_black() {
        let bytes =
            OutputFormatHandler::encode(&half_transparent(), OutputFormat::Jpeg, 95).unwrap();
        let decoded = OutputFormatHandler::decode(&bytes).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (16, 16));
        let background = decoded.get_pixel(15, 15);
        assert!(background.0.iter().all(|&c| c < 40), "{:?}", background);
    }

    #[cfg(feature = "webp-support")]
    #[test]
    fn test_webp_encoding() {
        let bytes =
            OutputFormatHandler::encode(&half_transparent(), OutputFormat::WebP, 80).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        let decoded = OutputFormatHandler::decode(&bytes).unwrap();
        assert_eq!(decoded.get_pixel(0, 0), Rgba([200, 100, 50, 255]));
    }
}
