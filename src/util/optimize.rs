use crate::format::ImageKind;
use anyhow::{Context, Result, bail};
use image::{ColorType, DynamicImage, codecs::jpeg::JpegEncoder};
use oxipng::Options;

/// Settings for the local re-encoder.
#[derive(Debug, Clone, Copy)]
pub struct LocalOptions {
    pub quality: u8,
    pub png_level: u8,
}

/// Re-encodes `data` as the same format. The result may be larger than the
/// input; callers decide whether to keep it.
pub fn recompress(data: &[u8], kind: ImageKind, options: LocalOptions) -> Result<Vec<u8>> {
    match kind {
        ImageKind::Jpeg => reencode_jpeg(data, options.quality),
        ImageKind::Png => optimize_png(data, options.png_level),
        other => bail!("{other} images cannot be recompressed locally"),
    }
}

pub fn optimize_png(data: &[u8], level: u8) -> Result<Vec<u8>> {
    let options = Options::from_preset(level);

    oxipng::optimize_from_memory(data, &options).context("Failed to optimize PNG")
}

pub fn reencode_jpeg(data: &[u8], quality: u8) -> Result<Vec<u8>> {
    let image = image::load_from_memory(data).context("Failed to decode JPEG")?;

    // The JPEG encoder only accepts 8-bit luma or RGB
    let image = match image.color() {
        ColorType::L8 | ColorType::Rgb8 => image,
        _ => DynamicImage::ImageRgb8(image.to_rgb8()),
    };

    let mut buffer = Vec::new();
    image
        .write_with_encoder(JpegEncoder::new_with_quality(&mut buffer, quality))
        .context("Failed to encode JPEG")?;

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
    use std::io::Cursor;

    fn noisy_rgb(width: u32, height: u32) -> RgbImage {
        ImageBuffer::from_fn(width, height, |x, y| {
            let v = (x * 31 + y * 17 + (x * y) % 13) as u8;
            Rgb([v, v.wrapping_mul(3), v.wrapping_add(y as u8)])
        })
    }

    fn encode_jpeg(image: &RgbImage, quality: u8) -> Vec<u8> {
        let mut buffer = Vec::new();
        DynamicImage::ImageRgb8(image.clone())
            .write_with_encoder(JpegEncoder::new_with_quality(&mut buffer, quality))
            .unwrap();
        buffer
    }

    #[test]
    fn test_reencode_jpeg_lower_quality_is_smaller() {
        let original = encode_jpeg(&noisy_rgb(64, 64), 100);

        let recompressed = reencode_jpeg(&original, 30).unwrap();

        assert!(recompressed.len() < original.len());
        let decoded = image::load_from_memory(&recompressed).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 64));
    }

    #[test]
    fn test_reencode_jpeg_handles_alpha_input() {
        let rgba: RgbaImage = ImageBuffer::from_pixel(8, 8, Rgba([10, 20, 30, 128]));
        let mut png = Cursor::new(Vec::new());
        rgba.write_to(&mut png, ImageFormat::Png).unwrap();

        let jpeg = reencode_jpeg(png.get_ref(), 70).unwrap();

        assert_eq!(image::guess_format(&jpeg).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn test_optimize_png_stays_lossless() {
        let source = noisy_rgb(32, 32);
        let mut png = Cursor::new(Vec::new());
        source.write_to(&mut png, ImageFormat::Png).unwrap();

        let optimized = optimize_png(png.get_ref(), 2).unwrap();

        let decoded = image::load_from_memory(&optimized).unwrap().to_rgb8();
        assert_eq!(decoded, source);
    }

    #[test]
    fn test_recompress_rejects_unsupported_kinds() {
        let options = LocalOptions {
            quality: 70,
            png_level: 2,
        };
        assert!(recompress(b"GIF89a", ImageKind::Gif, options).is_err());
        assert!(recompress(b"RIFF", ImageKind::WebP, options).is_err());
    }

    #[test]
    fn test_corrupt_input_is_an_error() {
        assert!(reencode_jpeg(b"not a jpeg", 70).is_err());
        assert!(optimize_png(b"not a png", 2).is_err());
    }
}
