//! Image preprocessing for OCR models
//!
//! Converts packed BGRA pixel buffers into the planar NCHW tensors the
//! PaddleOCR models consume. No resizing is done here: the caller supplies
//! an image already sized for the target model.

use ndarray::Array4;

use crate::error::{OcrError, OcrResult};

/// Number of colour channels fed to the models
pub const CHANNELS: usize = 3;

/// Bytes per packed pixel (B, G, R, A)
const BYTES_PER_PIXEL: usize = 4;

/// Read-only view over a packed BGRA pixel buffer
///
/// Each pixel is one little-endian 32-bit word: byte0 = blue, byte1 = green,
/// byte2 = red, byte3 = alpha. Rows are contiguous with no padding.
#[derive(Debug, Clone, Copy)]
pub struct PixelImage<'a> {
    data: &'a [u8],
    width: u32,
    height: u32,
}

impl<'a> PixelImage<'a> {
    /// Wrap a BGRA buffer, failing if it is smaller than `width * height` pixels
    pub fn new(data: &'a [u8], width: u32, height: u32) -> OcrResult<Self> {
        let image = Self { data, width, height };
        image.check_len()?;
        Ok(image)
    }

    /// Get image dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Number of pixels, or `None` if it does not fit in `usize`
    fn pixel_count(&self) -> Option<usize> {
        (self.width as usize).checked_mul(self.height as usize)
    }

    /// Check the buffer holds `width * height` words and return the pixel count
    ///
    /// Dimensions whose byte length overflows are reported with
    /// `expected = usize::MAX`: no buffer can be that large.
    fn check_len(&self) -> OcrResult<usize> {
        let count = self.pixel_count();
        let expected = count
            .and_then(|n| n.checked_mul(BYTES_PER_PIXEL))
            .unwrap_or(usize::MAX);
        match count {
            Some(n) if self.data.len() >= expected => Ok(n),
            _ => Err(OcrError::Encoding {
                width: self.width,
                height: self.height,
                expected,
                actual: self.data.len(),
            }),
        }
    }

    /// Packed word for the pixel at row-major index `idx`
    fn word(&self, idx: usize) -> u32 {
        let start = idx * BYTES_PER_PIXEL;
        let bytes = &self.data[start..start + BYTES_PER_PIXEL];
        u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}

/// Owned planar tensor of shape (1, 3, H, W)
///
/// Not `Clone`: the buffer moves from the encoder into the session.
#[derive(Debug)]
pub struct PlanarTensor {
    data: Array4<f32>,
}

impl PlanarTensor {
    /// Shape as (batch, channels, height, width)
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// Take ownership of the underlying array
    pub fn into_array(self) -> Array4<f32> {
        self.data
    }
}

/// Encode a BGRA image into a planar RGB tensor normalized to [0, 1]
///
/// Plane 0 holds red, plane 1 green, plane 2 blue, each row-major.
pub fn encode(image: &PixelImage<'_>) -> OcrResult<PlanarTensor> {
    let plane = image.check_len()?;
    let (width, height) = (image.width as usize, image.height as usize);

    let len = plane.checked_mul(CHANNELS).ok_or(OcrError::Encoding {
        width: image.width,
        height: image.height,
        expected: usize::MAX,
        actual: image.data.len(),
    })?;
    let mut buffer = vec![0.0f32; len];

    for idx in 0..plane {
        let pixel = image.word(idx);
        let r = ((pixel >> 16) & 0xFF) as f32;
        let g = ((pixel >> 8) & 0xFF) as f32;
        let b = (pixel & 0xFF) as f32;

        buffer[idx] = r / 255.0;
        buffer[plane + idx] = g / 255.0;
        buffer[2 * plane + idx] = b / 255.0;
    }

    let data = Array4::from_shape_vec((1, CHANNELS, height, width), buffer)
        .map_err(|e| OcrError::decode(format!("tensor layout: {e}")))?;

    Ok(PlanarTensor { data })
}

/// Convert RGBA image data to BGRA (swap R and B)
pub fn rgba_to_bgra(data: &[u8]) -> Vec<u8> {
    let mut bgra = data.to_vec();
    for chunk in bgra.chunks_exact_mut(BYTES_PER_PIXEL) {
        chunk.swap(0, 2);
    }
    bgra
}

/// Rotate a BGRA image by 180 degrees
///
/// Used to turn a text line upright after the orientation stage reports it
/// upside down.
pub fn rotate_180(image: &PixelImage<'_>) -> OcrResult<Vec<u8>> {
    let count = image.check_len()?;
    let mut rotated = Vec::with_capacity(count * BYTES_PER_PIXEL);

    for idx in (0..count).rev() {
        let start = idx * BYTES_PER_PIXEL;
        rotated.extend_from_slice(&image.data[start..start + BYTES_PER_PIXEL]);
    }

    Ok(rotated)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bgra(pixels: &[(u8, u8, u8)]) -> Vec<u8> {
        pixels
            .iter()
            .flat_map(|&(r, g, b)| [b, g, r, 255])
            .collect()
    }

    #[test]
    fn test_encode_planar_layout() {
        // 2x2: red, green / blue, gray
        let data = bgra(&[(255, 0, 0), (0, 255, 0), (0, 0, 255), (128, 128, 128)]);
        let image = PixelImage::new(&data, 2, 2).unwrap();

        let tensor = encode(&image).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 2, 2]);
        let t = tensor.into_array();

        // Red pixel at (0, 0)
        assert!((t[[0, 0, 0, 0]] - 1.0).abs() < 1e-6);
        assert_eq!(t[[0, 1, 0, 0]], 0.0);
        assert_eq!(t[[0, 2, 0, 0]], 0.0);

        // Green pixel at (x=1, y=0)
        assert!((t[[0, 1, 0, 1]] - 1.0).abs() < 1e-6);

        // Blue pixel at (x=0, y=1)
        assert!((t[[0, 2, 1, 0]] - 1.0).abs() < 1e-6);
        assert_eq!(t[[0, 0, 1, 0]], 0.0);

        assert!((t[[0, 0, 1, 1]] - 128.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn test_encode_values_in_unit_range() {
        let (w, h) = (7u32, 5u32);
        let data: Vec<u8> = (0..w * h * 4).map(|i| (i * 37 % 256) as u8).collect();
        let image = PixelImage::new(&data, w, h).unwrap();

        let tensor = encode(&image).unwrap();
        let flat = tensor.into_array().into_raw_vec_and_offset().0;

        assert_eq!(flat.len(), 3 * (w * h) as usize);
        assert!(flat.iter().all(|v| (0.0..=1.0).contains(v)));

        // Plane 0 comes from byte 2 (red), plane 2 from byte 0 (blue)
        let plane = (w * h) as usize;
        for idx in 0..plane {
            assert_eq!(flat[idx], data[idx * 4 + 2] as f32 / 255.0);
            assert_eq!(flat[2 * plane + idx], data[idx * 4] as f32 / 255.0);
        }
    }

    #[test]
    fn test_short_buffer_rejected() {
        let data = vec![0u8; 4 * 3];
        let err = PixelImage::new(&data, 2, 2).unwrap_err();
        assert!(matches!(err, OcrError::Encoding { expected: 16, actual: 12, .. }));
    }

    #[test]
    fn test_oversized_dimensions_rejected() {
        let err = PixelImage::new(&[], u32::MAX, u32::MAX).unwrap_err();
        assert!(matches!(err, OcrError::Encoding { actual: 0, .. }));

        // Wraps to zero bytes if multiplied unchecked on 64-bit targets
        let err = PixelImage::new(&[], 1 << 31, 1 << 31).unwrap_err();
        assert!(matches!(err, OcrError::Encoding { expected: usize::MAX, .. }));
    }

    #[test]
    fn test_empty_image() {
        let image = PixelImage::new(&[], 0, 0).unwrap();
        let tensor = encode(&image).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 0, 0]);
    }

    #[test]
    fn test_rgba_to_bgra() {
        let rgba = vec![10, 20, 30, 40, 50, 60, 70, 80];
        assert_eq!(rgba_to_bgra(&rgba), vec![30, 20, 10, 40, 70, 60, 50, 80]);
    }

    #[test]
    fn test_rotate_180() {
        let data = bgra(&[(1, 0, 0), (2, 0, 0), (3, 0, 0), (4, 0, 0), (5, 0, 0), (6, 0, 0)]);
        let image = PixelImage::new(&data, 3, 2).unwrap();

        let rotated = rotate_180(&image).unwrap();
        let reds: Vec<u8> = rotated.chunks_exact(4).map(|p| p[2]).collect();
        assert_eq!(reds, vec![6, 5, 4, 3, 2, 1]);
    }
}
