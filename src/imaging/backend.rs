//! Image codec backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the three operations the pipeline
//! needs from a codec: identify, decode, and encode. Everything works on
//! in-memory byte buffers; nothing here touches the filesystem.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), pure Rust, built on
//! the `image` crate.

use super::params::OutputFormat;
use crate::types::Dimensions;
use image::RgbaImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Decode failed: {0}")]
    DecodeFailed(String),
    #[error("Encode failed: {0}")]
    EncodeFailed(String),
}

/// Trait for image codec backends.
///
/// Every backend must implement all three operations so the rest of the
/// codebase is backend-agnostic.
pub trait ImageBackend: Sync {
    /// Get image dimensions without a full decode where the format allows.
    fn identify(&self, bytes: &[u8]) -> Result<Dimensions, BackendError>;

    /// Decode to straight-alpha RGBA8.
    fn decode(&self, bytes: &[u8]) -> Result<RgbaImage, BackendError>;

    /// Encode a raster. Lossy formats drop the alpha channel.
    fn encode(&self, image: &RgbaImage, format: OutputFormat) -> Result<Vec<u8>, BackendError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use image::Rgba;
    use std::sync::Mutex;

    /// Mock backend that records operations instead of running codecs.
    ///
    /// `decode` pops queued rasters (a missing entry is a decode failure);
    /// `encode` returns the raw pixel bytes behind a small header, so equal
    /// rasters give equal bytes.
    #[derive(Default)]
    pub struct MockBackend {
        pub decode_results: Mutex<Vec<RgbaImage>>,
        pub fail_encode: Mutex<bool>,
        pub operations: Mutex<Vec<RecordedOp>>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        Identify(usize),
        Decode(usize),
        Encode {
            width: u32,
            height: u32,
            format: OutputFormat,
        },
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue rasters for `decode`, returned in the given order.
        pub fn with_images(mut images: Vec<RgbaImage>) -> Self {
            images.reverse();
            Self {
                decode_results: Mutex::new(images),
                ..Self::default()
            }
        }

        /// Queue `count` solid rasters of the given size.
        pub fn with_solid(count: usize, width: u32, height: u32) -> Self {
            Self::with_images(
                (0..count)
                    .map(|i| {
                        RgbaImage::from_pixel(width, height, Rgba([i as u8 * 40, 90, 160, 255]))
                    })
                    .collect(),
            )
        }

        pub fn failing_encode() -> Self {
            Self {
                fail_encode: Mutex::new(true),
                ..Self::default()
            }
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }
    }

    impl ImageBackend for MockBackend {
        fn identify(&self, bytes: &[u8]) -> Result<Dimensions, BackendError> {
            self.operations
                .lock()
                .unwrap()
                .push(RecordedOp::Identify(bytes.len()));

            self.decode_results
                .lock()
                .unwrap()
                .last()
                .map(|img| Dimensions {
                    width: img.width(),
                    height: img.height(),
                })
                .ok_or_else(|| BackendError::DecodeFailed("No mock image".to_string()))
        }

        fn decode(&self, bytes: &[u8]) -> Result<RgbaImage, BackendError> {
            self.operations
                .lock()
                .unwrap()
                .push(RecordedOp::Decode(bytes.len()));

            self.decode_results
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| BackendError::DecodeFailed("No mock image".to_string()))
        }

        fn encode(&self, image: &RgbaImage, format: OutputFormat) -> Result<Vec<u8>, BackendError> {
            self.operations.lock().unwrap().push(RecordedOp::Encode {
                width: image.width(),
                height: image.height(),
                format,
            });
            if *self.fail_encode.lock().unwrap() {
                return Err(BackendError::EncodeFailed("mock encode failure".to_string()));
            }
            let mut out = format.extension().as_bytes().to_vec();
            out.extend_from_slice(&image.width().to_le_bytes());
            out.extend_from_slice(&image.height().to_le_bytes());
            out.extend_from_slice(image.as_raw());
            Ok(out)
        }
    }

    #[test]
    fn mock_decodes_in_queue_order() {
        let backend = MockBackend::with_solid(2, 8, 4);

        let first = backend.decode(b"one").unwrap();
        let second = backend.decode(b"two").unwrap();
        assert_eq!(first.get_pixel(0, 0).0[0], 0);
        assert_eq!(second.get_pixel(0, 0).0[0], 40);
        assert!(backend.decode(b"three").is_err());

        let ops = backend.get_operations();
        assert_eq!(ops.len(), 3);
        assert!(matches!(&ops[0], RecordedOp::Decode(3)));
    }

    #[test]
    fn mock_identify_peeks_without_consuming() {
        let backend = MockBackend::with_solid(1, 800, 600);

        let dims = backend.identify(b"x").unwrap();
        assert_eq!(dims, Dimensions { width: 800, height: 600 });
        assert!(backend.decode(b"x").is_ok());
    }

    #[test]
    fn mock_records_encode() {
        let backend = MockBackend::new();
        let img = RgbaImage::new(3, 2);

        let bytes = backend.encode(&img, OutputFormat::Png).unwrap();
        assert!(bytes.starts_with(b"png"));

        let ops = backend.get_operations();
        assert_eq!(
            ops,
            vec![RecordedOp::Encode {
                width: 3,
                height: 2,
                format: OutputFormat::Png,
            }]
        );
    }

    #[test]
    fn mock_encode_failure() {
        let backend = MockBackend::failing_encode();
        assert!(matches!(
            backend.encode(&RgbaImage::new(1, 1), OutputFormat::Png),
            Err(BackendError::EncodeFailed(_))
        ));
    }
}
