use std::path::{Path, PathBuf};

use bytes::Bytes;
use image::ImageFormat;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("failed reading frame '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("frame '{}' is not a PNG or JPEG image", .path.display())]
    UnsupportedFormat { path: PathBuf },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    Png,
    Jpeg,
}

impl FrameFormat {
    pub fn media_type(&self) -> &'static str {
        match self {
            FrameFormat::Png => "image/png",
            FrameFormat::Jpeg => "image/jpeg",
        }
    }
}

/// An encoded still image captured for one read.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub format: FrameFormat,
    pub data: Bytes,
}

impl Frame {
    pub fn media_type(&self) -> &'static str {
        self.format.media_type()
    }
}

/// Loads a still frame from disk. The encoding is detected from the file's
/// magic bytes and the payload is passed through untouched.
pub async fn read_frame(path: &Path) -> Result<Frame, FrameError> {
    let contents = tokio::fs::read(path).await.map_err(|source| FrameError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let format = match image::guess_format(&contents) {
        Ok(ImageFormat::Png) => FrameFormat::Png,
        Ok(ImageFormat::Jpeg) => FrameFormat::Jpeg,
        _ => {
            return Err(FrameError::UnsupportedFormat {
                path: path.to_path_buf(),
            })
        }
    };

    Ok(Frame {
        format,
        data: Bytes::from(contents),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
    const JPEG_MAGIC: &[u8] = b"\xFF\xD8\xFF\xE0\0\x10JFIF\0";

    #[tokio::test]
    async fn detects_png_and_jpeg_frames() {
        let dir = tempfile::tempdir().expect("temp dir");
        let png = dir.path().join("frame.png");
        let jpeg = dir.path().join("frame.jpg");
        std::fs::write(&png, PNG_MAGIC).expect("write png");
        std::fs::write(&jpeg, JPEG_MAGIC).expect("write jpeg");

        let frame = read_frame(&png).await.expect("png frame");
        assert_eq!(frame.media_type(), "image/png");
        assert_eq!(frame.data.as_ref(), PNG_MAGIC);

        let frame = read_frame(&jpeg).await.expect("jpeg frame");
        assert_eq!(frame.format, FrameFormat::Jpeg);
    }

    #[tokio::test]
    async fn rejects_other_content() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("frame.txt");
        std::fs::write(&path, b"not an image").expect("write text");

        let err = read_frame(&path).await.expect_err("text is rejected");
        assert!(matches!(err, FrameError::UnsupportedFormat { .. }));
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error() {
        let err = read_frame(Path::new("/nonexistent/sample.jpg"))
            .await
            .expect_err("missing file");
        assert!(matches!(err, FrameError::Io { .. }));
    }
}
