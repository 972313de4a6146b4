//! Storage for uploaded images under the configured media root.

use crate::models::student::IMAGE_MAX_LENGTH;
use crate::settings::MediaSettings;
use log::info;
use std::io::ErrorKind;
use std::path::PathBuf;
use thiserror::Error;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("upload is empty")]
    EmptyUpload,

    #[error("upload is not a supported image (png, jpeg, gif, webp, bmp)")]
    NotAnImage,

    #[error("stored path '{path}' exceeds {max} characters")]
    NameTooLong { path: String, max: usize },

    #[error("media storage error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone, Debug)]
pub struct MediaStore {
    root: PathBuf,
    images_dir: String,
}

impl MediaStore {
    pub fn new(settings: &MediaSettings) -> Self {
        MediaStore {
            root: PathBuf::from(&settings.root),
            images_dir: settings.images_dir.trim_matches('/').to_string(),
        }
    }

    /// Write an image and return its path relative to the media root.
    pub async fn save_image(&self, filename: &str, bytes: &[u8]) -> Result<String, MediaError> {
        if bytes.is_empty() {
            return Err(MediaError::EmptyUpload);
        }
        let extension = sniff_image(bytes).ok_or(MediaError::NotAnImage)?;

        let dir = self.root.join(&self.images_dir);
        tokio::fs::create_dir_all(&dir).await?;

        let stem = safe_stem(filename);
        let mut n = 0;
        loop {
            let candidate = if n == 0 {
                format!("{}.{}", stem, extension)
            } else {
                format!("{}_{}.{}", stem, n, extension)
            };
            let relative = format!("{}/{}", self.images_dir, candidate);
            if relative.chars().count() > IMAGE_MAX_LENGTH {
                return Err(MediaError::NameTooLong {
                    path: relative,
                    max: IMAGE_MAX_LENGTH,
                });
            }

            // create_new makes claiming a name atomic across concurrent uploads.
            let opened = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(dir.join(&candidate))
                .await;
            match opened {
                Ok(mut file) => {
                    file.write_all(bytes).await?;
                    file.flush().await?;
                    info!("Stored upload {} ({} bytes)", relative, bytes.len());
                    return Ok(relative);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => n += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Detect the image format from its magic bytes.
pub fn sniff_image(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("jpg")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("gif")
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("webp")
    } else if bytes.starts_with(b"BM") && bytes.len() > 14 {
        Some("bmp")
    } else {
        None
    }
}

/// Reduce a client-supplied name to a safe file stem. The client's extension
/// is dropped; stored files always carry the sniffed one.
fn safe_stem(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    let clean: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let clean = clean.trim_matches('.');
    let stem = match clean.rsplit_once('.') {
        Some((stem, _)) => stem.trim_end_matches('.'),
        None => clean,
    };
    if stem.is_empty() {
        "upload".to_string()
    } else {
        stem.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_stem_strips_directories_and_odd_characters() {
        assert_eq!(safe_stem("../../etc/pass wd.PNG"), "pass_wd");
        assert_eq!(safe_stem("C:\\photos\\me.jpeg"), "me");
    }

    #[test]
    fn safe_stem_drops_the_client_extension() {
        assert_eq!(safe_stem("x.html"), "x");
        assert_eq!(safe_stem("photo"), "photo");
        assert_eq!(safe_stem(""), "upload");
        assert_eq!(safe_stem("..."), "upload");
    }
}
