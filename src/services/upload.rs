use crate::dispatch::UploadedFile;
use crate::error::{AppError, AppResult};
use std::path::Path;
use tokio::fs;
use uuid::Uuid;

#[derive(Clone)]
pub struct UploadConfig {
    pub upload_dir: String,
}

pub const MAX_FILE_SIZE: usize = 5 * 1024 * 1024; // 5 MB

/// Image kind recognised from the leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImageKind {
    Jpeg,
    Png,
    Gif,
    Webp,
}

impl ImageKind {
    fn sniff(data: &[u8]) -> Option<Self> {
        if data.len() >= 3 && data[..3] == [0xFF, 0xD8, 0xFF] {
            Some(Self::Jpeg)
        } else if data.len() >= 4 && data[..4] == [0x89, 0x50, 0x4E, 0x47] {
            Some(Self::Png)
        } else if data.len() >= 4 && data[..4] == [0x47, 0x49, 0x46, 0x38] {
            Some(Self::Gif)
        } else if data.len() >= 12
            && data[..4] == [0x52, 0x49, 0x46, 0x46]
            && data[8..12] == [0x57, 0x45, 0x42, 0x50]
        {
            Some(Self::Webp)
        } else {
            None
        }
    }

    fn mime(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
        }
    }

    fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Webp => "webp",
        }
    }
}

/// Checks size, image signature and, when the client declared one, that
/// the declared type agrees with the bytes.
fn inspect(file: &UploadedFile) -> AppResult<ImageKind> {
    if file.data.len() > MAX_FILE_SIZE {
        return Err(AppError::PayloadTooLarge);
    }

    let kind = ImageKind::sniff(&file.data).ok_or_else(|| {
        AppError::Validation("Chỉ chấp nhận ảnh JPEG, PNG, GIF hoặc WEBP".to_string())
    })?;

    if let Some(declared) = file.content_type.as_deref() {
        let declared = declared.trim().to_ascii_lowercase();
        let generic = declared.is_empty() || declared == "application/octet-stream";
        if !generic && declared != kind.mime() {
            return Err(AppError::Validation(
                "Nội dung tệp không khớp với định dạng khai báo".to_string(),
            ));
        }
    }

    Ok(kind)
}

pub struct UploadService;

impl UploadService {
    /// Validates every file first, then writes them under
    /// `{upload_dir}/{subdirectory}` and returns their public paths in order.
    pub async fn save_images(
        config: &UploadConfig,
        files: &[&UploadedFile],
        subdirectory: &str,
    ) -> AppResult<Vec<String>> {
        let kinds = files
            .iter()
            .map(|f| inspect(f))
            .collect::<AppResult<Vec<_>>>()?;

        if files.is_empty() {
            return Ok(Vec::new());
        }

        let dir = Path::new(&config.upload_dir).join(subdirectory);
        fs::create_dir_all(&dir).await.map_err(|e| {
            AppError::Internal(anyhow::anyhow!("Failed to create upload directory: {e}"))
        })?;

        let mut paths = Vec::with_capacity(files.len());
        for (file, kind) in files.iter().zip(kinds) {
            let filename = format!("{}.{}", Uuid::new_v4(), kind.extension());
            fs::write(dir.join(&filename), &file.data)
                .await
                .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to write file: {e}")))?;
            paths.push(format!("/uploads/{}/{}", subdirectory, filename));
        }

        Ok(paths)
    }

    /// Best-effort removal of files written for a request that then failed.
    pub async fn discard(config: &UploadConfig, public_paths: &[String]) {
        for path in public_paths {
            let Some(relative) = path.strip_prefix("/uploads/") else {
                continue;
            };
            if let Err(e) = fs::remove_file(Path::new(&config.upload_dir).join(relative)).await {
                tracing::warn!("Failed to remove orphaned upload {}: {}", path, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;

    fn file(data: &'static [u8], content_type: Option<&str>) -> UploadedFile {
        UploadedFile {
            field: "media".into(),
            file_name: Some("x".into()),
            content_type: content_type.map(str::to_string),
            data: Bytes::from_static(data),
        }
    }

    #[test]
    fn sniffs_supported_images() {
        assert_eq!(ImageKind::sniff(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(ImageKind::Jpeg));
        assert_eq!(ImageKind::sniff(&[0x89, 0x50, 0x4E, 0x47, 0x0D]), Some(ImageKind::Png));
        assert_eq!(ImageKind::sniff(b"GIF89a"), Some(ImageKind::Gif));
        assert_eq!(ImageKind::sniff(b"RIFF\0\0\0\0WEBPVP8 "), Some(ImageKind::Webp));
        assert_eq!(ImageKind::sniff(b"%PDF-1.7"), None);
        assert_eq!(ImageKind::sniff(&[]), None);
    }

    #[test]
    fn declared_type_must_match_bytes() {
        let png: &'static [u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A];
        assert!(inspect(&file(png, Some("image/png"))).is_ok());
        assert!(inspect(&file(png, None)).is_ok());
        assert!(inspect(&file(png, Some("application/octet-stream"))).is_ok());
        assert!(matches!(
            inspect(&file(png, Some("image/jpeg"))),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn non_images_rejected() {
        assert!(inspect(&file(b"hello", Some("text/plain"))).is_err());
    }
}
