//! Request-body intake: turn a multipart form or a base64 JSON payload into
//! validated in-memory images.

use axum::extract::multipart::Multipart;
use base64::Engine;
use serde::Deserialize;
use service_core::error::AppError;

/// Most images a single request may carry.
pub const MAX_IMAGES_PER_REQUEST: usize = 10;
/// Largest accepted decoded image, in bytes.
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// One decoded, validated image ready for storage.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub extension: String,
    pub filename: Option<String>,
}

/// JSON body: a single data URI or a list of them. List entries may be
/// bare data-URI strings or `{ data, filename? }` objects.
#[derive(Debug, Deserialize)]
pub struct JsonIntake {
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub images: Option<Vec<JsonImage>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum JsonImage {
    Uri(String),
    Entry {
        data: String,
        #[serde(default)]
        filename: Option<String>,
    },
}

impl JsonImage {
    fn into_parts(self) -> (String, Option<String>) {
        match self {
            JsonImage::Uri(uri) => (uri, None),
            JsonImage::Entry { data, filename } => (data, filename),
        }
    }
}

/// File extension for a MIME type; `image/jpeg` maps to `jpg`.
fn extension_for(mime_type: &str) -> Result<String, AppError> {
    let subtype = mime_type
        .strip_prefix("image/")
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Unsupported content type: {}", mime_type)))?;
    let ext = match subtype {
        "jpeg" => "jpg",
        other => other,
    };
    if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Unsupported content type: {}",
            mime_type
        )));
    }
    Ok(ext.to_string())
}

fn validate_image(bytes: &[u8], mime_type: &str) -> Result<String, AppError> {
    if bytes.is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!("Empty image payload")));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Image exceeds the {} MB limit",
            MAX_IMAGE_BYTES / (1024 * 1024)
        )));
    }
    extension_for(mime_type)
}

/// Parse a `data:image/...;base64,...` URI into bytes plus MIME type.
pub fn parse_data_uri(uri: &str) -> Result<(Vec<u8>, String), AppError> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Expected a data URI")))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Malformed data URI")))?;
    let mime_type = header
        .strip_suffix(";base64")
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Data URI must be base64 encoded")))?;

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Invalid base64 payload: {}", e)))?;

    Ok((bytes, mime_type.to_string()))
}

/// Collect images from `image`/`images` multipart fields.
pub async fn from_multipart(mut multipart: Multipart) -> Result<Vec<UploadedImage>, AppError> {
    let mut images = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Malformed multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name != "image" && name != "images" {
            continue;
        }

        if images.len() >= MAX_IMAGES_PER_REQUEST {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "At most {} images per request",
                MAX_IMAGES_PER_REQUEST
            )));
        }

        let mime_type = field.content_type().unwrap_or_default().to_string();
        let filename = field.file_name().map(|s| s.to_string());
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Failed to read upload: {}", e)))?
            .to_vec();

        let extension = validate_image(&bytes, &mime_type)?;
        images.push(UploadedImage {
            bytes,
            mime_type,
            extension,
            filename,
        });
    }

    if images.is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!("No image provided")));
    }
    Ok(images)
}

/// Collect images from a JSON body of data URIs.
pub fn from_json(body: JsonIntake) -> Result<Vec<UploadedImage>, AppError> {
    let entries: Vec<JsonImage> = match (body.image, body.images) {
        (Some(single), None) => vec![JsonImage::Uri(single)],
        (None, Some(many)) => many,
        (Some(single), Some(mut many)) => {
            many.insert(0, JsonImage::Uri(single));
            many
        }
        (None, None) => {
            return Err(AppError::BadRequest(anyhow::anyhow!("No image provided")));
        }
    };

    if entries.is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!("No image provided")));
    }
    if entries.len() > MAX_IMAGES_PER_REQUEST {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "At most {} images per request",
            MAX_IMAGES_PER_REQUEST
        )));
    }

    let mut images = Vec::with_capacity(entries.len());
    for entry in entries {
        let (uri, filename) = entry.into_parts();
        let (bytes, mime_type) = parse_data_uri(&uri)?;
        let extension = validate_image(&bytes, &mime_type)?;
        images.push(UploadedImage {
            bytes,
            mime_type,
            extension,
            filename,
        });
    }
    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_uri(mime: &str, bytes: &[u8]) -> String {
        format!(
            "data:{};base64,{}",
            mime,
            base64::engine::general_purpose::STANDARD.encode(bytes)
        )
    }

    #[test]
    fn json_single_image_decodes() {
        let body = JsonIntake {
            image: Some(data_uri("image/png", b"\x89PNG fake")),
            images: None,
        };
        let images = from_json(body).unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].mime_type, "image/png");
        assert_eq!(images[0].extension, "png");
        assert_eq!(images[0].bytes, b"\x89PNG fake");
    }

    #[test]
    fn jpeg_maps_to_jpg_extension() {
        let body = JsonIntake {
            image: Some(data_uri("image/jpeg", b"\xff\xd8 fake")),
            images: None,
        };
        let images = from_json(body).unwrap();
        assert_eq!(images[0].extension, "jpg");
    }

    #[test]
    fn object_entries_carry_filenames() {
        let body = JsonIntake {
            image: None,
            images: Some(vec![JsonImage::Entry {
                data: data_uri("image/png", b"fake"),
                filename: Some("cat.png".to_string()),
            }]),
        };
        let images = from_json(body).unwrap();
        assert_eq!(images[0].filename.as_deref(), Some("cat.png"));
    }

    #[test]
    fn non_image_mime_is_rejected() {
        let body = JsonIntake {
            image: Some(data_uri("application/pdf", b"%PDF")),
            images: None,
        };
        assert!(matches!(from_json(body), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn malformed_data_uri_is_rejected() {
        for uri in [
            "not-a-data-uri",
            "data:image/png;base64",
            "data:image/png,plain-not-base64",
            "data:image/png;base64,!!!not-base64!!!",
        ] {
            let body = JsonIntake {
                image: Some(uri.to_string()),
                images: None,
            };
            assert!(matches!(from_json(body), Err(AppError::BadRequest(_))), "{}", uri);
        }
    }

    #[test]
    fn empty_and_oversized_lists_are_rejected() {
        let body = JsonIntake {
            image: None,
            images: Some(Vec::new()),
        };
        assert!(matches!(from_json(body), Err(AppError::BadRequest(_))));

        let body = JsonIntake {
            image: None,
            images: None,
        };
        assert!(matches!(from_json(body), Err(AppError::BadRequest(_))));

        let uri = JsonImage::Uri(data_uri("image/png", b"x"));
        let body = JsonIntake {
            image: None,
            images: Some(vec![uri; MAX_IMAGES_PER_REQUEST + 1]),
        };
        assert!(matches!(from_json(body), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn empty_payload_is_rejected() {
        let body = JsonIntake {
            image: Some("data:image/png;base64,".to_string()),
            images: None,
        };
        assert!(matches!(from_json(body), Err(AppError::BadRequest(_))));
    }
}
