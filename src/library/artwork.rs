use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use reqwest::{Client, header::CONTENT_TYPE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
}

impl ImageFormat {
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/gif" => Some(Self::Gif),
            "image/webp" => Some(Self::Webp),
            _ => None,
        }
    }

    /// Sniff the format from magic bytes.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        infer::get(bytes).and_then(|kind| Self::from_content_type(kind.mime_type()))
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Webp => "webp",
        }
    }

    /// Audio containers only carry JPEG, PNG and GIF pictures.
    pub fn is_embeddable(self) -> bool {
        !matches!(self, Self::Webp)
    }
}

#[derive(Debug, Clone)]
pub struct Artwork {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
}

impl Artwork {
    /// Declared content type wins; otherwise the bytes are sniffed, and
    /// anything unrecognised is treated as JPEG.
    pub fn new(bytes: Vec<u8>, content_type: Option<&str>) -> Self {
        let format = content_type
            .and_then(ImageFormat::from_content_type)
            .or_else(|| ImageFormat::from_bytes(&bytes))
            .unwrap_or(ImageFormat::Jpeg);
        Self { bytes, format }
    }

    pub fn cover_file_name(&self) -> String {
        format!("cover.{}", self.format.extension())
    }
}

pub async fn fetch_artwork(client: &Client, url: &str) -> Result<Artwork> {
    let response = client
        .get(url)
        .send()
        .await
        .wrap_err_with(|| format!("Failed to request artwork from {}", url))?
        .error_for_status()
        .wrap_err_with(|| format!("Artwork request to {} was rejected", url))?;

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let bytes = response
        .bytes()
        .await
        .wrap_err_with(|| format!("Failed to read artwork body from {}", url))?;
    if bytes.is_empty() {
        return Err(eyre!("Artwork at {} is empty", url));
    }

    Ok(Artwork::new(bytes.to_vec(), content_type.as_deref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
    const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10, b'J', b'F', b'I', b'F'];

    #[test]
    fn test_content_type_mapping() {
        assert_eq!(
            ImageFormat::from_content_type("image/jpeg"),
            Some(ImageFormat::Jpeg)
        );
        assert_eq!(
            ImageFormat::from_content_type("image/PNG; charset=binary"),
            Some(ImageFormat::Png)
        );
        assert_eq!(
            ImageFormat::from_content_type("image/webp"),
            Some(ImageFormat::Webp)
        );
        assert_eq!(ImageFormat::from_content_type("text/html"), None);
    }

    #[test]
    fn test_extension_mapping() {
        assert_eq!(ImageFormat::Jpeg.extension(), "jpg");
        assert_eq!(ImageFormat::Png.extension(), "png");
        assert_eq!(ImageFormat::Gif.extension(), "gif");
        assert_eq!(ImageFormat::Webp.extension(), "webp");
    }

    #[test]
    fn test_webp_is_not_embedded() {
        assert!(!ImageFormat::Webp.is_embeddable());
        assert!(ImageFormat::Png.is_embeddable());
    }

    #[test]
    fn test_artwork_sniffs_when_content_type_is_generic() {
        let artwork = Artwork::new(PNG_MAGIC.to_vec(), Some("application/octet-stream"));
        assert_eq!(artwork.format, ImageFormat::Png);
        assert_eq!(artwork.cover_file_name(), "cover.png");

        let artwork = Artwork::new(JPEG_MAGIC.to_vec(), None);
        assert_eq!(artwork.format, ImageFormat::Jpeg);
    }

    #[test]
    fn test_artwork_defaults_to_jpeg() {
        let artwork = Artwork::new(vec![1, 2, 3], None);
        assert_eq!(artwork.format, ImageFormat::Jpeg);
        assert_eq!(artwork.cover_file_name(), "cover.jpg");
    }
}
