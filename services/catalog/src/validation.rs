//! Pure validation and transform steps applied to every catalog write.
//!
//! Nothing here touches a store, so a write can be fully validated before
//! its first irreversible step.

use crate::config::CatalogLimits;
use crate::error::ValidationError;
use image::ImageFormat;
use regex::Regex;
use std::io::Cursor;
use std::sync::LazyLock;
use tracing::debug;

/// Separator used when creator names are stored as a single column
pub const CREATOR_DELIMITER: char = ';';

const VIDEO_CONTENT_TYPE: &str = "video/mp4";
const VIDEO_EXTENSION: &str = ".mp4";

/// Latin or Arabic letters and spaces
static CREATOR_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z\x{0600}-\x{06FF} ]+$").expect("valid regex"));

/// An uploaded file as received from the caller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaUpload {
    pub bytes: Vec<u8>,
    /// Content type the client claimed
    pub content_type: Option<String>,
    /// File name the client claimed
    pub filename: Option<String>,
}

impl MediaUpload {
    pub fn new(
        bytes: impl Into<Vec<u8>>,
        content_type: Option<&str>,
        filename: Option<&str>,
    ) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.map(str::to_string),
            filename: filename.map(str::to_string),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Zero-length uploads mean "no file chosen"
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn describe(&self) -> String {
        self.filename
            .as_deref()
            .or(self.content_type.as_deref())
            .unwrap_or("unnamed upload")
            .to_string()
    }
}

/// Drop uploads that carry no bytes
pub fn non_empty(upload: Option<MediaUpload>) -> Option<MediaUpload> {
    upload.filter(|u| !u.is_empty())
}

/// Split, trim and check a delimited list of creator names.
///
/// One bad name rejects the whole list and is named in the error.
pub fn parse_creators(raw: &str) -> Result<Vec<String>, ValidationError> {
    let names: Vec<String> = raw
        .split(CREATOR_DELIMITER)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect();

    if names.is_empty() {
        return Err(ValidationError::NoCreators);
    }

    if let Some(bad) = names.iter().find(|name| !CREATOR_NAME_RE.is_match(name)) {
        return Err(ValidationError::InvalidCreatorName(bad.clone()));
    }

    Ok(names)
}

/// Storage form of a creator list
pub fn join_creators(names: &[String]) -> String {
    names.join(&CREATOR_DELIMITER.to_string())
}

pub fn validate_year(year: i32, limits: &CatalogLimits) -> Result<i32, ValidationError> {
    if year < limits.start_year || year > limits.current_year {
        return Err(ValidationError::InvalidYear {
            year,
            min: limits.start_year,
            max: limits.current_year,
        });
    }
    Ok(year)
}

pub fn validate_title(title: &str) -> Result<String, ValidationError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    Ok(title.to_string())
}

pub fn normalize_link(link: Option<&str>) -> Option<String> {
    link.map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
}

pub fn validate_rating(stars: i32) -> Result<i16, ValidationError> {
    if !(1..=5).contains(&stars) {
        return Err(ValidationError::InvalidRating(stars));
    }
    Ok(stars as i16)
}

/// Check the cover ceiling and re-encode to PNG.
///
/// Re-encoding normalizes whatever raster format was uploaded and drops any
/// embedded metadata. The returned bytes are what gets stored.
pub fn prepare_cover(upload: &MediaUpload, limits: &CatalogLimits) -> Result<Vec<u8>, ValidationError> {
    if upload.len() > limits.max_cover_bytes {
        return Err(ValidationError::CoverTooLarge {
            size: upload.len(),
            limit: limits.max_cover_bytes,
        });
    }

    let decoded = image::load_from_memory(&upload.bytes)
        .map_err(|e| ValidationError::UnprocessableImage(e.to_string()))?;

    let mut out = Cursor::new(Vec::new());
    decoded
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|e| ValidationError::UnprocessableImage(e.to_string()))?;

    let png = out.into_inner();
    debug!(
        input_bytes = upload.len(),
        output_bytes = png.len(),
        width = decoded.width(),
        height = decoded.height(),
        "Cover re-encoded to PNG"
    );

    Ok(png)
}

/// Check the video ceiling and container.
///
/// Either the declared file name or the declared content type must say MP4.
pub fn validate_video(upload: &MediaUpload, limits: &CatalogLimits) -> Result<(), ValidationError> {
    if upload.len() > limits.max_video_bytes {
        return Err(ValidationError::VideoTooLarge {
            size: upload.len(),
            limit: limits.max_video_bytes,
        });
    }

    let named_mp4 = upload
        .filename
        .as_deref()
        .is_some_and(|name| name.to_ascii_lowercase().ends_with(VIDEO_EXTENSION));
    let typed_mp4 = upload
        .content_type
        .as_deref()
        .is_some_and(|ct| ct.eq_ignore_ascii_case(VIDEO_CONTENT_TYPE));

    if !named_mp4 && !typed_mp4 {
        return Err(ValidationError::UnsupportedVideoFormat(upload.describe()));
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    pub(crate) fn limits() -> CatalogLimits {
        CatalogLimits::new(2024, 2026)
    }

    pub(crate) fn jpeg_upload() -> MediaUpload {
        let img = RgbImage::from_pixel(8, 6, Rgb([200, 40, 90]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Jpeg).unwrap();
        MediaUpload::new(out.into_inner(), Some("image/jpeg"), Some("cover.jpg"))
    }

    pub(crate) fn mp4_upload() -> MediaUpload {
        MediaUpload::new(vec![0u8; 64], Some("video/mp4"), Some("demo.mp4"))
    }

    #[test]
    fn test_parse_creators_accepts_latin_and_arabic() {
        let names = parse_creators("Ali; Sara ;علي حسن;").unwrap();
        assert_eq!(names, vec!["Ali", "Sara", "علي حسن"]);
        assert_eq!(join_creators(&names), "Ali;Sara;علي حسن");
    }

    #[test]
    fn test_parse_creators_names_offending_entry() {
        let err = parse_creators("Ali;Sara2;Omar").unwrap_err();
        assert_eq!(err, ValidationError::InvalidCreatorName("Sara2".to_string()));

        let err = parse_creators("Ali;<script>").unwrap_err();
        assert_eq!(err, ValidationError::InvalidCreatorName("<script>".to_string()));
    }

    #[test]
    fn test_parse_creators_rejects_empty_list() {
        assert_eq!(parse_creators(" ; ;").unwrap_err(), ValidationError::NoCreators);
        assert_eq!(parse_creators("").unwrap_err(), ValidationError::NoCreators);
    }

    #[test]
    fn test_year_bounds_are_inclusive() {
        let limits = limits();
        assert_eq!(validate_year(2024, &limits), Ok(2024));
        assert_eq!(validate_year(2026, &limits), Ok(2026));
        assert!(validate_year(2027, &limits).is_err());
        assert!(validate_year(2023, &limits).is_err());
    }

    #[test]
    fn test_title_and_link_are_trimmed() {
        assert_eq!(validate_title("  Solar Car "), Ok("Solar Car".to_string()));
        assert_eq!(validate_title("   "), Err(ValidationError::EmptyTitle));
        assert_eq!(normalize_link(Some("  ")), None);
        assert_eq!(
            normalize_link(Some(" https://example.org ")),
            Some("https://example.org".to_string())
        );
    }

    #[test]
    fn test_rating_range() {
        assert_eq!(validate_rating(1), Ok(1));
        assert_eq!(validate_rating(5), Ok(5));
        assert_eq!(validate_rating(0), Err(ValidationError::InvalidRating(0)));
        assert_eq!(validate_rating(6), Err(ValidationError::InvalidRating(6)));
    }

    #[test]
    fn test_cover_is_reencoded_to_png() {
        let png = prepare_cover(&jpeg_upload(), &limits()).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
        let decoded = image::load_from_memory_with_format(&png, ImageFormat::Png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 6));
    }

    #[test]
    fn test_oversized_cover_rejected_before_decoding() {
        let upload = MediaUpload::new(vec![0u8; 4 * 1024 * 1024], Some("image/png"), None);
        let err = prepare_cover(&upload, &limits()).unwrap_err();
        assert!(matches!(err, ValidationError::CoverTooLarge { limit, .. } if limit == 3 * 1024 * 1024));
    }

    #[test]
    fn test_garbage_cover_is_unprocessable() {
        let upload = MediaUpload::new(b"definitely not an image".to_vec(), Some("image/png"), None);
        assert!(matches!(
            prepare_cover(&upload, &limits()),
            Err(ValidationError::UnprocessableImage(_))
        ));
    }

    #[test]
    fn test_video_accepts_mp4_by_name_or_type() {
        let limits = limits();
        assert!(validate_video(&mp4_upload(), &limits).is_ok());
        let by_name = MediaUpload::new(vec![1u8; 4], Some("application/octet-stream"), Some("DEMO.MP4"));
        assert!(validate_video(&by_name, &limits).is_ok());
        let by_type = MediaUpload::new(vec![1u8; 4], Some("video/mp4"), Some("clip"));
        assert!(validate_video(&by_type, &limits).is_ok());
    }

    #[test]
    fn test_video_rejects_other_containers() {
        let upload = MediaUpload::new(vec![1u8; 4], Some("video/quicktime"), Some("clip.mov"));
        assert_eq!(
            validate_video(&upload, &limits()),
            Err(ValidationError::UnsupportedVideoFormat("clip.mov".to_string()))
        );
    }

    #[test]
    fn test_video_ceiling_comes_from_limits() {
        let mut limits = limits();
        limits.max_video_bytes = 16;
        let upload = MediaUpload::new(vec![0u8; 17], Some("video/mp4"), Some("a.mp4"));
        assert_eq!(
            validate_video(&upload, &limits),
            Err(ValidationError::VideoTooLarge { size: 17, limit: 16 })
        );
    }

    #[test]
    fn test_empty_uploads_are_dropped() {
        assert_eq!(non_empty(Some(MediaUpload::default())), None);
        assert!(non_empty(Some(mp4_upload())).is_some());
    }
}
