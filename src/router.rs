//! Chooses between a text-only and an image-augmented request.
//!
//! The rule is a keyword heuristic: when at least one image is uploaded and
//! the query mentions "image", the most recently uploaded image is attached.
//! There is no way to target an earlier image.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::ConversionError;
use crate::models::UploadedFile;

const IMAGE_KEYWORD: &str = "image";

#[derive(Debug, Clone)]
pub enum RouteDecision {
    TextQuery,
    ImageQuery(UploadedFile),
}

pub fn route(query: &str, files: &[UploadedFile]) -> RouteDecision {
    if !query.to_lowercase().contains(IMAGE_KEYWORD) {
        return RouteDecision::TextQuery;
    }
    match files.iter().rev().find(|f| f.is_image_candidate()) {
        Some(image) => RouteDecision::ImageQuery(image.clone()),
        None => RouteDecision::TextQuery,
    }
}

/// Base64 payload for the selected image.
///
/// Only files whose declared type is an image convert; a file that was
/// selected on its name alone is rejected here.
pub fn encode_image(file: &UploadedFile) -> Result<String, ConversionError> {
    if !file.declares_image() {
        return Err(ConversionError::NotAnImage {
            name: file.name.clone(),
        });
    }
    Ok(STANDARD.encode(file.bytes()))
}

/// `data:` URL in the form the gateway expects.
pub fn image_data_url(payload: &str) -> String {
    format!("data:image/jpeg;base64,{}", payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MIME_TEXT;

    fn is_image(decision: RouteDecision) -> bool {
        matches!(decision, RouteDecision::ImageQuery(_))
    }

    fn photo(name: &str) -> UploadedFile {
        UploadedFile::new(name, "image/jpeg", vec![0xff, 0xd8, 0xff, 0xe0])
    }

    #[test]
    fn keyword_with_image_routes_to_image() {
        let files = vec![photo("photo.jpg")];
        match route("describe this image", &files) {
            RouteDecision::ImageQuery(f) => assert_eq!(f.name, "photo.jpg"),
            other => panic!("expected image route, got {:?}", other),
        }
    }

    #[test]
    fn no_keyword_routes_to_text() {
        let files = vec![photo("photo.jpg")];
        assert!(!is_image(route("what is 2+2", &files)));
    }

    #[test]
    fn keyword_without_images_routes_to_text() {
        let files = vec![UploadedFile::new("notes.txt", MIME_TEXT, b"hi".to_vec())];
        assert!(!is_image(route("is there an image here?", &files)));
    }

    #[test]
    fn keyword_match_is_case_insensitive_substring() {
        let files = vec![photo("photo.jpg")];
        assert!(is_image(route("IMAGES please", &files)));
        assert!(is_image(route("Imagine this Image", &files)));
    }

    #[test]
    fn selects_most_recent_image() {
        let files = vec![
            photo("first.jpg"),
            UploadedFile::new("notes.txt", MIME_TEXT, b"x".to_vec()),
            photo("second.png"),
            UploadedFile::new("later.txt", MIME_TEXT, b"y".to_vec()),
        ];
        match route("what is in the image", &files) {
            RouteDecision::ImageQuery(f) => assert_eq!(f.name, "second.png"),
            other => panic!("expected image route, got {:?}", other),
        }
    }

    #[test]
    fn encodes_declared_images() {
        let payload = encode_image(&UploadedFile::new("a.png", "image/png", b"abc".to_vec()))
            .unwrap();
        assert_eq!(payload, "YWJj");
        assert_eq!(image_data_url(&payload), "data:image/jpeg;base64,YWJj");
    }

    #[test]
    fn name_only_image_fails_conversion() {
        let file = UploadedFile::new("photo.jpg", "", b"abc".to_vec());
        assert!(matches!(
            encode_image(&file),
            Err(ConversionError::NotAnImage { .. })
        ));
    }

    #[test]
    fn empty_image_encodes_to_empty_payload() {
        let file = UploadedFile::new("blank.png", "image/png", Vec::new());
        let payload = encode_image(&file).unwrap();
        assert_eq!(payload, "");
        assert_eq!(image_data_url(&payload), "data:image/jpeg;base64,");
    }
}
