//! Attachment classification.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Kind of a message attachment.
///
/// The discriminants are stored as 3-bit indices in the packed stream, so
/// the set must stay at eight variants or fewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum AttachmentType {
    Image = 0,
    /// GIFs and other animated images.
    ImageAnimated = 1,
    Video = 2,
    Sticker = 3,
    Audio = 4,
    Document = 5,
    Other = 6,
}

const IMAGE_EXTS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp", "tiff", "tif", "svg", "ico", "psd", "heic"];
const ANIMATED_EXTS: &[&str] = &["gif", "gifv", "apng"];
const VIDEO_EXTS: &[&str] = &["mp4", "webm", "mkv", "flv", "mov", "avi", "wmv", "mpg", "mpeg"];
const AUDIO_EXTS: &[&str] = &["mp3", "ogg", "oga", "opus", "wav", "flac", "m4a"];
const DOCUMENT_EXTS: &[&str] = &[
    "doc", "docx", "odt", "pdf", "xls", "xlsx", "ods", "ppt", "pptx", "txt", "html", "rtf", "epub",
];

const DOCUMENT_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "application/epub",
    "application/epub+zip",
    "text/html",
    "application/rtf",
    "application/msword",
    "application/vnd.oasis.opendocument.spreadsheet",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "text/plain",
];

impl AttachmentType {
    /// All variants in index order.
    pub const ALL: [AttachmentType; 7] = [
        AttachmentType::Image,
        AttachmentType::ImageAnimated,
        AttachmentType::Video,
        AttachmentType::Sticker,
        AttachmentType::Audio,
        AttachmentType::Document,
        AttachmentType::Other,
    ];

    /// Guesses the type from the extension of `file_name`.
    pub fn from_file_name(file_name: &str) -> Self {
        let ext = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        let table = [
            (IMAGE_EXTS, AttachmentType::Image),
            (ANIMATED_EXTS, AttachmentType::ImageAnimated),
            (VIDEO_EXTS, AttachmentType::Video),
            (AUDIO_EXTS, AttachmentType::Audio),
            (DOCUMENT_EXTS, AttachmentType::Document),
        ];
        table
            .iter()
            .find(|(exts, _)| exts.contains(&ext.as_str()))
            .map_or(AttachmentType::Other, |&(_, kind)| kind)
    }

    /// Guesses the type from a MIME type.
    pub fn from_mime_type(mime_type: &str) -> Self {
        let mime_type = mime_type.to_lowercase();
        if mime_type.starts_with("image/gif") {
            AttachmentType::ImageAnimated
        } else if mime_type.starts_with("image/") {
            AttachmentType::Image
        } else if mime_type.starts_with("video/") {
            AttachmentType::Video
        } else if mime_type.starts_with("audio/") {
            AttachmentType::Audio
        } else if DOCUMENT_MIME_TYPES.contains(&mime_type.as_str()) {
            AttachmentType::Document
        } else {
            AttachmentType::Other
        }
    }

    /// Index used in packed attachment lists.
    pub fn index(self) -> u32 {
        self as u32
    }

    pub fn from_index(index: u32) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_file_name() {
        assert_eq!(AttachmentType::from_file_name("cat.PNG"), AttachmentType::Image);
        assert_eq!(AttachmentType::from_file_name("dance.gif"), AttachmentType::ImageAnimated);
        assert_eq!(AttachmentType::from_file_name("clip.final.mp4"), AttachmentType::Video);
        assert_eq!(AttachmentType::from_file_name("voice.ogg"), AttachmentType::Audio);
        assert_eq!(AttachmentType::from_file_name("cv.pdf"), AttachmentType::Document);
        assert_eq!(AttachmentType::from_file_name("archive.zip"), AttachmentType::Other);
        assert_eq!(AttachmentType::from_file_name("README"), AttachmentType::Other);
    }

    #[test]
    fn test_from_mime_type() {
        assert_eq!(AttachmentType::from_mime_type("image/gif"), AttachmentType::ImageAnimated);
        assert_eq!(AttachmentType::from_mime_type("IMAGE/jpeg"), AttachmentType::Image);
        assert_eq!(AttachmentType::from_mime_type("video/mp4"), AttachmentType::Video);
        assert_eq!(AttachmentType::from_mime_type("audio/ogg"), AttachmentType::Audio);
        assert_eq!(AttachmentType::from_mime_type("text/plain"), AttachmentType::Document);
        assert_eq!(AttachmentType::from_mime_type("application/zip"), AttachmentType::Other);
    }

    #[test]
    fn test_indices_fit_three_bits() {
        for (i, kind) in AttachmentType::ALL.iter().enumerate() {
            assert_eq!(kind.index() as usize, i);
            assert!(kind.index() < 8);
            assert_eq!(AttachmentType::from_index(kind.index()), Some(*kind));
        }
        assert_eq!(AttachmentType::from_index(7), None);
    }
}
