//! Maps a MIME type onto the coarse file type stored with every asset.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

const DOCUMENT_MIME_TYPES: &[&str] = &[
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
];

const PRESENTATION_MIME_TYPES: &[&str] = &[
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Image,
    Video,
    Pdf,
    Document,
    Presentation,
    Other,
}

impl FileType {
    pub const ALL: [FileType; 6] = [
        FileType::Image,
        FileType::Video,
        FileType::Pdf,
        FileType::Document,
        FileType::Presentation,
        FileType::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FileType::Image => "image",
            FileType::Video => "video",
            FileType::Pdf => "pdf",
            FileType::Document => "document",
            FileType::Presentation => "presentation",
            FileType::Other => "other",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        FileType::ALL
            .into_iter()
            .find(|file_type| file_type.as_str() == value)
            .ok_or_else(|| format!("unknown file type '{value}'"))
    }
}

/// Classifies a MIME type. Total: anything unrecognised is `Other`.
pub fn classify(mime_type: &str) -> FileType {
    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if essence.starts_with("image/") {
        FileType::Image
    } else if essence.starts_with("video/") {
        FileType::Video
    } else if essence == "application/pdf" {
        FileType::Pdf
    } else if DOCUMENT_MIME_TYPES.contains(&essence.as_str()) {
        FileType::Document
    } else if PRESENTATION_MIME_TYPES.contains(&essence.as_str()) {
        FileType::Presentation
    } else {
        FileType::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_rules_win_first() {
        assert_eq!(classify("image/png"), FileType::Image);
        assert_eq!(classify("image/svg+xml"), FileType::Image);
        assert_eq!(classify("video/quicktime"), FileType::Video);
    }

    #[test]
    fn exact_matches() {
        assert_eq!(classify("application/pdf"), FileType::Pdf);
        assert_eq!(classify("application/msword"), FileType::Document);
        assert_eq!(
            classify("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
            FileType::Document
        );
        assert_eq!(classify("application/vnd.ms-powerpoint"), FileType::Presentation);
        assert_eq!(
            classify("application/vnd.openxmlformats-officedocument.presentationml.presentation"),
            FileType::Presentation
        );
    }

    #[test]
    fn parameters_and_case_are_ignored() {
        assert_eq!(classify("Application/PDF; charset=binary"), FileType::Pdf);
        assert_eq!(classify(" IMAGE/JPEG "), FileType::Image);
    }

    #[test]
    fn unknown_types_fall_through_to_other() {
        for mime in ["", "text/plain", "application/zip", "audio/mpeg", "application/pdfx", "imagepng"] {
            assert_eq!(classify(mime), FileType::Other, "{mime}");
        }
    }

    #[test]
    fn classification_is_deterministic() {
        for mime in ["image/gif", "application/vnd.ms-excel", "application/octet-stream"] {
            assert_eq!(classify(mime), classify(mime));
        }
    }

    #[test]
    fn file_type_round_trips_through_text() {
        for file_type in FileType::ALL {
            assert_eq!(file_type.as_str().parse::<FileType>(), Ok(file_type));
        }
        assert!("audio".parse::<FileType>().is_err());
    }
}
