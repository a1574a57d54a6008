//! File-type allow-list shared by every upload and every extracted bundle member.

use std::path::{Component, Path};

/// Suffixes accepted anywhere in a request, compared case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowedExtension {
    Zip,
    Htm,
    Html,
    Css,
    Png,
    Jpg,
    Jpeg,
    Gif,
    Json,
}

impl AllowedExtension {
    pub const ALL: [AllowedExtension; 9] = [
        AllowedExtension::Zip,
        AllowedExtension::Htm,
        AllowedExtension::Html,
        AllowedExtension::Css,
        AllowedExtension::Png,
        AllowedExtension::Jpg,
        AllowedExtension::Jpeg,
        AllowedExtension::Gif,
        AllowedExtension::Json,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AllowedExtension::Zip => "zip",
            AllowedExtension::Htm => "htm",
            AllowedExtension::Html => "html",
            AllowedExtension::Css => "css",
            AllowedExtension::Png => "png",
            AllowedExtension::Jpg => "jpg",
            AllowedExtension::Jpeg => "jpeg",
            AllowedExtension::Gif => "gif",
            AllowedExtension::Json => "json",
        }
    }

    /// Match a bare suffix (no leading dot) against the allow-list.
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        let lowered = suffix.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == lowered)
    }

    /// Markup types that may serve as a bundle's entry document.
    pub fn is_markup(self) -> bool {
        matches!(self, AllowedExtension::Htm | AllowedExtension::Html)
    }
}

/// Classify a filename by the text after its last `.`.
///
/// Names without a `.` never classify.
pub fn classify(filename: &str) -> Option<AllowedExtension> {
    let (_, suffix) = filename.rsplit_once('.')?;
    AllowedExtension::from_suffix(suffix)
}

/// Returns `true` when the filename carries an allow-listed suffix.
pub fn is_allowed(filename: &str) -> bool {
    classify(filename).is_some()
}

/// Hidden files and archiver bookkeeping (`.DS_Store`, `__MACOSX/...`).
///
/// Any component of the relative path qualifies the whole path.
pub fn is_hidden_artifact(relative: &Path) -> bool {
    relative.components().any(|component| match component {
        Component::Normal(name) => {
            let name = name.to_string_lossy();
            name.starts_with('.') || name == "__MACOSX"
        }
        _ => false,
    })
}
