//! Loading files for the composer.
//!
//! Files become [`Attachment`]s carrying a `data:` URI of their bytes and,
//! for text-like formats, the decoded text.

use std::path::Path;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use quire_ai::types::Attachment;
use tracing::debug;
use uuid::Uuid;

pub const MAX_ATTACHMENT_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttachmentError {
    #[error("File {name} is too large (max 10MB)")]
    TooLarge { name: String, size: u64 },

    #[error("File {name} has an unsupported type")]
    Unsupported { name: String },

    #[error("Failed to read file {name}: {message}")]
    Io { name: String, message: String },
}

/// MIME type for a file name, by extension.
pub fn mime_for_name(name: &str) -> Option<&'static str> {
    let ext = Path::new(name).extension()?.to_str()?.to_lowercase();
    let mime = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "csv" => "text/csv",
        "txt" => "text/plain",
        "md" | "markdown" => "text/markdown",
        _ => return None,
    };
    Some(mime)
}

/// Text formats whose content is sent inline.
pub fn is_text_mime(mime: &str) -> bool {
    matches!(mime, "text/plain" | "text/csv" | "text/markdown")
}

/// What icon the attachment preview shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentIcon {
    Image,
    Pdf,
    Document,
    Spreadsheet,
    Other,
}

impl AttachmentIcon {
    pub fn for_mime(mime: &str) -> Self {
        if mime.starts_with("image/") {
            Self::Image
        } else if mime.contains("pdf") {
            Self::Pdf
        } else if mime.contains("csv") || mime.contains("spreadsheet") || mime.contains("excel") {
            Self::Spreadsheet
        } else if mime.contains("word") || mime.contains("doc") {
            Self::Document
        } else {
            Self::Other
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Pdf => "pdf",
            Self::Document => "document",
            Self::Spreadsheet => "spreadsheet",
            Self::Other => "file",
        }
    }
}

/// Build an attachment from in-memory bytes.
pub fn attachment_from_bytes(name: &str, bytes: &[u8]) -> Result<Attachment, AttachmentError> {
    let size = bytes.len() as u64;
    if size > MAX_ATTACHMENT_BYTES {
        return Err(AttachmentError::TooLarge {
            name: name.to_string(),
            size,
        });
    }
    let mime = mime_for_name(name).ok_or_else(|| AttachmentError::Unsupported {
        name: name.to_string(),
    })?;

    let text_content = if is_text_mime(mime) {
        Some(String::from_utf8_lossy(bytes).into_owned())
    } else {
        None
    };

    debug!("Loaded attachment {name} ({mime}, {size} bytes)");
    Ok(Attachment {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        mime_type: mime.to_string(),
        size,
        data_url: format!("data:{mime};base64,{}", STANDARD.encode(bytes)),
        text_content,
    })
}

/// Read a file from disk. The size is checked before the file is read.
pub fn load_attachment(path: &Path) -> Result<Attachment, AttachmentError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let io_err = |e: std::io::Error| AttachmentError::Io {
        name: name.clone(),
        message: e.to_string(),
    };

    let size = std::fs::metadata(path).map_err(io_err)?.len();
    if size > MAX_ATTACHMENT_BYTES {
        return Err(AttachmentError::TooLarge {
            name: name.clone(),
            size,
        });
    }
    let bytes = std::fs::read(path).map_err(io_err)?;
    attachment_from_bytes(&name, &bytes)
}

/// Human-readable size: `512 B`, `1.5 KB`, `2.0 MB`.
pub fn format_file_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    let b = bytes as f64;
    if b < KB {
        format!("{bytes} B")
    } else if b < MB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{:.1} MB", b / MB)
    }
}
