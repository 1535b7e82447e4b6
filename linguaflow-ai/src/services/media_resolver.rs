//! Media reference resolution and inlining
//!
//! Finds the first image and the first audio reference across a note's
//! fields, locates the file in the collection's media directory and returns
//! it as a `data:` URI. Every failure along the way (no reference, missing
//! directory, unknown file, unreadable file) degrades to `None`.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::text_sanitizer::decode_entities;

static IMAGE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<img[^>]+src\s*=\s*["']([^"'>]+)["']"#).expect("image pattern is valid")
});

static AUDIO_TAG_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<audio[^>]+src\s*=\s*["']([^"'>]+)["']"#).expect("audio pattern is valid")
});

static SOUND_DIRECTIVE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[sound:([^\]]+)\]").expect("sound pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Audio,
}

impl MediaKind {
    /// Reference patterns in priority order
    fn matchers(self) -> Vec<&'static Regex> {
        match self {
            MediaKind::Image => vec![&*IMAGE_REGEX],
            MediaKind::Audio => vec![&*AUDIO_TAG_REGEX, &*SOUND_DIRECTIVE_REGEX],
        }
    }
}

/// Inline the first resolvable media reference of `kind`
///
/// Fields are scanned in order; within a field each pattern is tried in
/// priority order. A reference whose file cannot be found or read is skipped
/// and the scan continues.
pub fn extract_first_media<S: AsRef<str>>(
    fields: &[S],
    media_dir: &Path,
    kind: MediaKind,
) -> Option<String> {
    if !media_dir.is_dir() {
        debug!(path = %media_dir.display(), "Media directory missing");
        return None;
    }

    for field in fields.iter().map(AsRef::as_ref).filter(|f| !f.is_empty()) {
        for matcher in kind.matchers() {
            for caps in matcher.captures_iter(field) {
                let filename = caps[1].trim();
                let Some(path) = resolve_media_path(media_dir, filename) else {
                    debug!(filename = %filename, kind = ?kind, "Referenced media not found");
                    continue;
                };

                match encode_media(&path) {
                    Ok(uri) => return Some(uri),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Failed to read media file");
                    }
                }
            }
        }
    }

    None
}

/// Locate `filename` inside `media_dir`
///
/// Tries the literal name, then its percent-decoded and entity-decoded forms,
/// first as a direct lookup and then as a case-insensitive scan of the
/// directory. Names containing path separators are never resolved.
pub fn resolve_media_path(media_dir: &Path, filename: &str) -> Option<PathBuf> {
    let candidates = candidate_names(filename);
    if candidates.is_empty() {
        return None;
    }

    for name in &candidates {
        let direct = media_dir.join(name);
        if direct.is_file() {
            return Some(direct);
        }
    }

    let lowered: Vec<String> = candidates.iter().map(|name| name.to_lowercase()).collect();
    WalkDir::new(media_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .find(|entry| {
            let name = entry.file_name().to_string_lossy().to_lowercase();
            lowered.contains(&name)
        })
        .map(|entry| entry.into_path())
}

fn candidate_names(filename: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::with_capacity(3);
    let forms = [
        Some(filename.to_string()),
        percent_decode(filename),
        Some(decode_entities(filename)),
    ];
    for name in forms.into_iter().flatten() {
        if is_plain_file_name(&name) && !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(&['/', '\\', '\0'][..])
}

/// `%XX` decoding; `None` when nothing changes or the result is not UTF-8
fn percent_decode(input: &str) -> Option<String> {
    urlencoding::decode(input)
        .ok()
        .map(Cow::into_owned)
        .filter(|decoded| decoded != input)
}

/// Read a file into a `data:<mime>;base64,<payload>` URI
pub fn encode_media(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(format!(
        "data:{};base64,{}",
        guess_mime_type(path),
        STANDARD.encode(bytes)
    ))
}

/// MIME type from the file extension
pub fn guess_mime_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        "ico" => "image/vnd.microsoft.icon",
        "tif" | "tiff" => "image/tiff",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" | "oga" | "opus" => "audio/ogg",
        "m4a" => "audio/mp4",
        "aac" => "audio/aac",
        "flac" => "audio/flac",
        "webm" => "audio/webm",
        "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}
