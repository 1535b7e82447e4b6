//! Markup stripping for field values

use scraper::Html;

/// Plain display text of `fields[index]`
///
/// Out-of-range indices yield an empty string. Text nodes are joined with a
/// space so adjacent words never run together, entities are decoded by the
/// parser, and whitespace is collapsed and trimmed.
pub fn clean_field<S: AsRef<str>>(fields: &[S], index: usize) -> String {
    fields
        .get(index)
        .map(|raw| clean_text(raw.as_ref()))
        .unwrap_or_default()
}

/// Strip markup from a single raw value
pub fn clean_text(raw: &str) -> String {
    if raw.trim().is_empty() {
        return String::new();
    }

    let fragment = Html::parse_fragment(raw);
    let joined = fragment.root_element().text().collect::<Vec<_>>().join(" ");
    joined.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decode character references in a bare value such as a media file name
pub(crate) fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    Html::parse_fragment(text).root_element().text().collect()
}
