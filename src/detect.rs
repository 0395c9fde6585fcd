use serde::Serialize;
use std::fmt;

/// Magic marker at both ends of a parquet file.
pub const COLUMNAR_MAGIC: &[u8; 4] = b"PAR1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    Spreadsheet,
    DelimitedText,
    ColumnarBinary,
    Unknown,
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PayloadKind::Spreadsheet => "spreadsheet",
            PayloadKind::DelimitedText => "delimited-text",
            PayloadKind::ColumnarBinary => "columnar-binary",
            PayloadKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Classify a payload from its content type, its name and its leading/trailing bytes.
///
/// Rules are checked in order and the first match wins: spreadsheet hint or
/// extension, then the columnar magic marker, then delimited-text hint or
/// extension.
pub fn classify(content_type: &str, name: &str, bytes: &[u8]) -> PayloadKind {
    let content_type = content_type.to_ascii_lowercase();
    let name = strip_query(name).to_ascii_lowercase();

    if content_type.contains("excel") || has_extension(&name, &[".xlsx", ".xls"]) {
        return PayloadKind::Spreadsheet;
    }
    if is_columnar_binary(bytes) {
        return PayloadKind::ColumnarBinary;
    }
    if content_type.contains("csv")
        || content_type.contains("text")
        || has_extension(&name, &[".csv", ".txt", ".tsv"])
    {
        return PayloadKind::DelimitedText;
    }
    PayloadKind::Unknown
}

pub fn is_columnar_binary(bytes: &[u8]) -> bool {
    bytes.len() >= COLUMNAR_MAGIC.len()
        && (bytes.starts_with(COLUMNAR_MAGIC) || bytes.ends_with(COLUMNAR_MAGIC))
}

/// Lower-case a `Content-Type` value and drop its parameters.
pub fn normalize_media_type(raw: &str) -> String {
    raw.split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn strip_query(name: &str) -> &str {
    let end = name.find(['?', '#']).unwrap_or(name.len());
    &name[..end]
}

fn has_extension(name: &str, extensions: &[&str]) -> bool {
    extensions.iter().any(|ext| name.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excel_hint_wins_over_everything() {
        let kind = classify(
            "application/vnd.ms-excel",
            "https://example.org/data.csv",
            b"PAR1....PAR1",
        );
        assert_eq!(kind, PayloadKind::Spreadsheet);
    }

    #[test]
    fn spreadsheet_extension_is_case_insensitive_and_ignores_query() {
        let kind = classify("", "https://example.org/FX.XLSX?download=1", b"");
        assert_eq!(kind, PayloadKind::Spreadsheet);
    }

    #[test]
    fn columnar_marker_beats_text_hint() {
        let mut payload = b"PAR1".to_vec();
        payload.extend_from_slice(&[0, 1, 2, 3]);
        payload.extend_from_slice(b"PAR1");
        assert_eq!(
            classify("text/csv", "https://example.org/data.csv", &payload),
            PayloadKind::ColumnarBinary
        );
        assert_eq!(classify("", "blob", b"xxxxPAR1"), PayloadKind::ColumnarBinary);
    }

    #[test]
    fn text_hints_and_extensions_are_delimited() {
        assert_eq!(classify("text/plain", "blob", b"a,b"), PayloadKind::DelimitedText);
        assert_eq!(
            classify("application/octet-stream", "rates.tsv", b"a\tb"),
            PayloadKind::DelimitedText
        );
        assert_eq!(
            classify("", "https://example.org/readme.txt#top", b"hello"),
            PayloadKind::DelimitedText
        );
    }

    #[test]
    fn unmatched_payload_is_unknown() {
        assert_eq!(
            classify("application/octet-stream", "https://example.org/blob", b"\x00\x01"),
            PayloadKind::Unknown
        );
        assert_eq!(classify("", "", b"PAR"), PayloadKind::Unknown);
    }

    #[test]
    fn media_type_is_lowercased_without_parameters() {
        assert_eq!(normalize_media_type("Text/CSV; charset=UTF-8"), "text/csv");
        assert_eq!(normalize_media_type("  application/json "), "application/json");
        assert_eq!(normalize_media_type(""), "");
    }
}
