//! Minimal CSV reading and writing.
//!
//! Index files are two columns, comma-delimited, no header, CRLF line
//! endings. Import files are full CSV with a header row, a configurable
//! delimiter and quoted fields that may span lines.

use std::borrow::Cow;

/// Quote a field when it contains the delimiter, a quote or a line break.
#[must_use]
pub fn escape(field: &str, delimiter: char) -> Cow<'_, str> {
    if field.contains(delimiter)
        || field.contains('"')
        || field.contains('\r')
        || field.contains('\n')
    {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

/// Render one two-column index row, CRLF-terminated.
#[must_use]
pub fn format_row(key: &str, value: &str) -> String {
    format!("{},{}\r\n", escape(key, ','), escape(value, ','))
}

/// Parse one index row. Returns `None` unless the line has exactly two
/// columns.
#[must_use]
pub fn parse_row(line: &str) -> Option<(String, String)> {
    let mut fields = split_fields(line.trim_end_matches(['\r', '\n']), ',');
    match (fields.pop(), fields.pop(), fields.pop()) {
        (Some(value), Some(key), None) => Some((key, value)),
        _ => None,
    }
}

fn split_fields(line: &str, delimiter: char) -> Vec<String> {
    let mut records = parse_records(line, delimiter);
    match records.pop() {
        Some(fields) if records.is_empty() => fields,
        // A quoted field spanned lines; callers feeding single lines treat
        // that as malformed.
        _ => Vec::new(),
    }
}

/// Parse a full CSV body into records of fields.
///
/// Handles quoted fields (with `""` escaping) that may contain the
/// delimiter and line breaks. Empty lines between records are skipped; a
/// trailing newline does not produce an empty record.
#[must_use]
pub fn parse_records(text: &str, delimiter: char) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut field_started = false;

    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if in_quotes {
            if ch == '"' {
                if chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(ch);
            }
            continue;
        }
        match ch {
            '"' if field.is_empty() && !field_started => {
                in_quotes = true;
                field_started = true;
            }
            c if c == delimiter => {
                record.push(std::mem::take(&mut field));
                field_started = false;
            }
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                end_record(&mut records, &mut record, &mut field, &mut field_started);
            }
            '\n' => {
                end_record(&mut records, &mut record, &mut field, &mut field_started);
            }
            c => {
                field.push(c);
                field_started = true;
            }
        }
    }
    end_record(&mut records, &mut record, &mut field, &mut field_started);
    records
}

fn end_record(
    records: &mut Vec<Vec<String>>,
    record: &mut Vec<String>,
    field: &mut String,
    field_started: &mut bool,
) {
    if record.is_empty() && field.is_empty() && !*field_started {
        return; // blank line
    }
    record.push(std::mem::take(field));
    records.push(std::mem::take(record));
    *field_started = false;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_round_trip() {
        let row = format_row("alice", "a.json");
        assert_eq!(row, "alice,a.json\r\n");
        assert_eq!(parse_row(&row), Some(("alice".into(), "a.json".into())));
    }

    #[test]
    fn quoting_covers_delimiter_quote_and_newline() {
        let row = format_row("a,b", "say \"hi\"");
        assert_eq!(row, "\"a,b\",\"say \"\"hi\"\"\"\r\n");
        assert_eq!(
            parse_row(&row),
            Some(("a,b".into(), "say \"hi\"".into()))
        );
    }

    #[test]
    fn malformed_rows_are_rejected() {
        assert_eq!(parse_row("only-one-column"), None);
        assert_eq!(parse_row("a,b,c"), None);
    }

    #[test]
    fn records_with_embedded_newlines() {
        let text = "name,notes\r\nWidget,\"line one\nline two\"\r\n\r\nGadget,plain\r\n";
        let records = parse_records(text, ',');
        assert_eq!(records.len(), 3);
        assert_eq!(records[1], vec!["Widget", "line one\nline two"]);
        assert_eq!(records[2], vec!["Gadget", "plain"]);
    }

    #[test]
    fn semicolon_delimiter() {
        let records = parse_records("a;b\n1;2", ';');
        assert_eq!(records, vec![vec!["a", "b"], vec!["1", "2"]]);
    }

    #[test]
    fn empty_trailing_field_is_kept() {
        let records = parse_records("a,\n", ',');
        assert_eq!(records, vec![vec!["a", ""]]);
    }
}
