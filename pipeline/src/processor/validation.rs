use csv::{Position, ReaderBuilder, StringRecord};
use std::collections::HashSet;
use thiserror::Error;

const UTF8_BOM: &str = "\u{feff}";

/// Why a file was rejected. Always terminal: the file goes to quarantine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("file is empty")]
    Empty,

    #[error("file is {size} bytes, limit is {max}")]
    TooLarge { size: u64, max: u64 },

    #[error("file is not valid UTF-8 (first invalid byte at offset {0})")]
    NotUtf8(usize),

    #[error("header column {0} has no name")]
    EmptyColumnName(usize),

    #[error("duplicate column '{0}' in header")]
    DuplicateColumn(String),

    #[error("required column '{0}' is missing")]
    MissingColumn(String),

    #[error("file has a header but no data rows")]
    NoDataRows,

    #[error("line {line}: expected {expected} fields, found {found}")]
    FieldCountMismatch {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("line {line}: quoted field is never closed")]
    UnterminatedQuote { line: usize },

    #[error("line {line}: text follows a closing quote")]
    TextAfterClosingQuote { line: usize },

    #[error("line {line}: quote inside an unquoted field")]
    StrayQuote { line: usize },

    #[error("line {line}: {reason}")]
    Unreadable { line: usize, reason: String },
}

#[derive(Debug, Clone)]
pub struct ValidationRules {
    pub max_file_size: u64,
    pub required_columns: Vec<String>,
}

/// Fields extracted from a valid file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPayload {
    pub columns: Vec<String>,
    pub row_count: u64,
}

pub struct RecordValidator {
    rules: ValidationRules,
}

impl RecordValidator {
    pub fn new(rules: ValidationRules) -> Self {
        Self { rules }
    }

    /// Checks `data` against the record schema: a UTF-8 CSV document with a
    /// header row and at least one data row of matching width.
    pub fn validate(&self, data: &[u8]) -> Result<ParsedPayload, ValidationError> {
        if data.is_empty() {
            return Err(ValidationError::Empty);
        }

        let size = data.len() as u64;
        if size > self.rules.max_file_size {
            return Err(ValidationError::TooLarge {
                size,
                max: self.rules.max_file_size,
            });
        }

        let text = std::str::from_utf8(data).map_err(|e| ValidationError::NotUtf8(e.valid_up_to()))?;
        let text = text.strip_prefix(UTF8_BOM).unwrap_or(text);

        check_quoting(text)?;

        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());
        let mut records = reader.records();

        let header = match records.next() {
            Some(record) => record.map_err(|e| unreadable(text, e))?,
            None => return Err(ValidationError::Empty),
        };
        let columns = self.validate_header(&header)?;

        let mut row_count = 0u64;
        for record in records {
            let record = record.map_err(|e| unreadable(text, e))?;
            if record.len() != columns.len() {
                return Err(ValidationError::FieldCountMismatch {
                    line: record.position().map_or(0, |pos| line_at(text, pos)),
                    expected: columns.len(),
                    found: record.len(),
                });
            }
            row_count += 1;
        }

        if row_count == 0 {
            return Err(ValidationError::NoDataRows);
        }

        Ok(ParsedPayload { columns, row_count })
    }

    fn validate_header(&self, header: &StringRecord) -> Result<Vec<String>, ValidationError> {
        let columns: Vec<String> = header.iter().map(|f| f.trim().to_string()).collect();

        let mut seen = HashSet::new();
        for (index, column) in columns.iter().enumerate() {
            if column.is_empty() {
                return Err(ValidationError::EmptyColumnName(index + 1));
            }
            if !seen.insert(column.as_str()) {
                return Err(ValidationError::DuplicateColumn(column.clone()));
            }
        }

        for required in &self.rules.required_columns {
            if !seen.contains(required.as_str()) {
                return Err(ValidationError::MissingColumn(required.clone()));
            }
        }

        Ok(columns)
    }
}

/// Rejects quoting the reader would otherwise repair: a quoted field that
/// never closes, text after a closing quote, and a quote inside an
/// unquoted field.
fn check_quoting(text: &str) -> Result<(), ValidationError> {
    let bytes = text.as_bytes();
    let mut line = 1;
    let mut field_start = true;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'"' if field_start => {
                let opened_on = line;
                i += 1;
                loop {
                    match bytes.get(i) {
                        None => return Err(ValidationError::UnterminatedQuote { line: opened_on }),
                        Some(b'"') if bytes.get(i + 1) == Some(&b'"') => i += 2,
                        Some(b'"') => {
                            i += 1;
                            break;
                        }
                        Some(b'\n') => {
                            line += 1;
                            i += 1;
                        }
                        Some(_) => i += 1,
                    }
                }
                if !matches!(bytes.get(i), None | Some(b',' | b'\r' | b'\n')) {
                    return Err(ValidationError::TextAfterClosingQuote { line });
                }
                field_start = false;
                continue;
            }
            b'"' => return Err(ValidationError::StrayQuote { line }),
            b',' | b'\r' => field_start = true,
            b'\n' => {
                line += 1;
                field_start = true;
            }
            _ => field_start = false,
        }
        i += 1;
    }

    Ok(())
}

/// Line a record starts on. The reader reports the position where it began
/// looking, which may precede skipped blank lines.
fn line_at(text: &str, pos: &Position) -> usize {
    let skipped = text
        .as_bytes()
        .get(pos.byte() as usize..)
        .unwrap_or_default()
        .iter()
        .take_while(|b| matches!(b, b'\r' | b'\n'))
        .filter(|b| **b == b'\n')
        .count();
    pos.line() as usize + skipped
}

fn unreadable(text: &str, err: csv::Error) -> ValidationError {
    ValidationError::Unreadable {
        line: err.position().map_or(0, |pos| line_at(text, pos)),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> RecordValidator {
        RecordValidator::new(ValidationRules {
            max_file_size: 1024 * 1024,
            required_columns: Vec::new(),
        })
    }

    #[test]
    fn test_valid_csv() {
        let payload = validator()
            .validate(b"id,name,amount\n1,widget,9.99\n2,gadget,19.50\n")
            .unwrap();

        assert_eq!(payload.columns, vec!["id", "name", "amount"]);
        assert_eq!(payload.row_count, 2);
    }

    #[test]
    fn test_crlf_bom_and_missing_trailing_newline() {
        let payload = validator()
            .validate("\u{feff}id,name\r\n1,a\r\n2,b".as_bytes())
            .unwrap();

        assert_eq!(payload.columns, vec!["id", "name"]);
        assert_eq!(payload.row_count, 2);
    }

    #[test]
    fn test_quoted_fields() {
        let data = b"id,comment\n1,\"hello, world\"\n2,\"multi\nline \"\"quoted\"\"\"\n3,plain\n";
        let payload = validator().validate(data).unwrap();
        assert_eq!(payload.row_count, 3);
    }

    #[test]
    fn test_blank_lines_ignored() {
        let payload = validator().validate(b"id,name\n\n1,a\n\n").unwrap();
        assert_eq!(payload.row_count, 1);
    }

    #[test]
    fn test_empty_file() {
        assert_eq!(validator().validate(b""), Err(ValidationError::Empty));
        assert_eq!(validator().validate(b"\n\n"), Err(ValidationError::Empty));
    }

    #[test]
    fn test_header_only() {
        assert_eq!(
            validator().validate(b"id,name,amount\n"),
            Err(ValidationError::NoDataRows)
        );
    }

    #[test]
    fn test_truncated_row() {
        assert_eq!(
            validator().validate(b"id,name,amount\n1,widget,9.99\n2,gad"),
            Err(ValidationError::FieldCountMismatch {
                line: 3,
                expected: 3,
                found: 2
            })
        );
    }

    #[test]
    fn test_truncated_inside_quotes() {
        assert_eq!(
            validator().validate(b"id,comment\n1,\"never clo"),
            Err(ValidationError::UnterminatedQuote { line: 2 })
        );
    }

    #[test]
    fn test_line_numbers_follow_quoted_newlines() {
        let data = b"id,comment\n1,\"a\nb\"\n2\n";
        assert_eq!(
            validator().validate(data),
            Err(ValidationError::FieldCountMismatch {
                line: 4,
                expected: 2,
                found: 1
            })
        );
    }

    #[test]
    fn test_line_numbers_skip_blank_lines() {
        assert_eq!(
            validator().validate(b"id,name\n\n\r\n1\n"),
            Err(ValidationError::FieldCountMismatch {
                line: 4,
                expected: 2,
                found: 1
            })
        );
    }

    #[test]
    fn test_text_after_closing_quote() {
        assert_eq!(
            validator().validate(b"id,name\n1,\"a\"b\n"),
            Err(ValidationError::TextAfterClosingQuote { line: 2 })
        );
        assert_eq!(
            validator().validate(b"id,name\n1,\"a\n\"x,2\n"),
            Err(ValidationError::TextAfterClosingQuote { line: 3 })
        );
    }

    #[test]
    fn test_quote_inside_unquoted_field() {
        assert_eq!(
            validator().validate(b"id,name\n1,a\"b\n"),
            Err(ValidationError::StrayQuote { line: 2 })
        );
        assert_eq!(
            validator().validate(b"id,name\n1, \"a\"\n"),
            Err(ValidationError::StrayQuote { line: 2 })
        );
    }

    #[test]
    fn test_not_utf8() {
        let err = validator().validate(&[b'i', b'd', b'\n', 0xff, 0xfe]).unwrap_err();
        assert_eq!(err, ValidationError::NotUtf8(3));
    }

    #[test]
    fn test_header_rules() {
        assert_eq!(
            validator().validate(b"id,,amount\n1,2,3\n"),
            Err(ValidationError::EmptyColumnName(2))
        );
        assert_eq!(
            validator().validate(b"id,id\n1,2\n"),
            Err(ValidationError::DuplicateColumn("id".into()))
        );

        let strict = RecordValidator::new(ValidationRules {
            max_file_size: 1024,
            required_columns: vec!["amount".into()],
        });
        assert_eq!(
            strict.validate(b"id,name\n1,a\n"),
            Err(ValidationError::MissingColumn("amount".into()))
        );
    }

    #[test]
    fn test_size_limit() {
        let small = RecordValidator::new(ValidationRules {
            max_file_size: 8,
            required_columns: Vec::new(),
        });
        assert_eq!(
            small.validate(b"id,name\n1,a\n"),
            Err(ValidationError::TooLarge { size: 12, max: 8 })
        );
    }
}
