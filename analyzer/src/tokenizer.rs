//! # Table Tokenizer
//!
//! Splits one line of a box-drawn table into trimmed field strings. The
//! simulator renders its tables with prettytable, either with Unicode box
//! characters or with the ASCII `+---+` / `|` format, and interleaves them
//! with progress prints; everything that is not a data row is reported as a
//! [`SkipKind`] instead of fields.

use smallvec::SmallVec;

/// Field list for one row. Tables observed in practice have 5 to 7 columns.
pub type Fields = SmallVec<[String; 8]>;

/// Column separators
const SEPARATORS: [char; 2] = ['│', '|'];

/// Corner, junction and rule glyphs that make up decorative border lines
const BORDER_GLYPHS: [char; 17] = [
    '┌', '┐', '└', '┘', '├', '┤', '┬', '┴', '┼', '─', '═', '╞', '╡', '╪', '+', '-', '=',
];

/// Column titles that mark a header row. Matching is case-sensitive so that
/// data cells such as `Honest` or `8271(malicious)` are never mistaken for titles.
const HEADER_TITLES: [&str; 6] = ["Block", "Blob", "Proposer", "Votes", "block_number", "blob_id"];

/// Why a line produced no fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipKind {
    /// Empty or whitespace-only line
    Blank,
    /// Decorative border made only of box glyphs
    Border,
    /// Header row; carries the column titles for layout resolution
    Header(Fields),
    /// Text outside the table, such as `Block Number: 17`
    Unframed,
}

/// Result of tokenizing one line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenizedLine {
    Fields(Fields),
    Skip(SkipKind),
}

impl TokenizedLine {
    pub fn is_skip(&self) -> bool {
        matches!(self, TokenizedLine::Skip(_))
    }

    /// Data fields, if this line is a data row
    pub fn fields(&self) -> Option<&Fields> {
        match self {
            TokenizedLine::Fields(fields) => Some(fields),
            TokenizedLine::Skip(_) => None,
        }
    }
}

/// Tokenize one line of a box-drawn table.
pub fn tokenize(line: &str) -> TokenizedLine {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return TokenizedLine::Skip(SkipKind::Blank);
    }

    if !line.contains(SEPARATORS) {
        if line.trim().chars().all(|c| BORDER_GLYPHS.contains(&c) || c.is_whitespace()) {
            return TokenizedLine::Skip(SkipKind::Border);
        }
        return TokenizedLine::Skip(SkipKind::Unframed);
    }

    let segments: Vec<&str> = line.split(SEPARATORS).collect();
    // The outer borders leave one segment on each side of the row.
    let inner = match segments.len() {
        0..=2 => &[][..],
        n => &segments[1..n - 1],
    };
    let fields: Fields = inner.iter().map(|s| s.trim().to_string()).collect();

    if fields.is_empty() {
        return TokenizedLine::Skip(SkipKind::Unframed);
    }

    if is_header(&fields) {
        return TokenizedLine::Skip(SkipKind::Header(fields));
    }

    TokenizedLine::Fields(fields)
}

fn is_header(fields: &[String]) -> bool {
    fields
        .iter()
        .any(|field| HEADER_TITLES.iter().any(|title| field.contains(title)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_border_lines_are_skipped() {
        for line in [
            "├───┼───┤",
            "┌──────┬─────┐",
            "└──────┴─────┘",
            "+-------+------+",
            "╞═══╪═══╡",
        ] {
            assert_eq!(tokenize(line), TokenizedLine::Skip(SkipKind::Border), "{}", line);
        }
    }

    #[test]
    fn test_header_line_is_skipped() {
        let line = "│ Block │ Proposer(Status) │ Blob ID │ Honest Votes │ Malicious Votes │";
        let tokenized = tokenize(line);
        assert!(tokenized.is_skip());
        match tokenized {
            TokenizedLine::Skip(SkipKind::Header(titles)) => {
                assert_eq!(titles.len(), 5);
                assert_eq!(titles[0], "Block");
                assert_eq!(titles[4], "Malicious Votes");
            }
            other => panic!("expected header, got {:?}", other),
        }
    }

    #[test]
    fn test_data_line_is_split_and_trimmed() {
        let line = "│ 12    │ 8271(malicious) │ 4       │ 3            │ 1               │";
        let fields = match tokenize(line) {
            TokenizedLine::Fields(fields) => fields,
            other => panic!("expected fields, got {:?}", other),
        };
        assert_eq!(
            fields.as_slice(),
            &["12", "8271(malicious)", "4", "3", "1"].map(String::from)
        );
    }

    #[test]
    fn test_ascii_table_row() {
        let fields = tokenize("| 3 | 150 | 2 | 1, 0, 1 |").fields().cloned().unwrap();
        assert_eq!(fields.len(), 4);
        assert_eq!(fields[3], "1, 0, 1");
    }

    #[test]
    fn test_status_cells_are_not_headers() {
        let tokenized = tokenize("│ 4 │ Honest │ 10 │ 8 │ 2 │");
        assert!(!tokenized.is_skip());
    }

    #[test]
    fn test_blank_and_unframed_lines() {
        assert_eq!(tokenize("   "), TokenizedLine::Skip(SkipKind::Blank));
        assert_eq!(tokenize(""), TokenizedLine::Skip(SkipKind::Blank));
        assert_eq!(
            tokenize("Block Number: 17"),
            TokenizedLine::Skip(SkipKind::Unframed)
        );
    }

    #[test]
    fn test_empty_cells_are_kept() {
        let fields = tokenize("│ 1 │  │ 3 │\r\n").fields().cloned().unwrap();
        assert_eq!(fields.as_slice(), &["1", "", "3"].map(String::from));
    }
}
