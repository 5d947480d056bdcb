//! Character-level CSV row parser.
//!
//! The parser never fails: unbalanced quotes simply run to the end of input and
//! ragged rows are returned as-is. Deciding what a row means is left to the
//! caller.

/// Split CSV text into rows of raw cell strings.
///
/// Handles quoted cells containing commas, newlines and doubled-quote escapes.
/// `\r\n` is treated as `\n`. A trailing empty row produced by a final newline
/// is discarded.
pub fn parse_rows(text: &str) -> Vec<Vec<String>> {
    let input = text.replace("\r\n", "\n");
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            if ch == '"' {
                if chars.peek() == Some(&'"') {
                    cell.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                cell.push(ch);
            }
            continue;
        }

        match ch {
            '"' => in_quotes = true,
            ',' => row.push(std::mem::take(&mut cell)),
            '\n' => {
                row.push(std::mem::take(&mut cell));
                rows.push(std::mem::take(&mut row));
            }
            _ => cell.push(ch),
        }
    }

    row.push(cell);
    rows.push(row);

    if rows
        .last()
        .is_some_and(|last| last.len() == 1 && last[0].is_empty())
    {
        rows.pop();
    }

    rows
}
