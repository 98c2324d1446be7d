//! Bulk numeric scan of a `VALUE` section that bypasses the grammar parser entirely.
//!
//! Eligible only for the common case: a flat `(name value)*` record stream with a
//! constant cycle length and no composite tuples. Any failure falls back to the
//! ordinary token-based parse; the fast path never produces a partial result.

pub(crate) struct FastScanResult {
    pub names: Vec<String>,
    /// One entry per name in `names`, each holding that signal's samples in order.
    pub columns: Vec<Vec<f64>>,
}

/// Finds the byte offset of the `END` keyword that closes the `VALUE` section starting
/// at `start`, skipping over quoted strings so a signal name containing the letters
/// "END" can never be mistaken for the terminator.
///
/// Returns `None` if no such marker is found before the end of the buffer.
pub(crate) fn find_value_section_end(src: &str, start: usize) -> Option<usize> {
    let bytes = src.as_bytes();
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'"' {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
                i += 1; // closing quote (or past end; loop condition catches it)
            }
            c if c.is_ascii_uppercase() => {
                let word_start = i;
                while i < bytes.len() && bytes[i].is_ascii_uppercase() {
                    i += 1;
                }
                if &src[word_start..i] == "END" {
                    return Some(word_start);
                }
            }
            _ => i += 1,
        }
    }
    None
}

/// Attempts the fast scan described in the module's header comment over `window`, the
/// raw text strictly between a `VALUE` keyword and its matching `END`.
///
/// Preconditions the caller must already have checked: no `GROUP` trace was declared in
/// this dataset, and `window` contains no `(`. This function itself checks the
/// remaining shape constraints and returns `None` on any violation.
pub(crate) fn try_fast_scan(window: &str) -> Option<FastScanResult> {
    if window.contains('(') {
        return None;
    }
    let tokens: Vec<&str> = window.split_whitespace().collect();
    if tokens.len() < 2 || tokens.len() % 2 != 0 {
        return None;
    }

    let mut cycle = None;
    let mut i = 2;
    while i < tokens.len() {
        if tokens[i] == tokens[0] {
            cycle = Some(i / 2);
            break;
        }
        i += 2;
    }
    let cycle_len = cycle?;
    if cycle_len == 0 {
        return None;
    }

    let total_pairs = tokens.len() / 2;
    let rows = total_pairs / cycle_len;
    if rows == 0 {
        return None;
    }
    let used_tokens = rows * cycle_len * 2;
    let tokens = &tokens[..used_tokens];

    let names: Vec<String> = (0..cycle_len).map(|k| unescape_name(tokens[2 * k])).collect();
    let mut columns: Vec<Vec<f64>> = vec![Vec::with_capacity(rows); cycle_len];
    for r in 0..rows {
        for (k, column) in columns.iter_mut().enumerate() {
            let value_tok = tokens[r * 2 * cycle_len + 2 * k + 1];
            let value: f64 = value_tok.parse().ok()?;
            column.push(value);
        }
    }
    Some(FastScanResult { names, columns })
}

fn unescape_name(tok: &str) -> String {
    let trimmed = tok.strip_prefix('"').and_then(|s| s.strip_suffix('"')).unwrap_or(tok);
    trimmed.replace('\\', "")
}
