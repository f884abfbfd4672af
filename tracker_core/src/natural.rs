//! Natural ("human") ordering for exercise titles.
//!
//! "Squat 2" sorts before "Squat 10": runs of digits compare by numeric
//! value, everything else compares case-insensitively.

use std::cmp::Ordering;

/// Split a string into alternating digit / non-digit runs
fn chunks(s: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut prev_digit: Option<bool> = None;

    for (i, c) in s.char_indices() {
        let digit = c.is_ascii_digit();
        if let Some(p) = prev_digit {
            if p != digit {
                out.push(&s[start..i]);
                start = i;
            }
        }
        prev_digit = Some(digit);
    }
    if start < s.len() {
        out.push(&s[start..]);
    }
    out
}

fn compare_digits(a: &str, b: &str) -> Ordering {
    // Arbitrary length: strip leading zeros, then longer is larger
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Compare two strings in natural order
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let chunks_a = chunks(a);
    let chunks_b = chunks(b);

    for (ca, cb) in chunks_a.iter().zip(chunks_b.iter()) {
        let digit_a = ca.starts_with(|c: char| c.is_ascii_digit());
        let digit_b = cb.starts_with(|c: char| c.is_ascii_digit());

        let result = if digit_a && digit_b {
            compare_digits(ca, cb)
        } else {
            ca.to_lowercase().cmp(&cb.to_lowercase())
        };
        if result != Ordering::Equal {
            return result;
        }
    }
    chunks_a.len().cmp(&chunks_b.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbers_compare_numerically() {
        assert_eq!(natural_cmp("Squat 2", "Squat 10"), Ordering::Less);
        assert_eq!(natural_cmp("Squat 10", "Squat 2"), Ordering::Greater);
    }

    #[test]
    fn test_case_insensitive_text() {
        assert_eq!(natural_cmp("bench", "Bench"), Ordering::Equal);
        assert_eq!(natural_cmp("bench", "Deadlift"), Ordering::Less);
    }

    #[test]
    fn test_leading_zeros_and_long_numbers() {
        assert_eq!(natural_cmp("a007", "a7"), Ordering::Equal);
        assert_eq!(
            natural_cmp("x 99999999999999999999", "x 100000000000000000000"),
            Ordering::Less
        );
    }

    #[test]
    fn test_prefix_sorts_first() {
        assert_eq!(natural_cmp("Row", "Row 1"), Ordering::Less);
    }

    #[test]
    fn test_sorting_titles() {
        let mut titles = vec!["Curl 12", "curl 3", "Ab Wheel", "Curl 1"];
        titles.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(titles, vec!["Ab Wheel", "Curl 1", "curl 3", "Curl 12"]);
    }
}
