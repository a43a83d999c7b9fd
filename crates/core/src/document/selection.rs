//! Page selection expressions.
//!
//! An expression is a comma separated list of terms:
//!
//! | term          | pages                 |
//! |---------------|-----------------------|
//! | `n`           | page n                |
//! | `a-b`         | a through b           |
//! | `-b`          | 1 through b           |
//! | `a-`          | a through the last    |
//! | `odd`, `even` | by parity             |
//! | `!t`, `t!`    | exclude term t        |
//!
//! Exclusions apply after every inclusion. An expression made only of
//! exclusions starts from all pages, as does an empty one.

use crate::error::{PdfError, Result};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Term {
    Range(usize, usize),
    Odd,
    Even,
}

impl Term {
    fn pages(&self, count: usize) -> Vec<usize> {
        match *self {
            Self::Range(a, b) => (a..=b.min(count)).collect(),
            Self::Odd => (1..=count).step_by(2).collect(),
            Self::Even => (2..=count).step_by(2).collect(),
        }
    }
}

fn parse_page(s: &str, term: &str) -> Result<usize> {
    match s.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(PdfError::Selection(format!("bad page number in {term:?}"))),
    }
}

/// Parse one term into (excluded, term).
fn parse_term(raw: &str, count: usize, allow_out_of_range: bool) -> Result<(bool, Term)> {
    let mut t = raw.trim();
    let mut excluded = false;
    if let Some(rest) = t.strip_prefix('!') {
        (t, excluded) = (rest.trim(), true);
    } else if let Some(rest) = t.strip_suffix('!') {
        (t, excluded) = (rest.trim(), true);
    }
    let term = match t.to_ascii_lowercase().as_str() {
        "odd" => return Ok((excluded, Term::Odd)),
        "even" => return Ok((excluded, Term::Even)),
        "" => return Err(PdfError::Selection(format!("empty term in {raw:?}"))),
        _ => match t.split_once('-') {
            Some((a, b)) => {
                let from = if a.trim().is_empty() { 1 } else { parse_page(a, raw)? };
                // An open end starting past the last page is out of range, not descending.
                let to = if b.trim().is_empty() { count.max(from) } else { parse_page(b, raw)? };
                if from > to {
                    return Err(PdfError::Selection(format!("descending range {raw:?}")));
                }
                Term::Range(from, to)
            }
            None => {
                let n = parse_page(t, raw)?;
                Term::Range(n, n)
            }
        },
    };
    if let Term::Range(a, b) = term
        && b > count
        && !allow_out_of_range
    {
        let page = if a > count { a } else { b };
        return Err(PdfError::Selection(format!(
            "page {page} out of range 1-{count}"
        )));
    }
    Ok((excluded, term))
}

fn parse_terms(expr: &str, count: usize, allow_out_of_range: bool) -> Result<Vec<(bool, Term)>> {
    if expr.trim().is_empty() {
        return Ok(Vec::new());
    }
    expr.split(',')
        .map(|t| parse_term(t, count, allow_out_of_range))
        .collect()
}

/// Selected 1-based page numbers of a `count`-page document.
///
/// Pages beyond `count` fail with [`PdfError::Selection`] unless
/// `allow_out_of_range`, in which case they are dropped.
pub fn parse_selection(expr: &str, count: usize, allow_out_of_range: bool) -> Result<BTreeSet<usize>> {
    let terms = parse_terms(expr, count, allow_out_of_range)?;
    let mut selected: BTreeSet<usize> = if terms.iter().all(|(excluded, _)| *excluded) {
        (1..=count).collect()
    } else {
        BTreeSet::new()
    };
    for (_, term) in terms.iter().filter(|(excluded, _)| !excluded) {
        selected.extend(term.pages(count));
    }
    for (_, term) in terms.iter().filter(|(excluded, _)| *excluded) {
        for p in term.pages(count) {
            selected.remove(&p);
        }
    }
    Ok(selected)
}

/// Like [`parse_selection`], but keeps the order of the terms and repeats.
///
/// Used for collecting pages: "3,1,3" yields `[3, 1, 3]`.
pub fn parse_selection_ordered(expr: &str, count: usize, allow_out_of_range: bool) -> Result<Vec<usize>> {
    let terms = parse_terms(expr, count, allow_out_of_range)?;
    let mut pages: Vec<usize> = if terms.iter().all(|(excluded, _)| *excluded) {
        (1..=count).collect()
    } else {
        terms
            .iter()
            .filter(|(excluded, _)| !excluded)
            .flat_map(|(_, term)| term.pages(count))
            .collect()
    };
    let removed: BTreeSet<usize> = terms
        .iter()
        .filter(|(excluded, _)| *excluded)
        .flat_map(|(_, term)| term.pages(count))
        .collect();
    pages.retain(|p| !removed.contains(p));
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sel(expr: &str, n: usize) -> Vec<usize> {
        parse_selection(expr, n, false).unwrap().into_iter().collect()
    }

    #[test]
    fn test_single_and_ranges() {
        assert_eq!(sel("2", 5), vec![2]);
        assert_eq!(sel("2-4", 5), vec![2, 3, 4]);
        assert_eq!(sel("-2", 5), vec![1, 2]);
        assert_eq!(sel("4-", 5), vec![4, 5]);
    }

    #[test]
    fn test_parity_and_exclusion() {
        assert_eq!(sel("odd", 5), vec![1, 3, 5]);
        assert_eq!(sel("even", 5), vec![2, 4]);
        assert_eq!(sel("1-5,!3", 5), vec![1, 2, 4, 5]);
        assert_eq!(sel("odd,5!", 5), vec![1, 3]);
        assert_eq!(sel("!1", 3), vec![2, 3]);
    }

    #[test]
    fn test_out_of_range() {
        assert!(matches!(parse_selection("7", 5, false), Err(PdfError::Selection(_))));
        assert!(parse_selection("7", 5, true).unwrap().is_empty());
        assert_eq!(parse_selection("4-9", 5, true).unwrap().len(), 2);
    }

    #[test]
    fn test_open_range_past_end() {
        assert!(parse_selection("5-", 3, true).unwrap().is_empty());
        assert_eq!(parse_selection("2,5-", 3, true).unwrap(), BTreeSet::from([2]));
        assert!(parse_selection_ordered("5-", 3, true).unwrap().is_empty());
        let err = parse_selection("5-", 3, false).unwrap_err();
        assert!(matches!(&err, PdfError::Selection(m) if m.contains("out of range")), "{err}");
    }

    #[test]
    fn test_malformed_terms() {
        assert!(parse_selection("a", 5, false).is_err());
        assert!(parse_selection("3-1", 5, false).is_err());
        assert!(parse_selection("0", 5, false).is_err());
        assert!(parse_selection("1,,2", 5, false).is_err());
    }

    #[test]
    fn test_ordered_keeps_repeats() {
        assert_eq!(parse_selection_ordered("3,1,3,2", 5, false).unwrap(), vec![3, 1, 3, 2]);
        assert_eq!(parse_selection_ordered("3,1,3,!3", 5, false).unwrap(), vec![1]);
    }
}
