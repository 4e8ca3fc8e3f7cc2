//! Free-text composition overrides such as `"10/20/70"` or `"8% 15%"`.

use muster_core::CompositionFraction;
use thiserror::Error;

/// Reasons an override string is rejected.
#[derive(Debug, Error, PartialEq)]
pub enum OverrideError {
    /// Between one and three numbers are accepted.
    #[error("expected 1 to 3 numbers, found {0}")]
    TokenCount(usize),
    /// Token is not a number.
    #[error("not a number: {0:?}")]
    NotANumber(String),
    /// Token parsed to NaN or infinity.
    #[error("non-finite value: {0:?}")]
    NonFinite(String),
    /// Shares cannot be negative.
    #[error("negative value: {0:?}")]
    Negative(String),
    /// All shares are zero.
    #[error("composition sums to zero")]
    ZeroSum,
}

/// Parse an override into a normalized (unbounded) composition.
///
/// Tokens are separated by `/`, `,` or whitespace, each with an optional
/// trailing `%`. One token is infantry alone; two tokens are infantry and
/// cavalry with archers taking `max(0, 100 - inf - cav)`; three tokens are
/// used as given. The shares are divided by their sum.
pub fn parse_override(text: &str) -> Result<CompositionFraction, OverrideError> {
    let tokens: Vec<&str> = text
        .split(|c: char| c == '/' || c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.is_empty() || tokens.len() > 3 {
        return Err(OverrideError::TokenCount(tokens.len()));
    }

    let mut values = Vec::with_capacity(tokens.len());
    for token in tokens.iter().copied() {
        let digits = token.strip_suffix('%').unwrap_or(token);
        let v: f64 = digits
            .parse()
            .map_err(|_| OverrideError::NotANumber(token.to_string()))?;
        if !v.is_finite() {
            return Err(OverrideError::NonFinite(token.to_string()));
        }
        if v < 0.0 {
            return Err(OverrideError::Negative(token.to_string()));
        }
        values.push(v);
    }

    let (inf, cav, arc) = match values[..] {
        [inf] => (inf, 0.0, 0.0),
        [inf, cav] => (inf, cav, (100.0 - inf - cav).max(0.0)),
        [inf, cav, arc] => (inf, cav, arc),
        _ => return Err(OverrideError::TokenCount(values.len())),
    };
    let sum = inf + cav + arc;
    if !(sum > 0.0) {
        return Err(OverrideError::ZeroSum);
    }
    Ok(CompositionFraction::new(inf / sum, cav / sum, arc / sum))
}
