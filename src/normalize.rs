//! Breed name canonicalization.
//!
//! Free-text breed names arrive in every imaginable spelling ("Golden
//! Retriever", "golden  retriever", "Golden-Retríever"). The cache key,
//! topic selection, and prompt role statement all need one stable form,
//! so everything funnels through [`normalize`].

/// Canonicalize a free-text breed name into a stable key fragment.
///
/// Lowercases, folds Latin diacritics (`á → a`, `ñ → n`), removes
/// characters that are neither letters nor spaces, collapses whitespace
/// runs, and trims. Pure and total: never panics, returns `""` for
/// empty input.
///
/// Idempotent: `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(breed: &str) -> String {
    let mut out = String::with_capacity(breed.len());
    let mut pending_space = false;

    for raw in breed.chars() {
        for lowered in raw.to_lowercase() {
            let folded = fold_diacritic(lowered);
            if folded.is_whitespace() {
                pending_space = true;
            } else if folded.is_alphabetic() {
                if pending_space && !out.is_empty() {
                    out.push(' ');
                }
                pending_space = false;
                out.push(folded);
            }
            // anything else (digits, punctuation, symbols) is dropped
        }
    }

    out
}

/// Fold a single lowercase character to its unaccented Latin base.
///
/// Covers the Latin-1 supplement plus the accented forms that actually
/// occur in Spanish/Western-European breed names. Unmapped characters
/// pass through unchanged.
fn fold_diacritic(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ä' | 'ã' | 'å' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'ö' | 'õ' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ñ' => 'n',
        'ç' => 'c',
        'ý' | 'ÿ' => 'y',
        other => other,
    }
}
