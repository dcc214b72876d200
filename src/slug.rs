use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static NON_SLUG_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// Returned when nothing of the input survives normalization.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("empty slug after normalization")]
pub struct EmptySlug;

/// Lower-cases `input`, collapses every run outside `[a-z0-9]` into one `-`
/// and trims dashes from both ends.
///
/// The store applies its own canonical rule afterwards, see
/// [`crate::store::canonical_slug`].
pub fn slugify(input: &str) -> Result<String, EmptySlug> {
    let lowered = input.trim().to_lowercase();
    let collapsed = NON_SLUG_RUN.replace_all(&lowered, "-");
    let slug = collapsed.trim_matches('-');
    if slug.is_empty() {
        return Err(EmptySlug);
    }
    Ok(slug.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    static SLUG_SHAPE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$").unwrap());

    #[test]
    fn composite_key() {
        assert_eq!(slugify("SET1-C001").unwrap(), "set1-c001");
    }

    #[test]
    fn collapses_punctuation_runs() {
        assert_eq!(slugify("  Bolt!!  (Alpha) ").unwrap(), "bolt-alpha");
        assert_eq!(slugify("a__b--c").unwrap(), "a-b-c");
    }

    #[test]
    fn non_ascii_becomes_separator() {
        assert_eq!(slugify("Pokémon Card").unwrap(), "pok-mon-card");
    }

    #[test]
    fn empty_input_fails() {
        assert_eq!(slugify(""), Err(EmptySlug));
        assert_eq!(slugify("   "), Err(EmptySlug));
        assert_eq!(slugify("!?-_/"), Err(EmptySlug));
    }

    #[test]
    fn deterministic() {
        let a = slugify("Lightning Bolt #42").unwrap();
        let b = slugify("Lightning Bolt #42").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, "lightning-bolt-42");
    }

    proptest! {
        #[test]
        fn output_is_canonical_or_empty(input in "[ -~]{1,64}") {
            match slugify(&input) {
                Ok(slug) => {
                    prop_assert!(
                        SLUG_SHAPE.is_match(&slug),
                        "bad slug {:?} from {:?}",
                        slug,
                        input
                    );
                }
                Err(EmptySlug) => {
                    prop_assert!(!input.chars().any(|c| c.is_ascii_alphanumeric()));
                }
            }
        }
    }
}
