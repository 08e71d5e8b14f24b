use once_cell::sync::Lazy;
use regex::Regex;

static NON_ALPHANUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("static slug pattern"));

/// URL-safe identifier for a path name: lowercase, runs of anything that is not
/// a letter or digit collapse to a single `-`, no leading/trailing `-`.
#[must_use]
pub fn slugify(name: &str) -> String {
    let lower = name.to_lowercase();
    NON_ALPHANUMERIC
        .replace_all(&lower, "-")
        .trim_matches('-')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::slugify;

    #[test]
    fn known_path_slugs() {
        assert_eq!(slugify("You, Robot"), "you-robot");
        assert_eq!(slugify("11 Things I Hate About U"), "11-things-i-hate-about-u");
        assert_eq!(slugify("Avatar of Boris"), "avatar-of-boris");
        assert_eq!(slugify("  -- Bees Hate You!! "), "bees-hate-you");
    }

    #[test]
    fn slugify_is_idempotent() {
        for name in ["You, Robot", "Heavy Rains", "KOLHS", "A Shrunken Adventurer am I", ""] {
            let once = slugify(name);
            assert_eq!(slugify(&once), once);
        }
    }
}
