use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref HASHTAG: Regex = Regex::new(r"#\w+").expect("hashtag pattern is valid");
    static ref STRIPPED: Regex =
        Regex::new(r"[\p{P}\p{S}\p{N}]+").expect("character class pattern is valid");
    static ref WHITESPACE: Regex = Regex::new(r"\s+").expect("whitespace pattern is valid");
}

/// Removes hashtags, punctuation, symbols and digits, then collapses runs of
/// whitespace into single spaces. Idempotent.
pub fn normalize(text: &str) -> String {
    let text = HASHTAG.replace_all(text, " ");
    let text = STRIPPED.replace_all(&text, " ");

    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn it_strips_punctuation_symbols_and_digits() {
        assert_eq!(
            normalize("Users (n = 1,204) reported 3x more use of €-based ads!"),
            "Users n reported x more use of based ads"
        );
    }

    #[test]
    fn it_removes_hashtags() {
        assert_eq!(normalize("Trending #MeToo and #2020vision posts"), "Trending and posts");
    }

    #[test]
    fn it_collapses_whitespace() {
        assert_eq!(normalize("  social \t\n media   use "), "social media use");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize(" ... 42 "), "");
    }

    #[test]
    fn it_keeps_non_latin_letters() {
        assert_eq!(normalize("Selbstbestimmung, autonomía!"), "Selbstbestimmung autonomía");
    }

    proptest! {
        #[test]
        fn it_is_idempotent(text in "\\PC{0,80}") {
            let once = normalize(&text);
            prop_assert_eq!(normalize(&once), once.clone());
        }

        #[test]
        fn it_is_idempotent_on_ascii_noise(text in "[ -~\\t\\n#]{0,120}") {
            let once = normalize(&text);
            prop_assert_eq!(normalize(&once), once.clone());
        }
    }
}
