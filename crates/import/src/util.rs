/// Declares a function returning a lazily compiled, process-wide regex.
macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static ::regex::Regex {
            static R: ::std::sync::OnceLock<::regex::Regex> = ::std::sync::OnceLock::new();
            R.get_or_init(|| ::regex::Regex::new($pat).expect("invalid regex"))
        }
    };
}

/// Keyword test against lower-cased cell text. Keywords of two characters
/// or fewer ("dr", "cr") must stand alone as a word so that
/// "description" never reads as a credit column.
pub fn contains_keyword(text: &str, keyword: &str) -> bool {
    if keyword.chars().count() > 2 {
        return text.contains(keyword);
    }
    text.split(|c: char| !c.is_alphanumeric())
        .any(|word| word == keyword)
}
