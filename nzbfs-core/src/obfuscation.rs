/// Guess whether a file name stem is machine-generated noise (hash-like or
/// random token) rather than a human-readable release name.
pub fn is_probably_obfuscated(name: &str) -> bool {
    let stem = name.rsplit_once('.').map(|(s, _)| s).unwrap_or(name);
    if stem.len() < 16 {
        return false;
    }
    if stem.chars().all(|c| c.is_ascii_hexdigit()) {
        return true;
    }
    // Human names carry separators; long separator-free tokens mixing letters
    // and several digits are almost always generated.
    if stem.chars().any(|c| matches!(c, ' ' | '.' | '-' | '_')) {
        return false;
    }
    let digits = stem.chars().filter(|c| c.is_ascii_digit()).count();
    let letters = stem.chars().filter(|c| c.is_ascii_alphabetic()).count();
    stem.len() >= 20 && digits >= 4 && letters > 0
}
