use nzbfs_core::obfuscation::is_probably_obfuscated;

#[test]
fn hex_stems_are_obfuscated() {
    assert!(is_probably_obfuscated("a1b2c3d4e5f6a7b8c9d0.mkv"));
    assert!(is_probably_obfuscated("0123456789abcdef0123456789abcdef"));
}

#[test]
fn release_names_are_not() {
    assert!(!is_probably_obfuscated("Great.Movie.2024.1080p.mkv"));
    assert!(!is_probably_obfuscated("some-album-flac.rar"));
    assert!(!is_probably_obfuscated("track_01_remaster.flac"));
    assert!(!is_probably_obfuscated("readme.txt"));
}

#[test]
fn short_stems_are_not() {
    assert!(!is_probably_obfuscated("deadbeef.bin"));
    assert!(!is_probably_obfuscated("abc.mkv"));
}

#[test]
fn long_random_tokens_are_obfuscated() {
    assert!(is_probably_obfuscated("xK9fQ2mZl8pR4wT7vB31.mkv"));
}
