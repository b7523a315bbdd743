//! Extension matching for intercepted paths
//!
//! Extensions are compared byte for byte: no case folding, no leading dot,
//! no wildcards. Only the text after the last `.` of the whole path counts.

use crate::error::ConfigError;

/// Upper bound on configured extensions
pub const MAX_EXTENSIONS: usize = 5;

/// Extension of `path`, or `""` when it has no `.`
pub fn extension_of(path: &str) -> &str {
    match path.rfind('.') {
        Some(dot) => &path[dot + 1..],
        None => "",
    }
}

/// Byte-level [`extension_of`] for raw C paths
pub fn extension_of_bytes(path: &[u8]) -> &[u8] {
    match path.iter().rposition(|&b| b == b'.') {
        Some(dot) => &path[dot + 1..],
        None => &[],
    }
}

/// Whether the extension of `path` is exactly one of `configured`
pub fn matches<S: AsRef<str>>(path: &str, configured: &[S]) -> bool {
    let ext = extension_of(path);
    configured.iter().any(|c| c.as_ref() == ext)
}

/// Bounded set of extensions an interceptor redirects
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtensionSet(Vec<Box<[u8]>>);

impl ExtensionSet {
    pub fn new<I, S>(extensions: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entries: Vec<Box<[u8]>> = extensions
            .into_iter()
            .map(|e| Box::from(e.as_ref().as_bytes()))
            .collect();
        if entries.len() > MAX_EXTENSIONS {
            return Err(ConfigError::TooManyExtensions(entries.len()));
        }
        Ok(Self(entries))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Match a raw path; never allocates
    pub fn matches(&self, path: &[u8]) -> bool {
        let ext = extension_of_bytes(path);
        self.0.iter().any(|c| **c == *ext)
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.0.iter().map(|e| &**e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_dot_means_no_extension() {
        for p in ["", "Makefile", "/usr/bin/env", "song"] {
            assert_eq!(extension_of(p), "", "{p}");
            assert_eq!(extension_of_bytes(p.as_bytes()), b"", "{p}");
        }
    }

    #[test]
    fn only_the_last_segment_counts() {
        assert_eq!(extension_of("song.mp3"), "mp3");
        assert_eq!(extension_of("archive.tar.gz"), "gz");
        assert_eq!(extension_of("/home/me/.config/a.b.c.mp3"), "mp3");
        assert_eq!(extension_of_bytes(b"my.song.mp3"), b"mp3");
    }

    #[test]
    fn trailing_dot_is_empty() {
        assert_eq!(extension_of("song."), "");
        assert_eq!(extension_of_bytes(b"."), b"");
    }

    #[test]
    fn dot_in_directory_is_still_the_last_dot() {
        assert_eq!(extension_of("/opt/app.d/readme"), "d/readme");
    }

    #[test]
    fn matching_is_exact_and_case_sensitive() {
        let configured = ["mp3", "wav"];
        assert!(matches("song.mp3", &configured));
        assert!(matches("/music/take.2.wav", &configured));
        assert!(!matches("song.MP3", &configured));
        assert!(!matches("song.mp", &configured));
        assert!(!matches("song.mp3x", &configured));
        assert!(!matches("mp3", &configured));
    }

    #[test]
    fn empty_set_never_matches() {
        let none: [&str; 0] = [];
        assert!(!matches("song.mp3", &none));
        assert!(!matches("", &none));
        assert!(!ExtensionSet::default().matches(b"song.mp3"));
    }

    #[test]
    fn set_agrees_with_str_matching() {
        let set = ExtensionSet::new(["mp3", "txt"]).unwrap();
        for p in ["a.mp3", "a.txt", "a.TXT", "a", "a.", "x.y.mp3"] {
            assert_eq!(set.matches(p.as_bytes()), matches(p, &["mp3", "txt"]), "{p}");
        }
    }

    #[test]
    fn set_is_bounded() {
        assert_eq!(ExtensionSet::new(["a", "b", "c", "d", "e"]).unwrap().len(), 5);
        assert_eq!(
            ExtensionSet::new(["a", "b", "c", "d", "e", "f"]),
            Err(ConfigError::TooManyExtensions(6))
        );
    }
}
