//! Artifact path sanitisation (spec §4.1, invariant I6).
//!
//! Every artifact path is normalised before it is stored or checked for
//! conflicts: no `..` segments, no leading `/`, no scheme prefix, no NULs,
//! backslashes normalised to `/`. Sanitisation is idempotent — running it
//! twice produces the same result as running it once (spec §8 testable
//! properties).

/// Sanitise an artifact-relative path.
///
/// Steps (order matters — each step's output feeds the next):
/// 1. Strip NUL bytes.
/// 2. Normalise `\` to `/`.
/// 3. Strip a `scheme://` prefix if present.
/// 4. Split on `/`, drop `.` and leading/interior `..` segments, drop empty
///    segments (collapses `//` and a leading `/`).
/// 5. Re-join with `/`.
pub fn sanitise_path(raw: &str) -> String {
    let no_nul: String = raw.chars().filter(|&c| c != '\0').collect();
    let unix_slashes = no_nul.replace('\\', "/");

    let without_scheme = match unix_slashes.find("://") {
        Some(idx) => {
            let rest = &unix_slashes[idx + 3..];
            match rest.strip_prefix('/') {
                Some(already_rooted) => already_rooted.to_string(),
                None => match rest.find('/') {
                    Some(slash) => rest[slash + 1..].to_string(),
                    None => String::new(),
                },
            }
        }
        None => unix_slashes,
    };

    let mut segments: Vec<&str> = Vec::new();
    for seg in without_scheme.split('/') {
        match seg {
            "" | "." => continue,
            ".." => continue,
            s => segments.push(s),
        }
    }
    segments.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_traversal_and_leading_slash() {
        assert_eq!(sanitise_path("../etc/passwd"), "etc/passwd");
        assert_eq!(sanitise_path("/etc/passwd"), "etc/passwd");
        assert_eq!(sanitise_path("../../../etc/passwd"), "etc/passwd");
    }

    #[test]
    fn normalises_backslashes() {
        assert_eq!(sanitise_path("dir\\sub\\file.txt"), "dir/sub/file.txt");
    }

    #[test]
    fn strips_scheme_prefix() {
        assert_eq!(sanitise_path("file:///etc/passwd"), "etc/passwd");
        assert_eq!(sanitise_path("https://evil.test/x"), "x");
    }

    #[test]
    fn strips_nul_bytes() {
        assert_eq!(sanitise_path("foo\0bar"), "foobar");
    }

    #[test]
    fn idempotent() {
        let inputs = [
            "../etc/passwd",
            "a/b/../../c",
            "C:\\Users\\x",
            "scheme://host/path",
            "plain/file.txt",
        ];
        for i in inputs {
            let once = sanitise_path(i);
            let twice = sanitise_path(&once);
            assert_eq!(once, twice, "not idempotent for {i:?}");
        }
    }

    #[test]
    fn never_contains_traversal_or_nul() {
        let inputs = [
            "../../../../x",
            "a/../../b",
            "/../x",
            "x\0y/../z",
            "weird//double//slash",
        ];
        for i in inputs {
            let out = sanitise_path(i);
            assert!(!out.contains(".."));
            assert!(!out.starts_with('/'));
            assert!(!out.contains('\0'));
        }
    }
}
