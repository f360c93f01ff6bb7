//! Domain label normalization.
//!
//! Backup manifests tag every record with a compact domain such as
//! `CameraRollDomain` or `AppDomain-com.vendor.games`. When the tree groups
//! by domain, those tags become the leading path segments of each entry,
//! so they are rewritten into something a human wants to `ls`.

/// Turn a compact domain tag into readable path segments.
///
/// Splits on hyphens; inserts a space before an uppercase letter that
/// immediately follows a lowercase one (so acronym runs stay intact); and
/// strips a trailing `" Domain"` from each produced segment.
///
/// ```
/// use backupfs_kernel::clean_domain;
///
/// assert_eq!(clean_domain("CameraRollDomain"), ["Camera Roll"]);
/// assert_eq!(
///     clean_domain("AppDomain-com.vendor.games"),
///     ["App", "com.vendor.games"]
/// );
/// ```
pub fn clean_domain(domain: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    // True when the previous character was lowercase; an uppercase letter
    // right after a lowercase one marks a word boundary.
    let mut prev_lower = false;

    for ch in domain.chars() {
        if ch == '-' {
            if !current.is_empty() {
                segments.push(strip_suffix(current));
                current = String::new();
                prev_lower = false;
            }
            continue;
        }
        if ch.is_uppercase() {
            if prev_lower {
                current.push(' ');
            }
            prev_lower = false;
        } else if ch.is_lowercase() {
            prev_lower = true;
        }
        current.push(ch);
    }
    if !current.is_empty() {
        segments.push(strip_suffix(current));
    }
    segments
}

fn strip_suffix(segment: String) -> String {
    match segment.strip_suffix(" Domain") {
        Some(stripped) => stripped.to_owned(),
        None => segment,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_domain() {
        assert_eq!(clean_domain("CameraRollDomain"), ["Camera Roll"]);
        assert_eq!(clean_domain("HomeDomain"), ["Home"]);
        assert_eq!(clean_domain("MediaDomain"), ["Media"]);
    }

    #[test]
    fn test_hyphenated_app_domain() {
        assert_eq!(
            clean_domain("AppDomain-com.vendor.games"),
            ["App", "com.vendor.games"]
        );
        assert_eq!(
            clean_domain("AppDomainGroup-group.com.vendor.shared"),
            ["App Domain Group", "group.com.vendor.shared"]
        );
    }

    #[test]
    fn test_acronyms_stay_intact() {
        // Consecutive uppercase letters are never split.
        assert_eq!(clean_domain("DCIMDomain"), ["DCIMDomain"]);
        assert_eq!(clean_domain("SysSharedContainerDomain"), ["Sys Shared Container"]);
    }

    #[test]
    fn test_digits_do_not_break_words() {
        // Digits are neither case, so they carry the previous flag along.
        assert_eq!(clean_domain("HomeKit2Domain"), ["Home Kit2"]);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert_eq!(clean_domain(""), Vec::<String>::new());
        assert_eq!(clean_domain("---"), Vec::<String>::new());
        assert_eq!(clean_domain("-leading"), ["leading"]);
    }

    #[test]
    fn test_restartable() {
        // Pure function: same input, same output.
        assert_eq!(
            clean_domain("CameraRollDomain"),
            clean_domain("CameraRollDomain")
        );
    }
}
