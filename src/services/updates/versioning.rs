use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;

static VERSION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{1,9}(\.[0-9]{1,9}){1,3}$").expect("version pattern compiles"));

/// `major.minor[.patch[.build]]`, ASCII digits only, at most nine per part.
pub fn is_valid_version(version: &str) -> bool {
    VERSION_PATTERN.is_match(version)
}

fn components(version: &str) -> Vec<u64> {
    version
        .split('.')
        .map(|part| part.parse::<u64>().unwrap_or(0))
        .collect()
}

/// Numeric comparison of dotted versions; missing components count as zero,
/// so `1.2` equals `1.2.0`.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let left = components(a);
    let right = components(b);
    let len = left.len().max(right.len());
    for index in 0..len {
        let l = left.get(index).copied().unwrap_or(0);
        let r = right.get(index).copied().unwrap_or(0);
        match l.cmp(&r) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

pub fn is_newer(candidate: &str, current: &str) -> bool {
    compare_versions(candidate, current) == Ordering::Greater
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1.0", true)]
    #[case("1.2.3", true)]
    #[case("10.20.30.40", true)]
    #[case("1", false)]
    #[case("1.2.3.4.5", false)]
    #[case("1.a", false)]
    #[case("v1.2", false)]
    #[case("1..2", false)]
    #[case("", false)]
    #[case("\u{0661}.\u{0662}", false)]
    #[case("12345678901.0", false)]
    fn version_format(#[case] version: &str, #[case] valid: bool) {
        assert_eq!(is_valid_version(version), valid);
    }

    #[rstest]
    #[case("1.10", "1.9", Ordering::Greater)]
    #[case("1.2", "1.2.0", Ordering::Equal)]
    #[case("2.0.0.1", "2.0.0", Ordering::Greater)]
    #[case("0.9.9", "1.0", Ordering::Less)]
    fn numeric_ordering(#[case] a: &str, #[case] b: &str, #[case] expected: Ordering) {
        assert_eq!(compare_versions(a, b), expected);
    }

    #[test]
    fn newer_is_strict() {
        assert!(is_newer("1.0.1", "1.0"));
        assert!(!is_newer("1.0.0", "1.0"));
    }
}
