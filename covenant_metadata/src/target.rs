// Copyright Covenant Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Matching contract targets written in harness attributes against the
//! fully-qualified names of contracted functions.
//!
//! Harnesses name their targets the way they would call them (`divide`,
//! `Stack::pop`, `crate::math::divide`), so a target matches a function when
//! its normalized segments are a suffix of the function's segments.

/// Remove every `<...>` group, turbofish included, and all whitespace.
pub fn strip_generics(path: &str) -> String {
    let mut depth = 0usize;
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            c if depth == 0 && !c.is_whitespace() => out.push(c),
            _ => {}
        }
    }
    out.replace("::::", "::").trim_end_matches("::").to_string()
}

/// The segments of `path` without generics and without leading
/// `crate`/`self`/`super` segments.
pub fn normalize_path(path: &str) -> Vec<String> {
    let stripped = strip_generics(path);
    let mut segments: Vec<String> = stripped
        .split("::")
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect();
    while segments.first().is_some_and(|s| matches!(s.as_str(), "crate" | "self" | "super")) {
        segments.remove(0);
    }
    segments
}

/// Whether the target `declared` designates the function named `qualified`.
pub fn target_matches(qualified: &str, declared: &str) -> bool {
    let qualified = normalize_path(qualified);
    let declared = normalize_path(declared);
    !declared.is_empty() && qualified.ends_with(&declared)
}

/// Whether two targets, as written, may designate the same function.
pub fn targets_overlap(a: &str, b: &str) -> bool {
    let a = normalize_path(a);
    let b = normalize_path(b);
    !a.is_empty() && !b.is_empty() && (a.ends_with(&b) || b.ends_with(&a))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generics_and_prefixes_are_ignored() {
        assert_eq!(strip_generics("demo::Stack<alloc::vec::Vec<u8>>"), "demo::Stack");
        assert_eq!(strip_generics("Stack::<u8>::pop"), "Stack::pop");
        assert_eq!(normalize_path("crate::math::divide"), vec!["math", "divide"]);
        assert_eq!(normalize_path("super::super::f"), vec!["f"]);
    }

    #[test]
    fn suffix_matching() {
        assert!(target_matches("demo::math::divide", "divide"));
        assert!(target_matches("demo::math::divide", "crate::math::divide"));
        assert!(target_matches("demo::Stack::pop", "Stack::<u8>::pop"));
        assert!(!target_matches("demo::math::divide", "multiply"));
        assert!(!target_matches("demo::math::redivide", "divide"));
        assert!(!target_matches("demo::f", ""));
    }

    #[test]
    fn overlapping_targets() {
        assert!(targets_overlap("divide", "math::divide"));
        assert!(!targets_overlap("math::divide", "algebra::divide"));
    }
}
