//! Unit-string beautification for display.
//!
//! `units_to_unicode` applies a small substitution table; `units_to_latex` is an
//! identity placeholder (LaTeX rendering is out of scope).

use std::sync::OnceLock;

use regex::Regex;

struct Rule {
    pattern: &'static str,
    replacement: &'static str,
}

const RULES: &[Rule] = &[
    Rule { pattern: r"sqrt\(([^)]*)\)", replacement: "√$1" },
    Rule { pattern: r"\^2", replacement: "²" },
    Rule { pattern: r"\bOhm\b", replacement: "Ω" },
    Rule { pattern: r"\bR\b", replacement: "Ω" },
    Rule { pattern: r"\bI\b", replacement: "A" },
    Rule { pattern: r"\bC\b", replacement: "F" },
    Rule { pattern: r"\bDeg\b", replacement: "°" },
];

fn compiled_rules() -> &'static [(Regex, &'static str)] {
    static COMPILED: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        RULES
            .iter()
            .map(|rule| (Regex::new(rule.pattern).expect("static pattern is valid"), rule.replacement))
            .collect()
    })
}

/// Replaces ASCII unit shorthand (`sqrt(Hz)`, `^2`, `Ohm`, ...) with unicode glyphs.
///
/// Empty or unset input yields the empty string.
pub fn units_to_unicode(units: &str) -> String {
    if units.is_empty() {
        return String::new();
    }
    let mut out = units.to_string();
    for (re, replacement) in compiled_rules() {
        out = re.replace_all(&out, *replacement).into_owned();
    }
    out
}

/// LaTeX rendering is not implemented; this is an identity passthrough placeholder.
pub fn units_to_latex(units: &str) -> String {
    units.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_common_units() {
        assert_eq!(units_to_unicode("V^2/Hz"), "V²/Hz");
        assert_eq!(units_to_unicode("V/sqrt(Hz)"), "V/√Hz");
        assert_eq!(units_to_unicode("Ohm"), "Ω");
        assert_eq!(units_to_unicode(""), "");
    }

    #[test]
    fn whole_word_anchoring_avoids_false_hits() {
        // "R" inside a longer identifier must not be replaced.
        assert_eq!(units_to_unicode("RMS"), "RMS");
        assert_eq!(units_to_unicode("R"), "Ω");
    }

    #[test]
    fn latex_is_identity() {
        assert_eq!(units_to_latex("V/sqrt(Hz)"), "V/sqrt(Hz)");
    }
}
