//! Description normalizer: strips institutional boilerplate from raw vendor
//! descriptions so they can be displayed and compared.

use std::sync::OnceLock;

use regex::Regex;

use crate::util::collapse_whitespace;

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

// Bank-inserted prefixes, e.g. "Recurring Card Purchase 01/14 ".
re!(re_bank_prefix, concat!(
    r"(?i)^(?:(?:recurring\s+)?card\s+purchase(?:\s+with\s+pin)?(?:\s+return)?\s+\d{1,2}/\d{1,2}",
    r"|pos\s+(?:debit|purchase))\s+"
));
// Card processor prefixes: "SQ *", "TST*", "PAYPAL *" ...
re!(re_processor_prefix,
    r"(?i)^(?:sq|tst|sp|pp|paypal)\s?\*\s*");
re!(re_reference, concat!(
    r"(?i)\b(?:web|ppd|ccd|tel)\s+id:\s*\S+",
    r"|\b(?:ref|trace|conf|transaction)\s*(?:#|:|no\.|no\b)\s*:?\s*[A-Z0-9\-]+"
));
re!(re_card_suffix,
    r"(?i)\s+card\s+\d{4}\s*$");

fn normalize_pass(s: &str) -> String {
    let s = collapse_whitespace(s);
    let s = re_bank_prefix().replace(&s, "");
    let s = re_processor_prefix().replace(&s, "");
    let s = re_reference().replace_all(&s, " ");
    let s = re_card_suffix().replace(&s, "");
    collapse_whitespace(&s)
}

/// Clean a raw description. Deterministic and idempotent: passes repeat
/// until nothing more is stripped. Store numbers such as `#4521` survive.
/// If everything would be stripped, the whitespace-collapsed input is kept.
pub fn normalize_description(raw: &str) -> String {
    let mut current = collapse_whitespace(raw);
    loop {
        let next = normalize_pass(&current);
        if next == current {
            break;
        }
        current = next;
    }
    if current.is_empty() {
        collapse_whitespace(raw)
    } else {
        current
    }
}
