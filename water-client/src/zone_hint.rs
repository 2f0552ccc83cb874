//! Best-effort zone guess from a meter label.
//!
//! Only consulted for meters whose `zone` field is blank or `Unknown`. The
//! proposals are surfaced for data-quality review and never feed any
//! aggregate. The rule table mirrors naming conventions seen in the field
//! data and is not exhaustive.

/// A meter whose zone could not be taken from its own record.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ZoneInference {
    pub account_number: String,
    pub label: String,
    /// `None` when no rule matched.
    pub proposed_zone: Option<&'static str>,
}

enum Marker {
    /// A label word equal to this.
    Word(&'static str),
    /// A label word starting with this.
    Prefix(&'static str),
}

struct ZoneRule {
    zone: &'static str,
    markers: &'static [Marker],
}

// First match wins. 3B is listed before 3A because 3A's `z3-` prefix also
// covers the 3B villas.
const ZONE_RULES: &[ZoneRule] = &[
    ZoneRule {
        zone: "Zone_03_(B)",
        markers: &[
            Marker::Word("z3-3"),
            Marker::Word("z3-8"),
            Marker::Word("z3-12"),
            Marker::Prefix("d-52"),
            Marker::Prefix("d-53"),
            Marker::Prefix("d-54"),
        ],
    },
    ZoneRule {
        zone: "Zone_03_(A)",
        markers: &[
            Marker::Prefix("z3-"),
            Marker::Prefix("d-44"),
            Marker::Prefix("d-45"),
            Marker::Prefix("d-46"),
            Marker::Prefix("d-47"),
            Marker::Prefix("d-51"),
            Marker::Prefix("d-74"),
            Marker::Prefix("d-75"),
        ],
    },
    ZoneRule {
        zone: "Zone_05",
        markers: &[Marker::Prefix("z5-")],
    },
    ZoneRule {
        zone: "Zone_08",
        markers: &[Marker::Prefix("z8-")],
    },
    ZoneRule {
        zone: "Zone_01_(FM)",
        markers: &[
            Marker::Word("fm"),
            Marker::Word("b1"),
            Marker::Word("b2"),
            Marker::Word("b3"),
            Marker::Word("b4"),
            Marker::Word("b5"),
            Marker::Word("b6"),
            Marker::Word("b7"),
            Marker::Word("b8"),
            Marker::Prefix("cif"),
        ],
    },
    ZoneRule {
        zone: "Zone_VS",
        markers: &[
            Marker::Prefix("coffee"),
            Marker::Prefix("laundry"),
            Marker::Prefix("village"),
        ],
    },
    ZoneRule {
        zone: "Zone_SC",
        markers: &[Marker::Prefix("sale"), Marker::Prefix("caffe")],
    },
];

/// True when a recorded zone carries no information.
pub fn is_unassigned(zone: &str) -> bool {
    let zone = zone.trim();
    zone.is_empty() || zone.eq_ignore_ascii_case("unknown")
}

/// Propose a zone code for `label`, if any rule matches.
pub fn infer_zone(label: &str) -> Option<&'static str> {
    let lowered = label.to_ascii_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| c.is_whitespace() || c == '(' || c == ')' || c == ',')
        .filter(|w| !w.is_empty())
        .collect();

    ZONE_RULES
        .iter()
        .find(|rule| {
            rule.markers.iter().any(|marker| match marker {
                Marker::Word(w) => words.iter().any(|word| word == w),
                Marker::Prefix(p) => words.iter().any(|word| word.starts_with(p)),
            })
        })
        .map(|rule| rule.zone)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinguishes_3b_villas_from_3a() {
        assert_eq!(infer_zone("Z3-3 (Villa)"), Some("Zone_03_(B)"));
        assert_eq!(infer_zone("Z3-31 (Villa)"), Some("Zone_03_(A)"));
        assert_eq!(infer_zone("Z3-44(1A) (Building)"), Some("Zone_03_(A)"));
        assert_eq!(infer_zone("D-53 Building Bulk Meter"), Some("Zone_03_(B)"));
    }

    #[test]
    fn matches_words_not_substrings() {
        assert_eq!(infer_zone("Building B1"), Some("Zone_01_(FM)"));
        assert_eq!(infer_zone("Cabinet FM (CONTRACTORS OFFICE)"), Some("Zone_01_(FM)"));
        assert_eq!(infer_zone("Building B10 Annex"), None);
        assert_eq!(infer_zone("Hotel Main Building"), None);
    }

    #[test]
    fn unassigned_zones() {
        assert!(is_unassigned(""));
        assert!(is_unassigned(" Unknown "));
        assert!(!is_unassigned("Zone_05"));
    }
}
