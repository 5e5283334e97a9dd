use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Canonical reservation-category keys. The set is open: source files may
/// introduce categories this table does not know about, and those pass
/// through verbatim (lowercased) with a warning attached to the file.
pub const OPEN: &str = "open";
pub const EWS: &str = "ews";
pub const OBC_NCL: &str = "obc-ncl";
pub const SC: &str = "sc";
pub const ST: &str = "st";

/// Synonym table mapping source spellings to canonical keys. New synonyms
/// are data here, not logic changes elsewhere.
static CATEGORY_SYNONYMS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("open", OPEN),
        ("general", OPEN),
        ("gen", OPEN),
        ("ur", OPEN),
        ("unreserved", OPEN),
        ("ews", EWS),
        ("gen ews", EWS),
        ("general ews", EWS),
        ("economically weaker section", EWS),
        ("obc", OBC_NCL),
        ("obc ncl", OBC_NCL),
        ("obc (ncl)", OBC_NCL),
        ("bc", OBC_NCL),
        ("other backward class", OBC_NCL),
        ("sc", SC),
        ("scheduled caste", SC),
        ("st", ST),
        ("scheduled tribe", ST),
    ])
});

/// Map a source category label to its canonical key. Returns the key and
/// whether the label was found in the synonym table; unmapped labels come
/// back lowercased verbatim so no data is discarded.
pub fn canonical_category(label: &str) -> (String, bool) {
    let folded = label
        .trim()
        .to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    match CATEGORY_SYNONYMS.get(folded.as_str()) {
        Some(canonical) => ((*canonical).to_string(), true),
        None => (label.trim().to_lowercase(), false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn obc_variants_map_to_obc_ncl() {
        for label in ["OBC", "obc-ncl", "OBC (NCL)", "Other Backward Class"] {
            assert_eq!(canonical_category(label), (OBC_NCL.to_string(), true));
        }
    }

    #[test]
    fn general_variants_map_to_open() {
        for label in ["General", "GEN", "UR", "Open", "unreserved"] {
            assert_eq!(canonical_category(label), (OPEN.to_string(), true));
        }
    }

    #[test]
    fn unmapped_label_passes_through_lowercased() {
        let (key, mapped) = canonical_category("PwD-Open");
        assert_eq!(key, "pwd-open");
        assert!(!mapped);
    }
}
