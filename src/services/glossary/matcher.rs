use super::model::GlossaryHit;
use super::normalize::normalize;
use super::tables::{self, BODY_PARTS, COMMON_TRANSLATIONS, DIRECTION_PREFIXES, DIRECTION_SUFFIXES, PRESERVED_TYPES};

/// Exact-match lookup of one label name. User terms are checked first.
pub fn lookup_label(user_terms: &[(String, String)], name: &str) -> Option<GlossaryHit> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return None;
    }
    let norm = normalize(trimmed);

    if let Some((_, v)) = user_terms.iter().find(|(k, _)| *k == norm) {
        return Some(GlossaryHit::Term(v.clone()));
    }

    // only the upper-case spelling is a type name; `image` is a term
    if PRESERVED_TYPES.contains(&trimmed) {
        return Some(GlossaryHit::Preserved(trimmed.to_string()));
    }

    if let Some(v) = tables::lookup(COMMON_TRANSLATIONS, &norm) {
        return Some(GlossaryHit::Term(v.to_string()));
    }

    if let Some(v) = tables::lookup(BODY_PARTS, trimmed) {
        return Some(GlossaryHit::Term(v.to_string()));
    }

    direction_composite(trimmed).map(GlossaryHit::Term)
}

/// `l_eye` / `eye_l` style names.
fn direction_composite(name: &str) -> Option<String> {
    for (prefix, dir) in DIRECTION_PREFIXES {
        if let Some(base) = name.strip_prefix(prefix) {
            if let Some(part) = tables::lookup(BODY_PARTS, base) {
                return Some(format!("{dir}{part}"));
            }
        }
    }
    for (suffix, dir) in DIRECTION_SUFFIXES {
        if let Some(base) = name.strip_suffix(suffix) {
            if let Some(part) = tables::lookup(BODY_PARTS, base) {
                return Some(format!("{dir}{part}"));
            }
        }
    }
    None
}
