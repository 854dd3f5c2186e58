//! Standard terms applied to label fields before any request is sent.

use std::collections::BTreeMap;

pub mod matcher;
pub mod model;
pub mod normalize;
pub mod tables;

pub use model::GlossaryHit;

#[derive(Debug, Clone, Default)]
pub struct Glossary {
    user_terms: Vec<(String, String)>,
}

impl Glossary {
    /// `extra` comes from the `glossary` section of the config.
    pub fn new(extra: &BTreeMap<String, String>) -> Self {
        let user_terms = extra
            .iter()
            .map(|(k, v)| (normalize::normalize(k), v.trim().to_string()))
            .filter(|(k, v)| !k.is_empty() && !v.is_empty())
            .collect();
        Glossary { user_terms }
    }

    pub fn lookup_label(&self, name: &str) -> Option<GlossaryHit> {
        matcher::lookup_label(&self.user_terms, name)
    }

    /// Chinese rendering of a raw type-name value, for repairing loader files.
    pub fn type_name_translation(value: &str) -> Option<&'static str> {
        tables::lookup(tables::TYPE_NAMES, value.trim())
    }

    pub fn is_preserved_type(value: &str) -> bool {
        tables::PRESERVED_TYPES.contains(&value.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserved_types_keep_their_name() {
        let g = Glossary::default();
        assert_eq!(g.lookup_label("IMAGE"), Some(GlossaryHit::Preserved("IMAGE".into())));
        assert_eq!(g.lookup_label("image"), Some(GlossaryHit::Term("图像".into())));
    }

    #[test]
    fn composites_and_body_parts() {
        let g = Glossary::default();
        assert_eq!(g.lookup_label("l_eye").map(|h| h.text().to_string()).as_deref(), Some("左眼睛"));
        assert_eq!(g.lookup_label("brow_r").map(|h| h.text().to_string()).as_deref(), Some("右眉毛"));
        assert_eq!(g.lookup_label("hair").map(|h| h.text().to_string()).as_deref(), Some("头发"));
        assert_eq!(g.lookup_label("seed"), None);
    }

    #[test]
    fn user_terms_override_builtin_table() {
        let mut extra = BTreeMap::new();
        extra.insert("Image".to_string(), "图片".to_string());
        extra.insert("cfg".to_string(), "引导系数".to_string());
        let g = Glossary::new(&extra);
        assert_eq!(g.lookup_label("image"), Some(GlossaryHit::Term("图片".into())));
        assert_eq!(g.lookup_label("CFG"), Some(GlossaryHit::Term("引导系数".into())));
    }

    #[test]
    fn type_name_repairs() {
        assert_eq!(Glossary::type_name_translation("LATENT"), Some("潜在空间"));
        assert_eq!(Glossary::type_name_translation("seed"), None);
    }
}
