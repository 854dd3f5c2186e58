use crate::model::node::Section;

const FORBIDDEN: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

pub fn has_cjk(text: &str) -> bool {
    text.chars().any(|c| ('\u{4e00}'..='\u{9fff}').contains(&c))
}

/// Accepts or rejects one returned field value.
pub fn check_translation(section: Section, source: &str, translated: &str) -> Result<(), String> {
    let t = translated.trim();
    if t.is_empty() {
        return Err("empty translation".into());
    }

    if section == Section::Tooltips {
        return if has_cjk(t) {
            Ok(())
        } else {
            Err(format!("tooltip has no Chinese text: {t}"))
        };
    }

    if t == source.trim() {
        return Ok(());
    }
    if !has_cjk(t) {
        return Err(format!("no Chinese text in {t:?}"));
    }
    if let Some(c) = t.chars().find(|c| FORBIDDEN.contains(c)) {
        return Err(format!("forbidden character {c:?} in {t:?}"));
    }
    if section.is_label() {
        let limit = 3 * source.chars().count() + 10;
        if t.chars().count() > limit {
            return Err(format!("label longer than {limit} characters"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_need_cjk_or_identity() {
        assert!(check_translation(Section::Widgets, "seed", "随机种子").is_ok());
        assert!(check_translation(Section::Outputs, "VAE", "VAE").is_ok());
        assert!(check_translation(Section::Widgets, "seed", "Seed value").is_err());
        assert!(check_translation(Section::Inputs, "path", "路径/文件").is_err());
        assert!(check_translation(Section::Title, "Loader", "").is_err());
    }

    #[test]
    fn label_length_is_bounded() {
        let long = "很".repeat(17);
        assert!(check_translation(Section::Inputs, "ab", &long).is_err());
        assert!(check_translation(Section::Inputs, "ab", &"很".repeat(16)).is_ok());
        assert!(check_translation(Section::Inputs, "ab", "很长的标签").is_ok());
        // titles are not length-bounded
        assert!(check_translation(Section::Title, "ab", &long).is_ok());
    }

    #[test]
    fn tooltips_need_cjk_even_when_unchanged() {
        assert!(check_translation(Section::Tooltips, "The seed", "The seed").is_err());
        assert!(check_translation(Section::Tooltips, "The seed", "随机种子").is_ok());
    }
}
