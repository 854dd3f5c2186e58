use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum GlossaryHit {
    /// Type name kept verbatim.
    Preserved(String),
    Term(String),
}

impl GlossaryHit {
    pub fn text(&self) -> &str {
        match self {
            GlossaryHit::Preserved(t) | GlossaryHit::Term(t) => t,
        }
    }
}
