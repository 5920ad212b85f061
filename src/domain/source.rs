use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered subscription: one remote configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl Source {
    pub fn new(url: String, name: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            url,
            name: name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
        }
    }

    /// Label used to namespace this source's proxies and groups.
    ///
    /// `position` is the 1-based index of the source in its list and only
    /// matters when the source has no name.
    pub fn label(&self, position: usize) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| default_label(position))
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.url)
    }
}

pub fn default_label(position: usize) -> String {
    format!("sub{}", position)
}
