use serde::{Deserialize, Serialize};

/// Identity of one reference card image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardLabel {
    /// Opaque card identifier (e.g. "sv3-125").
    pub id: String,

    /// Human-readable card name.
    pub name: String,
}

impl CardLabel {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Ordered labels; position i labels vector i of the paired index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelTable {
    labels: Vec<CardLabel>,
}

impl LabelTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, label: CardLabel) {
        self.labels.push(label);
    }

    pub fn get(&self, position: usize) -> Option<&CardLabel> {
        self.labels.get(position)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CardLabel> {
        self.labels.iter()
    }
}

impl From<Vec<CardLabel>> for LabelTable {
    fn from(labels: Vec<CardLabel>) -> Self {
        Self { labels }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_table_positions() {
        let mut t = LabelTable::new();
        t.push(CardLabel::new("a-1", "Alpha"));
        t.push(CardLabel::new("b-2", "Beta"));
        assert_eq!(t.len(), 2);
        assert_eq!(t.get(1).map(|l| l.id.as_str()), Some("b-2"));
        assert!(t.get(2).is_none());
    }

    #[test]
    fn card_label_json() {
        let json = serde_json::to_string(&CardLabel::new("x", "Name")).unwrap();
        assert_eq!(json, r#"{"id":"x","name":"Name"}"#);
    }
}
