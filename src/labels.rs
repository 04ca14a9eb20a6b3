//! Per-project label registry and selection state.

/// A named category scoped to the active project.
#[derive(Clone, Debug, PartialEq)]
pub struct Label {
    pub id: i64,
    pub name: String,
}

/// Why a new label name was rejected before reaching the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LabelInputError {
    Empty,
    Duplicate,
}

/// Labels available for the active project plus the current selection. The
/// selection gates drawing: no gesture can start without one.
#[derive(Debug, Default)]
pub struct LabelRegistry {
    labels: Vec<Label>,
    selected: Option<String>,
}

impl LabelRegistry {
    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn id_of(&self, name: &str) -> Option<i64> {
        self.labels.iter().find(|l| l.name == name).map(|l| l.id)
    }

    /// Replace the registry contents from a fresh server fetch. The current
    /// selection survives only if the name is still present.
    pub fn replace(&mut self, labels: Vec<Label>) {
        self.labels = labels;
        if let Some(sel) = &self.selected {
            if !self.labels.iter().any(|l| &l.name == sel) {
                self.selected = None;
            }
        }
    }

    /// Validate a candidate label name: trimmed, non-empty, and not already
    /// present (case-sensitive exact match). Returns the trimmed name.
    pub fn validate_new(&self, raw: &str) -> Result<String, LabelInputError> {
        let name = raw.trim();
        if name.is_empty() {
            return Err(LabelInputError::Empty);
        }
        if self.labels.iter().any(|l| l.name == name) {
            return Err(LabelInputError::Duplicate);
        }
        Ok(name.to_owned())
    }

    /// Select a label by name; unknown names are ignored.
    pub fn select(&mut self, name: &str) {
        if self.labels.iter().any(|l| l.name == name) {
            self.selected = Some(name.to_owned());
        }
    }

    pub fn deselect(&mut self) {
        self.selected = None;
    }

    /// Remove a label locally, clearing the selection if it matched. The
    /// caller is responsible for the remote delete and for cascading to
    /// annotations.
    pub fn remove(&mut self, name: &str) {
        self.labels.retain(|l| l.name != name);
        if self.selected.as_deref() == Some(name) {
            self.selected = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(names: &[(i64, &str)]) -> LabelRegistry {
        let mut reg = LabelRegistry::default();
        reg.replace(
            names
                .iter()
                .map(|(id, name)| Label {
                    id: *id,
                    name: (*name).to_owned(),
                })
                .collect(),
        );
        reg
    }

    #[test]
    fn new_names_are_trimmed() {
        let reg = registry_with(&[(1, "cat")]);
        assert_eq!(reg.validate_new("  dog "), Ok("dog".to_owned()));
    }

    #[test]
    fn blank_names_are_rejected() {
        let reg = LabelRegistry::default();
        assert_eq!(reg.validate_new("   "), Err(LabelInputError::Empty));
        assert_eq!(reg.validate_new(""), Err(LabelInputError::Empty));
    }

    #[test]
    fn duplicates_are_rejected_case_sensitively() {
        let reg = registry_with(&[(1, "cat")]);
        assert_eq!(reg.validate_new("cat"), Err(LabelInputError::Duplicate));
        assert_eq!(reg.validate_new(" cat "), Err(LabelInputError::Duplicate));
        // A different case is a different label.
        assert_eq!(reg.validate_new("Cat"), Ok("Cat".to_owned()));
    }

    #[test]
    fn selection_requires_a_known_name() {
        let mut reg = registry_with(&[(1, "cat")]);
        reg.select("dog");
        assert_eq!(reg.selected(), None);
        reg.select("cat");
        assert_eq!(reg.selected(), Some("cat"));
    }

    #[test]
    fn refresh_keeps_selection_only_when_still_present() {
        let mut reg = registry_with(&[(1, "cat"), (2, "dog")]);
        reg.select("dog");
        reg.replace(vec![Label {
            id: 2,
            name: "dog".to_owned(),
        }]);
        assert_eq!(reg.selected(), Some("dog"));
        reg.replace(vec![Label {
            id: 1,
            name: "cat".to_owned(),
        }]);
        assert_eq!(reg.selected(), None);
    }

    #[test]
    fn removing_the_selected_label_clears_selection() {
        let mut reg = registry_with(&[(1, "cat"), (2, "dog")]);
        reg.select("cat");
        reg.remove("cat");
        assert_eq!(reg.selected(), None);
        assert_eq!(reg.labels().len(), 1);
        assert_eq!(reg.id_of("dog"), Some(2));
        assert_eq!(reg.id_of("cat"), None);
    }
}
