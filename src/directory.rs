use crate::types::ModelDescriptor;

/// Presents the resolved model set and reports the current selection.
pub trait ModelDirectory {
    fn populate(&mut self, models: &[ModelDescriptor]);

    fn selected_model(&self) -> Option<String>;
}

/// In-memory directory. Keeps the current selection across refreshes when the
/// model is still listed, otherwise selects the first entry.
#[derive(Debug, Default, Clone)]
pub struct ModelCatalog {
    models: Vec<ModelDescriptor>,
    selected: Option<String>,
}

impl ModelCatalog {
    pub fn new(preferred: Option<String>) -> Self {
        Self {
            models: Vec::new(),
            selected: preferred,
        }
    }

    pub fn models(&self) -> &[ModelDescriptor] {
        &self.models
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.iter().any(|m| m.name == name)
    }

    /// Returns false if `name` is not in the current listing.
    pub fn select(&mut self, name: &str) -> bool {
        if !self.contains(name) {
            return false;
        }
        self.selected = Some(name.to_string());
        true
    }
}

impl ModelDirectory for ModelCatalog {
    fn populate(&mut self, models: &[ModelDescriptor]) {
        self.models = models.to_vec();
        let keep = match &self.selected {
            Some(name) => self.contains(name),
            None => false,
        };
        if !keep {
            self.selected = self.models.first().map(|m| m.name.clone());
        }
        tracing::debug!(
            "Model directory populated with {} entries (selected: {:?})",
            self.models.len(),
            self.selected
        );
    }

    fn selected_model(&self) -> Option<String> {
        self.selected.clone()
    }
}
