use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{info, instrument};
use validator::Validate;

use crate::errors::ServiceError;
use crate::models::Category;

/// Work-order categories keyed by code.
#[derive(Debug, Default)]
pub struct CategoryRegistry {
    categories: DashMap<String, Category>,
}

impl CategoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    #[instrument(skip(self, category), fields(code = %category.code))]
    pub fn register(&self, category: Category) -> Result<Category, ServiceError> {
        category.validate()?;
        match self.categories.entry(category.code.clone()) {
            Entry::Occupied(_) => Err(ServiceError::ValidationError(format!(
                "code: category '{}' already exists",
                category.code
            ))),
            Entry::Vacant(vacant) => {
                vacant.insert(category.clone());
                info!("Category registered");
                Ok(category)
            }
        }
    }

    pub fn get(&self, code: &str) -> Result<Category, ServiceError> {
        self.categories
            .get(code)
            .map(|c| c.clone())
            .ok_or_else(|| ServiceError::not_found("category", code))
    }

    pub fn contains(&self, code: &str) -> bool {
        self.categories.contains_key(code)
    }

    pub fn list(&self) -> Vec<Category> {
        let mut all: Vec<Category> = self.categories.iter().map(|c| c.clone()).collect();
        all.sort_by(|a, b| a.code.cmp(&b.code));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn category(code: &str) -> Category {
        Category {
            code: code.to_string(),
            name: format!("Category {}", code),
            description: None,
        }
    }

    #[test]
    fn duplicate_codes_are_validation_errors() {
        let registry = CategoryRegistry::new();
        registry.register(category("BRK")).unwrap();
        assert_matches!(
            registry.register(category("BRK")),
            Err(ServiceError::ValidationError(msg)) if msg.contains("BRK")
        );
        assert_eq!(registry.list().len(), 1);
    }

    #[test]
    fn blank_codes_are_rejected() {
        let registry = CategoryRegistry::new();
        assert_matches!(registry.register(category("")), Err(ServiceError::ValidationError(_)));
    }

    #[test]
    fn unknown_codes_are_not_found() {
        assert_matches!(CategoryRegistry::new().get("ENG"), Err(ServiceError::NotFound(_)));
    }
}
