use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Built-in default catalog. Entries here are available unless the operator
/// overrides them; a model absent from the table is unrestricted.
pub const DEFAULT_MODELS: &[&str] = &[
    "gpt-4",
    "gpt-4-32k",
    "gpt-4-turbo-preview",
    "gpt-4-vision-preview",
    "gpt-3.5-turbo",
    "gpt-3.5-turbo-16k",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelEntry {
    pub available: bool,
    pub in_default_catalog: bool,
}

/// Process-wide model allow/deny table.
///
/// Built once at startup from the default catalog merged with the operator
/// override list, then shared read-only with every request handler.
#[derive(Debug, Clone, Default)]
pub struct ModelTable {
    entries: HashMap<String, ModelEntry>,
}

impl ModelTable {
    /// Override grammar: comma-separated tokens, `+name` marks available,
    /// `-name` marks unavailable, a bare `name` marks available. Later
    /// tokens win over earlier ones and over the default catalog.
    pub fn build(custom_models: Option<&str>) -> Self {
        let mut entries = HashMap::new();
        for name in DEFAULT_MODELS {
            entries.insert(
                (*name).to_string(),
                ModelEntry {
                    available: true,
                    in_default_catalog: true,
                },
            );
        }

        for token in custom_models
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
        {
            let (name, available) = match token.split_at_checked(1) {
                Some(("+", name)) => (name, true),
                Some(("-", name)) => (name, false),
                _ => (token, true),
            };
            let in_default_catalog = entries
                .get(name)
                .is_some_and(|entry| entry.in_default_catalog);
            entries.insert(
                name.to_string(),
                ModelEntry {
                    available,
                    in_default_catalog,
                },
            );
        }

        Self { entries }
    }

    /// Marks every known model with the prefix unavailable and denies the
    /// bare prefix itself. Used for operator feature-disable flags.
    pub fn with_prefix_denied(mut self, prefix: &str) -> Self {
        for (name, entry) in self.entries.iter_mut() {
            if name.starts_with(prefix) {
                entry.available = false;
            }
        }
        self.entries
            .entry(prefix.to_string())
            .and_modify(|entry| entry.available = false)
            .or_insert(ModelEntry {
                available: false,
                in_default_catalog: false,
            });
        self
    }

    pub fn get(&self, model: &str) -> Option<ModelEntry> {
        self.entries.get(model).copied()
    }

    /// Explicitly denied models. A lookup miss is "no restriction".
    pub fn is_denied(&self, model: &str) -> bool {
        self.get(model).is_some_and(|entry| !entry.available)
    }
}

/// Upstream model-listing response shape, passed through after filtering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListModelsResponse {
    pub object: String,
    pub data: Vec<ListedModel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListedModel {
    pub id: String,
    #[serde(flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}

/// Removes catalog entries whose id starts with an operator-disabled prefix.
pub fn filter_model_listing(mut listing: ListModelsResponse, disabled_prefixes: &[&str]) -> ListModelsResponse {
    listing.data.retain(|model| {
        !disabled_prefixes
            .iter()
            .any(|prefix| model.id.starts_with(prefix))
    });
    listing
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_models_are_available() {
        let table = ModelTable::build(None);
        assert_eq!(
            table.get("gpt-4"),
            Some(ModelEntry {
                available: true,
                in_default_catalog: true,
            })
        );
        assert!(table.get("unknown-model").is_none());
    }

    #[test]
    fn minus_token_marks_a_model_unavailable() {
        let table = ModelTable::build(Some("-gpt-4,+my-fine-tune"));
        assert!(table.is_denied("gpt-4"));
        assert!(!table.is_denied("my-fine-tune"));
        // A miss is "no restriction", not a denial.
        assert!(!table.is_denied("unlisted-model"));
    }

    #[test]
    fn later_tokens_override_earlier_ones() {
        let table = ModelTable::build(Some("-gpt-4,+gpt-4"));
        assert!(!table.is_denied("gpt-4"));
    }

    #[test]
    fn bare_token_marks_available_and_empty_tokens_are_ignored() {
        let table = ModelTable::build(Some(" , my-model ,,"));
        assert_eq!(
            table.get("my-model").map(|entry| entry.available),
            Some(true)
        );
    }

    #[test]
    fn prefix_denial_covers_catalog_variants() {
        let table = ModelTable::build(None).with_prefix_denied("gpt-4");
        assert!(table.is_denied("gpt-4"));
        assert!(table.is_denied("gpt-4-32k"));
        assert!(!table.is_denied("gpt-3.5-turbo"));
    }

    #[test]
    fn listing_filter_removes_disabled_prefixes() {
        let listing: ListModelsResponse = serde_json::from_value(serde_json::json!({
            "object": "list",
            "data": [
                { "id": "gpt-4", "object": "model" },
                { "id": "gpt-3.5-turbo", "object": "model" },
            ]
        }))
        .unwrap();
        let filtered = filter_model_listing(listing, &["gpt-4"]);
        let ids: Vec<_> = filtered.data.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["gpt-3.5-turbo"]);
    }

    #[test]
    fn listing_filter_keeps_unknown_fields_intact() {
        let listing: ListModelsResponse = serde_json::from_value(serde_json::json!({
            "object": "list",
            "data": [{ "id": "gpt-3.5-turbo", "object": "model", "owned_by": "openai" }]
        }))
        .unwrap();
        let filtered = filter_model_listing(listing, &["gpt-4"]);
        let round_trip = serde_json::to_value(&filtered).unwrap();
        assert_eq!(round_trip["data"][0]["owned_by"], "openai");
    }
}
