//! OpenSearch index configuration and mappings.
//!
//! This module defines the index settings and mappings for the product index.

use serde_json::{json, Value};

/// The default name of the product index.
pub const DEFAULT_INDEX_NAME: &str = "products";

/// Configuration for the product index.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// The index name (used for all operations).
    pub name: String,
    /// Number of primary shards.
    pub number_of_shards: u32,
    /// Number of replicas per primary shard.
    pub number_of_replicas: u32,
}

impl IndexConfig {
    /// Create a new index configuration with 1 shard and 1 replica.
    ///
    /// # Arguments
    ///
    /// * `name` - The index name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            number_of_shards: 1,
            number_of_replicas: 1,
        }
    }

    /// Override the shard layout.
    pub fn with_shards(mut self, number_of_shards: u32, number_of_replicas: u32) -> Self {
        self.number_of_shards = number_of_shards;
        self.number_of_replicas = number_of_replicas;
        self
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self::new(DEFAULT_INDEX_NAME)
    }
}

/// Get the index settings and mappings for the product index.
///
/// The configuration includes:
/// - **Keyword fields**: identifiers, brand, color, locale and language for filtering
/// - **Text fields**: title, description, bullet points and the combined `search_text`
/// - **title.raw**: keyword subfield for exact matches and sorting on the title
pub fn get_index_settings(config: &IndexConfig) -> Value {
    json!({
        "settings": {
            "number_of_shards": config.number_of_shards,
            "number_of_replicas": config.number_of_replicas
        },
        "mappings": {
            "dynamic": "strict",
            "properties": {
                "product_id": {
                    "type": "keyword"
                },
                "product_title": {
                    "type": "text",
                    "fields": {
                        "raw": {
                            "type": "keyword",
                            "ignore_above": 512
                        }
                    }
                },
                "product_description": {
                    "type": "text"
                },
                "product_bullet_point": {
                    "type": "text"
                },
                "product_brand": {
                    "type": "keyword"
                },
                "product_color_name": {
                    "type": "keyword"
                },
                "product_locale": {
                    "type": "keyword"
                },
                "product_language": {
                    "type": "keyword"
                },
                "search_text": {
                    "type": "text"
                }
            }
        }
    })
}
