//! The product catalogue schema and its default pipeline.

use std::collections::HashMap;

use product_indexer_shared::RecordSchema;
use serde_json::Value;

use super::manager::{PipelineError, PipelineManager};
use super::stage::PipelineStage;
use super::stages::{
    ConcatFieldsStage, CopyFieldStage, IdentifierStage, LookupStage, MissingPolicy,
    StripMarkupStage,
};

pub const PRODUCT_ID: &str = "product_id";
pub const PRODUCT_TITLE: &str = "product_title";
pub const PRODUCT_DESCRIPTION: &str = "product_description";
pub const PRODUCT_BULLET_POINT: &str = "product_bullet_point";
pub const PRODUCT_BRAND: &str = "product_brand";
pub const PRODUCT_COLOR_NAME: &str = "product_color_name";
pub const PRODUCT_LOCALE: &str = "product_locale";
pub const PRODUCT_LANGUAGE: &str = "product_language";
pub const SEARCH_TEXT: &str = "search_text";

/// Columns of a product catalogue line.
pub fn product_schema() -> RecordSchema {
    RecordSchema::new([
        PRODUCT_ID,
        PRODUCT_TITLE,
        PRODUCT_DESCRIPTION,
        PRODUCT_BULLET_POINT,
        PRODUCT_BRAND,
        PRODUCT_COLOR_NAME,
        PRODUCT_LOCALE,
    ])
}

/// Catalogue locale to analyzer language.
pub fn locale_languages() -> HashMap<String, String> {
    [("jp", "ja"), ("us", "en"), ("es", "es")]
        .into_iter()
        .map(|(locale, language)| (locale.to_string(), language.to_string()))
        .collect()
}

/// Stages of the default product pipeline, in order.
pub fn product_stages() -> Vec<Box<dyn PipelineStage>> {
    let empty = || MissingPolicy::Default(Value::String(String::new()));

    vec![
        Box::new(IdentifierStage::new(PRODUCT_ID)),
        Box::new(CopyFieldStage::new(PRODUCT_TITLE, MissingPolicy::Fail)),
        Box::new(CopyFieldStage::new(PRODUCT_BRAND, MissingPolicy::Default(Value::Null))),
        Box::new(CopyFieldStage::new(
            PRODUCT_COLOR_NAME,
            MissingPolicy::Default(Value::Null),
        )),
        Box::new(CopyFieldStage::new(PRODUCT_LOCALE, MissingPolicy::Default(Value::Null))),
        Box::new(StripMarkupStage::new(PRODUCT_DESCRIPTION, empty())),
        Box::new(StripMarkupStage::new(PRODUCT_BULLET_POINT, empty())),
        Box::new(LookupStage::new(
            PRODUCT_LOCALE,
            PRODUCT_LANGUAGE,
            locale_languages(),
        )),
        Box::new(ConcatFieldsStage::new(
            [
                PRODUCT_TITLE,
                PRODUCT_BRAND,
                PRODUCT_DESCRIPTION,
                PRODUCT_BULLET_POINT,
            ],
            SEARCH_TEXT,
            " ",
        )),
    ]
}

/// The default product pipeline, checked against [`product_schema`].
pub fn product_pipeline() -> Result<PipelineManager, PipelineError> {
    let pipeline = PipelineManager::new(product_stages())?;
    pipeline.validate_against(&product_schema())?;
    Ok(pipeline)
}
