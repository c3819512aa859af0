//! Shared utility functions for selfmod.

pub mod json_extraction;

pub use json_extraction::{
    extract_from_json_code_block, extract_last_valid_json_object, find_matching_brace,
    try_extract_json_object, JsonExtractionResult,
};
