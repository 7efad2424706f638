//! JSON pipeline files.

use docflow_core::config::EngineConfig;

use super::{ParsedPipeline, PipelineFile};
use crate::error::Result;

/// Parse a JSON pipeline file. `base` is the config the file's overrides
/// apply on top of (env or defaults).
pub fn parse_json_pipeline(src: &str, base: &EngineConfig) -> Result<ParsedPipeline> {
    let file: PipelineFile = serde_json::from_str(src)?;
    file.into_parsed(base)
}
