//! Custom tool lifecycle, sandbox execution and the model-facing tool surface.
//!
//! [`CustomToolManager`] validates and persists user- and model-authored
//! tools, [`ExecutionBridge`] runs them through the sandbox, [`MetaTools`]
//! gives the model discovery and dispatch over the registry, and
//! [`ToolCatalog`] assembles a fresh registry per conversation.

#![warn(missing_docs, clippy::pedantic)]

mod bridge;
mod catalog;
mod custom;
mod manage;
mod meta;

pub use bridge::{
    DEFAULT_MAX_ARGUMENT_CHARS, DEFAULT_SANDBOX_TIMEOUT, ExecutionBridge, ToolDraft, ensure_payload,
};
pub use catalog::ToolCatalog;
pub use custom::{
    CreateOutcome, CreateToolInput, CustomToolManager, DEFAULT_CATEGORY, MAX_CATEGORY_LEN,
    MAX_CODE_LEN, MAX_DESCRIPTION_LEN, TOOL_LANGUAGE, ToolPatch, UpdateOutcome, base_name,
    definition_for, program_for,
};
pub use manage::{MANAGE_TOOL_NAMES, register_manage_tools};
pub use meta::{
    BATCH_USE_TOOL, GET_TOOL_HELP, INSPECT_TOOL_SOURCE, META_TOOL_NAMES, MetaTools, SEARCH_TOOLS,
    USE_TOOL, is_meta_tool, meta_tool_definitions,
};
