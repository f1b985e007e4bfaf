use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tera::{Context, Error as TeraError, Tera};

use crate::models::tool::Tool;
use crate::resources::NetworkConfig;

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");
const BUNDLED_KNOWLEDGE: &str = include_str!("prompts/knowledge.md");

pub fn load_prompt<T: Serialize>(template: &str, context_data: &T) -> Result<String, TeraError> {
    let mut tera = Tera::default();
    tera.add_raw_template("inline_template", template)?;
    let context = Context::from_serialize(context_data)?;
    let rendered = tera.render("inline_template", &context)?;
    Ok(rendered)
}

pub fn load_prompt_file<T: Serialize>(
    template_file: impl Into<PathBuf>,
    context_data: &T,
) -> Result<String, TeraError> {
    let template_path = template_file.into();
    let template_content = fs::read_to_string(&template_path).map_err(|e| {
        TeraError::chain(
            format!("Failed to read template file {}", template_path.display()),
            e,
        )
    })?;
    load_prompt(&template_content, context_data)
}

/// Knowledge base text: the file at `path` if given, otherwise the bundled document
pub fn load_knowledge(path: Option<&Path>) -> std::io::Result<String> {
    match path {
        Some(path) => fs::read_to_string(path),
        None => Ok(BUNDLED_KNOWLEDGE.to_string()),
    }
}

#[derive(Serialize)]
struct SystemPromptContext<'a> {
    tools: &'a [Tool],
    network: &'a NetworkConfig,
    knowledge: &'a str,
}

/// Renders the system prompt once; the result is reused for every conversation
pub fn system_prompt(
    tools: &[Tool],
    network: &NetworkConfig,
    knowledge: &str,
) -> Result<String, TeraError> {
    let context = SystemPromptContext {
        tools,
        network,
        knowledge: knowledge.trim(),
    };
    Ok(load_prompt(SYSTEM_TEMPLATE, &context)?.trim().to_string())
}
