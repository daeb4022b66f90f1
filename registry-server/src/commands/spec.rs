//! Command to generate the OpenAPI document and write it to a file or stdout.

use crate::openapi::ApiDoc;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use utoipa::OpenApi;

/// Output selected by the `spec` subcommand argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecTarget<'a> {
    StdoutYaml,
    StdoutJson,
    File(&'a Path),
}

impl<'a> SpecTarget<'a> {
    /// `None` and `"yaml"` stream YAML, `"json"` streams JSON, anything else
    /// is treated as a file path.
    #[must_use]
    pub fn from_arg(arg: Option<&'a str>) -> Self {
        match arg {
            None | Some("yaml") => Self::StdoutYaml,
            Some("json") => Self::StdoutJson,
            Some(path) => Self::File(Path::new(path)),
        }
    }
}

/// Renders the document; a `.json` extension selects JSON, anything else YAML.
///
/// # Errors
/// Returns an error if serialization fails.
pub fn render_for_path(path: &Path) -> Result<String, Box<dyn std::error::Error>> {
    let openapi = ApiDoc::openapi();
    let rendered = match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => openapi.to_pretty_json()?,
        _ => openapi.to_yaml()?,
    };
    Ok(rendered)
}

/// Generates the OpenAPI document and writes it where `output_path` says.
///
/// # Errors
/// Returns an error if serialization or writing fails.
pub fn generate_spec(output_path: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let openapi = ApiDoc::openapi();

    match SpecTarget::from_arg(output_path) {
        SpecTarget::StdoutJson => {
            io::stdout().write_all(openapi.to_pretty_json()?.as_bytes())?;
        }
        SpecTarget::StdoutYaml => {
            io::stdout().write_all(openapi.to_yaml()?.as_bytes())?;
        }
        SpecTarget::File(path) => {
            fs::write(path, render_for_path(path)?)?;
            println!("OpenAPI spec written to {}", path.display());
        }
    }

    Ok(())
}
