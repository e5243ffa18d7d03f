//! README rendering collaborator.

use pkgcrawl_provider::{ReadmeFormat, ReadmeInfo};

use crate::error::Result;

/// Turns a fetched README into HTML for the catalog.
pub trait ReadmeRenderer: Send + Sync {
    fn render(&self, readme: &ReadmeInfo) -> Result<String>;
}

/// Renders every format as escaped preformatted text.
///
/// Sites with a real markup pipeline plug in their own renderer.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlainRenderer;

impl ReadmeRenderer for PlainRenderer {
    fn render(&self, readme: &ReadmeInfo) -> Result<String> {
        let class = match readme.format {
            ReadmeFormat::Markdown => "markdown",
            ReadmeFormat::Textile => "textile",
            ReadmeFormat::Creole => "creole",
            ReadmeFormat::Rst => "rst",
            ReadmeFormat::Text => "txt",
        };
        Ok(format!(
            "<pre class=\"readme {class}\">{}</pre>",
            escape_html(&readme.contents)
        ))
    }
}

pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}
