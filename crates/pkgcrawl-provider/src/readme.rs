//! Downloads README files referenced by package records.

use std::{fmt, path::Path};

use crate::{
    error::{ProviderError, Result},
    provider::ProviderContext,
};
use pkgcrawl_fetch::FetchError;
use tracing::trace;

/// Markup language of a README, derived from its file extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadmeFormat {
    Markdown,
    Textile,
    Creole,
    Rst,
    Text,
}

impl ReadmeFormat {
    pub fn from_filename(filename: &str) -> Self {
        let extension = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "md" | "mkd" | "mdown" | "markdown" => ReadmeFormat::Markdown,
            "textile" => ReadmeFormat::Textile,
            "creole" => ReadmeFormat::Creole,
            "rst" => ReadmeFormat::Rst,
            _ => ReadmeFormat::Text,
        }
    }
}

impl fmt::Display for ReadmeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReadmeFormat::Markdown => "markdown",
            ReadmeFormat::Textile => "textile",
            ReadmeFormat::Creole => "creole",
            ReadmeFormat::Rst => "rst",
            ReadmeFormat::Text => "txt",
        };
        write!(f, "{name}")
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadmeInfo {
    pub filename: String,
    pub format: ReadmeFormat,
    pub contents: String,
}

pub struct ReadmeClient<'a> {
    ctx: &'a ProviderContext,
}

impl<'a> ReadmeClient<'a> {
    pub fn new(ctx: &'a ProviderContext) -> Self {
        Self { ctx }
    }

    /// Fetches the README at `url`. A missing file is `Ok(None)`.
    pub fn readme_info(&self, url: &str) -> Result<Option<ReadmeInfo>> {
        let filename = url
            .split(['?', '#'])
            .next()
            .and_then(|u| u.rsplit('/').next())
            .filter(|f| !f.is_empty())
            .unwrap_or("README")
            .to_string();

        let body = match self.ctx.fetcher.fetch(url) {
            Ok(body) => body,
            Err(FetchError::NotFound { .. }) => return Ok(None),
            Err(err) => return Err(ProviderError::Fetch(err)),
        };

        trace!("Fetched README {} ({} bytes)", url, body.len());
        Ok(Some(ReadmeInfo {
            format: ReadmeFormat::from_filename(&filename),
            filename,
            contents: String::from_utf8_lossy(&body).into_owned(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hosting::test_support::context;

    #[test]
    fn test_format_from_filename() {
        assert_eq!(ReadmeFormat::from_filename("README.md"), ReadmeFormat::Markdown);
        assert_eq!(ReadmeFormat::from_filename("readme.MARKDOWN"), ReadmeFormat::Markdown);
        assert_eq!(ReadmeFormat::from_filename("README.rst"), ReadmeFormat::Rst);
        assert_eq!(ReadmeFormat::from_filename("README.textile"), ReadmeFormat::Textile);
        assert_eq!(ReadmeFormat::from_filename("README.creole"), ReadmeFormat::Creole);
        assert_eq!(ReadmeFormat::from_filename("README"), ReadmeFormat::Text);
        assert_eq!(ReadmeFormat::Text.to_string(), "txt");
    }

    #[test]
    fn test_readme_info() {
        let (transport, ctx) = context();
        let url = "https://raw.githubusercontent.com/foo/bar/main/README.md";
        transport.insert(url, pkgcrawl_fetch::RawResponse::new(200, "# Bar"));

        let client = ReadmeClient::new(&ctx);
        let info = client.readme_info(url).unwrap().unwrap();
        assert_eq!(info.filename, "README.md");
        assert_eq!(info.format, ReadmeFormat::Markdown);
        assert_eq!(info.contents, "# Bar");

        let missing = client
            .readme_info("https://raw.githubusercontent.com/foo/bar/main/README.rst")
            .unwrap();
        assert!(missing.is_none());
    }
}
