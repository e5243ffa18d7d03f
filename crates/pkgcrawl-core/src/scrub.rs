//! Removes API credentials from error text before it is stored.

use std::collections::BTreeMap;

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use pkgcrawl_config::channel::ChannelConfig;
use regex::Regex;
use tracing::warn;

/// Strips configured query-string secrets and maps local paths to their
/// canonical form.
pub struct SecretScrubber {
    patterns: Vec<Regex>,
    channel: ChannelConfig,
}

impl SecretScrubber {
    pub fn new(
        query_string_params: &BTreeMap<String, BTreeMap<String, String>>,
        channel: ChannelConfig,
    ) -> Self {
        let mut patterns = Vec::new();
        for params in query_string_params.values() {
            for (name, value) in params {
                let encoded = utf8_percent_encode(value, NON_ALPHANUMERIC).to_string();
                let mut values = vec![regex::escape(value)];
                if encoded != *value {
                    values.push(regex::escape(&encoded));
                }

                let pattern = format!("[?&]{}=(?:{})", regex::escape(name), values.join("|"));
                match Regex::new(&pattern) {
                    Ok(regex) => patterns.push(regex),
                    Err(err) => warn!("Not scrubbing query param {}: {}", name, err),
                }
            }
        }
        Self {
            patterns,
            channel,
        }
    }

    pub fn scrub(&self, message: &str) -> String {
        let mut cleaned = message.to_string();
        for pattern in &self.patterns {
            cleaned = pattern.replace_all(&cleaned, "").into_owned();
        }
        self.channel.to_canonical(&cleaned)
    }
}
