//! Canonical path addressing for things and thing/band pairs.
//!
//! `channel` and `unchannel` are pure inverses for any path `channel`
//! builds: segment values are percent-encoded so ids containing reserved
//! characters stay distinguishable from path structure.

use std::borrow::Cow;

use percent_encoding::{percent_decode_str, percent_encode, AsciiSet, CONTROLS};

/// Characters that must not appear raw inside a channel segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b'/')
    .add(b'$')
    .add(b'%')
    .add(b'#')
    .add(b'.')
    .add(b']')
    .add(b'[');

/// Addressing configuration shared by the HTTP surface and the long-poll
/// delivery map.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Mount prefix, stored without a trailing slash; empty means root.
    pub prefix: String,
}

impl ChannelConfig {
    pub fn new(prefix: impl Into<String>) -> Self {
        let mut prefix = prefix.into();
        while prefix.ends_with('/') {
            prefix.pop();
        }
        Self { prefix }
    }
}

/// Build the canonical path for the given segments under the configured
/// prefix. With no segments this is the prefix itself (or `/` at root).
pub fn channel(config: &ChannelConfig, segments: &[&str]) -> String {
    let mut path = config.prefix.clone();
    for segment in segments {
        path.push('/');
        path.push_str(&percent_encode(segment.as_bytes(), SEGMENT).to_string());
    }
    if path.is_empty() {
        path.push('/');
    }
    path
}

/// Split a path built by [`channel`] back into its decoded segments.
///
/// Returns `None` when the path does not live under the configured prefix
/// or a segment is not valid UTF-8 after decoding.
pub fn unchannel(config: &ChannelConfig, path: &str) -> Option<Vec<String>> {
    let rest = path.strip_prefix(config.prefix.as_str())?;
    if rest.is_empty() {
        return Some(Vec::new());
    }
    let rest = rest.strip_prefix('/')?;
    if rest.is_empty() {
        return Some(Vec::new());
    }
    rest.split('/')
        .map(|segment| {
            percent_decode_str(segment)
                .decode_utf8()
                .ok()
                .map(Cow::into_owned)
        })
        .collect()
}
