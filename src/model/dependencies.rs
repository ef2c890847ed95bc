use once_cell::sync::Lazy;
use regex::Regex;

use super::{Asset, AssetId, Model};
use crate::core::error::Result;

#[allow(clippy::expect_used)] // constant patterns
static REQUIRE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"require\(\s*["']([^"']+)["']\s*\)"#).expect("require pattern is valid")
});

#[allow(clippy::expect_used)] // constant patterns
static COMMON_JS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(^|[^.\w$])(module\.exports|exports\.[\w$]+)\s*=")
        .expect("exports pattern is valid")
});

const ALIAS_PREFIX: &str = "alias!";

/// One outgoing reference found in the text of an asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyRef {
    /// A `require()` of a module, relative paths already resolved.
    Require(String),
    /// A `require('alias!<name>')`.
    Alias(String),
    /// A fully-qualified class name of a known source module, only used from
    /// inside function bodies.
    Class(AssetId),
    /// A class name used while the referring code is defined, e.g. in a
    /// top-level `extend()` call. The target must be loaded first.
    DefineClass(AssetId),
}

/// Whether module text is written in the CommonJS style.
pub fn is_common_js(text: &str) -> bool {
    COMMON_JS_PATTERN.is_match(text)
}

/// Extracts the dependency references of `asset`.
///
/// Class names are only scanned for in namespaced modules and linked
/// non-module assets; CommonJS modules must `require()` what they use.
pub fn extract(model: &Model, asset: &Asset) -> Result<Vec<DependencyRef>> {
    if !asset.is_linked() {
        return Ok(Vec::new());
    }

    let text = asset.content()?;
    let mut refs = Vec::new();
    let referrer = asset.require_path();

    for captures in REQUIRE_PATTERN.captures_iter(&text) {
        let target = &captures[1];
        let reference = match target.strip_prefix(ALIAS_PREFIX) {
            Some(alias) => DependencyRef::Alias(alias.to_string()),
            None => DependencyRef::Require(resolve_relative(referrer, target)),
        };
        if !refs.contains(&reference) {
            refs.push(reference);
        }
    }

    let scans_classes = asset.source_module().map_or(true, |info| !info.encapsulated);
    if scans_classes {
        for (id, define_time) in class_references(model, &text) {
            let reference = if define_time {
                DependencyRef::DefineClass(id)
            } else {
                DependencyRef::Class(id)
            };
            if id != asset.id() && !refs.contains(&reference) {
                refs.push(reference);
            }
        }
    }

    Ok(refs)
}

/// Resolves `./` and `../` segments against the directory of `referrer`.
pub fn resolve_relative(referrer: Option<&str>, target: &str) -> String {
    if !(target.starts_with("./") || target.starts_with("../")) {
        return target.to_string();
    }

    let mut segments: Vec<&str> = referrer
        .map(|path| path.split('/').collect())
        .unwrap_or_default();
    _ = segments.pop();

    for segment in target.split('/') {
        match segment {
            "." | "" => {}
            ".." => {
                _ = segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

fn is_identifier_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'$'
}

/// Finds the class names of `model` mentioned in `text`, first mention first.
///
/// Each class is paired with whether any mention sits outside every `{}`
/// block, i.e. runs when the code is defined rather than when it is called.
pub fn class_references(model: &Model, text: &str) -> Vec<(AssetId, bool)> {
    let trie = model.class_index();
    let bytes = text.as_bytes();
    let mut found: Vec<(AssetId, bool)> = Vec::new();
    let mut depth = 0usize;
    let mut pos = 0;

    while pos < bytes.len() {
        match bytes[pos] {
            b'{' => depth += 1,
            b'}' => depth = depth.saturating_sub(1),
            _ => {}
        }
        let at_boundary = pos == 0
            || !(is_identifier_byte(bytes[pos - 1]) || bytes[pos - 1] == b'.');
        if at_boundary && text.is_char_boundary(pos) {
            let longest = trie
                .literal_prefixes(&text[pos..])
                .into_iter()
                .rev()
                .find(|(len, _)| {
                    bytes
                        .get(pos + len)
                        .map_or(true, |next| !is_identifier_byte(*next))
                });
            if let Some((len, id)) = longest {
                let define_time = depth == 0;
                match found.iter_mut().find(|(seen, _)| seen == id) {
                    Some(entry) => entry.1 |= define_time,
                    None => found.push((*id, define_time)),
                }
                pos += len;
                continue;
            }
        }
        pos += 1;
    }

    found
}
