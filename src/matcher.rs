use std::{collections::HashMap, path::Path, sync::LazyLock};

use anyhow::{Context, Result};
use regex::{Captures, Regex};
use tracing::{info, warn};

pub const DEFAULT_ALIAS_MAP_PATH: &str = "channel-map.json";

/// Matches a JSON string literal, a block comment or a line comment
static COMMENT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(?:\\.|[^"\\])*"|/\*[\s\S]*?\*/|//[^\n]*"#).expect("Comment regex is valid")
});

/// Keyword (team or league name) to broadcaster name fragments, e.g.
/// `"premier league": ["sky sports", "tnt sports"]`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasMap(HashMap<String, Vec<String>>);

impl AliasMap {
    /// Parses JSON with `//` and `/* */` comments. Keys and fragments are lowercased.
    ///
    /// # Errors
    /// Errors when the remaining text isn't a JSON object of string arrays
    pub fn parse(raw: &str) -> Result<Self> {
        let cleaned = strip_comments(raw);
        let map: HashMap<String, Vec<String>> =
            serde_json::from_str(&cleaned).context("Parsing alias map")?;

        Ok(Self(
            map.into_iter()
                .map(|(k, v)| {
                    let fragments = v
                        .into_iter()
                        .map(|f| f.trim().to_lowercase())
                        .filter(|f| !f.is_empty())
                        .collect();
                    (k.trim().to_lowercase(), fragments)
                })
                .collect(),
        ))
    }

    /// Loads the alias map from disk. A missing or invalid file yields an empty map.
    pub async fn load(path: &Path) -> Self {
        let loaded = match tokio::fs::read_to_string(path).await {
            Ok(raw) => Self::parse(&raw),
            Err(e) => Err(e).with_context(|| format!("Reading {}", path.display())),
        };

        match loaded {
            Ok(map) => {
                info!("Loaded {} alias entries from {}", map.len(), path.display());
                map
            }
            Err(e) => {
                warn!(
                    "Alias map not found or invalid, matching will rely only on team and league names: {e:#}"
                );
                Self::default()
            }
        }
    }

    #[must_use]
    pub fn fragments(&self, keyword: &str) -> &[String] {
        self.0.get(keyword).map(Vec::as_slice).unwrap_or_default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, Vec<V>)> for AliasMap {
    fn from_iter<T: IntoIterator<Item = (K, Vec<V>)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| {
                    (
                        k.into().to_lowercase(),
                        v.into_iter().map(|f| f.into().to_lowercase()).collect(),
                    )
                })
                .collect(),
        )
    }
}

fn strip_comments(raw: &str) -> String {
    COMMENT_REGEX
        .replace_all(raw, |c: &Captures| {
            let m = &c[0];
            if m.starts_with('"') {
                m.to_string()
            } else {
                String::new()
            }
        })
        .into_owned()
}

/// Whether a channel name contains any keyword, or any alias fragment of a keyword
///
/// Containment is case-insensitive and otherwise literal, so short keywords (a country name, say)
/// can match unrelated channels.
pub fn matches<I, S>(channel_name: &str, keywords: I, aliases: &AliasMap) -> bool
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let name = channel_name.to_lowercase();

    keywords.into_iter().any(|keyword| {
        let keyword = keyword.as_ref().trim().to_lowercase();
        if keyword.is_empty() {
            return false;
        }
        name.contains(&keyword)
            || aliases
                .fragments(&keyword)
                .iter()
                .any(|f| !f.is_empty() && name.contains(f.as_str()))
    })
}
