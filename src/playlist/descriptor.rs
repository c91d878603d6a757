use std::{fmt, sync::LazyLock};

use regex::{Captures, Regex};

pub const EXTINF_PREFIX: &str = "#EXTINF:";

static ATTRIBUTE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z0-9_.:-]+)=(?:"([^"]*)"|([^\s"]+))"#).expect("Attribute regex is valid")
});

/// A parsed `#EXTINF` line: `#EXTINF:<duration> key="value" ...,<label>`
///
/// The text before the label is kept verbatim, so tokens the attribute syntax doesn't cover survive
/// a rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    head: String,
    pub label: Option<String>,
}

impl Descriptor {
    /// Parses a descriptor line. Returns `None` when the line isn't an `#EXTINF` line.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let body = line.trim().strip_prefix(EXTINF_PREFIX)?;

        let (head, label) = match find_label_comma(body) {
            Some(i) => (&body[..i], Some(body[i + 1..].trim().to_string())),
            None => (body, None),
        };

        Some(Self {
            head: head.trim().to_string(),
            label: label.filter(|l| !l.is_empty()),
        })
    }

    /// Creates a bare descriptor with a `-1` duration
    #[must_use]
    pub fn synthetic(label: impl Into<String>) -> Self {
        Self {
            head: "-1".to_string(),
            label: Some(label.into()),
        }
    }

    /// Everything before the first whitespace of the head, usually `-1` or `0`
    #[must_use]
    pub fn duration(&self) -> &str {
        self.head
            .split_once(char::is_whitespace)
            .map_or(self.head.as_str(), |(d, _)| d)
    }

    fn find_attribute(&self, key: &str) -> Option<Captures<'_>> {
        ATTRIBUTE_REGEX
            .captures_iter(&self.head)
            .find(|c| c[1].eq_ignore_ascii_case(key))
    }

    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.find_attribute(key)
            .map(|c| c.get(2).or_else(|| c.get(3)).map_or("", |m| m.as_str()))
    }

    /// Sets an attribute in place, appending it when it isn't present yet. The rest of the head is
    /// left untouched.
    pub fn set_attribute(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        let span = self.find_attribute(key).map(|c| {
            let whole = c.get(0).map_or(0..0, |m| m.range());
            (whole, c[1].to_string())
        });

        match span {
            Some((range, existing_key)) => {
                self.head
                    .replace_range(range, &format!("{existing_key}=\"{value}\""));
            }
            None => {
                self.head.push_str(&format!(" {key}=\"{value}\""));
            }
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set_attribute(key, value);
        self
    }

    #[must_use]
    pub fn group(&self) -> Option<&str> {
        self.attribute("group-title")
    }

    pub fn set_group(&mut self, group: impl Into<String>) {
        self.set_attribute("group-title", group);
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{EXTINF_PREFIX}{},{}",
            self.head,
            self.label.as_deref().unwrap_or_default()
        )
    }
}

/// Position of the first comma that isn't inside a quoted attribute value
///
/// When quotes never balance, the first comma of the line is used instead.
fn find_label_comma(body: &str) -> Option<usize> {
    let mut quoted = false;
    let mut first = None;
    for (i, c) in body.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ',' if !quoted => return Some(i),
            ',' => {
                first.get_or_insert(i);
            }
            _ => {}
        }
    }
    if quoted { first } else { None }
}
