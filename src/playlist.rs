use tracing::debug;

pub mod descriptor;

pub use descriptor::Descriptor;

/// Directive lines that travel with the entry that follows them
pub const DIRECTIVE_PREFIXES: [&str; 2] = ["#EXTVLCOPT", "#KODIPROP"];

pub const DEFAULT_SCHEMES: [&str; 4] = ["http", "https", "rtmp", "udp"];

/// How entries are keyed for deduplication
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IdentityMode {
    /// Same stream URL means same channel
    #[default]
    StreamUrl,
    /// Every parsed entry is distinct: `<source tag>#<source position>-<entry position>`
    SourcePosition,
}

#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Accepted (lowercase) URL schemes for the stream line
    pub schemes: Vec<String>,
    pub identity: IdentityMode,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            schemes: DEFAULT_SCHEMES.iter().map(ToString::to_string).collect(),
            identity: IdentityMode::default(),
        }
    }
}

impl ParseOptions {
    fn accepts(&self, line: &str) -> bool {
        let Some((scheme, rest)) = line.split_once("://") else {
            return false;
        };
        !rest.is_empty() && self.schemes.iter().any(|s| s.eq_ignore_ascii_case(scheme))
    }
}

/// One playable playlist entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEntry {
    pub descriptor: Descriptor,
    /// Display name used for matching
    pub name: String,
    pub stream_url: String,
    /// `#EXTVLCOPT` / `#KODIPROP` lines, in source order
    pub directives: Vec<String>,
    pub source_tag: String,
    pub identity: String,
}

impl ChannelEntry {
    /// Whether the stream uses a web scheme that can be probed over HTTP
    #[must_use]
    pub fn is_web(&self) -> bool {
        let url = self.stream_url.to_ascii_lowercase();
        url.starts_with("http://") || url.starts_with("https://")
    }

    /// Output lines for this entry placed under `group`: directives, descriptor, URL
    #[must_use]
    pub fn render(&self, group: &str, label_prefix: Option<&str>) -> Vec<String> {
        let mut descriptor = self.descriptor.clone();
        descriptor.set_group(group);
        let label = descriptor.label.take().unwrap_or_else(|| self.name.clone());
        descriptor.label = Some(match label_prefix {
            Some(prefix) => format!("{prefix} {label}"),
            None => label,
        });

        let mut lines = self.directives.clone();
        lines.push(descriptor.to_string());
        lines.push(self.stream_url.clone());
        lines
    }
}

/// Parses playlist text with the default options
#[must_use]
pub fn parse(text: &str, source_tag: &str) -> Vec<ChannelEntry> {
    parse_with(text, source_tag, 0, &ParseOptions::default())
}

/// Parses playlist text into entries, in source order
///
/// `source_position` is the index of the source among all sources of the run. It keeps identities
/// apart when the same source is given more than once.
///
/// A descriptor with no stream line before the next descriptor (or the end of input) is dropped,
/// as are directive lines with no descriptor before them.
#[must_use]
pub fn parse_with(
    text: &str,
    source_tag: &str,
    source_position: usize,
    options: &ParseOptions,
) -> Vec<ChannelEntry> {
    let mut channels = Vec::new();
    let mut pending: Option<(&str, Descriptor)> = None;
    let mut directives: Vec<String> = Vec::new();
    let mut dropped = 0usize;

    for line in text.lines().map(str::trim) {
        if let Some(descriptor) = Descriptor::parse(line) {
            if pending.is_some() {
                dropped += 1;
            }
            pending = Some((line, descriptor));
            directives.clear();
        } else if DIRECTIVE_PREFIXES.iter().any(|p| line.starts_with(p)) {
            directives.push(line.to_string());
        } else if pending.is_some() && options.accepts(line) {
            let Some((raw, descriptor)) = pending.take() else {
                continue;
            };
            let name = descriptor
                .label
                .clone()
                .unwrap_or_else(|| raw.to_string());
            let identity = match options.identity {
                IdentityMode::StreamUrl => line.to_string(),
                IdentityMode::SourcePosition => {
                    format!("{source_tag}#{source_position}-{}", channels.len())
                }
            };

            channels.push(ChannelEntry {
                descriptor,
                name,
                stream_url: line.to_string(),
                directives: std::mem::take(&mut directives),
                source_tag: source_tag.to_string(),
                identity,
            });
        }
    }

    if pending.is_some() {
        dropped += 1;
    }
    if dropped > 0 {
        debug!("Dropped {dropped} descriptor(s) without a stream URL from {source_tag}");
    }

    channels
}
