//! Allowlist HTML sanitizer for converted documents.
//!
//! Everything not explicitly allowed is dropped: unknown tags lose their
//! markup (their text is kept), scriptable containers lose their content too,
//! and only a handful of attributes survive with vetted URL schemes.

use anyhow::Context;
use regex::{Captures, Regex};

const ALLOWED_TAGS: &[&str] = &[
    "p", "br", "hr", "h1", "h2", "h3", "h4", "h5", "h6", "strong", "b", "em", "i", "u", "s",
    "sub", "sup", "ul", "ol", "li", "a", "img", "table", "thead", "tbody", "tr", "td", "th",
    "blockquote", "pre", "code", "span", "div",
];

/// Elements removed together with everything inside them.
const STRIPPED_WITH_CONTENT: &[&str] = &[
    "script", "style", "iframe", "object", "embed", "noscript", "template", "svg", "math",
];

const VOID_TAGS: &[&str] = &["br", "hr", "img"];

const MAX_PASSES: usize = 4;

pub struct HtmlSanitizer {
    comment: Regex,
    containers: Vec<Regex>,
    tag: Regex,
    attribute: Regex,
}

impl HtmlSanitizer {
    pub fn new() -> anyhow::Result<Self> {
        let comment = Regex::new(r"(?s)<!--.*?-->|<!\[CDATA\[.*?\]\]>|<![^>]*>|<\?[^>]*>")
            .context("Failed to compile comment pattern")?;

        let containers = STRIPPED_WITH_CONTENT
            .iter()
            .map(|name| {
                Regex::new(&format!(r"(?is)<{0}\b[^>]*>.*?</{0}\s*>", name))
                    .with_context(|| format!("Failed to compile container pattern for {}", name))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let tag = Regex::new(r"(?s)<(/?)([a-zA-Z][a-zA-Z0-9]*)([^>]*)>")
            .context("Failed to compile tag pattern")?;

        let attribute = Regex::new(
            r#"([a-zA-Z_:][-a-zA-Z0-9_:.]*)\s*(?:=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+)))?"#,
        )
        .context("Failed to compile attribute pattern")?;

        Ok(Self {
            comment,
            containers,
            tag,
            attribute,
        })
    }

    /// Sanitize untrusted HTML.
    pub fn sanitize(&self, html: &str) -> String {
        let mut current = html.to_string();

        // Repeat until stable so fragments can't reassemble into a tag.
        for _ in 0..MAX_PASSES {
            let next = self.sanitize_once(&current);
            if next == current {
                break;
            }
            current = next;
        }

        current
    }

    fn sanitize_once(&self, html: &str) -> String {
        let mut out = self.comment.replace_all(html, "").into_owned();

        for container in &self.containers {
            out = container.replace_all(&out, "").into_owned();
        }

        self.tag
            .replace_all(&out, |caps: &Captures| self.rewrite_tag(caps))
            .into_owned()
    }

    fn rewrite_tag(&self, caps: &Captures) -> String {
        let closing = !caps[1].is_empty();
        let name = caps[2].to_lowercase();

        if !ALLOWED_TAGS.contains(&name.as_str()) {
            return String::new();
        }

        if closing {
            if VOID_TAGS.contains(&name.as_str()) {
                return String::new();
            }
            return format!("</{}>", name);
        }

        let mut rebuilt = format!("<{}", name);
        for attr in self.attribute.captures_iter(&caps[3]) {
            let attr_name = attr[1].to_lowercase();
            let raw = attr
                .get(2)
                .or_else(|| attr.get(3))
                .or_else(|| attr.get(4))
                .map(|m| m.as_str())
                .unwrap_or("");

            if !is_allowed_attribute(&name, &attr_name) {
                continue;
            }

            // Attribute values are entity-encoded; vet what the browser will see.
            let value = decode_references(raw, html_entity);
            if (attr_name == "href" || attr_name == "src") && !is_safe_url(&attr_name, &value) {
                continue;
            }

            rebuilt.push_str(&format!(" {}=\"{}\"", attr_name, escape_attribute(&value)));
        }
        rebuilt.push('>');
        rebuilt
    }
}

fn is_allowed_attribute(tag: &str, attr: &str) -> bool {
    match (tag, attr) {
        (_, "title") => true,
        ("a", "href") => true,
        ("img", "src" | "alt" | "width" | "height") => true,
        ("td" | "th", "colspan" | "rowspan") => true,
        ("ol", "start") => true,
        _ => false,
    }
}

fn is_safe_url(attr: &str, value: &str) -> bool {
    let normalized: String = value
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_lowercase();

    if normalized.starts_with("http://")
        || normalized.starts_with("https://")
        || normalized.starts_with('#')
    {
        return true;
    }

    if attr == "href" && normalized.starts_with("mailto:") {
        return true;
    }

    if attr == "src"
        && normalized.starts_with("data:image/")
        && !normalized.starts_with("data:image/svg")
    {
        return true;
    }

    // Relative references carry no scheme.
    match normalized.find(':') {
        None => true,
        Some(colon) => {
            let prefix = &normalized[..colon];
            !prefix.contains('&') && prefix.contains(['/', '?', '#'])
        }
    }
}

fn escape_attribute(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Decode numeric character references and the named references `named`
/// knows about. Anything else is left as written.
pub(crate) fn decode_references(text: &str, named: fn(&str) -> Option<char>) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let Some(semi) = tail.find(';') else {
            out.push_str(tail);
            return out;
        };
        let entity = &tail[1..semi];
        let decoded = match entity.strip_prefix('#') {
            Some(numeric) => numeric
                .strip_prefix(|c: char| c == 'x' || c == 'X')
                .map(|hex| u32::from_str_radix(hex, 16).ok())
                .unwrap_or_else(|| numeric.parse().ok())
                .and_then(char::from_u32),
            None => named(entity),
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// The five predefined XML entities.
pub(crate) fn xml_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => None,
    }
}

/// XML entities plus the HTML named references that can spell out a URL scheme.
fn html_entity(name: &str) -> Option<char> {
    xml_entity(name).or(match name {
        "colon" => Some(':'),
        "Tab" => Some('\t'),
        "NewLine" => Some('\n'),
        "nbsp" => Some('\u{a0}'),
        "sol" => Some('/'),
        "bsol" => Some('\\'),
        "quest" => Some('?'),
        "num" => Some('#'),
        "period" => Some('.'),
        "comma" => Some(','),
        "semi" => Some(';'),
        "lpar" => Some('('),
        "rpar" => Some(')'),
        "excl" => Some('!'),
        "equals" => Some('='),
        _ => None,
    })
}

/// Escape text for inclusion in HTML element content.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
