use std::collections::HashMap;

/// Vendor tags attached to a message, keyed by tag name.
///
/// Values have IRCv3 escapes removed. A tag sent with an empty value
/// (`badges=`) is present with the value `""`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tags(HashMap<String, String>);

/// Reverse the IRCv3 tag value escaping
fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }

        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            // Unknown escapes lose the backslash; a lone one at the end is dropped
            Some(other) => out.push(other),
            None => (),
        }
    }

    out
}

impl Tags {
    /// Parse a tag segment, without its leading `@`
    pub fn parse(segment: &str) -> Self {
        let mut tags = HashMap::new();

        for entry in segment.split(';') {
            if entry.is_empty() {
                continue;
            }

            match entry.split_once('=') {
                Some((key, value)) => {
                    tags.insert(key.to_string(), unescape(value));
                }
                None => {
                    tracing::debug!(?entry, "Skipping tag with no value");
                }
            }
        }

        Self(tags)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The sender's display name, if sent and non-empty
    pub fn display_name(&self) -> Option<&str> {
        self.get("display-name").filter(|s| !s.is_empty())
    }

    /// The sender's chat colour (`#RRGGBB`), if they have set one
    pub fn color(&self) -> Option<&str> {
        self.get("color").filter(|s| !s.is_empty())
    }

    /// The `badges` tag as a list of `(name, version)` pairs
    pub fn badges(&self) -> Vec<(&str, &str)> {
        self.get("badges")
            .into_iter()
            .flat_map(|b| b.split(','))
            .filter(|b| !b.is_empty())
            .map(|b| b.split_once('/').unwrap_or((b, "")))
            .collect()
    }
}
