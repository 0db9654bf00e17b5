use std::path::Path;
use std::sync::OnceLock;

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use serde::Serialize;

/// Text format a file is summarised as, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentFormat {
    Markdown,
    Json,
    Toml,
    Yaml,
    Code,
    Text,
}

impl ContentFormat {
    pub fn for_path(path: &Path) -> ContentFormat {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        match ext.as_str() {
            "md" | "mdx" | "markdown" => ContentFormat::Markdown,
            "json" => ContentFormat::Json,
            "toml" => ContentFormat::Toml,
            "yaml" | "yml" => ContentFormat::Yaml,
            "rs" | "ts" | "tsx" | "js" | "jsx" | "mjs" | "cjs" | "py" | "go" | "java" | "kt"
            | "swift" | "c" | "h" | "cpp" | "hpp" | "rb" | "sh" => ContentFormat::Code,
            _ => ContentFormat::Text,
        }
    }
}

/// Lightweight structural summary of a file's content.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedMetadata {
    pub format: ContentFormat,
    pub line_count: usize,
    /// Markdown headings, in document order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub headings: Vec<String>,
    /// Top-level keys of JSON, TOML and YAML documents.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub keys: Vec<String>,
    /// Definition-looking lines in source code.
    pub definitions: usize,
}

/// Turns file content into a [`ParsedMetadata`].
///
/// Errors are reported to the caller, which degrades to "no metadata".
pub trait ContentParser: Send + Sync {
    fn parse(&self, path: &Path, content: &[u8]) -> Result<ParsedMetadata>;
}

/// Default parser: line-oriented heuristics for Markdown and code, real
/// parsers for JSON, TOML and YAML.
#[derive(Debug, Default)]
pub struct StructuralParser;

static DEFINITION_RE: OnceLock<Regex> = OnceLock::new();

fn definition_re() -> &'static Regex {
    DEFINITION_RE.get_or_init(|| {
        Regex::new(
            r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:export\s+)?(?:default\s+)?(?:async\s+)?(?:fn|function|def|class|struct|enum|trait|impl|interface)\b",
        )
        .expect("definition regex is valid")
    })
}

impl ContentParser for StructuralParser {
    fn parse(&self, path: &Path, content: &[u8]) -> Result<ParsedMetadata> {
        let text = std::str::from_utf8(content)
            .map_err(|_| anyhow!("{} is not UTF-8 text", path.display()))?;
        let format = ContentFormat::for_path(path);

        let mut metadata = ParsedMetadata {
            format,
            line_count: text.lines().count(),
            headings: Vec::new(),
            keys: Vec::new(),
            definitions: 0,
        };

        match format {
            ContentFormat::Markdown => metadata.headings = markdown_headings(text),
            ContentFormat::Json => {
                let value: serde_json::Value = serde_json::from_str(text)
                    .with_context(|| format!("invalid JSON in {}", path.display()))?;
                if let serde_json::Value::Object(map) = value {
                    metadata.keys = map.keys().cloned().collect();
                }
            }
            ContentFormat::Toml => {
                let table: toml::Table = toml::from_str(text)
                    .with_context(|| format!("invalid TOML in {}", path.display()))?;
                metadata.keys = table.keys().cloned().collect();
            }
            ContentFormat::Yaml => {
                let value: serde_yaml::Value = serde_yaml::from_str(text)
                    .with_context(|| format!("invalid YAML in {}", path.display()))?;
                if let serde_yaml::Value::Mapping(map) = value {
                    metadata.keys = map.iter().filter_map(|(key, _)| yaml_key(key)).collect();
                }
            }
            ContentFormat::Code => {
                let re = definition_re();
                metadata.definitions = text.lines().filter(|l| re.is_match(l)).count();
            }
            ContentFormat::Text => {}
        }

        Ok(metadata)
    }
}

/// ATX headings outside fenced code blocks.
fn markdown_headings(text: &str) -> Vec<String> {
    let mut headings = Vec::new();
    let mut in_fence = false;

    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }

        let level = trimmed.chars().take_while(|&c| c == '#').count();
        if (1..=6).contains(&level) {
            let rest = &trimmed[level..];
            if rest.is_empty() || rest.starts_with(' ') {
                let title = rest.trim().trim_end_matches('#').trim();
                if !title.is_empty() {
                    headings.push(title.to_string());
                }
            }
        }
    }

    headings
}

/// Scalar mapping keys as text; complex keys are skipped.
fn yaml_key(key: &serde_yaml::Value) -> Option<String> {
    match key {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
