//! Replace plugin (pre-process): token substitution in working files.
//!
//! Tokens default to `{{{name}}}`. Values come from the project manifest
//! (`./package.json`), overlaid with an optional values file given by
//! `--values <file>` or the `values` setting. Values files ending in
//! `.yaml`/`.yml` are parsed as YAML, anything else as JSON.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::{NoExpand, Regex};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::core::scheduler::parallel;
use crate::domain::{Activity, FileRecord};
use crate::fs::{is_not_found, FileSystem};
use crate::plugins::{ConfigureContext, Plugin, PluginDescriptor, RunContext};

pub const NAME: &str = "replace";

/// Placeholder in a replace pattern that stands for the token name
const NAME_PLACEHOLDER: &str = "replace";

/// A token syntax: `find` captures the token name in group 1, `replace`
/// matches one token once the placeholder is swapped for a name
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenPattern {
    pub find: String,
    pub replace: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct ReplaceSettings {
    tokens: Vec<TokenPattern>,
    manifest: String,
    values: Option<String>,
    concurrency: Option<usize>,
}

impl Default for ReplaceSettings {
    fn default() -> Self {
        Self {
            tokens: vec![default_token()],
            manifest: "./package.json".to_string(),
            values: None,
            concurrency: None,
        }
    }
}

fn default_token() -> TokenPattern {
    TokenPattern {
        find: "[{]{3}([^}]*)[}]{3}".to_string(),
        replace: "[{]{3}replace[}]{3}".to_string(),
    }
}

/// A token syntax with its patterns compiled
#[derive(Debug, Clone)]
struct CompiledToken {
    find: Regex,
    replace: String,
}

impl CompiledToken {
    fn compile(token: &TokenPattern) -> Result<Self> {
        let find = Regex::new(&token.find)
            .with_context(|| format!("Invalid token pattern '{}'", token.find))?;
        Ok(Self {
            find,
            replace: token.replace.clone(),
        })
    }
}

pub struct Replace {
    descriptor: PluginDescriptor,
    settings: ReplaceSettings,
    tokens: Vec<CompiledToken>,
    values: Map<String, Value>,
}

impl Default for Replace {
    fn default() -> Self {
        Self::new()
    }
}

impl Replace {
    pub fn new() -> Self {
        let token = default_token();
        let descriptor = PluginDescriptor::new(NAME, Activity::PreProcess)
            .with_option(
                "--values [value]",
                "a key / value JSON or YAML file to use with token replacement",
            )
            .with_config(json!({
                "tokens": [{ "find": token.find, "replace": token.replace }],
                "manifest": "./package.json",
            }));

        Self {
            descriptor,
            settings: ReplaceSettings::default(),
            tokens: Vec::new(),
            values: Map::new(),
        }
    }

    /// Manifest values overlaid with the values file, if any
    async fn load_values(&self, fs: &FileSystem, values_path: Option<&str>) -> Result<Map<String, Value>> {
        let mut values = match fs.read(self.settings.manifest.as_str()).await {
            Ok(content) => match serde_json::from_str::<Value>(&content) {
                Ok(Value::Object(map)) => map,
                Ok(_) => Map::new(),
                Err(e) => {
                    warn!(manifest = %self.settings.manifest, error = %e, "Ignoring malformed manifest");
                    Map::new()
                }
            },
            Err(e) if is_not_found(&e) => Map::new(),
            Err(e) => return Err(e.into()),
        };

        if let Some(path) = values_path {
            match fs.read(path).await {
                Ok(content) => {
                    let overlay = parse_values(Path::new(path), &content)?;
                    values.extend(overlay);
                }
                Err(e) => warn!(path, error = %e, "Values file unreadable, using manifest only"),
            }
        }

        Ok(values)
    }
}

/// Parse a values file by extension
fn parse_values(path: &Path, content: &str) -> Result<Map<String, Value>> {
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );

    let value: Value = if is_yaml {
        serde_yaml::from_str(content)
            .with_context(|| format!("Failed to parse YAML values {}", path.display()))?
    } else {
        serde_json::from_str(content)
            .with_context(|| format!("Failed to parse JSON values {}", path.display()))?
    };

    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        _ => anyhow::bail!("Values file {} must contain a mapping", path.display()),
    }
}

/// Text for a value; `None` for values that never replace a token
fn replacement_text(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        other => Some(other.to_string()),
    }
}

/// Replace every known token in `content`. Returns `None` when nothing
/// was replaced.
fn substitute(
    content: &str,
    tokens: &[CompiledToken],
    values: &Map<String, Value>,
) -> Result<Option<String>> {
    let mut output = content.to_string();
    let mut replaced = false;

    for token in tokens {
        let names: Vec<String> = token
            .find
            .captures_iter(&output)
            .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
            .collect();

        for name in names {
            let Some(text) = values.get(&name).and_then(replacement_text) else {
                continue;
            };

            let pattern = token
                .replace
                .replacen(NAME_PLACEHOLDER, &regex::escape(&name), 1);
            let replacer = Regex::new(&pattern)
                .with_context(|| format!("Invalid replace pattern '{}'", pattern))?;

            let next = replacer.replace_all(&output, NoExpand(&text)).into_owned();
            replaced |= next != output;
            output = next;
        }
    }

    Ok(replaced.then_some(output))
}

/// Rewrite one working file; `Ok(true)` when it changed
async fn replace_in_file(
    fs: &FileSystem,
    file: &FileRecord,
    tokens: &[CompiledToken],
    values: &Map<String, Value>,
) -> Result<bool> {
    let path = file.working_file();
    let content = match fs.read(&path).await {
        Ok(content) => content,
        Err(e) => {
            debug!(error = %e, "Skipping unreadable file");
            return Ok(false);
        }
    };

    match substitute(&content, tokens, values)? {
        Some(updated) => {
            fs.write(&path, updated).await?;
            Ok(true)
        }
        None => Ok(false),
    }
}

#[async_trait]
impl Plugin for Replace {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    async fn configure(&mut self, ctx: &mut ConfigureContext<'_>) -> Result<()> {
        self.settings = ctx.config.plugin_config(NAME)?;
        self.tokens = self
            .settings
            .tokens
            .iter()
            .map(CompiledToken::compile)
            .collect::<Result<_>>()?;

        let values_path = ctx
            .args
            .value("values")
            .filter(|v| *v != "true")
            .map(str::to_string)
            .or_else(|| self.settings.values.clone());

        self.values = self.load_values(ctx.fs, values_path.as_deref()).await?;
        debug!(values = self.values.len(), "Loaded replacement values");
        Ok(())
    }

    async fn run(&mut self, ctx: &RunContext) -> Result<()> {
        let files = ctx.project().await.files.clone();
        let fs = &ctx.fs;
        let tokens = &self.tokens;
        let values = &self.values;

        let results = parallel(files, self.settings.concurrency, |file: FileRecord| async move {
            replace_in_file(fs, &file, tokens, values).await
        })
        .await;

        let mut changed = 0usize;
        let mut failed = 0usize;
        for result in results {
            match result {
                Ok(true) => changed += 1,
                Ok(false) => {}
                Err(e) => {
                    failed += 1;
                    warn!(error = %e, "Token replacement failed");
                }
            }
        }

        info!(files = changed, "Replaced tokens");
        if failed > 0 {
            anyhow::bail!("Token replacement failed for {} files", failed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens() -> Vec<CompiledToken> {
        vec![CompiledToken::compile(&default_token()).unwrap()]
    }

    fn values(json: Value) -> Map<String, Value> {
        match json {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_substitutes_known_tokens() {
        let values = values(json!({ "name": "kiln", "version": "1.2.0" }));
        let out = substitute("{{{name}}} v{{{version}}} by {{{author}}}", &tokens(), &values)
            .unwrap()
            .unwrap();
        assert_eq!(out, "kiln v1.2.0 by {{{author}}}");
    }

    #[test]
    fn test_untouched_content_reports_none() {
        let values = values(json!({ "name": "" }));
        assert_eq!(substitute("plain text", &tokens(), &values).unwrap(), None);
        assert_eq!(substitute("{{{name}}}", &tokens(), &values).unwrap(), None);
    }

    #[test]
    fn test_values_are_literal_and_names_escaped() {
        let values = values(json!({ "a.b": "$1 cost", "n": 3 }));
        let out = substitute("{{{a.b}}} {{{axb}}} {{{n}}}", &tokens(), &values)
            .unwrap()
            .unwrap();
        assert_eq!(out, "$1 cost {{{axb}}} 3");
    }

    #[test]
    fn test_parse_values_by_extension() {
        let yaml = parse_values(Path::new("values.yaml"), "name: kiln\nport: 80\n").unwrap();
        assert_eq!(yaml["name"], json!("kiln"));
        assert_eq!(yaml["port"], json!(80));

        let json = parse_values(Path::new("values.json"), r#"{"name":"x"}"#).unwrap();
        assert_eq!(json["name"], json!("x"));

        assert!(parse_values(Path::new("values.json"), "[1,2]").is_err());
    }

    #[tokio::test]
    async fn test_run_rewrites_working_copies() {
        use std::sync::Arc;

        use crate::config::Config;
        use crate::core::bus::EventBus;
        use crate::fs::PathResolver;

        let temp = tempfile::TempDir::new().unwrap();
        let root = temp.path();
        let working = root.join(".kiln/tmp");
        std::fs::create_dir_all(working.join("src")).unwrap();
        std::fs::write(working.join("src/a.js"), "v{{{version}}}").unwrap();
        std::fs::write(working.join("src/b.js"), "plain").unwrap();

        let ctx = RunContext::new(
            1,
            Arc::new(Config::default()),
            Arc::new(FileSystem::new(PathResolver::new(root))),
            Arc::new(EventBus::new()),
        );
        for name in ["a.js", "b.js"] {
            ctx.project_mut()
                .await
                .files
                .push(FileRecord::new(root, &working, root.join("src").join(name)));
        }

        let mut plugin = Replace::new();
        plugin.tokens = tokens();
        plugin.values = values(json!({ "version": "2.0.1" }));
        plugin.run(&ctx).await.unwrap();

        assert_eq!(
            std::fs::read_to_string(working.join("src/a.js")).unwrap(),
            "v2.0.1"
        );
        assert_eq!(std::fs::read_to_string(working.join("src/b.js")).unwrap(), "plain");
    }
}
