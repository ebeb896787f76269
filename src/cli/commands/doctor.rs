//! Doctor command - verify configuration and service access.

use crate::chunking::TextChunker;
use crate::cli::Output;
use crate::config::Settings;
use crate::vectordb::{index_name, EsClient, SearchEngine};
use console::style;
use std::path::Path;

/// Outcome of one diagnostic check.
#[derive(Debug)]
pub struct CheckResult {
    pub name: &'static str,
    pub status: CheckStatus,
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
}

impl CheckResult {
    fn new(name: &'static str, status: CheckStatus, message: impl Into<String>) -> Self {
        Self {
            name,
            status,
            message: message.into(),
            hint: None,
        }
    }

    fn ok(name: &'static str, message: impl Into<String>) -> Self {
        Self::new(name, CheckStatus::Ok, message)
    }

    fn warning(name: &'static str, message: impl Into<String>, hint: &str) -> Self {
        Self::new(name, CheckStatus::Warning, message).with_hint(hint)
    }

    fn error(name: &'static str, message: impl Into<String>, hint: &str) -> Self {
        Self::new(name, CheckStatus::Error, message).with_hint(hint)
    }

    fn with_hint(mut self, hint: &str) -> Self {
        self.hint = Some(hint.to_string());
        self
    }

    fn print(&self) {
        let icon = match self.status {
            CheckStatus::Ok => style("✓").green(),
            CheckStatus::Warning => style("!").yellow(),
            CheckStatus::Error => style("✗").red(),
        };
        println!("  {} {} - {}", icon, style(self.name).bold(), self.message);
        if let Some(hint) = &self.hint {
            println!("    {} {}", style("→").dim(), style(hint).dim());
        }
    }
}

/// Run all diagnostic checks.
pub async fn run_doctor(config_path: &Path, settings: &Settings) -> anyhow::Result<()> {
    Output::header("Ragline Doctor");
    println!();

    let mut checks = Vec::new();

    println!("{}", style("Configuration").bold());
    let mut section = vec![
        check_config_file(config_path),
        check_chunking(settings),
        check_collection(settings),
    ];
    print_all(&section);
    checks.append(&mut section);
    println!();

    println!("{}", style("Elasticsearch").bold());
    let mut section = check_elasticsearch(settings).await;
    print_all(&section);
    checks.append(&mut section);
    println!();

    println!("{}", style("API Configuration").bold());
    let api_check = check_openai_api_key();
    api_check.print();
    checks.push(api_check);
    println!();

    let errors = checks.iter().filter(|c| c.status == CheckStatus::Error).count();
    let warnings = checks.iter().filter(|c| c.status == CheckStatus::Warning).count();

    if errors > 0 {
        Output::error(&format!(
            "{} error(s) found. Please fix them before using Ragline.",
            errors
        ));
        anyhow::bail!("doctor found {} error(s)", errors);
    } else if warnings > 0 {
        Output::warning(&format!("All checks passed with {} warning(s).", warnings));
    } else {
        Output::success("All checks passed! Ragline is ready to use.");
    }

    Ok(())
}

fn print_all(checks: &[CheckResult]) {
    for check in checks {
        check.print();
    }
}

fn check_config_file(config_path: &Path) -> CheckResult {
    if config_path.exists() {
        CheckResult::ok("Config file", format!("{}", config_path.display()))
    } else {
        CheckResult::warning(
            "Config file",
            "using defaults",
            &format!("Create {} to override them", config_path.display()),
        )
    }
}

fn check_chunking(settings: &Settings) -> CheckResult {
    match TextChunker::from_settings(&settings.chunking) {
        Ok(chunker) => CheckResult::ok(
            "Chunking",
            format!(
                "{} chars, {} overlap",
                chunker.chunk_size(),
                chunker.chunk_overlap()
            ),
        ),
        Err(e) => CheckResult::error("Chunking", e.to_string(), "Fix [chunking] in the config"),
    }
}

fn check_collection(settings: &Settings) -> CheckResult {
    let index = index_name(&settings.collection.name, settings.embedding.dimensions as usize);
    let scope = match &settings.collection.app_id {
        Some(app_id) => format!("app {}", app_id),
        None => "all apps".to_string(),
    };
    CheckResult::ok("Collection", format!("index {} ({})", index, scope))
}

async fn check_elasticsearch(settings: &Settings) -> Vec<CheckResult> {
    let client = match EsClient::new(&settings.elasticsearch) {
        Ok(client) => client,
        Err(e) => {
            return vec![CheckResult::error(
                "Endpoint",
                e.to_string(),
                "Set [elasticsearch] url or ELASTICSEARCH_URL",
            )]
        }
    };

    let mut results = vec![CheckResult::ok("Endpoint", client.base_url().as_str())];

    match client.info().await {
        Ok(info) => {
            let cluster = info["cluster_name"].as_str().unwrap_or("unknown cluster");
            let version = info["version"]["number"].as_str().unwrap_or("unknown version");
            results.push(CheckResult::ok(
                "Cluster",
                format!("{} ({})", cluster, version),
            ));
        }
        Err(e) => {
            results.push(CheckResult::error(
                "Cluster",
                e.to_string(),
                "Check that Elasticsearch is running and the credentials are correct",
            ));
            return results;
        }
    }

    let index = index_name(&settings.collection.name, settings.embedding.dimensions as usize);
    match client.index_exists(&index).await {
        Ok(true) => results.push(CheckResult::ok("Index", index.as_str())),
        Ok(false) => results.push(CheckResult::warning(
            "Index",
            format!("{} (not created yet)", index),
            "It will be created on first ingest",
        )),
        Err(e) => results.push(CheckResult::error("Index", e.to_string(), "Check index permissions")),
    }

    results
}

/// The embedder reads `OPENAI_API_KEY`; report whether it looks usable.
fn check_openai_api_key() -> CheckResult {
    const NAME: &str = "OPENAI_API_KEY";
    const HINT: &str = "Set with: export OPENAI_API_KEY='sk-...'";

    let key = std::env::var(NAME).unwrap_or_default();
    let key = key.trim();
    if key.is_empty() {
        return CheckResult::error(NAME, "not set", HINT);
    }
    if !key.starts_with("sk-") || key.len() <= 20 {
        return CheckResult::warning(NAME, "set but format looks unusual", HINT);
    }
    CheckResult::ok(NAME, format!("configured ({})", mask_key(key)))
}

/// Keep the prefix and the last four characters of a secret.
fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 11 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..7].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key("sk-proj-abcdefghijklmnop1234"), "sk-proj...1234");
        assert_eq!(mask_key("short"), "*****");
    }

    #[test]
    fn test_check_result_error() {
        let result = CheckResult::error("test", "failed", "fix it");
        assert_eq!(result.status, CheckStatus::Error);
        assert_eq!(result.hint, Some("fix it".to_string()));
    }

    #[test]
    fn test_check_chunking() {
        let mut settings = Settings::default();
        assert_eq!(check_chunking(&settings).status, CheckStatus::Ok);

        settings.chunking.chunk_overlap = settings.chunking.chunk_size;
        assert_eq!(check_chunking(&settings).status, CheckStatus::Error);
    }

    #[test]
    fn test_check_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        assert_eq!(check_config_file(&path).status, CheckStatus::Warning);

        std::fs::write(&path, "").unwrap();
        assert_eq!(check_config_file(&path).status, CheckStatus::Ok);
    }

    #[tokio::test]
    async fn test_check_elasticsearch_without_url() {
        let mut settings = Settings::default();
        settings.elasticsearch.url = None;
        let results = check_elasticsearch(&settings).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, CheckStatus::Error);
    }
}
