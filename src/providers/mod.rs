//! Provider subsystem for model inference backends.
//!
//! Every backend implements the [`Provider`] trait defined in [`traits`] and is
//! constructed by its canonical key in [`create_provider`]. All supported
//! backends speak the OpenAI chat completions format, so they share
//! [`compatible::OpenAiCompatibleProvider`] and differ only in URL layout and
//! authentication.

pub mod compatible;
pub mod traits;

pub use compatible::{AuthStyle, OpenAiCompatibleProvider};
#[allow(unused_imports)]
pub use traits::{
    ChatMessage, ChatRequest, ChatResponse, Provider, ReasoningEffort, ResponseFormat, TokenUsage,
    ToolCall,
};

const MAX_API_ERROR_CHARS: usize = 200;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";
const FOUNDRY_LOCAL_BASE_URL: &str = "http://localhost:5273/v1";
const AZURE_API_VERSION: &str = "2024-10-21";

fn is_secret_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')
}

fn token_end(input: &str, from: usize) -> usize {
    let mut end = from;
    for (i, c) in input[from..].char_indices() {
        if is_secret_char(c) {
            end = from + i + c.len_utf8();
        } else {
            break;
        }
    }
    end
}

/// Scrub known secret-like token prefixes from provider error strings.
pub fn scrub_secret_patterns(input: &str) -> String {
    const PREFIXES: [&str; 3] = ["sk-", "sk-proj-", "Bearer "];

    let mut scrubbed = input.to_string();

    for prefix in PREFIXES {
        let mut search_from = 0;
        while let Some(rel) = scrubbed[search_from..].find(prefix) {
            let start = search_from + rel;
            let content_start = start + prefix.len();
            let end = token_end(&scrubbed, content_start);

            if end == content_start {
                search_from = content_start;
                continue;
            }

            scrubbed.replace_range(start..end, "[REDACTED]");
            search_from = start + "[REDACTED]".len();
        }
    }

    scrubbed
}

/// Sanitize API error text by scrubbing secrets and truncating length.
pub fn sanitize_api_error(input: &str) -> String {
    let scrubbed = scrub_secret_patterns(input);

    if scrubbed.chars().count() <= MAX_API_ERROR_CHARS {
        return scrubbed;
    }

    let mut end = MAX_API_ERROR_CHARS;
    while end > 0 && !scrubbed.is_char_boundary(end) {
        end -= 1;
    }

    format!("{}...", &scrubbed[..end])
}

/// Build a sanitized provider error from a failed HTTP response.
pub async fn api_error(provider: &str, response: reqwest::Response) -> anyhow::Error {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read provider error body>".to_string());
    let sanitized = sanitize_api_error(&body);
    anyhow::anyhow!("{provider} API error ({status}): {sanitized}")
}

/// Resolve API key for a provider from the explicit value or environment variables.
fn resolve_provider_credential(name: &str, credential_override: Option<&str>) -> Option<String> {
    if let Some(raw_override) = credential_override {
        let trimmed = raw_override.trim();
        if !trimmed.is_empty() {
            return Some(trimmed.to_owned());
        }
    }

    let provider_env_candidates: &[&str] = match name {
        "openai" => &["OPENAI_API_KEY"],
        "azure" => &["AZURE_OPENAI_API_KEY"],
        _ => &[],
    };

    provider_env_candidates
        .iter()
        .chain(["AGENTRELAY_API_KEY", "API_KEY"].iter())
        .find_map(|var| {
            std::env::var(var)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        })
}

/// Factory: create the right provider from its name, credential and optional base URL.
pub fn create_provider(
    name: &str,
    api_key: Option<&str>,
    api_url: Option<&str>,
) -> anyhow::Result<Box<dyn Provider>> {
    let key = resolve_provider_credential(name, api_key);
    let key = key.as_deref();

    if let Some(url) = name.strip_prefix("custom:") {
        if url.trim().is_empty() {
            anyhow::bail!("custom provider requires a URL: custom:<url>");
        }
        let auth = if key.is_some() {
            AuthStyle::Bearer
        } else {
            AuthStyle::None
        };
        return Ok(Box::new(OpenAiCompatibleProvider::new(
            "custom", url, key, auth,
        )));
    }

    match name {
        "openai" => Ok(Box::new(OpenAiCompatibleProvider::new(
            "openai",
            api_url.unwrap_or(OPENAI_BASE_URL),
            key,
            AuthStyle::Bearer,
        ))),
        "azure" | "azure-openai" => {
            let endpoint = api_url
                .map(str::to_string)
                .or_else(|| std::env::var("AZURE_OPENAI_ENDPOINT").ok())
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| {
                    anyhow::anyhow!("azure provider requires api_url (the resource endpoint)")
                })?;
            Ok(Box::new(OpenAiCompatibleProvider::azure(
                &endpoint,
                key,
                AZURE_API_VERSION,
            )))
        }
        "ollama" => Ok(Box::new(OpenAiCompatibleProvider::new(
            "ollama",
            api_url.unwrap_or(OLLAMA_BASE_URL),
            None,
            AuthStyle::None,
        ))),
        "foundry-local" | "foundry" => Ok(Box::new(OpenAiCompatibleProvider::new(
            "foundry-local",
            api_url.unwrap_or(FOUNDRY_LOCAL_BASE_URL),
            None,
            AuthStyle::None,
        ))),
        _ => anyhow::bail!(
            "Unknown provider: {name}. Supported: openai, azure, ollama, foundry-local, custom:<url>"
        ),
    }
}

/// Information about a supported provider for display purposes.
pub struct ProviderInfo {
    /// Canonical name used in config (e.g. `"openai"`)
    pub name: &'static str,
    /// Human-readable display name
    pub display_name: &'static str,
    /// Alternative names accepted in config
    pub aliases: &'static [&'static str],
    /// Whether the provider runs locally (no API key required)
    pub local: bool,
}

/// Return the list of all known providers for display in `agentrelay providers`.
pub fn list_providers() -> Vec<ProviderInfo> {
    vec![
        ProviderInfo {
            name: "openai",
            display_name: "OpenAI",
            aliases: &[],
            local: false,
        },
        ProviderInfo {
            name: "azure",
            display_name: "Azure OpenAI",
            aliases: &["azure-openai"],
            local: false,
        },
        ProviderInfo {
            name: "ollama",
            display_name: "Ollama",
            aliases: &[],
            local: true,
        },
        ProviderInfo {
            name: "foundry-local",
            display_name: "Foundry Local",
            aliases: &["foundry"],
            local: true,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_openai() {
        let p = create_provider("openai", Some("provider-test-credential"), None).unwrap();
        assert_eq!(p.name(), "openai");
    }

    #[test]
    fn factory_custom_url() {
        let p = create_provider("custom:http://10.0.0.1:8080/v1", None, None).unwrap();
        assert_eq!(p.name(), "custom");
    }

    #[test]
    fn factory_custom_requires_url() {
        assert!(create_provider("custom:", None, None).is_err());
    }

    #[test]
    fn factory_azure_with_endpoint() {
        let p = create_provider("azure", Some("k"), Some("https://res.openai.azure.com")).unwrap();
        assert_eq!(p.name(), "azure");
    }

    #[test]
    fn factory_unknown_provider_errors() {
        let p = create_provider("nonexistent", None, None);
        let msg = p.err().unwrap().to_string();
        assert!(msg.contains("Unknown provider"));
    }

    #[test]
    fn factory_empty_name_errors() {
        assert!(create_provider("", None, None).is_err());
    }

    #[test]
    fn listed_providers_have_unique_ids_and_aliases() {
        let mut seen = std::collections::HashSet::new();
        for provider in list_providers() {
            assert!(seen.insert(provider.name), "duplicate id {}", provider.name);
            for alias in provider.aliases {
                assert!(seen.insert(alias), "duplicate alias {alias}");
            }
        }
    }

    #[test]
    fn listed_local_providers_are_constructible_without_credentials() {
        for provider in list_providers().into_iter().filter(|p| p.local) {
            assert!(
                create_provider(provider.name, None, None).is_ok(),
                "local provider should not need a key: {}",
                provider.name
            );
            for alias in provider.aliases {
                assert!(create_provider(alias, None, None).is_ok());
            }
        }
    }

    #[test]
    fn sanitize_scrubs_sk_prefix() {
        let out = sanitize_api_error("request failed: sk-1234567890abcdef");
        assert!(!out.contains("sk-1234567890abcdef"));
        assert!(out.contains("[REDACTED]"));
    }

    #[test]
    fn sanitize_truncates_long_error() {
        let result = sanitize_api_error(&"a".repeat(400));
        assert!(result.len() <= 203);
        assert!(result.ends_with("..."));
    }

    #[test]
    fn sanitize_no_secret_no_change() {
        let input = "simple upstream timeout";
        assert_eq!(sanitize_api_error(input), input);
    }

    #[test]
    fn resolve_provider_credential_prefers_explicit_argument() {
        let resolved = resolve_provider_credential("openai", Some("  explicit-key  "));
        assert_eq!(resolved, Some("explicit-key".to_string()));
    }
}
