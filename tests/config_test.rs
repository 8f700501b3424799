use astral::config::{AstralConfig, load_from_path, validate};
use astral::context::DEFAULT_SYSTEM_PROMPT;
use astral::error::ConfigError;

static NEXT_DIR: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(0);

fn tmp_dir() -> std::path::PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_nanos();
    let seq = NEXT_DIR.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    let path = std::env::temp_dir().join(format!("astral-config-test-{nanos}-{seq}"));
    std::fs::create_dir_all(&path).expect("create temp dir");
    path
}

#[test]
fn default_config_has_sensible_values() {
    let config = AstralConfig::default();
    assert_eq!(config.gateway.port, 8000);
    assert_eq!(config.gateway.bind, "127.0.0.1");
    assert!(config.gateway.cors_origins.is_empty());

    assert_eq!(config.completion.provider, "groq");
    assert_eq!(config.completion.model, "llama-3.3-70b-versatile");
    assert_eq!(config.completion.max_context_tokens, 128_000);
    assert_eq!(config.completion.web_reply_tokens, 512);
    assert_eq!(config.completion.default_reply_tokens, 200);
    assert!(config.completion.api_key.is_none());

    assert_eq!(config.search.max_results, 4);
    assert_eq!(config.search.cache_capacity, 128);
    assert_eq!(config.search.max_query_chars, 800);
    assert!(!config.search.always_fetch_web_results);

    assert_eq!(config.memory.capacity, 1000);
    assert_eq!(config.memory.retrieve_limit, 5);
    assert!(config.memory.path.is_none());

    assert!(validate(&config).is_ok());
}

#[test]
fn valid_toml_parses_successfully() {
    let toml_str = r#"
[gateway]
port = 8080
bind = "0.0.0.0"
cors_origins = ["https://ropdawg.github.io"]

[completion]
provider = "openai"
model = "gpt-4o-mini"
api_key = "sk-test"
temperature = 0.3
system_prompt = "You are helpful."

[search]
bing_api_key = "bing-test"
always_fetch_web_results = true
cache_ttl_secs = 0

[memory]
capacity = 50
path = "/var/lib/astral/memory.json"
"#;

    let config: AstralConfig = toml::from_str(toml_str).unwrap();
    assert_eq!(config.gateway.port, 8080);
    assert_eq!(config.gateway.bind, "0.0.0.0");
    assert_eq!(config.gateway.cors_origins, vec!["https://ropdawg.github.io"]);
    assert_eq!(config.completion.provider, "openai");
    assert_eq!(config.completion.api_key.as_deref(), Some("sk-test"));
    assert_eq!(config.completion.api_key_env(), "OPENAI_API_KEY");
    assert_eq!(config.completion.system_instructions(), "You are helpful.");
    // Unset fields keep their defaults.
    assert!((config.completion.top_p - 0.9).abs() < f32::EPSILON);
    assert_eq!(config.search.bing_api_key.as_deref(), Some("bing-test"));
    assert!(config.search.always_fetch_web_results);
    assert_eq!(config.search.max_results, 4);
    assert_eq!(config.memory.capacity, 50);
    assert_eq!(config.memory.retrieve_limit, 5);
    assert!(validate(&config).is_ok());
}

#[test]
fn empty_toml_uses_defaults() {
    let config: AstralConfig = toml::from_str("").unwrap();
    assert_eq!(config.gateway.port, 8000);
    assert_eq!(config.completion.provider, "groq");
}

#[test]
fn unknown_provider_fails_validation() {
    let mut config = AstralConfig::default();
    config.completion.provider = "mystery".into();
    let err = validate(&config).unwrap_err();
    assert!(err.to_string().contains("invalid provider"));
}

#[test]
fn out_of_range_sampling_fails_validation() {
    let mut config = AstralConfig::default();
    config.completion.temperature = 3.5;
    assert!(validate(&config).is_err());

    let mut config = AstralConfig::default();
    config.completion.top_p = 0.0;
    assert!(validate(&config).is_err());
}

#[test]
fn zero_capacities_fail_validation() {
    let mut config = AstralConfig::default();
    config.memory.capacity = 0;
    assert!(validate(&config).is_err());

    let mut config = AstralConfig::default();
    config.search.cache_capacity = 0;
    assert!(validate(&config).is_err());
}

#[test]
fn context_window_must_exceed_reply_floor() {
    let mut config = AstralConfig::default();
    config.completion.max_context_tokens = 20;
    let err = validate(&config).unwrap_err();
    assert!(err.to_string().contains("max_context_tokens"));
}

#[test]
fn missing_credential_names_the_env_var() {
    let config = AstralConfig::default();
    let err = config.completion.require_api_key().unwrap_err();
    assert!(matches!(err, ConfigError::MissingCredential { .. }));
    assert!(err.to_string().contains("GROQ_API_KEY"));
    assert!(err.to_string().contains("astral auth"));
}

#[test]
fn blank_api_key_counts_as_missing() {
    let mut config = AstralConfig::default();
    config.completion.api_key = Some("   ".into());
    assert!(config.completion.require_api_key().is_err());

    config.completion.api_key = Some("gsk_live".into());
    assert_eq!(config.completion.require_api_key().unwrap(), "gsk_live");
}

#[test]
fn load_from_path_reads_file() {
    let dir = tmp_dir();
    let path = dir.join("config.toml");
    std::fs::write(&path, "[gateway]\nport = 9100\n").unwrap();

    let config = load_from_path(&path).expect("config loads");
    assert_eq!(config.gateway.port, 9100);

    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn load_from_path_reports_parse_errors_with_path() {
    let dir = tmp_dir();
    let path = dir.join("config.toml");
    std::fs::write(&path, "[gateway\nport = ").unwrap();

    let err = load_from_path(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().contains("config.toml"));

    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn missing_file_is_io_error() {
    let dir = tmp_dir();
    let err = load_from_path(&dir.join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn system_prompt_file_takes_precedence() {
    let dir = tmp_dir();
    let path = dir.join("persona.md");
    std::fs::write(&path, "You are a patient tutor.").unwrap();

    let mut config = AstralConfig::default();
    config.completion.system_prompt = Some("inline".into());
    config.completion.system_prompt_path = Some(path.display().to_string());
    assert_eq!(
        config.completion.system_instructions(),
        "You are a patient tutor."
    );

    // Unreadable file falls back to the inline prompt.
    config.completion.system_prompt_path = Some(dir.join("missing.md").display().to_string());
    assert_eq!(config.completion.system_instructions(), "inline");

    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn default_system_prompt_is_used_when_unset() {
    let config = AstralConfig::default();
    assert_eq!(config.completion.system_instructions(), DEFAULT_SYSTEM_PROMPT);
}
