//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` (or the path given with `-f`) relative to the
//! current working directory, falling back to built-in defaults when no file
//! exists.  Service URLs, the default model, the work dir and the log level
//! can be overridden from the environment.  The Telegram token is only ever
//! read from the environment.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::error::AppError;
use crate::logger;

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Console channel configuration.
#[derive(Debug, Clone)]
pub struct PtyConfig {
    pub enabled: bool,
}

/// Telegram channel configuration.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub enabled: bool,
    /// From `TELEGRAM_BOT_TOKEN`. Never sourced from TOML.
    pub token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CommsConfig {
    pub pty: PtyConfig,
    pub telegram: TelegramConfig,
}

/// Text-generation backend configuration (`[text]`).
#[derive(Debug, Clone)]
pub struct TextConfig {
    /// `"ollama"` or `"dummy"`.
    pub provider: String,
    /// Base URL of the Ollama server, without a trailing path.
    pub api_url: String,
    /// Model used for every chat, one-shot and generate call.
    pub model: String,
    /// Per-request HTTP timeout in seconds.
    pub timeout_seconds: u64,
}

/// Image-generation backend configuration (`[image]`).
#[derive(Debug, Clone)]
pub struct ImageConfig {
    /// `"comfyui"` or `"dummy"`.
    pub provider: String,
    pub api_url: String,
    pub checkpoint: String,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub cfg: f32,
    pub seed: u64,
    pub negative_prompt: String,
    /// Delay between `/history` polls.
    pub poll_interval_ms: u64,
    /// Upper bound on a whole generation, submit to download.
    pub timeout_seconds: u64,
}

/// Session store configuration (`[sessions]`).
#[derive(Debug, Clone)]
pub struct SessionsConfig {
    /// Maximum turns kept per user; oldest are dropped first.
    pub history_cap: usize,
}

/// Fully-resolved bot configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_name: String,
    /// Working directory for generated files (already expanded, no `~`).
    pub work_dir: PathBuf,
    pub log_level: String,
    /// Prefix that marks a message as a command, `!` by default.
    pub command_prefix: String,
    pub comms: CommsConfig,
    pub text: TextConfig,
    pub image: ImageConfig,
    pub sessions: SessionsConfig,
}

impl Config {
    pub fn comms_pty_should_load(&self) -> bool {
        self.comms.pty.enabled
    }

    pub fn comms_telegram_should_load(&self) -> bool {
        self.comms.telegram.enabled
    }
}

/// Environment-sourced values that take precedence over the TOML file.
///
/// Tests build this directly instead of mutating process env vars.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub work_dir: Option<String>,
    pub log_level: Option<String>,
    pub ollama_api_url: Option<String>,
    pub ollama_model: Option<String>,
    pub comfyui_api_url: Option<String>,
    pub telegram_token: Option<String>,
}

impl Overrides {
    pub fn from_env() -> Self {
        Self {
            work_dir: env::var("RELAY_WORK_DIR").ok(),
            log_level: env::var("RELAY_LOG_LEVEL").ok(),
            ollama_api_url: env::var("OLLAMA_API_URL").ok(),
            ollama_model: env::var("OLLAMA_MODEL").ok(),
            comfyui_api_url: env::var("COMFYUI_API_URL").ok(),
            telegram_token: env::var("TELEGRAM_BOT_TOKEN").ok().filter(|t| !t.is_empty()),
        }
    }
}

// ── Raw TOML shape ────────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
struct RawConfig {
    #[serde(default)]
    bot: RawBot,
    #[serde(default)]
    comms: RawComms,
    #[serde(default)]
    text: RawText,
    #[serde(default)]
    image: RawImage,
    #[serde(default)]
    sessions: RawSessions,
}

#[derive(Deserialize)]
struct RawBot {
    #[serde(default = "default_bot_name")]
    name: String,
    #[serde(default = "default_work_dir")]
    work_dir: String,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default = "default_command_prefix")]
    command_prefix: String,
}

impl Default for RawBot {
    fn default() -> Self {
        Self {
            name: default_bot_name(),
            work_dir: default_work_dir(),
            log_level: default_log_level(),
            command_prefix: default_command_prefix(),
        }
    }
}

#[derive(Deserialize, Default)]
struct RawComms {
    #[serde(default)]
    pty: RawPty,
    #[serde(default)]
    telegram: RawTelegram,
}

#[derive(Deserialize)]
struct RawPty {
    /// Defaults to `true`; still requires `-i` at runtime.
    #[serde(default = "default_true")]
    enabled: bool,
}

impl Default for RawPty {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Deserialize)]
struct RawTelegram {
    #[serde(default = "default_true")]
    enabled: bool,
}

impl Default for RawTelegram {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Deserialize)]
struct RawText {
    #[serde(default = "default_text_provider")]
    provider: String,
    #[serde(default = "default_ollama_api_url")]
    api_url: String,
    #[serde(default = "default_ollama_model")]
    model: String,
    #[serde(default = "default_text_timeout_seconds")]
    timeout_seconds: u64,
}

impl Default for RawText {
    fn default() -> Self {
        Self {
            provider: default_text_provider(),
            api_url: default_ollama_api_url(),
            model: default_ollama_model(),
            timeout_seconds: default_text_timeout_seconds(),
        }
    }
}

#[derive(Deserialize)]
struct RawImage {
    #[serde(default = "default_image_provider")]
    provider: String,
    #[serde(default = "default_comfyui_api_url")]
    api_url: String,
    #[serde(default = "default_checkpoint")]
    checkpoint: String,
    #[serde(default = "default_image_side")]
    width: u32,
    #[serde(default = "default_image_side")]
    height: u32,
    #[serde(default = "default_steps")]
    steps: u32,
    #[serde(default = "default_cfg")]
    cfg: f32,
    #[serde(default = "default_seed")]
    seed: u64,
    #[serde(default = "default_negative_prompt")]
    negative_prompt: String,
    #[serde(default = "default_poll_interval_ms")]
    poll_interval_ms: u64,
    #[serde(default = "default_image_timeout_seconds")]
    timeout_seconds: u64,
}

impl Default for RawImage {
    fn default() -> Self {
        Self {
            provider: default_image_provider(),
            api_url: default_comfyui_api_url(),
            checkpoint: default_checkpoint(),
            width: default_image_side(),
            height: default_image_side(),
            steps: default_steps(),
            cfg: default_cfg(),
            seed: default_seed(),
            negative_prompt: default_negative_prompt(),
            poll_interval_ms: default_poll_interval_ms(),
            timeout_seconds: default_image_timeout_seconds(),
        }
    }
}

#[derive(Deserialize)]
struct RawSessions {
    #[serde(default = "default_history_cap")]
    history_cap: usize,
}

impl Default for RawSessions {
    fn default() -> Self {
        Self { history_cap: default_history_cap() }
    }
}

fn default_bot_name() -> String { "relay-bot".to_string() }
fn default_work_dir() -> String { "~/.relay-bot".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_command_prefix() -> String { "!".to_string() }
fn default_true() -> bool { true }

fn default_text_provider() -> String { "ollama".to_string() }
fn default_ollama_api_url() -> String { "http://localhost:11434".to_string() }
fn default_ollama_model() -> String { "llama3.1".to_string() }
fn default_text_timeout_seconds() -> u64 { 120 }

fn default_image_provider() -> String { "comfyui".to_string() }
fn default_comfyui_api_url() -> String { "http://127.0.0.1:8188".to_string() }
fn default_checkpoint() -> String { "flux1-dev-fp8.safetensors".to_string() }
fn default_image_side() -> u32 { 512 }
fn default_steps() -> u32 { 15 }
fn default_cfg() -> f32 { 1.0 }
fn default_seed() -> u64 { 359_819_880_975_166 }
fn default_negative_prompt() -> String { "text, watermark".to_string() }
fn default_poll_interval_ms() -> u64 { 1000 }
fn default_image_timeout_seconds() -> u64 { 300 }

fn default_history_cap() -> usize { 10 }

// ── Loading ───────────────────────────────────────────────────────────────────

/// Load config from `config_path`, or `config/default.toml` when present,
/// then apply environment overrides.
///
/// An explicit path that cannot be read is an error; a missing default file
/// is not.
pub fn load(config_path: Option<&str>) -> Result<Config, AppError> {
    let overrides = Overrides::from_env();
    match config_path {
        Some(path) => load_from(Some(Path::new(path)), &overrides),
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_PATH);
            let path = default_path.exists().then_some(default_path);
            load_from(path, &overrides)
        }
    }
}

/// Internal loader. Accepts an explicit path (or none for built-in defaults)
/// and the overrides to apply.
pub fn load_from(path: Option<&Path>, overrides: &Overrides) -> Result<Config, AppError> {
    let parsed: RawConfig = match path {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;
            toml::from_str(&raw)
                .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?
        }
        None => RawConfig::default(),
    };

    let b = parsed.bot;
    let work_dir = expand_home(overrides.work_dir.as_deref().unwrap_or(&b.work_dir));
    let log_level = overrides.log_level.clone().unwrap_or(b.log_level);

    if b.command_prefix.trim().is_empty() {
        return Err(AppError::Config("bot.command_prefix must not be empty".into()));
    }
    if parsed.sessions.history_cap == 0 {
        return Err(AppError::Config("sessions.history_cap must be at least 1".into()));
    }
    // EnvFilter would accept a typo as a target directive and log nothing.
    logger::parse_level(&log_level)
        .map_err(|_| AppError::Config(format!("bot.log_level: unrecognised level '{log_level}'")))?;
    if parsed.text.timeout_seconds == 0 {
        return Err(AppError::Config("text.timeout_seconds must be at least 1".into()));
    }
    if parsed.image.timeout_seconds == 0 {
        return Err(AppError::Config("image.timeout_seconds must be at least 1".into()));
    }
    if parsed.image.poll_interval_ms == 0 {
        return Err(AppError::Config("image.poll_interval_ms must be at least 1".into()));
    }

    Ok(Config {
        bot_name: b.name,
        work_dir,
        log_level,
        command_prefix: b.command_prefix.trim().to_string(),
        comms: CommsConfig {
            pty: PtyConfig { enabled: parsed.comms.pty.enabled },
            telegram: TelegramConfig {
                enabled: parsed.comms.telegram.enabled,
                token: overrides.telegram_token.clone(),
            },
        },
        text: TextConfig {
            provider: parsed.text.provider,
            api_url: trim_base_url(overrides.ollama_api_url.as_deref().unwrap_or(&parsed.text.api_url)),
            model: overrides.ollama_model.clone().unwrap_or(parsed.text.model),
            timeout_seconds: parsed.text.timeout_seconds,
        },
        image: ImageConfig {
            provider: parsed.image.provider,
            api_url: trim_base_url(overrides.comfyui_api_url.as_deref().unwrap_or(&parsed.image.api_url)),
            checkpoint: parsed.image.checkpoint,
            width: parsed.image.width,
            height: parsed.image.height,
            steps: parsed.image.steps,
            cfg: parsed.image.cfg,
            seed: parsed.image.seed,
            negative_prompt: parsed.image.negative_prompt,
            poll_interval_ms: parsed.image.poll_interval_ms,
            timeout_seconds: parsed.image.timeout_seconds,
        },
        sessions: SessionsConfig { history_cap: parsed.sessions.history_cap },
    })
}

fn trim_base_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

// ── test helpers ──────────────────────────────────────────────────────────────

/// Offline `Config` for tests: dummy backends, no channels, no tokens.
impl Config {
    pub fn test_default(work_dir: &Path) -> Self {
        Self {
            bot_name: "test".into(),
            work_dir: work_dir.to_path_buf(),
            log_level: "info".into(),
            command_prefix: "!".into(),
            comms: CommsConfig {
                pty: PtyConfig { enabled: false },
                telegram: TelegramConfig { enabled: false, token: None },
            },
            text: TextConfig {
                provider: "dummy".into(),
                api_url: "http://localhost:0".into(),
                model: "test-model".into(),
                timeout_seconds: 1,
            },
            image: ImageConfig {
                provider: "dummy".into(),
                api_url: "http://localhost:0".into(),
                checkpoint: default_checkpoint(),
                width: 64,
                height: 64,
                steps: 1,
                cfg: 1.0,
                seed: 1,
                negative_prompt: default_negative_prompt(),
                poll_interval_ms: 10,
                timeout_seconds: 1,
            },
            sessions: SessionsConfig { history_cap: default_history_cap() },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE_TOML: &str = r#"
[bot]
name = "test-bot"
work_dir = "/tmp/relay"
log_level = "debug"

[text]
api_url = "http://ollama.lan:11434/"
model = "mistral"

[image]
width = 768
steps = 20

[sessions]
history_cap = 4
"#;

    fn write_toml(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn defaults_without_file() {
        let cfg = load_from(None, &Overrides::default()).unwrap();
        assert_eq!(cfg.text.api_url, "http://localhost:11434");
        assert_eq!(cfg.text.model, "llama3.1");
        assert_eq!(cfg.image.api_url, "http://127.0.0.1:8188");
        assert_eq!(cfg.image.checkpoint, "flux1-dev-fp8.safetensors");
        assert_eq!(cfg.sessions.history_cap, 10);
        assert_eq!(cfg.command_prefix, "!");
        assert!(cfg.comms.telegram.token.is_none());
    }

    #[test]
    fn toml_values_applied() {
        let f = write_toml(SAMPLE_TOML);
        let cfg = load_from(Some(f.path()), &Overrides::default()).unwrap();
        assert_eq!(cfg.bot_name, "test-bot");
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.work_dir, PathBuf::from("/tmp/relay"));
        assert_eq!(cfg.text.api_url, "http://ollama.lan:11434");
        assert_eq!(cfg.text.model, "mistral");
        assert_eq!(cfg.image.width, 768);
        assert_eq!(cfg.image.height, 512);
        assert_eq!(cfg.image.steps, 20);
        assert_eq!(cfg.sessions.history_cap, 4);
    }

    #[test]
    fn env_overrides_win() {
        let f = write_toml(SAMPLE_TOML);
        let overrides = Overrides {
            work_dir: Some("/srv/relay".into()),
            log_level: Some("trace".into()),
            ollama_api_url: Some("http://gpu:11434".into()),
            ollama_model: Some("llama3.2".into()),
            comfyui_api_url: Some("http://gpu:8188/".into()),
            telegram_token: Some("123:abc".into()),
        };
        let cfg = load_from(Some(f.path()), &overrides).unwrap();
        assert_eq!(cfg.work_dir, PathBuf::from("/srv/relay"));
        assert_eq!(cfg.log_level, "trace");
        assert_eq!(cfg.text.api_url, "http://gpu:11434");
        assert_eq!(cfg.text.model, "llama3.2");
        assert_eq!(cfg.image.api_url, "http://gpu:8188");
        assert_eq!(cfg.comms.telegram.token.as_deref(), Some("123:abc"));
    }

    #[test]
    fn zero_history_cap_rejected() {
        let f = write_toml("[sessions]\nhistory_cap = 0\n");
        let err = load_from(Some(f.path()), &Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("history_cap"));
    }

    #[test]
    fn unknown_log_level_rejected() {
        let f = write_toml("[bot]\nlog_level = \"verbose\"\n");
        let err = load_from(Some(f.path()), &Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("verbose"));

        let overrides = Overrides { log_level: Some("loud".into()), ..Overrides::default() };
        assert!(load_from(None, &overrides).is_err());
    }

    #[test]
    fn log_level_case_insensitive() {
        let overrides = Overrides { log_level: Some("DEBUG".into()), ..Overrides::default() };
        assert!(load_from(None, &overrides).is_ok());
    }

    #[test]
    fn zero_timeouts_rejected() {
        let f = write_toml("[text]\ntimeout_seconds = 0\n");
        let err = load_from(Some(f.path()), &Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("text.timeout_seconds"));

        let f = write_toml("[image]\ntimeout_seconds = 0\n");
        let err = load_from(Some(f.path()), &Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("image.timeout_seconds"));

        let f = write_toml("[image]\npoll_interval_ms = 0\n");
        assert!(load_from(Some(f.path()), &Overrides::default()).is_err());
    }

    #[test]
    fn missing_explicit_file_errors() {
        let result = load_from(Some(Path::new("/nonexistent/config.toml")), &Overrides::default());
        let msg = result.unwrap_err().to_string();
        assert!(msg.contains("config error"));
    }

    #[test]
    fn malformed_toml_errors() {
        let f = write_toml("[text\nmodel = ");
        assert!(load_from(Some(f.path()), &Overrides::default()).is_err());
    }

    #[test]
    fn tilde_expands_to_home() {
        let home = dirs::home_dir().expect("home dir must exist in test env");
        let expanded = expand_home("~/.relay-bot");
        assert!(expanded.starts_with(&home));
        assert!(expanded.ends_with(".relay-bot"));
    }

    #[test]
    fn absolute_path_unchanged() {
        assert_eq!(expand_home("/absolute/path"), PathBuf::from("/absolute/path"));
    }
}
