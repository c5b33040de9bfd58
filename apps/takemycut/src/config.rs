use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, Context};
use orchestrator::CutPlan;
use serde::Deserialize;

pub const DEFAULT_URL: &str = "ws://127.0.0.1:4455";
pub const DEFAULT_PASSWORD_FILE: &str = "~/.config/memen_demon/obs_password";
pub const DEFAULT_CONFIG_FILE: &str = "takemycut.toml";
pub const CONFIG_ENV: &str = "TAKEMYCUT_CONFIG";
const ENV_PREFIX: &str = "TAKEMYCUT_";

/// One configuration layer. Unset fields fall through to the layer below.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Overrides {
    pub url: Option<String>,
    pub password: Option<String>,
    pub password_file: Option<String>,
    pub itstinks_scene: Option<String>,
    pub clip_input: Option<String>,
    pub prevscene_source: Option<String>,
    pub clone_input: Option<String>,
    pub wrapper_scene: Option<String>,
    /// Seconds.
    pub hide_delay: Option<f64>,
    pub fallback_ms: Option<u64>,
    pub preload_ms: Option<u64>,
    pub no_force_cut: Option<bool>,
}

impl Overrides {
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        toml::from_str(raw).context("invalid config file")
    }

    /// Reads `TAKEMYCUT_*` variables through `lookup`.
    pub fn from_env(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));
        Ok(Self {
            url: var("URL"),
            password: var("PASSWORD"),
            password_file: var("PASSWORD_FILE"),
            itstinks_scene: var("ITSTINKS_SCENE"),
            clip_input: var("CLIP_INPUT"),
            prevscene_source: var("PREVSCENE_SOURCE"),
            clone_input: var("CLONE_INPUT"),
            wrapper_scene: var("WRAPPER_SCENE"),
            hide_delay: parse_var("HIDE_DELAY", var("HIDE_DELAY"))?,
            fallback_ms: parse_var("FALLBACK_MS", var("FALLBACK_MS"))?,
            preload_ms: parse_var("PRELOAD_MS", var("PRELOAD_MS"))?,
            no_force_cut: var("NO_FORCE_CUT")
                .map(|raw| parse_flag(&raw).with_context(|| format!("{ENV_PREFIX}NO_FORCE_CUT")))
                .transpose()?,
        })
    }

    /// `self` wins wherever it has a value.
    pub fn over(self, lower: Overrides) -> Overrides {
        Overrides {
            url: self.url.or(lower.url),
            password: self.password.or(lower.password),
            password_file: self.password_file.or(lower.password_file),
            itstinks_scene: self.itstinks_scene.or(lower.itstinks_scene),
            clip_input: self.clip_input.or(lower.clip_input),
            prevscene_source: self.prevscene_source.or(lower.prevscene_source),
            clone_input: self.clone_input.or(lower.clone_input),
            wrapper_scene: self.wrapper_scene.or(lower.wrapper_scene),
            hide_delay: self.hide_delay.or(lower.hide_delay),
            fallback_ms: self.fallback_ms.or(lower.fallback_ms),
            preload_ms: self.preload_ms.or(lower.preload_ms),
            no_force_cut: self.no_force_cut.or(lower.no_force_cut),
        }
    }
}

fn parse_var<T>(name: &str, raw: Option<String>) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.map(|raw| {
        raw.trim()
            .parse()
            .with_context(|| format!("{ENV_PREFIX}{name}={raw:?} is not a valid value"))
    })
    .transpose()
}

fn parse_flag(raw: &str) -> anyhow::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean, got {other:?}"),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub url: String,
    pub password: Option<String>,
    pub plan: CutPlan,
}

impl Settings {
    pub fn resolve(layers: Overrides) -> anyhow::Result<Self> {
        let defaults = CutPlan::default();

        let hide_delay = match layers.hide_delay {
            Some(secs) => match Duration::try_from_secs_f64(secs) {
                Ok(delay) => delay,
                Err(_) => bail!("hide delay must be a finite number of seconds >= 0, got {secs}"),
            },
            None => defaults.hide_delay,
        };
        let password = resolve_password(layers.password, layers.password_file.as_deref())?;

        let plan = CutPlan {
            overlay_scene: layers.itstinks_scene.unwrap_or(defaults.overlay_scene),
            clip_input: layers.clip_input.unwrap_or(defaults.clip_input),
            background_source: layers.prevscene_source.unwrap_or(defaults.background_source),
            clone_input: layers.clone_input.unwrap_or(defaults.clone_input),
            wrapper_scene: layers.wrapper_scene.unwrap_or(defaults.wrapper_scene),
            hide_delay,
            fallback_duration: layers
                .fallback_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.fallback_duration),
            preload: layers
                .preload_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.preload),
            force_cut: !layers.no_force_cut.unwrap_or(false),
            ..defaults
        };

        Ok(Self {
            url: layers.url.unwrap_or_else(|| DEFAULT_URL.to_string()),
            password,
            plan,
        })
    }
}

/// Layers `cli` over the environment over the config file, then resolves.
pub fn load_settings(
    cli: Overrides,
    cli_config: Option<PathBuf>,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<Settings> {
    let explicit_config = cli_config.or_else(|| env(CONFIG_ENV).map(PathBuf::from));
    let file = load_config_file(explicit_config.as_deref())?;
    let env = Overrides::from_env(env)?;
    Settings::resolve(cli.over(env).over(file))
}

/// An explicitly named file must exist; the default one is optional.
fn load_config_file(explicit: Option<&Path>) -> anyhow::Result<Overrides> {
    let path = explicit.unwrap_or(Path::new(DEFAULT_CONFIG_FILE));
    match fs::read_to_string(path) {
        Ok(raw) => Overrides::from_toml(&raw).with_context(|| path.display().to_string()),
        Err(err) if err.kind() == io::ErrorKind::NotFound && explicit.is_none() => {
            Ok(Overrides::default())
        }
        Err(err) => {
            Err(err).with_context(|| format!("failed to read config file {}", path.display()))
        }
    }
}

fn resolve_password(
    password: Option<String>,
    password_file: Option<&str>,
) -> anyhow::Result<Option<String>> {
    if let Some(password) = password.filter(|p| !p.is_empty()) {
        return Ok(Some(password));
    }

    let explicit = password_file.is_some();
    let path = expand_home(password_file.unwrap_or(DEFAULT_PASSWORD_FILE));
    match fs::read_to_string(&path) {
        Ok(raw) => {
            let trimmed = raw.trim();
            Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound && !explicit => Ok(None),
        Err(err) => {
            Err(err).with_context(|| format!("failed to read password file {}", path.display()))
        }
    }
}

fn expand_home(path: &str) -> PathBuf {
    let rest = match path.strip_prefix('~') {
        Some("") => "",
        Some(rest) if rest.starts_with('/') => &rest[1..],
        _ => return PathBuf::from(path),
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => PathBuf::from(path),
    }
}
