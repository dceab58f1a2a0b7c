use std::{collections::HashMap, fs, path::Path};

use companion_core::ClientConfig;
use shared::domain::{AvatarId, EntityId, WorldId};
use tracing::warn;

pub const DEFAULT_CONFIG_PATH: &str = "companion.toml";

/// Defaults, then the optional TOML file, then the environment.
pub fn load_settings(path: &Path) -> ClientConfig {
    load_settings_with(path, |key| std::env::var(key).ok())
}

fn load_settings_with(path: &Path, lookup: impl Fn(&str) -> Option<String>) -> ClientConfig {
    let mut settings = ClientConfig::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<HashMap<String, String>>(&raw) {
            Ok(file_cfg) => apply_file(&mut settings, &file_cfg),
            Err(err) => warn!(path = %path.display(), "ignoring config file: {err}"),
        }
    }

    apply_env(&mut settings, lookup);
    settings
}

fn apply_file(settings: &mut ClientConfig, file_cfg: &HashMap<String, String>) {
    if let Some(v) = file_cfg.get("ws_url") {
        settings.ws_url = v.clone();
    }
    if let Some(v) = file_cfg.get("http_url") {
        settings.http_url = v.clone();
    }
    if let Some(v) = file_cfg.get("username") {
        settings.credentials.username = v.clone();
    }
    if let Some(v) = file_cfg.get("password") {
        settings.credentials.password = v.clone();
    }
    if let Some(v) = file_cfg.get("worlds") {
        apply_worlds(settings, v);
    }
    if let Some(v) = file_cfg.get("entity_id") {
        apply_entity_id(settings, v);
    }
    if let Some(v) = file_cfg.get("avatar_id") {
        apply_avatar_id(settings, v);
    }
}

/// Later names in each list take precedence, so `APP__*` beats the short form.
fn apply_env(settings: &mut ClientConfig, lookup: impl Fn(&str) -> Option<String>) {
    let var = |names: &[&str]| names.iter().filter_map(|name| lookup(*name)).last();

    if let Some(v) = var(&["WS_URL", "APP__WS_URL"]) {
        settings.ws_url = v;
    }
    if let Some(v) = var(&["HTTP_URL", "APP__HTTP_URL"]) {
        settings.http_url = v;
    }
    if let Some(v) = var(&["BOT_USERNAME", "APP__USERNAME"]) {
        settings.credentials.username = v;
    }
    if let Some(v) = var(&["BOT_PASSWORD", "APP__PASSWORD"]) {
        settings.credentials.password = v;
    }
    if let Some(v) = var(&["WORLDS", "APP__WORLDS"]) {
        apply_worlds(settings, &v);
    }
    if let Some(v) = var(&["BOT_ENTITY_ID", "APP__ENTITY_ID"]) {
        apply_entity_id(settings, &v);
    }
    if let Some(v) = var(&["BOT_AVATAR_ID", "APP__AVATAR_ID"]) {
        apply_avatar_id(settings, &v);
    }
}

fn apply_worlds(settings: &mut ClientConfig, raw: &str) {
    match parse_worlds(raw) {
        Some(worlds) => settings.worlds = worlds,
        None => warn!(value = raw, "ignoring invalid world list"),
    }
}

fn apply_entity_id(settings: &mut ClientConfig, raw: &str) {
    match raw.trim().parse::<i64>() {
        Ok(id) => settings.identity.entity_id = EntityId(id),
        Err(_) => warn!(value = raw, "ignoring invalid entity id"),
    }
}

fn apply_avatar_id(settings: &mut ClientConfig, raw: &str) {
    match raw.trim().parse::<i64>() {
        Ok(id) => settings.identity.avatar_id = AvatarId(id),
        Err(_) => warn!(value = raw, "ignoring invalid avatar id"),
    }
}

fn parse_worlds(raw: &str) -> Option<Vec<WorldId>> {
    let worlds = raw
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| part.parse::<i64>().ok().map(WorldId))
        .collect::<Option<Vec<_>>>()?;
    (!worlds.is_empty()).then_some(worlds)
}
