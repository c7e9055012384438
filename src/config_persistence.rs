use std::path::Path;

use log::warn;
use toml_edit::{value, Array, DocumentMut, Item, Table};

use crate::config::{sanitize_config, Config};

fn set_table_value_preserving_decor(table: &mut Table, key: &str, item: Item) {
    let existing_value_decor = table
        .get(key)
        .and_then(|current| current.as_value().map(|value| value.decor().clone()));
    table[key] = item;
    if let Some(existing_value_decor) = existing_value_decor {
        if let Some(next_value) = table[key].as_value_mut() {
            *next_value.decor_mut() = existing_value_decor;
        }
    }
}

fn set_table_scalar_if_changed<T, F>(
    table: &mut Table,
    key: &str,
    previous_value: T,
    next_value: T,
    to_item: F,
) where
    T: PartialEq + Copy,
    F: FnOnce(T) -> Item,
{
    if table.contains_key(key) && previous_value == next_value {
        return;
    }
    set_table_value_preserving_decor(table, key, to_item(next_value));
}

fn ensure_section_table<'a>(document: &'a mut DocumentMut, key: &str) -> Option<&'a mut Table> {
    let root = document.as_table_mut();
    let should_replace = !matches!(root.get(key), Some(item) if item.is_table());
    if should_replace {
        root.insert(key, Item::Table(Table::new()));
    }
    root.get_mut(key).and_then(Item::as_table_mut)
}

fn write_config_to_document(document: &mut DocumentMut, previous: &Config, config: &Config) {
    if let Some(library) = ensure_section_table(document, "library") {
        if !library.contains_key("folders") || previous.library.folders != config.library.folders {
            let folders: Array = config.library.folders.iter().map(String::as_str).collect();
            set_table_value_preserving_decor(library, "folders", value(folders));
        }
        if previous.library.cache_file != config.library.cache_file {
            match &config.library.cache_file {
                Some(cache_file) => {
                    set_table_value_preserving_decor(library, "cache_file", value(cache_file.as_str()))
                }
                None => {
                    library.remove("cache_file");
                }
            }
        }
    }

    if let Some(covers) = ensure_section_table(document, "covers") {
        set_table_scalar_if_changed(
            covers,
            "show_covers",
            previous.covers.show_covers,
            config.covers.show_covers,
            value,
        );
        set_table_scalar_if_changed(
            covers,
            "cover_size",
            i64::from(previous.covers.cover_size),
            i64::from(config.covers.cover_size),
            value,
        );
        set_table_scalar_if_changed(
            covers,
            "buffered_cover_size",
            i64::from(previous.covers.buffered_cover_size),
            i64::from(config.covers.buffered_cover_size),
            value,
        );
        set_table_scalar_if_changed(
            covers,
            "buffer_increment",
            i64::from(previous.covers.buffer_increment),
            i64::from(config.covers.buffer_increment),
            value,
        );
        set_table_scalar_if_changed(
            covers,
            "decoded_cache_entries",
            previous.covers.decoded_cache_entries as i64,
            config.covers.decoded_cache_entries as i64,
            value,
        );
    }

    if let Some(scan) = ensure_section_table(document, "scan") {
        set_table_scalar_if_changed(
            scan,
            "progress_updates_per_second",
            i64::from(previous.scan.progress_updates_per_second),
            i64::from(config.scan.progress_updates_per_second),
            value,
        );
    }
}

pub fn serialize_config_with_preserved_comments(
    existing_text: &str,
    config: &Config,
) -> Result<String, String> {
    let previous = toml::from_str::<Config>(existing_text)
        .map_err(|err| format!("failed to parse existing config as Config: {}", err))?;
    let mut document = existing_text
        .parse::<DocumentMut>()
        .map_err(|err| format!("failed to parse existing config as TOML document: {}", err))?;
    write_config_to_document(&mut document, &previous, config);
    Ok(document.to_string())
}

pub fn persist_config_file(config: &Config, path: &Path) {
    let existing_text = std::fs::read_to_string(path).ok();
    let config_text = if let Some(existing_text) = existing_text {
        match serialize_config_with_preserved_comments(&existing_text, config) {
            Ok(updated_text) => Some(updated_text),
            Err(err) => {
                warn!(
                    "Failed to preserve config comments for {} ({}). Falling back to plain serialization.",
                    path.display(),
                    err
                );
                toml::to_string(config).ok()
            }
        }
    } else {
        toml::to_string(config).ok()
    };

    let Some(config_text) = config_text else {
        log::error!("Failed to serialize config for {}", path.display());
        return;
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                log::error!("Failed to create config directory {}: {}", parent.display(), err);
                return;
            }
        }
    }
    if let Err(err) = std::fs::write(path, config_text) {
        log::error!("Failed to persist config to {}: {}", path.display(), err);
    }
}

/// Loads and sanitizes `path`, falling back to defaults when it is missing or invalid.
pub fn load_config_file(path: &Path) -> Config {
    let config_content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            warn!(
                "Failed to read config file {}. Using defaults. error={}",
                path.display(),
                err
            );
            return Config::default();
        }
    };

    match toml::from_str::<Config>(&config_content) {
        Ok(config) => sanitize_config(config),
        Err(err) => {
            warn!(
                "Failed to parse config file {}. Using defaults. error={}",
                path.display(),
                err
            );
            Config::default()
        }
    }
}
