//! Persisted global settings and application preferences.

use super::{BlockKind, ConversionSettings, NamingBlock, NamingConfig, SettingsOverride};
use super::{DEFAULT_PREFIX, DEFAULT_RANDOM_LENGTH};
use crate::storage::{KeyValueStore, APP_SETTINGS_KEY, SETTINGS_KEY};
use aether_common::ConflictMode;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;

/// Current version of the persisted settings record.
pub const SETTINGS_VERSION: u64 = 2;

/// Application-level preferences that are not conversion parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppPreferences {
    /// Restore an unfinished session without asking.
    pub auto_restore_session: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct SettingsRecord {
    version: u64,
    settings: ConversionSettings,
    output_directory: Option<PathBuf>,
}

/// Owner of the global settings, the output directory and preferences.
///
/// Every mutation is written through to the key-value store.
pub struct SettingsStore {
    record: RwLock<SettingsRecord>,
    preferences: RwLock<AppPreferences>,
    storage: Arc<dyn KeyValueStore>,
}

impl SettingsStore {
    /// Load persisted records, migrating legacy versions. Unreadable
    /// records fall back to defaults.
    pub fn load(storage: Arc<dyn KeyValueStore>) -> Arc<Self> {
        let record = match storage.get(SETTINGS_KEY) {
            Ok(Some(raw)) => parse_settings_record(&raw).unwrap_or_else(|e| {
                tracing::warn!("Discarding unreadable settings record: {}", e);
                SettingsRecord::default()
            }),
            Ok(None) => SettingsRecord::default(),
            Err(e) => {
                tracing::warn!("Failed to read settings: {}", e);
                SettingsRecord::default()
            }
        };

        let preferences = match storage.get(APP_SETTINGS_KEY) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!("Discarding unreadable preferences: {}", e);
                AppPreferences::default()
            }),
            Ok(None) => AppPreferences::default(),
            Err(e) => {
                tracing::warn!("Failed to read preferences: {}", e);
                AppPreferences::default()
            }
        };

        Arc::new(Self {
            record: RwLock::new(SettingsRecord {
                version: SETTINGS_VERSION,
                ..record
            }),
            preferences: RwLock::new(preferences),
            storage,
        })
    }

    /// Global settings with the output directory folded in.
    pub fn global(&self) -> ConversionSettings {
        let record = self.record.read();
        let mut settings = record.settings.clone();
        if record.output_directory.is_some() {
            settings.output_directory = record.output_directory.clone();
        }
        settings
    }

    pub fn output_directory(&self) -> Option<PathBuf> {
        self.record.read().output_directory.clone()
    }

    pub fn conflict_mode(&self) -> ConflictMode {
        self.record.read().settings.conflict_mode
    }

    pub fn preferences(&self) -> AppPreferences {
        self.preferences.read().clone()
    }

    /// Apply every set field of `patch` to the global settings.
    pub fn update(&self, patch: &SettingsOverride) {
        self.update_with(|settings| patch.apply_to(settings));
    }

    /// Mutate the global settings in place.
    pub fn update_with(&self, f: impl FnOnce(&mut ConversionSettings)) {
        f(&mut self.record.write().settings);
        self.persist_settings();
    }

    /// Edit the global naming template.
    pub fn update_naming<R>(&self, f: impl FnOnce(&mut NamingConfig) -> R) -> R {
        let result = f(&mut self.record.write().settings.naming_config);
        self.persist_settings();
        result
    }

    /// Restore default settings. The output directory is kept.
    pub fn reset(&self) {
        self.record.write().settings = ConversionSettings::default();
        self.persist_settings();
    }

    pub fn set_output_directory(&self, dir: Option<PathBuf>) {
        self.record.write().output_directory = dir;
        self.persist_settings();
    }

    pub fn set_conflict_mode(&self, mode: ConflictMode) {
        self.update_with(|settings| settings.conflict_mode = mode);
    }

    pub fn set_auto_restore(&self, enabled: bool) {
        self.preferences.write().auto_restore_session = enabled;
        self.persist_preferences();
    }

    fn persist_settings(&self) {
        let result = {
            let record = self.record.read();
            serde_json::to_string(&*record)
        };
        match result {
            Ok(json) => {
                if let Err(e) = self.storage.set(SETTINGS_KEY, &json) {
                    tracing::error!("Failed to persist settings: {}", e);
                }
            }
            Err(e) => tracing::error!("Failed to serialize settings: {}", e),
        }
    }

    fn persist_preferences(&self) {
        let result = serde_json::to_string(&*self.preferences.read());
        match result {
            Ok(json) => {
                if let Err(e) = self.storage.set(APP_SETTINGS_KEY, &json) {
                    tracing::error!("Failed to persist preferences: {}", e);
                }
            }
            Err(e) => tracing::error!("Failed to serialize preferences: {}", e),
        }
    }
}

fn parse_settings_record(raw: &str) -> serde_json::Result<SettingsRecord> {
    let value: Value = serde_json::from_str(raw)?;
    serde_json::from_value(migrate_settings_record(value))
}

/// Bring a raw settings record up to [`SETTINGS_VERSION`].
///
/// - v0 → v1: a single `naming_strategy` (plus `prefix_value` and
///   `random_length`) becomes a list of naming blocks.
/// - v1 → v2: the boolean `overwrite` becomes a `conflict_mode`.
///
/// Both snake_case and camelCase legacy keys are accepted.
pub fn migrate_settings_record(mut record: Value) -> Value {
    let version = record.get("version").and_then(Value::as_u64).unwrap_or(0);
    if version >= SETTINGS_VERSION {
        return record;
    }

    if let Some(settings) = record.get_mut("settings").and_then(Value::as_object_mut) {
        if version < 1 {
            let strategy = take_legacy(settings, "naming_strategy", "namingStrategy");
            let prefix = take_legacy(settings, "prefix_value", "prefixValue");
            let length = take_legacy(settings, "random_length", "randomLength");

            if let Some(strategy) = strategy.as_ref().and_then(Value::as_str) {
                let prefix = prefix
                    .as_ref()
                    .and_then(Value::as_str)
                    .filter(|p| !p.is_empty())
                    .unwrap_or(DEFAULT_PREFIX);
                let length = length
                    .as_ref()
                    .and_then(Value::as_u64)
                    .and_then(|l| u8::try_from(l).ok())
                    .unwrap_or(DEFAULT_RANDOM_LENGTH);

                let sanitize = settings
                    .get("naming_config")
                    .and_then(|n| n.get("sanitize_enabled"))
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                let config = NamingConfig {
                    blocks: legacy_blocks(strategy, prefix, length),
                    sanitize_enabled: sanitize,
                };
                if let Ok(value) = serde_json::to_value(config) {
                    settings.insert("naming_config".into(), value);
                }
            }
        }

        if let Some(overwrite) = take_legacy(settings, "overwrite", "overwrite") {
            let mode = if overwrite.as_bool().unwrap_or(false) {
                "overwrite"
            } else {
                "skip"
            };
            settings.insert("conflict_mode".into(), json!(mode));
        }
    }

    if let Some(obj) = record.as_object_mut() {
        obj.insert("version".into(), json!(SETTINGS_VERSION));
    }
    record
}

fn take_legacy(
    settings: &mut serde_json::Map<String, Value>,
    snake: &str,
    camel: &str,
) -> Option<Value> {
    let snake_value = settings.remove(snake);
    let camel_value = settings.remove(camel);
    snake_value.or(camel_value)
}

fn legacy_blocks(strategy: &str, prefix: &str, length: u8) -> Vec<NamingBlock> {
    let original = || NamingBlock::with_id("migrated-original", BlockKind::Original);
    match strategy {
        "prefix" => vec![
            NamingBlock::with_id(
                "migrated-prefix",
                BlockKind::Prefix {
                    value: prefix.to_string(),
                },
            ),
            original(),
        ],
        "random" => vec![NamingBlock::with_id(
            "migrated-random",
            BlockKind::Random {
                length: length.clamp(4, 32),
            },
        )],
        "date" => vec![
            original(),
            NamingBlock::with_id("migrated-date", BlockKind::Date),
        ],
        _ => vec![original()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::FieldOverride;
    use crate::storage::MemoryStore;

    #[test]
    fn test_defaults_when_nothing_persisted() {
        let store = SettingsStore::load(MemoryStore::new());
        assert_eq!(store.global(), ConversionSettings::default());
        assert_eq!(store.preferences(), AppPreferences::default());
        assert_eq!(store.output_directory(), None);
    }

    #[test]
    fn test_mutations_persist_and_reload() {
        let storage = MemoryStore::new();
        let store = SettingsStore::load(storage.clone());

        store.update(&SettingsOverride {
            quality_percent: FieldOverride::Set(42),
            ..Default::default()
        });
        store.set_output_directory(Some(PathBuf::from("/out")));
        store.set_conflict_mode(ConflictMode::KeepBoth);
        store.set_auto_restore(true);

        let reloaded = SettingsStore::load(storage);
        let global = reloaded.global();
        assert_eq!(global.quality_percent, 42);
        assert_eq!(global.output_directory, Some(PathBuf::from("/out")));
        assert_eq!(reloaded.conflict_mode(), ConflictMode::KeepBoth);
        assert!(reloaded.preferences().auto_restore_session);
    }

    #[test]
    fn test_reset_keeps_output_directory() {
        let store = SettingsStore::load(MemoryStore::new());
        store.set_output_directory(Some(PathBuf::from("/out")));
        store.update_with(|s| s.is_muted = true);

        store.reset();
        assert!(!store.global().is_muted);
        assert_eq!(store.output_directory(), Some(PathBuf::from("/out")));
    }

    #[test]
    fn test_migrate_prefix_strategy_and_overwrite() {
        let legacy = json!({
            "version": 0,
            "settings": {
                "namingStrategy": "prefix",
                "prefixValue": "holiday",
                "overwrite": true,
                "quality_percent": 65
            }
        });

        let migrated = migrate_settings_record(legacy);
        assert_eq!(migrated["version"], json!(2));

        let record: SettingsRecord = serde_json::from_value(migrated).unwrap();
        let blocks: Vec<_> = record
            .settings
            .naming_config
            .blocks
            .iter()
            .map(|b| b.kind.clone())
            .collect();
        assert_eq!(
            blocks,
            vec![
                BlockKind::Prefix {
                    value: "holiday".into()
                },
                BlockKind::Original
            ]
        );
        assert_eq!(record.settings.conflict_mode, ConflictMode::Overwrite);
        assert_eq!(record.settings.quality_percent, 65);
    }

    #[test]
    fn test_migrate_v1_overwrite_false_to_skip() {
        let legacy = json!({
            "version": 1,
            "settings": { "overwrite": false, "naming_config": NamingConfig::default() }
        });
        let record: SettingsRecord =
            serde_json::from_value(migrate_settings_record(legacy)).unwrap();
        assert_eq!(record.settings.conflict_mode, ConflictMode::Skip);
        assert_eq!(record.settings.naming_config, NamingConfig::default());
    }

    #[test]
    fn test_migrate_random_strategy_clamps_length() {
        let legacy = json!({
            "settings": { "naming_strategy": "random", "random_length": 90 }
        });
        let record: SettingsRecord =
            serde_json::from_value(migrate_settings_record(legacy)).unwrap();
        assert_eq!(
            record.settings.naming_config.blocks[0].kind,
            BlockKind::Random { length: 32 }
        );
    }

    #[test]
    fn test_current_version_is_untouched() {
        let current = json!({"version": 2, "settings": {"overwrite": true}});
        assert_eq!(migrate_settings_record(current.clone()), current);
    }

    #[test]
    fn test_corrupt_record_falls_back_to_defaults() {
        let storage = MemoryStore::new();
        storage.set(SETTINGS_KEY, "{not json").unwrap();
        storage.set(APP_SETTINGS_KEY, "[]").unwrap();

        let store = SettingsStore::load(storage);
        assert_eq!(store.global(), ConversionSettings::default());
        assert!(!store.preferences().auto_restore_session);
    }

    #[test]
    fn test_update_naming() {
        let store = SettingsStore::load(MemoryStore::new());
        let id = store.update_naming(|n| n.add_block(BlockKind::Date));
        assert_eq!(store.global().naming_config.blocks.len(), 2);
        assert!(store.update_naming(|n| n.remove_block(&id)));
        assert_eq!(store.global().naming_config.blocks.len(), 1);
    }
}
