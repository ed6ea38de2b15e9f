//! Conversion settings and per-item overrides.
//!
//! The global [`ConversionSettings`] apply to every queue item. An item may
//! carry a [`SettingsOverride`] in which each field is either inherited from
//! the global value or explicitly set. [`resolve`] produces the effective
//! settings; [`has_effective_override`] and [`clean_overrides`] compare an
//! override against the current globals.

mod naming;
mod store;

pub use naming::*;
pub use store::*;

use aether_common::{
    AudioFormat, BackgroundColor, ConflictMode, ImageFormat, ResizeMode, VideoFormat,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Effective conversion parameters for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionSettings {
    /// `None` keeps the original container.
    pub video_format: Option<VideoFormat>,
    pub image_format: Option<ImageFormat>,
    pub audio_format: Option<AudioFormat>,
    pub quality_percent: u8,
    pub resize_enabled: bool,
    pub resize_width: u32,
    pub resize_height: u32,
    pub resize_mode: ResizeMode,
    pub background_color: BackgroundColor,
    pub is_muted: bool,
    pub strip_metadata: bool,
    pub naming_config: NamingConfig,
    /// `None` writes next to the input file.
    pub output_directory: Option<PathBuf>,
    /// Applied globally; not overridable per item.
    pub conflict_mode: ConflictMode,
    /// When off, items are only renamed/relocated.
    pub processing_enabled: bool,
    /// Upper video bitrate in kbit/s.
    pub max_bitrate: Option<u32>,
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self {
            video_format: None,
            image_format: None,
            audio_format: None,
            quality_percent: 80,
            resize_enabled: false,
            resize_width: 1920,
            resize_height: 1080,
            resize_mode: ResizeMode::Contain,
            background_color: BackgroundColor::Black,
            is_muted: false,
            strip_metadata: false,
            naming_config: NamingConfig::default(),
            output_directory: None,
            conflict_mode: ConflictMode::Skip,
            processing_enabled: true,
            max_bitrate: None,
        }
    }
}

/// A single overridable field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "lowercase")]
pub enum FieldOverride<T> {
    /// Use the global value.
    Inherit,
    /// Use this value regardless of the global one.
    Set(T),
}

impl<T> Default for FieldOverride<T> {
    fn default() -> Self {
        Self::Inherit
    }
}

impl<T> FieldOverride<T> {
    pub fn is_inherit(&self) -> bool {
        matches!(self, Self::Inherit)
    }

    pub fn as_set(&self) -> Option<&T> {
        match self {
            Self::Set(v) => Some(v),
            Self::Inherit => None,
        }
    }
}

impl<T: Clone + PartialEq> FieldOverride<T> {
    fn apply(&self, target: &mut T) {
        if let Self::Set(v) = self {
            *target = v.clone();
        }
    }

    /// Set to a value that differs from `global` (deep equality).
    fn differs_from(&self, global: &T) -> bool {
        matches!(self, Self::Set(v) if v != global)
    }
}

impl<T> From<T> for FieldOverride<T> {
    fn from(value: T) -> Self {
        Self::Set(value)
    }
}

macro_rules! settings_override {
    ($($field:ident: $ty:ty),+ $(,)?) => {
        /// Partial settings for one item. Absent fields inherit.
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        #[serde(default)]
        pub struct SettingsOverride {
            $(
                #[serde(skip_serializing_if = "FieldOverride::is_inherit")]
                pub $field: FieldOverride<$ty>,
            )+
        }

        impl SettingsOverride {
            /// Write every set field into `target`.
            pub fn apply_to(&self, target: &mut ConversionSettings) {
                $( self.$field.apply(&mut target.$field); )+
            }

            /// Shallow merge: fields set in `patch` replace ours.
            pub fn merge(&mut self, patch: &SettingsOverride) {
                $(
                    if !patch.$field.is_inherit() {
                        self.$field = patch.$field.clone();
                    }
                )+
            }

            /// Copy of `self` keeping only fields that differ from `global`.
            fn retain_differing(&self, global: &ConversionSettings) -> SettingsOverride {
                let mut pruned = SettingsOverride::default();
                $(
                    if self.$field.differs_from(&global.$field) {
                        pruned.$field = self.$field.clone();
                    }
                )+
                pruned
            }

            /// Number of fields that are set.
            pub fn set_count(&self) -> usize {
                0 $( + usize::from(!self.$field.is_inherit()) )+
            }

            /// Number of set fields whose value differs from `global`.
            pub fn differing_count(&self, global: &ConversionSettings) -> usize {
                0 $( + usize::from(self.$field.differs_from(&global.$field)) )+
            }
        }
    };
}

settings_override! {
    video_format: Option<VideoFormat>,
    image_format: Option<ImageFormat>,
    audio_format: Option<AudioFormat>,
    quality_percent: u8,
    resize_enabled: bool,
    resize_width: u32,
    resize_height: u32,
    resize_mode: ResizeMode,
    background_color: BackgroundColor,
    is_muted: bool,
    strip_metadata: bool,
    naming_config: NamingConfig,
    output_directory: Option<PathBuf>,
    processing_enabled: bool,
    max_bitrate: Option<u32>,
}

impl SettingsOverride {
    pub fn is_empty(&self) -> bool {
        self.set_count() == 0
    }
}

/// Effective settings: globals with every set override field applied.
pub fn resolve(global: &ConversionSettings, overrides: Option<&SettingsOverride>) -> ConversionSettings {
    let mut effective = global.clone();
    if let Some(o) = overrides {
        o.apply_to(&mut effective);
    }
    effective
}

/// True when at least one set field differs from the global value.
///
/// Comparison is structural, so a naming config with the same blocks in the
/// same order counts as equal.
pub fn has_effective_override(overrides: Option<&SettingsOverride>, global: &ConversionSettings) -> bool {
    overrides.is_some_and(|o| o.differing_count(global) > 0)
}

/// Drop fields equal to the globals; `None` when nothing remains.
pub fn clean_overrides(
    overrides: Option<&SettingsOverride>,
    global: &ConversionSettings,
) -> Option<SettingsOverride> {
    let pruned = overrides?.retain_differing(global);
    if pruned.is_empty() {
        None
    } else {
        Some(pruned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quality(q: u8) -> SettingsOverride {
        SettingsOverride {
            quality_percent: FieldOverride::Set(q),
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_without_override_is_global() {
        let global = ConversionSettings::default();
        assert_eq!(resolve(&global, None), global);
        assert_eq!(resolve(&global, Some(&SettingsOverride::default())), global);
    }

    #[test]
    fn test_resolve_applies_set_fields_only() {
        let global = ConversionSettings::default();
        let o = SettingsOverride {
            quality_percent: 40.into(),
            video_format: Some(VideoFormat::Webm).into(),
            ..Default::default()
        };

        let effective = resolve(&global, Some(&o));
        assert_eq!(effective.quality_percent, 40);
        assert_eq!(effective.video_format, Some(VideoFormat::Webm));
        assert_eq!(effective.image_format, None);
        assert_eq!(effective.resize_width, 1920);
    }

    #[test]
    fn test_explicit_keep_original_beats_global_format() {
        let global = ConversionSettings {
            video_format: Some(VideoFormat::Mkv),
            ..Default::default()
        };
        let o = SettingsOverride {
            video_format: FieldOverride::Set(None),
            ..Default::default()
        };
        assert_eq!(resolve(&global, Some(&o)).video_format, None);
        assert!(has_effective_override(Some(&o), &global));
    }

    #[test]
    fn test_has_effective_override_uses_deep_equality() {
        let global = ConversionSettings::default();

        assert!(!has_effective_override(None, &global));
        assert!(!has_effective_override(Some(&quality(80)), &global));
        assert!(has_effective_override(Some(&quality(81)), &global));

        // Structurally equal naming config is not an override
        let same_naming = SettingsOverride {
            naming_config: NamingConfig::default().into(),
            ..Default::default()
        };
        assert!(!has_effective_override(Some(&same_naming), &global));

        let mut naming = NamingConfig::default();
        naming.set_sanitize(true);
        let other_naming = SettingsOverride {
            naming_config: naming.into(),
            ..Default::default()
        };
        assert!(has_effective_override(Some(&other_naming), &global));
    }

    #[test]
    fn test_clean_overrides_prunes_equal_fields() {
        let global = ConversionSettings::default();
        let o = SettingsOverride {
            quality_percent: 80.into(),
            is_muted: true.into(),
            ..Default::default()
        };

        let cleaned = clean_overrides(Some(&o), &global).unwrap();
        assert!(cleaned.quality_percent.is_inherit());
        assert_eq!(cleaned.is_muted, FieldOverride::Set(true));
        assert_eq!(cleaned.set_count(), 1);

        assert_eq!(clean_overrides(Some(&quality(80)), &global), None);
        assert_eq!(clean_overrides(None, &global), None);
    }

    #[test]
    fn test_merge_is_shallow() {
        let mut base = SettingsOverride {
            quality_percent: 50.into(),
            is_muted: true.into(),
            ..Default::default()
        };
        base.merge(&quality(60));
        assert_eq!(base.quality_percent, FieldOverride::Set(60));
        assert_eq!(base.is_muted, FieldOverride::Set(true));
    }

    #[test]
    fn test_override_serialization_skips_inherit() {
        let json = serde_json::to_value(quality(70)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"quality_percent": {"mode": "set", "value": 70}})
        );

        let back: SettingsOverride = serde_json::from_value(json).unwrap();
        assert_eq!(back, quality(70));

        let empty: SettingsOverride = serde_json::from_str("{}").unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_settings_deserialize_fills_missing_fields() {
        let settings: ConversionSettings =
            serde_json::from_str(r#"{"quality_percent": 55}"#).unwrap();
        assert_eq!(settings.quality_percent, 55);
        assert!(settings.processing_enabled);
        assert_eq!(settings.naming_config, NamingConfig::default());
    }
}
