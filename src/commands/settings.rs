// Settings command handlers backed by the settings JSON file
use crate::error::{ConfigurationError, Result};
use crate::file_manager::{read_json_file_or_default, update_json_file};
use crate::models::Settings;
use crate::upscale::command_builder::list_custom_models;
use crate::utils::get_settings_json_path;
use log::debug;
use serde::Deserialize;
use std::path::Path;

/// Partial settings update. Absent fields are left alone; an empty string clears
/// an optional path.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateSettingsParams {
    pub remember_output_folder: Option<bool>,
    pub saved_output_path: Option<String>,
    pub batch_output_path: Option<String>,
    pub custom_models_path: Option<String>,
    pub compression: Option<u8>,
    pub no_image_processing: Option<bool>,
    pub use_custom_width: Option<bool>,
    pub custom_width: Option<u32>,
    pub gpu_id: Option<String>,
    pub save_image_as: Option<String>,
    pub default_model: Option<String>,
    pub bin_dir: Option<String>,
    pub models_dir: Option<String>,
}

fn optional_path(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

impl UpdateSettingsParams {
    /// Reject values that would only fail later, at submission time.
    fn validate(&self) -> Result<()> {
        if let Some(compression) = self.compression {
            if compression > 100 {
                return Err(ConfigurationError::InvalidCompression(compression).into());
            }
        }
        if let Some(width) = self.custom_width {
            if width == 0 {
                return Err(ConfigurationError::InvalidTargetWidth.into());
            }
        }
        if let Some(path) = self.custom_models_path.as_deref() {
            if !path.trim().is_empty() {
                list_custom_models(Path::new(path))
                    .map_err(|_| ConfigurationError::InvalidCustomModelsFolder(path.into()))?;
            }
        }
        Ok(())
    }

    fn apply(self, settings: &mut Settings) {
        if let Some(remember_output_folder) = self.remember_output_folder {
            settings.remember_output_folder = remember_output_folder;
        }
        if let Some(saved_output_path) = self.saved_output_path {
            settings.saved_output_path = optional_path(saved_output_path);
        }
        if let Some(batch_output_path) = self.batch_output_path {
            settings.batch_output_path = optional_path(batch_output_path);
        }
        if let Some(custom_models_path) = self.custom_models_path {
            settings.custom_models_path = optional_path(custom_models_path);
        }
        if let Some(compression) = self.compression {
            settings.compression = compression;
        }
        if let Some(no_image_processing) = self.no_image_processing {
            settings.no_image_processing = no_image_processing;
        }
        if let Some(use_custom_width) = self.use_custom_width {
            settings.use_custom_width = use_custom_width;
        }
        if let Some(custom_width) = self.custom_width {
            settings.custom_width = Some(custom_width);
        }
        if let Some(gpu_id) = self.gpu_id {
            settings.gpu_id = gpu_id;
        }
        if let Some(save_image_as) = self.save_image_as {
            settings.save_image_as = save_image_as.to_lowercase();
        }
        if let Some(default_model) = self.default_model {
            if !default_model.trim().is_empty() {
                settings.default_model = default_model;
            }
        }
        if let Some(bin_dir) = self.bin_dir {
            settings.bin_dir = optional_path(bin_dir);
        }
        if let Some(models_dir) = self.models_dir {
            settings.models_dir = optional_path(models_dir);
        }
    }
}

/// Current settings, or the defaults when no settings file exists yet.
pub fn get_settings() -> Result<Settings> {
    get_settings_from(&get_settings_json_path())
}

pub fn get_settings_from(path: &Path) -> Result<Settings> {
    read_json_file_or_default(path)
}

pub fn update_settings(params: UpdateSettingsParams) -> Result<Settings> {
    update_settings_at(&get_settings_json_path(), params)
}

pub fn update_settings_at(path: &Path, params: UpdateSettingsParams) -> Result<Settings> {
    params.validate()?;
    let settings = update_json_file(path, |settings: &mut Settings| params.apply(settings))?;
    debug!("Updated settings: {:?}", settings);
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UpscaylError;
    use std::fs;
    use std::path::PathBuf;

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("upscayl-settings-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = scratch_dir();
        let settings = get_settings_from(&dir.join("settings.json")).unwrap();
        assert_eq!(settings, Settings::default());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_partial_update_keeps_other_fields() {
        let dir = scratch_dir();
        let path = dir.join("settings.json");

        update_settings_at(
            &path,
            UpdateSettingsParams {
                compression: Some(80),
                save_image_as: Some("WEBP".to_string()),
                ..UpdateSettingsParams::default()
            },
        )
        .unwrap();
        let settings = update_settings_at(
            &path,
            UpdateSettingsParams {
                remember_output_folder: Some(true),
                saved_output_path: Some("/pinned".to_string()),
                ..UpdateSettingsParams::default()
            },
        )
        .unwrap();

        assert_eq!(settings.compression, 80);
        assert_eq!(settings.save_image_as, "webp");
        assert_eq!(settings.remembered_output_dir(), Some(PathBuf::from("/pinned")));
        assert_eq!(get_settings_from(&path).unwrap(), settings);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_empty_string_clears_path() {
        let dir = scratch_dir();
        let path = dir.join("settings.json");
        update_settings_at(
            &path,
            UpdateSettingsParams {
                batch_output_path: Some("/batch".to_string()),
                ..UpdateSettingsParams::default()
            },
        )
        .unwrap();

        let settings = update_settings_at(
            &path,
            UpdateSettingsParams {
                batch_output_path: Some(String::new()),
                ..UpdateSettingsParams::default()
            },
        )
        .unwrap();
        assert_eq!(settings.batch_output_path, None);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_invalid_values_are_rejected_without_writing() {
        let dir = scratch_dir();
        let path = dir.join("settings.json");

        let err = update_settings_at(
            &path,
            UpdateSettingsParams {
                compression: Some(101),
                ..UpdateSettingsParams::default()
            },
        )
        .unwrap_err();
        assert!(matches!(
            err,
            UpscaylError::Configuration(ConfigurationError::InvalidCompression(101))
        ));

        let empty = dir.join("empty-models");
        fs::create_dir_all(&empty).unwrap();
        let err = update_settings_at(
            &path,
            UpdateSettingsParams {
                custom_models_path: Some(empty.to_string_lossy().to_string()),
                ..UpdateSettingsParams::default()
            },
        )
        .unwrap_err();
        assert!(err.is_configuration());
        assert!(!path.exists());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_params_deserialize_from_partial_json() {
        let params: UpdateSettingsParams =
            serde_json::from_str(r#"{"no_image_processing": true, "gpu_id": "1"}"#).unwrap();
        assert_eq!(params.no_image_processing, Some(true));
        assert_eq!(params.gpu_id.as_deref(), Some("1"));
        assert!(params.compression.is_none());
    }
}
