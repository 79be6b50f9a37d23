use crate::error::{Result, UpscaylError};
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

static APP_DATA_DIR: OnceLock<PathBuf> = OnceLock::new();

pub fn get_app_data_dir() -> PathBuf {
    APP_DATA_DIR
        .get_or_init(|| {
            let base_dir = dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."));
            base_dir.join("upscayl")
        })
        .clone()
}

pub fn get_data_dir() -> PathBuf {
    get_app_data_dir().join("data")
}

pub fn get_logs_dir() -> PathBuf {
    get_app_data_dir().join("logs")
}

pub fn get_settings_json_path() -> PathBuf {
    get_data_dir().join("settings.json")
}

/// Look for a bundled resource directory next to the executable, then up to three
/// parents above it (development layout), then in the current directory.
fn find_resource_dir(name: &str) -> PathBuf {
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            let candidate = exe_dir.join(name);
            if candidate.exists() {
                return candidate;
            }

            let mut current = exe_dir;
            for _ in 0..3 {
                if let Some(parent) = current.parent() {
                    let dev_candidate = parent.join(name);
                    if dev_candidate.exists() {
                        debug!("Found {} at: {:?}", name, dev_candidate);
                        return dev_candidate;
                    }
                    current = parent;
                }
            }
        }
    }

    let cwd_candidate = std::env::current_dir()
        .unwrap_or_default()
        .join(name);

    debug!("Fallback to current dir {}: {:?}", name, cwd_candidate);
    cwd_candidate
}

/// Directory holding the upscaler executables.
pub fn get_bundled_bin_dir() -> PathBuf {
    find_resource_dir("bin")
}

/// Directory holding the models shipped with the application.
pub fn get_bundled_models_dir() -> PathBuf {
    find_resource_dir("models")
}

pub fn ensure_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|e| UpscaylError::io(dir, e))?;
        debug!("Created directory: {:?}", dir);
    }
    Ok(())
}

pub fn initialize_data_directories() -> Result<()> {
    let directories = [get_data_dir(), get_logs_dir()];

    for dir in &directories {
        ensure_dir(dir)?;
    }

    info!("Data directories initialized at: {:?}", get_app_data_dir());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_is_under_app_data_dir() {
        let root = get_app_data_dir();
        assert!(get_settings_json_path().starts_with(&root));
        assert!(get_logs_dir().starts_with(&root));
        assert_eq!(get_settings_json_path().file_name().unwrap(), "settings.json");
    }

    #[test]
    fn test_ensure_dir_creates_nested() {
        let dir = std::env::temp_dir()
            .join(format!("upscayl-paths-{}", uuid::Uuid::new_v4()))
            .join("a")
            .join("b");
        ensure_dir(&dir).unwrap();
        assert!(dir.is_dir());
        ensure_dir(&dir).unwrap();
        let _ = fs::remove_dir_all(dir.parent().unwrap().parent().unwrap());
    }
}
