// Atomic JSON file operations

use crate::error::{Result, UpscaylError};
use log::debug;
use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

lazy_static::lazy_static! {
    static ref FILE_LOCK: parking_lot::Mutex<()> = parking_lot::Mutex::new(());
}

pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let _lock = FILE_LOCK.lock();

    let mut file = File::open(path).map_err(|e| UpscaylError::io(path, e))?;

    let mut contents = String::new();
    file.read_to_string(&mut contents)
        .map_err(|e| UpscaylError::io(path, e))?;

    serde_json::from_str(&contents).map_err(|source| UpscaylError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes JSON atomically using write-to-temp-then-rename
pub fn write_json_file<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    let _lock = FILE_LOCK.lock();

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| UpscaylError::io(parent, e))?;
    }

    let json_string = serde_json::to_string_pretty(data).map_err(|source| UpscaylError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    let temp_path = path.with_extension("tmp");

    let mut temp_file = File::create(&temp_path).map_err(|e| UpscaylError::io(&temp_path, e))?;

    temp_file
        .write_all(json_string.as_bytes())
        .map_err(|e| UpscaylError::io(&temp_path, e))?;

    temp_file
        .sync_all()
        .map_err(|e| UpscaylError::io(&temp_path, e))?;

    fs::rename(&temp_path, path).map_err(|e| UpscaylError::io(path, e))?;

    Ok(())
}

pub fn initialize_json_file<T: Serialize>(path: &Path, default: &T) -> Result<()> {
    if !path.exists() {
        debug!("Initializing JSON file: {:?}", path);
        write_json_file(path, default)?;
    }
    Ok(())
}

pub fn read_json_file_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if path.exists() {
        read_json_file(path)
    } else {
        Ok(T::default())
    }
}

pub fn update_json_file<T, F>(path: &Path, update_fn: F) -> Result<T>
where
    T: DeserializeOwned + Serialize + Default,
    F: FnOnce(&mut T),
{
    let mut data: T = read_json_file_or_default(path)?;
    update_fn(&mut data);
    write_json_file(path, &data)?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Settings;
    use std::path::PathBuf;

    fn scratch_file(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("upscayl-json-{}", uuid::Uuid::new_v4()))
            .join(name)
    }

    #[test]
    fn test_write_then_read() {
        let path = scratch_file("settings.json");
        let settings = Settings {
            compression: 33,
            ..Settings::default()
        };
        write_json_file(&path, &settings).unwrap();
        let loaded: Settings = read_json_file(&path).unwrap();
        assert_eq!(loaded, settings);
        assert!(!path.with_extension("tmp").exists());
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_missing_file_defaults() {
        let path = scratch_file("missing.json");
        let loaded: Settings = read_json_file_or_default(&path).unwrap();
        assert_eq!(loaded, Settings::default());
        assert!(matches!(
            read_json_file::<Settings>(&path),
            Err(UpscaylError::Io { .. })
        ));
    }

    #[test]
    fn test_invalid_json_reported() {
        let path = scratch_file("broken.json");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            read_json_file::<Settings>(&path),
            Err(UpscaylError::Json { .. })
        ));
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_update_creates_file() {
        let path = scratch_file("settings.json");
        let updated: Settings = update_json_file(&path, |s: &mut Settings| {
            s.gpu_id = "1".to_string();
        })
        .unwrap();
        assert_eq!(updated.gpu_id, "1");
        let reloaded: Settings = read_json_file(&path).unwrap();
        assert_eq!(reloaded.gpu_id, "1");
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}
