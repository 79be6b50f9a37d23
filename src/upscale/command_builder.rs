// Maps a request onto an upscaler executable and its argument list
use super::path_resolver::{effective_scale, format_scale, native_model_scale};
use crate::error::{ConfigurationError, Result, UpscaylError};
use crate::models::{Settings, UpscaleRequest};
use crate::utils::{get_bundled_bin_dir, get_bundled_models_dir};
use log::debug;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Models shipped with the application for the general-purpose engine.
pub const DEFAULT_MODELS: [&str; 5] = [
    "realesrgan-x4plus",
    "remacri",
    "ultramix_balanced",
    "ultrasharp",
    "realesrgan-x4plus-anime",
];

/// Models shipped for the secondary engine, which stores each model as a directory.
pub const DIRECTORY_MODELS: [&str; 3] = [
    "models-cunet",
    "models-upconv_7_anime_style_art_rgb",
    "models-upconv_7_photo",
];

const DIRECTORY_MODEL_PREFIX: &str = "models-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    /// `.param`/`.bin` model files, run by the general-purpose engine
    General,
    /// One directory per model, run by the secondary engine
    DirectoryModels,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Executable {
    Upscayl,
    Waifu2x,
}

impl Executable {
    pub fn file_name(&self) -> String {
        let base = match self {
            Executable::Upscayl => "upscayl-bin",
            Executable::Waifu2x => "waifu2x-ncnn-vulkan",
        };
        if cfg!(windows) {
            format!("{}.exe", base)
        } else {
            base.to_string()
        }
    }
}

impl ModelFamily {
    pub fn executable(&self) -> Executable {
        match self {
            ModelFamily::General => Executable::Upscayl,
            ModelFamily::DirectoryModels => Executable::Waifu2x,
        }
    }
}

pub fn model_family(model: &str) -> Result<ModelFamily> {
    let model = model.trim();
    let invalid = model.is_empty() || model.contains(['/', '\\']) || model.contains("..");
    if invalid {
        return Err(ConfigurationError::UnknownModelFamily(model.to_string()).into());
    }
    if model.starts_with(DIRECTORY_MODEL_PREFIX) {
        Ok(ModelFamily::DirectoryModels)
    } else {
        Ok(ModelFamily::General)
    }
}

pub fn is_builtin_model(model: &str) -> bool {
    DEFAULT_MODELS.contains(&model) || DIRECTORY_MODELS.contains(&model)
}

/// Locations of the engine executables and model folders.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub bin_dir: PathBuf,
    pub bundled_models_dir: PathBuf,
    pub custom_models_dir: Option<PathBuf>,
}

impl EngineConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        let bin_dir = settings
            .bin_dir
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(get_bundled_bin_dir);
        let bundled_models_dir = settings
            .models_dir
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(get_bundled_models_dir);

        Self {
            bin_dir,
            bundled_models_dir,
            custom_models_dir: settings.custom_models_dir(),
        }
    }

    /// Built-in names always use the bundled folder, even when a custom folder is set.
    pub fn models_dir_for(&self, model: &str) -> &Path {
        if is_builtin_model(model) {
            &self.bundled_models_dir
        } else {
            self.custom_models_dir
                .as_deref()
                .unwrap_or(&self.bundled_models_dir)
        }
    }

    pub fn program_path(&self, executable: Executable) -> PathBuf {
        self.bin_dir.join(executable.file_name())
    }
}

/// The engine is asked for a different scale than the user requested; the
/// post-processing step brings the image to the requested size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScaleSubstitution {
    pub requested: f64,
    pub engine: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvocationDescriptor {
    pub executable: Executable,
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Always unset; the process inherits the caller's directory
    pub working_dir: Option<PathBuf>,
    pub input: PathBuf,
    pub output: PathBuf,
    pub scale_substitution: Option<ScaleSubstitution>,
}

impl InvocationDescriptor {
    /// Rendered command line for logs.
    pub fn command_line(&self) -> String {
        let mut line = self.program.to_string_lossy().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

fn engine_scale(request: &UpscaleRequest, family: ModelFamily) -> Result<(f64, Option<ScaleSubstitution>)> {
    let requested = effective_scale(request)?;
    let native_two = native_model_scale(&request.model) == 2;
    if family == ModelFamily::General && requested == 2.0 && !native_two {
        return Ok((
            4.0,
            Some(ScaleSubstitution {
                requested,
                engine: 4.0,
            }),
        ));
    }
    Ok((requested, None))
}

/// Build the invocation for one pass reading `input` and writing `output`.
pub fn build(
    input: &Path,
    output: &Path,
    request: &UpscaleRequest,
    engine: &EngineConfig,
) -> Result<InvocationDescriptor> {
    let family = model_family(&request.model)?;
    let executable = family.executable();
    let models_dir = engine.models_dir_for(&request.model);
    let format = request.output_format;

    let (scale, scale_substitution) = match request.target_width {
        Some(_) => (native_model_scale(&request.model) as f64, None),
        None => engine_scale(request, family)?,
    };

    let mut args = vec![
        "-i".to_string(),
        input.to_string_lossy().to_string(),
        "-o".to_string(),
        output.to_string_lossy().to_string(),
        "-s".to_string(),
        format_scale(scale),
    ];

    match family {
        ModelFamily::General => {
            args.push("-m".to_string());
            args.push(models_dir.to_string_lossy().to_string());
            args.push("-n".to_string());
            args.push(request.model.clone());
            if let Some(width) = request.target_width {
                args.push("-w".to_string());
                args.push(width.to_string());
            }
            if let Some(quality) = format.compression_quality() {
                if quality > 100 {
                    return Err(ConfigurationError::InvalidCompression(quality).into());
                }
                args.push("-c".to_string());
                args.push(quality.to_string());
            }
        }
        ModelFamily::DirectoryModels => {
            args.push("-x".to_string());
            args.push("-m".to_string());
            args.push(models_dir.join(&request.model).to_string_lossy().to_string());
        }
    }

    if !request.gpu_selector.trim().is_empty() {
        args.push("-g".to_string());
        args.push(request.gpu_selector.trim().to_string());
    }
    args.push("-f".to_string());
    args.push(format.extension().to_string());

    let descriptor = InvocationDescriptor {
        executable,
        program: engine.program_path(executable),
        args,
        working_dir: None,
        input: input.to_path_buf(),
        output: output.to_path_buf(),
        scale_substitution,
    };
    debug!("Built invocation: {}", descriptor.command_line());
    Ok(descriptor)
}

/// Distinct model names found in a custom models folder (`.param`/`.bin` stems).
pub fn list_custom_models(dir: &Path) -> Result<Vec<String>> {
    let entries = fs::read_dir(dir).map_err(|e| UpscaylError::io(dir, e))?;
    let mut models = BTreeSet::new();

    for entry in entries.flatten() {
        let path = entry.path();
        let is_model_file = path
            .extension()
            .map(|ext| {
                let ext = ext.to_string_lossy().to_ascii_lowercase();
                ext == "param" || ext == "bin"
            })
            .unwrap_or(false);
        if is_model_file {
            if let Some(stem) = path.file_stem() {
                models.insert(stem.to_string_lossy().to_string());
            }
        }
    }

    if models.is_empty() {
        return Err(ConfigurationError::InvalidCustomModelsFolder(dir.to_path_buf()).into());
    }
    Ok(models.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OutputFormat;

    fn engine() -> EngineConfig {
        EngineConfig {
            bin_dir: PathBuf::from("/app/bin"),
            bundled_models_dir: PathBuf::from("/app/models"),
            custom_models_dir: Some(PathBuf::from("/custom")),
        }
    }

    fn arg_after<'a>(descriptor: &'a InvocationDescriptor, flag: &str) -> Option<&'a str> {
        let idx = descriptor.args.iter().position(|a| a == flag)?;
        descriptor.args.get(idx + 1).map(String::as_str)
    }

    #[test]
    fn test_general_family_arguments() {
        let mut request = UpscaleRequest::new("/in/cat.png", "realesrgan-x4plus");
        request.scale_factor = Some(4.0);
        request.gpu_selector = "1".to_string();
        let d = build(Path::new("/in/cat.png"), Path::new("/out/cat.png"), &request, &engine()).unwrap();

        assert_eq!(d.executable, Executable::Upscayl);
        assert_eq!(d.program, PathBuf::from("/app/bin").join(Executable::Upscayl.file_name()));
        assert_eq!(arg_after(&d, "-i"), Some("/in/cat.png"));
        assert_eq!(arg_after(&d, "-o"), Some("/out/cat.png"));
        assert_eq!(arg_after(&d, "-s"), Some("4"));
        assert_eq!(arg_after(&d, "-m"), Some("/app/models"));
        assert_eq!(arg_after(&d, "-n"), Some("realesrgan-x4plus"));
        assert_eq!(arg_after(&d, "-g"), Some("1"));
        assert_eq!(arg_after(&d, "-f"), Some("png"));
        assert_eq!(d.working_dir, None);
        assert_eq!(d.scale_substitution, None);
    }

    #[test]
    fn test_scale_two_substituted_with_four() {
        let mut request = UpscaleRequest::new("/in/cat.png", "realesrgan-x4plus");
        request.scale_factor = Some(2.0);
        let d = build(Path::new("/in/cat.png"), Path::new("/out/cat.png"), &request, &engine()).unwrap();

        assert_eq!(arg_after(&d, "-s"), Some("4"));
        assert_eq!(
            d.scale_substitution,
            Some(ScaleSubstitution {
                requested: 2.0,
                engine: 4.0
            })
        );
    }

    #[test]
    fn test_native_two_model_keeps_scale_two() {
        let mut request = UpscaleRequest::new("/in/cat.png", "realesr-animevideov3-x2");
        request.scale_factor = Some(2.0);
        let d = build(Path::new("/in/cat.png"), Path::new("/out/cat.png"), &request, &engine()).unwrap();
        assert_eq!(arg_after(&d, "-s"), Some("2"));
        assert_eq!(d.scale_substitution, None);
    }

    #[test]
    fn test_custom_model_uses_custom_dir() {
        let request = UpscaleRequest::new("/in/cat.png", "4x-my-model");
        let d = build(Path::new("/in/cat.png"), Path::new("/out/cat.png"), &request, &engine()).unwrap();
        assert_eq!(arg_after(&d, "-m"), Some("/custom"));
    }

    #[test]
    fn test_builtin_model_ignores_custom_dir() {
        let request = UpscaleRequest::new("/in/cat.png", "ultrasharp");
        let d = build(Path::new("/in/cat.png"), Path::new("/out/cat.png"), &request, &engine()).unwrap();
        assert_eq!(arg_after(&d, "-m"), Some("/app/models"));
    }

    #[test]
    fn test_custom_model_without_custom_dir_falls_back() {
        let mut config = engine();
        config.custom_models_dir = None;
        assert_eq!(config.models_dir_for("4x-my-model"), Path::new("/app/models"));
    }

    #[test]
    fn test_directory_family_arguments() {
        let mut request = UpscaleRequest::new("/in/cat.png", "models-cunet");
        request.scale_factor = Some(2.0);
        let d = build(Path::new("/in/cat.png"), Path::new("/out/cat.png"), &request, &engine()).unwrap();

        assert_eq!(d.executable, Executable::Waifu2x);
        assert!(d.args.contains(&"-x".to_string()));
        assert_eq!(arg_after(&d, "-s"), Some("2"));
        assert_eq!(
            arg_after(&d, "-m"),
            Some(Path::new("/app/models").join("models-cunet").to_str().unwrap())
        );
        assert_eq!(arg_after(&d, "-n"), None);
    }

    #[test]
    fn test_lossy_format_passes_quality() {
        let mut request = UpscaleRequest::new("/in/cat.png", "remacri");
        request.output_format = OutputFormat::Webp { quality: 75 };
        let d = build(Path::new("/in/cat.png"), Path::new("/out/cat.webp"), &request, &engine()).unwrap();
        assert_eq!(arg_after(&d, "-c"), Some("75"));
        assert_eq!(arg_after(&d, "-f"), Some("webp"));

        request.output_format = OutputFormat::Jpg { quality: 101 };
        let err = build(Path::new("/in/cat.png"), Path::new("/out/cat.jpg"), &request, &engine()).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_target_width_argument() {
        let mut request = UpscaleRequest::new("/in/cat.png", "remacri");
        request.target_width = Some(2048);
        request.scale_factor = Some(2.0);
        let d = build(Path::new("/in/cat.png"), Path::new("/out/cat.png"), &request, &engine()).unwrap();
        assert_eq!(arg_after(&d, "-w"), Some("2048"));
        assert_eq!(arg_after(&d, "-s"), Some("4"));
        assert_eq!(d.scale_substitution, None);
    }

    #[test]
    fn test_unknown_family_rejected() {
        for model in ["", "  ", "../evil", "dir/model"] {
            let request = UpscaleRequest::new("/in/cat.png", model);
            let err = build(Path::new("/in/cat.png"), Path::new("/out/cat.png"), &request, &engine()).unwrap_err();
            assert!(matches!(
                err,
                UpscaylError::Configuration(ConfigurationError::UnknownModelFamily(_))
            ));
        }
    }

    #[test]
    fn test_list_custom_models() {
        let dir = std::env::temp_dir().join(format!("upscayl-models-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        for file in ["4x-foo.param", "4x-foo.bin", "2x-bar.PARAM", "readme.txt"] {
            fs::write(dir.join(file), b"").unwrap();
        }
        let models = list_custom_models(&dir).unwrap();
        assert_eq!(models, vec!["2x-bar".to_string(), "4x-foo".to_string()]);

        let empty = dir.join("empty");
        fs::create_dir_all(&empty).unwrap();
        assert!(list_custom_models(&empty).unwrap_err().is_configuration());
        let _ = fs::remove_dir_all(&dir);
    }
}
