// Input decomposition and deterministic output naming
use crate::error::{ConfigurationError, Result};
use crate::models::{Settings, UpscaleMode, UpscaleRequest};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Largest multiplier the engines accept.
pub const MAX_SCALE: f64 = 16.0;

/// Everything except `A-Z a-z 0-9 - _ . ! ~ * ' ( )`, the set a URI component leaves alone.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Output directory candidates that come from settings rather than the request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputDirectoryOverrides {
    /// Pinned folder, present only when "remember output folder" is on
    pub remembered: Option<PathBuf>,
    pub batch_folder: Option<PathBuf>,
}

impl From<&Settings> for OutputDirectoryOverrides {
    fn from(settings: &Settings) -> Self {
        Self {
            remembered: settings.remembered_output_dir(),
            batch_folder: settings.batch_output_dir(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum OutputTarget {
    File(PathBuf),
    Directory(PathBuf),
}

impl OutputTarget {
    pub fn path(&self) -> &Path {
        match self {
            OutputTarget::File(path) | OutputTarget::Directory(path) => path,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedPaths {
    /// Empty when the source path has no directory component
    pub input_directory: String,
    pub input_file_name: String,
    pub input_stem: String,
    pub input_extension: Option<String>,
    pub scale_label: String,
    pub output: OutputTarget,
    /// Output file already present and overwrite not requested
    pub output_exists: bool,
}

/// Split on the last `/` or `\`, whichever platform produced the path.
pub fn split_source_path(source: &str) -> (String, String) {
    let trimmed = source.trim_end_matches(['/', '\\']);
    let trimmed = if trimmed.is_empty() { source } else { trimmed };
    match trimmed.rfind(['/', '\\']) {
        Some(idx) => (trimmed[..idx].to_string(), trimmed[idx + 1..].to_string()),
        None => (String::new(), trimmed.to_string()),
    }
}

fn split_extension(file_name: &str) -> (String, Option<String>) {
    let path = Path::new(file_name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| file_name.to_string());
    let extension = path.extension().map(|e| e.to_string_lossy().to_string());
    (stem, extension)
}

/// Scale the model produces natively, read from its name ("x1", "x2", "x3"; otherwise 4).
pub fn native_model_scale(model: &str) -> u32 {
    if model.contains("x1") {
        1
    } else if model.contains("x2") {
        2
    } else if model.contains("x3") {
        3
    } else {
        4
    }
}

/// Multiplier used for the job. Without post-processing no downscale step can
/// correct the engine's output, so the model's native scale is used.
pub fn effective_scale(request: &UpscaleRequest) -> Result<f64> {
    let native = native_model_scale(&request.model) as f64;
    if request.skip_post_processing {
        return Ok(native);
    }
    match request.scale_factor {
        Some(scale) if scale.is_finite() && scale > 0.0 && scale <= MAX_SCALE => Ok(scale),
        Some(scale) => Err(ConfigurationError::InvalidScale(scale).into()),
        None => Ok(native),
    }
}

pub fn format_scale(scale: f64) -> String {
    if scale.fract() == 0.0 {
        format!("{}", scale as u64)
    } else {
        format!("{}", scale)
    }
}

/// `<N>x` for multipliers, `<W>px` for an explicit target width.
pub fn scale_label(request: &UpscaleRequest) -> Result<String> {
    match request.target_width {
        Some(0) => Err(ConfigurationError::InvalidTargetWidth.into()),
        Some(width) => Ok(format!("{}px", width)),
        None => Ok(format!("{}x", format_scale(effective_scale(request)?))),
    }
}

fn non_empty(value: Option<&str>) -> Option<PathBuf> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Pick the output directory: remembered folder, then batch override, then the
/// request's own directory. `None` means the caller must use its mode fallback.
fn configured_output_dir(
    request: &UpscaleRequest,
    overrides: &OutputDirectoryOverrides,
) -> Option<PathBuf> {
    overrides
        .remembered
        .clone()
        .or_else(|| overrides.batch_folder.clone())
        .or_else(|| non_empty(request.output_directory.as_deref()))
}

fn working_context(dir: &str) -> Result<PathBuf> {
    if dir.is_empty() {
        std::env::current_dir().map_err(|_| ConfigurationError::UnresolvedOutputDirectory.into())
    } else {
        Ok(PathBuf::from(dir))
    }
}

/// Resolve all paths for a request. Only reads the filesystem to check whether
/// the output file already exists.
pub fn resolve(request: &UpscaleRequest, overrides: &OutputDirectoryOverrides) -> Result<ResolvedPaths> {
    if request.source_path.trim().is_empty() {
        return Err(ConfigurationError::EmptySourcePath.into());
    }

    let (input_directory, input_file_name) = split_source_path(&request.source_path);
    let (input_stem, input_extension) = split_extension(&input_file_name);
    let scale_label = scale_label(request)?;
    let configured = configured_output_dir(request, overrides);

    let output = match request.mode {
        UpscaleMode::Single | UpscaleMode::DoublePass => {
            let dir = match configured {
                Some(dir) => dir,
                None => working_context(&input_directory)?,
            };
            let file_name = format!(
                "{}_upscayl_{}_{}.{}",
                input_stem,
                scale_label,
                request.model,
                request.output_format.extension()
            );
            OutputTarget::File(dir.join(file_name))
        }
        UpscaleMode::Batch => {
            let dir = match configured {
                Some(dir) => dir,
                // Never write into the input folder itself
                None => working_context(&input_directory)?.join(format!(
                    "{}_upscayl_{}_{}",
                    input_file_name, scale_label, request.model
                )),
            };
            OutputTarget::Directory(dir)
        }
    };

    let output_exists = match &output {
        OutputTarget::File(path) => !request.overwrite_existing && path.exists(),
        OutputTarget::Directory(_) => false,
    };

    Ok(ResolvedPaths {
        input_directory,
        input_file_name,
        input_stem,
        input_extension,
        scale_label,
        output,
        output_exists,
    })
}

/// Render an output path for display or URL use: the final segment is
/// percent-encoded, the directory part is left untouched.
pub fn display_path(path: &Path) -> String {
    let raw = path.to_string_lossy();
    let (dir, file_name) = match raw.rfind(['/', '\\']) {
        Some(idx) => (&raw[..=idx], &raw[idx + 1..]),
        None => ("", raw.as_ref()),
    };
    format!("{}{}", dir, encode_segment(file_name))
}

fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, URI_COMPONENT).to_string()
}
