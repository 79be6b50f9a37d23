// Upscale request data models
use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "realesrgan-x4plus";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum UpscaleMode {
    #[default]
    Single,
    DoublePass,
    Batch,
}

impl UpscaleMode {
    /// Number of engine invocations a job in this mode runs.
    pub fn pass_count(&self) -> u8 {
        match self {
            UpscaleMode::DoublePass => 2,
            UpscaleMode::Single | UpscaleMode::Batch => 1,
        }
    }
}

/// Encoding of the final output file. Lossy formats carry their compression quality (0-100).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Png,
    Jpg {
        quality: u8,
    },
    Webp {
        quality: u8,
    },
}

impl OutputFormat {
    /// Parse a format name as stored in settings ("png", "jpg", "jpeg", "webp").
    pub fn from_name(name: &str, quality: u8) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "png" => Some(OutputFormat::Png),
            "jpg" | "jpeg" => Some(OutputFormat::Jpg { quality }),
            "webp" => Some(OutputFormat::Webp { quality }),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpg { .. } => "jpg",
            OutputFormat::Webp { .. } => "webp",
        }
    }

    pub fn is_lossless(&self) -> bool {
        matches!(self, OutputFormat::Png)
    }

    pub fn compression_quality(&self) -> Option<u8> {
        match self {
            OutputFormat::Png => None,
            OutputFormat::Jpg { quality } | OutputFormat::Webp { quality } => Some(*quality),
        }
    }
}

/// Declarative description of one unit of upscale work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpscaleRequest {
    /// Image file, or folder for batch mode
    pub source_path: String,
    #[serde(default)]
    pub output_directory: Option<String>,
    pub model: String,
    /// Multiplier; defaults to the model's native scale when absent
    #[serde(default)]
    pub scale_factor: Option<f64>,
    /// Explicit output width in pixels, used instead of a multiplier
    #[serde(default)]
    pub target_width: Option<u32>,
    /// Empty selects the default device
    #[serde(default)]
    pub gpu_selector: String,
    #[serde(default)]
    pub output_format: OutputFormat,
    #[serde(default)]
    pub overwrite_existing: bool,
    #[serde(default)]
    pub skip_post_processing: bool,
    #[serde(default)]
    pub mode: UpscaleMode,
}

impl UpscaleRequest {
    pub fn new(source_path: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            source_path: source_path.into(),
            output_directory: None,
            model: model.into(),
            scale_factor: None,
            target_width: None,
            gpu_selector: String::new(),
            output_format: OutputFormat::Png,
            overwrite_existing: false,
            skip_post_processing: false,
            mode: UpscaleMode::Single,
        }
    }

    /// Apply the rules that hold for every accepted request.
    ///
    /// Skipping post-processing forces lossless output, since post-processing is
    /// the step that re-encodes and compresses.
    pub fn normalized(mut self, force_skip_post_processing: bool) -> Self {
        if force_skip_post_processing {
            self.skip_post_processing = true;
        }
        if self.skip_post_processing {
            self.output_format = OutputFormat::Png;
        }
        if let Some(dir) = &self.output_directory {
            if dir.trim().is_empty() {
                self.output_directory = None;
            }
        }
        self
    }
}
