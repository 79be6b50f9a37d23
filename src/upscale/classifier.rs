// Classification of upscaler stderr lines
//
// The engine does not emit structured output, so every decision taken from its
// output goes through `classify`. The substring markers below are the only
// coupling to the engine's wording.

const FAILURE_MARKERS: [&str; 2] = ["invalid gpu", "failed"];
const ALPHA_MARKER: &str = "has alpha channel";

#[derive(Debug, Clone, PartialEq)]
pub enum OutputLine {
    /// Normalized 0.0 - 1.0
    Progress(f64),
    AlphaWarning,
    FailureSignal,
    Info,
}

/// Classify one line of engine output. Rules apply in order, first match wins.
pub fn classify(line: &str) -> OutputLine {
    let lowered = line.to_lowercase();

    if FAILURE_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        return OutputLine::FailureSignal;
    }

    if lowered.contains(ALPHA_MARKER) {
        return OutputLine::AlphaWarning;
    }

    match leading_percentage(line) {
        Some(percent) => OutputLine::Progress(percent / 100.0),
        None => OutputLine::Info,
    }
}

/// Leading numeric token such as "42.5" or "42.50%", accepted when within 0-100.
fn leading_percentage(line: &str) -> Option<f64> {
    let trimmed = line.trim_start();
    let end = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let token = &trimmed[..end];

    if !token.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let value: f64 = token.parse().ok()?;
    if (0.0..=100.0).contains(&value) {
        Some(value)
    } else {
        None
    }
}
