// ============================================================================
// BATCH MODE — run a filter pipeline over image files without the editor UI
// ============================================================================
//
//   EpiGimp -i photo.png --filter grayscale -o result.png
//   EpiGimp -i photo.jpg --filter brightness:20 --filter blur:2 -o out.jpg -q 85
//   EpiGimp -i "shots/*.png" --filters pipeline.json --output-dir processed/ -f webp
//
// A file is loaded into a fresh Document, the pipeline runs against its base
// layer exactly as menu filters would, and the composite is exported.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use crate::document::Document;
use crate::error::{EditorError, EditorResult};
use crate::io::{export_image, load_image, ExportFormat};
use crate::ops::filters::FilterSpec;
use crate::settings::EditorSettings;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// EpiGimp headless image processor.
#[derive(Parser, Debug)]
#[command(
    name = "epigimp",
    about = "EpiGimp headless batch image filter",
    long_about = "Apply pixel filters to image files and convert between formats.\n\
                  Supports PNG, JPEG, WEBP, BMP and GIF output.\n\n\
                  Filters: grayscale, sepia, invert, brightness:N, contrast:N,\n\
                  saturate:FACTOR, blur:RADIUS.\n\n\
                  Example:\n  \
                  epigimp -i photo.png --filter sepia --filter contrast:30 -o result.png"
)]
pub struct CliArgs {
    /// Input file(s). Glob patterns accepted (e.g. "*.png", "shots/*.jpg").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Filter to apply, as `name` or `name:value`. Repeatable; applied in order.
    #[arg(long = "filter", value_name = "NAME[:VALUE]")]
    pub filter: Vec<String>,

    /// JSON file holding an array of filters, e.g. [{"type": "blur", "value": 2}].
    /// Applied after any --filter arguments.
    #[arg(long = "filters", value_name = "PIPELINE.json")]
    pub filters: Option<PathBuf>,

    /// Output file path. Only valid for single-file input.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch processing.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Output format: png, jpeg, webp, bmp, gif.
    /// When omitted, inferred from --output's extension, defaulting to png.
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// JPEG quality (1–100). Defaults to the saved export quality.
    #[arg(short, long, value_name = "1-100")]
    pub quality: Option<u8>,

    /// Print per-file timing information.
    #[arg(short, long)]
    pub verbose: bool,
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    if inputs.len() > 1 && args.output.is_some() && args.output_dir.is_none() {
        eprintln!(
            "error: {} input files given but --output only accepts a single file path.\n\
             Use --output-dir to specify a destination directory for batch processing.",
            inputs.len()
        );
        return ExitCode::FAILURE;
    }

    let pipeline = match build_pipeline(&args.filter, args.filters.as_deref()) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let settings = EditorSettings::load();
    let format = parse_format(args.format.as_deref(), args.output.as_deref());
    let quality = args.quality.unwrap_or(settings.export_quality);

    if let Some(dir) = &args.output_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!("error: could not create output directory '{}': {}", dir.display(), e);
        return ExitCode::FAILURE;
    }

    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }
        let file_start = Instant::now();

        let Some(output_path) =
            build_output_path(input_path, args.output.as_deref(), args.output_dir.as_deref(), format)
        else {
            eprintln!("  error: cannot determine output path for '{}'.", input_path.display());
            any_failure = true;
            continue;
        };

        match run_one(input_path, &output_path, &pipeline, &settings, format, quality) {
            Ok(()) => {
                if args.verbose || multi {
                    println!(
                        "  → {} ({:.0}ms)",
                        output_path.display(),
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                crate::log_err!("{}: {}", input_path.display(), e);
                eprintln!("  error: {}", e);
                any_failure = true;
            }
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

// ============================================================================
// Per-file processing pipeline
// ============================================================================

fn run_one(
    input: &Path,
    output: &Path,
    pipeline: &[FilterSpec],
    settings: &EditorSettings,
    format: ExportFormat,
    quality: u8,
) -> EditorResult<()> {
    let buffer = load_image(input)?;
    let mut doc = Document::with_settings(settings);
    doc.import_buffer(buffer);

    for spec in pipeline {
        doc.apply_filter(spec)?;
    }

    let flat = doc.render().ok_or(EditorError::MissingActiveLayer)?;
    export_image(&flat, output, format, quality)
}

// ============================================================================
// Helpers
// ============================================================================

/// `--filter` arguments first, then the JSON pipeline file.
fn build_pipeline(compact: &[String], json_path: Option<&Path>) -> EditorResult<Vec<FilterSpec>> {
    let mut pipeline = compact
        .iter()
        .map(|s| s.parse::<FilterSpec>())
        .collect::<EditorResult<Vec<_>>>()?;

    if let Some(path) = json_path {
        let text = std::fs::read_to_string(path)?;
        pipeline.extend(parse_pipeline_json(&text)?);
    }
    Ok(pipeline)
}

/// Parse a JSON array of `{"type": ..., "value": ...}` filter objects.
pub fn parse_pipeline_json(text: &str) -> EditorResult<Vec<FilterSpec>> {
    serde_json::from_str(text).map_err(|e| EditorError::InvalidFilter(e.to_string()))
}

/// Literal paths first, then glob matches, in argument order.  A file named
/// by several patterns is processed once.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut inputs: Vec<PathBuf> = Vec::new();
    let mut add = |path: PathBuf| {
        if !inputs.contains(&path) {
            inputs.push(path);
        }
    };

    for pattern in patterns {
        let literal = PathBuf::from(pattern);
        if literal.exists() {
            add(literal);
            continue;
        }
        let matches: Vec<PathBuf> = match glob::glob(pattern) {
            Ok(paths) => paths.filter_map(Result::ok).collect(),
            Err(e) => {
                eprintln!("warning: '{}' is not a usable pattern: {}", pattern, e);
                continue;
            }
        };
        if matches.is_empty() {
            eprintln!("warning: nothing matches '{}'.", pattern);
        }
        matches.into_iter().for_each(&mut add);
    }

    inputs
}

/// Choose the format from `--format` or the output extension, else PNG.
fn parse_format(format_arg: Option<&str>, output: Option<&Path>) -> ExportFormat {
    if let Some(f) = format_arg {
        return ExportFormat::from_extension(f).unwrap_or_else(|| {
            eprintln!("warning: unknown format '{}', writing png.", f);
            ExportFormat::Png
        });
    }
    output.and_then(ExportFormat::from_path).unwrap_or_default()
}

/// Where one processed input is written.  `output` is an explicit file and
/// wins; otherwise the file is `<stem>.<ext>` in `output_dir`, or next to the
/// input.  Writing next to the input never replaces it: a clash gets an
/// `_out` suffix.
fn build_output_path(
    input: &Path,
    output: Option<&Path>,
    output_dir: Option<&Path>,
    format: ExportFormat,
) -> Option<PathBuf> {
    if let Some(path) = output {
        return Some(path.to_path_buf());
    }
    let stem = input.file_stem()?.to_string_lossy();
    let file_name = |suffix: &str| format!("{}{}.{}", stem, suffix, format.extension());

    match output_dir {
        Some(dir) => Some(dir.join(file_name(""))),
        None => {
            let dir = input.parent().unwrap_or(Path::new("."));
            let beside = dir.join(file_name(""));
            Some(if beside == input { dir.join(file_name("_out")) } else { beside })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_flag_wins_over_extension() {
        assert_eq!(parse_format(Some("jpeg"), Some(Path::new("a.png"))), ExportFormat::Jpeg);
        assert_eq!(parse_format(None, Some(Path::new("a.GIF"))), ExportFormat::Gif);
        assert_eq!(parse_format(None, None), ExportFormat::Png);
    }

    #[test]
    fn output_path_avoids_overwriting_input() {
        let p = build_output_path(Path::new("dir/pic.png"), None, None, ExportFormat::Png).unwrap();
        assert_eq!(p, Path::new("dir/pic_out.png"));

        let p = build_output_path(Path::new("dir/pic.png"), None, Some(Path::new("out")), ExportFormat::Webp)
            .unwrap();
        assert_eq!(p, Path::new("out/pic.webp"));
    }

    #[test]
    fn inputs_are_deduplicated_in_order() {
        let dir = std::env::temp_dir().join(format!("epigimp-cli-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        for name in ["b.png", "a.png"] {
            std::fs::write(dir.join(name), b"x").unwrap();
        }
        let literal = dir.join("b.png").to_string_lossy().into_owned();
        let pattern = dir.join("*.png").to_string_lossy().into_owned();
        let missing = dir.join("*.gif").to_string_lossy().into_owned();

        let inputs = resolve_inputs(&[literal, pattern, missing]);
        assert_eq!(inputs, vec![dir.join("b.png"), dir.join("a.png")]);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn pipeline_combines_flags_and_json() {
        let dir = std::env::temp_dir().join(format!("epigimp-cli-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let json = dir.join("pipeline.json");
        std::fs::write(&json, r#"[{"type": "contrast", "value": 10}]"#).unwrap();

        let pipeline = build_pipeline(&["invert".to_string()], Some(&json)).unwrap();
        assert_eq!(pipeline, vec![FilterSpec::Invert, FilterSpec::Contrast { value: 10.0 }]);
        assert!(build_pipeline(&["wobble".to_string()], None).is_err());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn batch_run_filters_and_writes() {
        let dir = std::env::temp_dir().join(format!("epigimp-cli-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let input = dir.join("red.png");
        let red = crate::canvas::PixelBuffer::new_filled(4, 4, image::Rgba([255, 0, 0, 255])).unwrap();
        export_image(&red, &input, ExportFormat::Png, 0).unwrap();

        let output = dir.join("gray.png");
        let args = CliArgs::parse_from([
            "epigimp",
            "-i",
            input.to_str().unwrap(),
            "--filter",
            "grayscale",
            "-o",
            output.to_str().unwrap(),
        ]);
        assert_eq!(run(args), ExitCode::SUCCESS);
        let out = load_image(&output).unwrap();
        assert_eq!(out.get_pixel(2, 2).unwrap(), image::Rgba([85, 85, 85, 255]));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
