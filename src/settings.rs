use std::path::PathBuf;

use image::Rgba;

use crate::canvas::{parse_hex_color, to_hex, THUMBNAIL_MAX_EDGE};
use crate::components::history::DEFAULT_MAX_HISTORY;
use crate::error::{EditorError, EditorResult};

const SETTINGS_FILE: &str = "epigimp_settings.cfg";

/// Persistent editor preferences, stored as `key=value` lines.
#[derive(Clone, Debug, PartialEq)]
pub struct EditorSettings {
    pub max_history_steps: usize,
    pub thumbnail_max_edge: u32,
    /// JPEG quality, 1–100.
    pub export_quality: u8,
    pub brush_size: f32,
    pub brush_color: Rgba<u8>,
    pub brush_opacity: f32,
    pub font_family: String,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            max_history_steps: DEFAULT_MAX_HISTORY,
            thumbnail_max_edge: THUMBNAIL_MAX_EDGE,
            export_quality: 92,
            brush_size: 5.0,
            brush_color: Rgba([0, 0, 0, 255]),
            brush_opacity: 1.0,
            font_family: "DejaVu Sans".to_string(),
        }
    }
}

impl EditorSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/epigimp/epigimp_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\EpiGimp\epigimp_settings.cfg
    /// On macOS:   ~/Library/Application Support/EpiGimp/epigimp_settings.cfg
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA").or_else(|_| std::env::var("USERPROFILE")).ok()?;
            return Some(PathBuf::from(appdata).join("EpiGimp").join(SETTINGS_FILE));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").ok()?;
            return Some(
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join("EpiGimp")
                    .join(SETTINGS_FILE),
            );
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            let config_dir = match std::env::var("XDG_CONFIG_HOME") {
                Ok(dir) => PathBuf::from(dir),
                Err(_) => PathBuf::from(std::env::var("HOME").ok()?).join(".config"),
            };
            Some(config_dir.join("epigimp").join(SETTINGS_FILE))
        }
    }

    /// Parse settings text.  Unknown keys are ignored and a malformed value
    /// keeps that key's default.
    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let key = key.trim();
            let val = val.trim();
            match key {
                "max_history_steps" => {
                    if let Ok(v) = val.parse::<usize>()
                        && v > 0
                    {
                        s.max_history_steps = v;
                    }
                }
                "thumbnail_max_edge" => {
                    if let Ok(v) = val.parse::<u32>()
                        && v > 0
                    {
                        s.thumbnail_max_edge = v;
                    }
                }
                "export_quality" => {
                    if let Ok(v) = val.parse::<u8>() {
                        s.export_quality = v.clamp(1, 100);
                    }
                }
                "brush_size" => {
                    if let Ok(v) = val.parse::<f32>()
                        && v.is_finite()
                        && v > 0.0
                    {
                        s.brush_size = v;
                    }
                }
                "brush_color" => {
                    if let Ok(c) = parse_hex_color(val) {
                        s.brush_color = c;
                    }
                }
                "brush_opacity" => {
                    if let Ok(v) = val.parse::<f32>()
                        && v.is_finite()
                    {
                        s.brush_opacity = v.clamp(0.0, 1.0);
                    }
                }
                "font_family" => {
                    if !val.is_empty() {
                        s.font_family = val.to_string();
                    }
                }
                _ => {}
            }
        }
        s
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "max_history_steps={}\n\
             thumbnail_max_edge={}\n\
             export_quality={}\n\
             brush_size={}\n\
             brush_color={}\n\
             brush_opacity={}\n\
             font_family={}\n",
            self.max_history_steps,
            self.thumbnail_max_edge,
            self.export_quality,
            self.brush_size,
            to_hex(self.brush_color),
            self.brush_opacity,
            self.font_family,
        )
    }

    /// Load settings from disk (returns default if file missing or unreadable).
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else { return Self::default() };
        match std::fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self) -> EditorResult<()> {
        let path = Self::settings_path()
            .ok_or_else(|| EditorError::Config("no settings directory for this platform".into()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, self.to_config_string())?;
        crate::log_info!("settings saved to {}", path.display());
        Ok(())
    }
}
