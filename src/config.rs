use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub vsync: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self { title: "Taskscape".to_string(), width: 1280, height: 720, vsync: true }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GlyphConfig {
    /// Filesystem path or http(s) URL of the label typeface.
    #[serde(default = "GlyphConfig::default_source")]
    pub source: String,
    /// Label cap height in world units.
    #[serde(default = "GlyphConfig::default_label_height")]
    pub label_height: f32,
}

impl GlyphConfig {
    fn default_source() -> String {
        "assets/fonts/label.ttf".to_string()
    }

    const fn default_label_height() -> f32 {
        0.22
    }
}

impl Default for GlyphConfig {
    fn default() -> Self {
        Self { source: Self::default_source(), label_height: Self::default_label_height() }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub glyph: GlyphConfig,
    /// Optional JSON seed file for the demo task store.
    #[serde(default)]
    pub tasks: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AppConfigOverrides {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub vsync: Option<bool>,
    pub font: Option<String>,
    pub tasks: Option<String>,
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(cfg)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                eprintln!("[config] load error: {err:?}. Falling back to defaults.");
                Self::default()
            }
        }
    }

    pub fn apply_overrides(&mut self, overrides: &AppConfigOverrides) {
        if let Some(width) = overrides.width {
            self.window.width = width;
        }
        if let Some(height) = overrides.height {
            self.window.height = height;
        }
        if let Some(vsync) = overrides.vsync {
            self.window.vsync = vsync;
        }
        if let Some(font) = &overrides.font {
            self.glyph.source = font.clone();
        }
        if let Some(tasks) = &overrides.tasks {
            self.tasks = Some(tasks.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = AppConfig::load_or_default("definitely/not/here.json");
        assert_eq!(cfg.window.width, 1280);
        assert_eq!(cfg.glyph.source, "assets/fonts/label.ttf");
        assert!(cfg.tasks.is_none());
    }

    #[test]
    fn partial_config_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{"glyph": {{"source": "http://fonts.local/label.ttf"}}}}"#).expect("write");
        let cfg = AppConfig::load(file.path()).expect("parse config");
        assert_eq!(cfg.glyph.source, "http://fonts.local/label.ttf");
        assert!((cfg.glyph.label_height - 0.22).abs() < f32::EPSILON);
        assert_eq!(cfg.window.height, 720);
    }

    #[test]
    fn overrides_replace_config_fields() {
        let mut cfg = AppConfig::default();
        cfg.apply_overrides(&AppConfigOverrides {
            width: Some(1920),
            height: None,
            vsync: Some(false),
            font: Some("demo.ttf".to_string()),
            tasks: Some("tasks.json".to_string()),
        });
        assert_eq!(cfg.window.width, 1920);
        assert_eq!(cfg.window.height, 720);
        assert!(!cfg.window.vsync);
        assert_eq!(cfg.glyph.source, "demo.ttf");
        assert_eq!(cfg.tasks.as_deref(), Some("tasks.json"));
    }
}
