//! Text-object support: resolving the displayed string (including the
//! editor's date-script substitution) and the raster contract. Font loading
//! and glyph rendering are external collaborators behind [`TextRasterizer`].

use chrono::{DateTime, Local};

use crate::scene::model::{SceneObject, TextInfo};
use crate::tex::TexImage;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HorizontalAlign {
    #[default]
    Left,
    Center,
    Right,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VerticalAlign {
    #[default]
    Top,
    Center,
    Bottom,
}

impl HorizontalAlign {
    pub fn parse(s: &str) -> Self {
        match s {
            "center" => Self::Center,
            "right" => Self::Right,
            _ => Self::Left,
        }
    }
}

impl VerticalAlign {
    pub fn parse(s: &str) -> Self {
        match s {
            "center" => Self::Center,
            "bottom" => Self::Bottom,
            _ => Self::Top,
        }
    }
}

/// Rasterizes a string into an RGBA image sized to the object's render
/// target. The default implementation renders nothing, which leaves text
/// objects invisible but keeps the frame loop intact.
pub trait TextRasterizer {
    #[allow(clippy::too_many_arguments)]
    fn rasterize(
        &mut self,
        text: &str,
        point_size: f64,
        width: u32,
        height: u32,
        halign: HorizontalAlign,
        valign: VerticalAlign,
    ) -> Option<TexImage>;
}

#[derive(Default)]
pub struct NullTextRasterizer;

impl TextRasterizer for NullTextRasterizer {
    fn rasterize(
        &mut self,
        _text: &str,
        _point_size: f64,
        _width: u32,
        _height: u32,
        _halign: HorizontalAlign,
        _valign: VerticalAlign,
    ) -> Option<TexImage> {
        None
    }
}

/// Whether the object's text changes over time (a date script), requiring
/// re-rasterization every frame.
pub fn is_time_dependent(text: &TextInfo) -> bool {
    text.script.contains("new Date()")
}

/// The string a text object should display right now.
pub fn resolve_text_content(text: &TextInfo, now: DateTime<Local>) -> String {
    if is_time_dependent(text) {
        let format = if text.format.is_empty() {
            "%Y/%m/%d %H:%M:%S".to_string()
        } else {
            editor_date_format(&text.format)
        };
        return now.format(&format).to_string();
    }
    text.value.clone()
}

/// Translates the editor's date tokens into strftime specifiers.
fn editor_date_format(format: &str) -> String {
    format
        .replace("yyyy", "%Y")
        .replace("MM", "%m")
        .replace("dd", "%d")
        .replace("hh", "%I")
        .replace("mm", "%M")
        .replace("ss", "%S")
}

pub fn point_size(object: &SceneObject) -> f64 {
    let size = object.point_size.base();
    if size > 0.0 {
        size
    } else {
        24.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn text_with_script(format: &str) -> TextInfo {
        serde_json::from_value(serde_json::json!({
            "value": "static",
            "script": "engine.registerUpdate(function() { return new Date(); })",
            "scriptproperties": {"format": {"value": format}}
        }))
        .unwrap()
    }

    #[test]
    fn static_text_returns_value() {
        let info: TextInfo = serde_json::from_value(serde_json::json!("hello")).unwrap();
        assert!(!is_time_dependent(&info));
        let now = Local.with_ymd_and_hms(2024, 3, 5, 14, 30, 45).unwrap();
        assert_eq!(resolve_text_content(&info, now), "hello");
    }

    #[test]
    fn date_script_formats_with_editor_tokens() {
        let info = text_with_script("yyyy-MM-dd mm:ss");
        assert!(is_time_dependent(&info));
        let now = Local.with_ymd_and_hms(2024, 3, 5, 14, 30, 45).unwrap();
        assert_eq!(resolve_text_content(&info, now), "2024-03-05 30:45");
    }

    #[test]
    fn date_script_without_format_uses_default() {
        let info = text_with_script("");
        let now = Local.with_ymd_and_hms(2024, 3, 5, 14, 30, 45).unwrap();
        assert_eq!(resolve_text_content(&info, now), "2024/03/05 14:30:45");
    }

    #[test]
    fn alignment_parsing() {
        assert_eq!(HorizontalAlign::parse("center"), HorizontalAlign::Center);
        assert_eq!(HorizontalAlign::parse("right"), HorizontalAlign::Right);
        assert_eq!(HorizontalAlign::parse(""), HorizontalAlign::Left);
        assert_eq!(VerticalAlign::parse("bottom"), VerticalAlign::Bottom);
    }
}
