//! Signature appearance.
//!
//! A visible signature is drawn by the normal appearance (`/AP /N`) of its
//! widget annotation: a Form XObject that either paints a stamp image
//! scaled to the widget rectangle or writes a few lines of description text
//! in a standard font. Invisible signatures get an empty form with a zero
//! bounding box.

use super::types::StandardFont;
use crate::pdf::object::{Dict, Object, ObjectRef};
use crate::pdf::serializer::ObjectSerializer;
use crate::stamp::NormalizedStamp;
use bytes::Bytes;

/// How the signature content is rendered inside its rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderingMode {
    /// Text only (layer 2 text)
    #[default]
    Description,
    /// The signature graphic only
    Graphic,
}

/// Line spacing as a multiple of the font size.
const LEADING: f32 = 1.2;

/// Inner padding between the rectangle border and the text.
const PADDING: f32 = 2.0;

/// Smallest font size the description text is shrunk to.
const MIN_FONT_SIZE: f32 = 4.0;

/// Appearance settings and metadata of the signature being created.
#[derive(Debug, Clone)]
pub struct SignatureAppearance {
    reason: Option<String>,
    contact: Option<String>,
    location: Option<String>,
    signature_creator: Option<String>,
    page_number: usize,
    page_rect: Option<[f32; 4]>,
    rendering_mode: RenderingMode,
    layer2_text: String,
    font: StandardFont,
    font_size: f32,
    graphic: Option<NormalizedStamp>,
}

impl Default for SignatureAppearance {
    fn default() -> Self {
        Self {
            reason: None,
            contact: None,
            location: None,
            signature_creator: None,
            page_number: 1,
            page_rect: None,
            rendering_mode: RenderingMode::Description,
            layer2_text: String::new(),
            font: StandardFont::Helvetica,
            font_size: 12.0,
            graphic: None,
        }
    }
}

fn non_empty(value: impl Into<String>) -> Option<String> {
    let value = value.into();
    (!value.is_empty()).then_some(value)
}

impl SignatureAppearance {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reason for signing (`/Reason`). Empty text clears it.
    pub fn set_reason(&mut self, reason: impl Into<String>) -> &mut Self {
        self.reason = non_empty(reason);
        self
    }

    /// Contact information (`/ContactInfo`). Empty text clears it.
    pub fn set_contact(&mut self, contact: impl Into<String>) -> &mut Self {
        self.contact = non_empty(contact);
        self
    }

    /// Signing location (`/Location`). Empty text clears it.
    pub fn set_location(&mut self, location: impl Into<String>) -> &mut Self {
        self.location = non_empty(location);
        self
    }

    /// Name of the application that created the signature, recorded in
    /// `/Prop_Build /App /Name`.
    pub fn set_signature_creator(&mut self, creator: impl Into<String>) -> &mut Self {
        self.signature_creator = non_empty(creator);
        self
    }

    /// Page the widget is placed on, 1-based.
    pub fn set_page_number(&mut self, page_number: usize) -> &mut Self {
        self.page_number = page_number;
        self
    }

    /// Widget rectangle `[llx lly urx ury]`. A visible signature needs one.
    pub fn set_page_rect(&mut self, rect: [f32; 4]) -> &mut Self {
        self.page_rect = Some(rect);
        self
    }

    pub fn set_rendering_mode(&mut self, mode: RenderingMode) -> &mut Self {
        self.rendering_mode = mode;
        self
    }

    pub fn set_layer2_text(&mut self, text: impl Into<String>) -> &mut Self {
        self.layer2_text = text.into();
        self
    }

    pub fn set_layer2_font(&mut self, font: StandardFont) -> &mut Self {
        self.font = font;
        self
    }

    pub fn set_layer2_font_size(&mut self, size: f32) -> &mut Self {
        self.font_size = size;
        self
    }

    /// Image painted in [`RenderingMode::Graphic`].
    pub fn set_signature_graphic(&mut self, graphic: NormalizedStamp) -> &mut Self {
        self.graphic = Some(graphic);
        self
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn contact(&self) -> Option<&str> {
        self.contact.as_deref()
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn signature_creator(&self) -> Option<&str> {
        self.signature_creator.as_deref()
    }

    pub fn page_number(&self) -> usize {
        self.page_number
    }

    pub fn page_rect(&self) -> Option<[f32; 4]> {
        self.page_rect
    }

    pub fn rendering_mode(&self) -> RenderingMode {
        self.rendering_mode
    }

    pub fn layer2_text(&self) -> &str {
        &self.layer2_text
    }

    pub fn font(&self) -> StandardFont {
        self.font
    }

    pub fn font_size(&self) -> f32 {
        self.font_size
    }

    pub fn graphic(&self) -> Option<&NormalizedStamp> {
        self.graphic.as_ref()
    }

    /// Whether the widget has a non-empty rectangle.
    pub fn is_visible(&self) -> bool {
        self.page_rect
            .is_some_and(|[llx, lly, urx, ury]| urx - llx > 0.0 && ury - lly > 0.0)
    }

    /// Widget rectangle, `[0 0 0 0]` for invisible signatures.
    pub fn widget_rect(&self) -> [f32; 4] {
        match self.page_rect {
            Some(rect) if self.is_visible() => rect,
            _ => [0.0; 4],
        }
    }

    /// Image XObject holding the JPEG signature graphic, when one is drawn.
    pub fn image_xobject(&self) -> Option<Object> {
        if !self.is_visible() || self.rendering_mode != RenderingMode::Graphic {
            return None;
        }
        let graphic = self.graphic.as_ref()?;

        let mut dict = Dict::new();
        dict.insert("Type".to_string(), Object::name("XObject"));
        dict.insert("Subtype".to_string(), Object::name("Image"));
        dict.insert("Width".to_string(), Object::Integer(graphic.width as i64));
        dict.insert("Height".to_string(), Object::Integer(graphic.height as i64));
        dict.insert("ColorSpace".to_string(), Object::name("DeviceRGB"));
        dict.insert("BitsPerComponent".to_string(), Object::Integer(8));
        dict.insert("Filter".to_string(), Object::name("DCTDecode"));

        Some(Object::Stream {
            dict,
            data: Bytes::from(graphic.jpeg.clone()),
        })
    }

    /// Normal appearance Form XObject. `image` is the reference of the
    /// object returned by [`image_xobject`](Self::image_xobject), if any.
    pub fn build_form(&self, image: Option<ObjectRef>) -> Object {
        let [llx, lly, urx, ury] = self.widget_rect();
        let (width, height) = (urx - llx, ury - lly);

        let mut resources = Dict::new();
        let content = if !self.is_visible() {
            Vec::new()
        } else {
            match (self.rendering_mode, image) {
                (RenderingMode::Graphic, Some(image_ref)) => {
                    resources.insert(
                        "XObject".to_string(),
                        ObjectSerializer::dict(vec![("Im1", Object::Reference(image_ref))]),
                    );
                    graphic_content(width, height)
                },
                _ => {
                    resources.insert(
                        "Font".to_string(),
                        ObjectSerializer::dict(vec![("F1", self.font_dict())]),
                    );
                    self.description_content(width, height)
                },
            }
        };

        let mut dict = Dict::new();
        dict.insert("Type".to_string(), Object::name("XObject"));
        dict.insert("Subtype".to_string(), Object::name("Form"));
        dict.insert("FormType".to_string(), Object::Integer(1));
        dict.insert("BBox".to_string(), ObjectSerializer::rect([0.0, 0.0, width, height]));
        dict.insert("Resources".to_string(), Object::Dictionary(resources));

        Object::Stream {
            dict,
            data: Bytes::from(content),
        }
    }

    fn font_dict(&self) -> Object {
        ObjectSerializer::dict(vec![
            ("Type", Object::name("Font")),
            ("Subtype", Object::name("Type1")),
            ("BaseFont", Object::name(self.font.base_font())),
            ("Encoding", Object::name("WinAnsiEncoding")),
        ])
    }

    /// Font size that fits every line of the text into the rectangle, never
    /// larger than the configured size.
    pub fn fitted_font_size(&self, width: f32, height: f32) -> f32 {
        let lines: Vec<&str> = self.layer2_text.lines().collect();
        let longest = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);
        let mut size = self.font_size;
        if longest > 0 {
            size = size.min((width - 2.0 * PADDING) / (longest as f32 * self.font.average_width()));
        }
        if !lines.is_empty() {
            size = size.min((height - 2.0 * PADDING) / (lines.len() as f32 * LEADING));
        }
        size.max(MIN_FONT_SIZE)
    }

    fn description_content(&self, width: f32, height: f32) -> Vec<u8> {
        let size = self.fitted_font_size(width, height);
        let leading = size * LEADING;
        let mut content = String::from("BT\n");
        content.push_str(&format!("/F1 {} Tf\n", fmt(size)));
        content.push_str(&format!("{} TL\n", fmt(leading)));
        content.push_str(&format!("{} {} Td\n", fmt(PADDING), fmt(height - PADDING - size)));

        let mut bytes = content.into_bytes();
        for (i, line) in self.layer2_text.lines().enumerate() {
            if i > 0 {
                bytes.extend_from_slice(b"T* ");
            }
            bytes.push(b'(');
            bytes.extend_from_slice(&encode_win_ansi(line));
            bytes.extend_from_slice(b") Tj\n");
        }
        bytes.extend_from_slice(b"ET\n");
        bytes
    }
}

fn graphic_content(width: f32, height: f32) -> Vec<u8> {
    format!("q\n{} 0 0 {} 0 0 cm\n/Im1 Do\nQ\n", fmt(width), fmt(height)).into_bytes()
}

fn fmt(value: f32) -> String {
    crate::pdf::serializer::format_real(value as f64)
}

/// Encode text for a literal string shown with WinAnsiEncoding.
///
/// Latin-1 characters map to themselves; the typographic characters
/// WinAnsi places in 0x80..0x9F are mapped explicitly, and anything else
/// becomes `?`. String delimiters are escaped.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for c in text.chars() {
        let byte = match c {
            '€' => 0x80,
            '‚' => 0x82,
            '„' => 0x84,
            '…' => 0x85,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '–' => 0x96,
            '—' => 0x97,
            '™' => 0x99,
            'Š' => 0x8A,
            'š' => 0x9A,
            'Ž' => 0x8E,
            'ž' => 0x9E,
            c if (c as u32) < 0x20 => b' ',
            c if (c as u32) < 0x80 || (0xA0..=0xFF).contains(&(c as u32)) => c as u32 as u8,
            _ => b'?',
        };
        match byte {
            b'(' | b')' | b'\\' => {
                out.push(b'\\');
                out.push(byte);
            },
            _ => out.push(byte),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp() -> NormalizedStamp {
        NormalizedStamp {
            jpeg: vec![0xFF, 0xD8, 0xFF, 0xD9],
            width: 150,
            height: 150,
        }
    }

    #[test]
    fn test_setters_ignore_empty_text() {
        let mut appearance = SignatureAppearance::new();
        appearance.set_reason("").set_contact("me@example.com").set_location("Gdańsk");
        assert_eq!(appearance.reason(), None);
        assert_eq!(appearance.contact(), Some("me@example.com"));
        assert_eq!(appearance.location(), Some("Gdańsk"));
    }

    #[test]
    fn test_invisible_appearance() {
        let appearance = SignatureAppearance::new();
        assert!(!appearance.is_visible());
        assert_eq!(appearance.widget_rect(), [0.0; 4]);
        assert!(appearance.image_xobject().is_none());

        let form = appearance.build_form(None);
        match form {
            Object::Stream { dict, data } => {
                assert!(data.is_empty());
                assert_eq!(dict.get("Subtype"), Some(&Object::name("Form")));
            },
            other => panic!("expected a stream, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_width_rect_is_invisible() {
        let mut appearance = SignatureAppearance::new();
        appearance.set_page_rect([10.0, 10.0, 10.0, 50.0]);
        assert!(!appearance.is_visible());
    }

    // ========================================================================
    // Graphic mode
    // ========================================================================

    #[test]
    fn test_graphic_form_draws_image() {
        let mut appearance = SignatureAppearance::new();
        appearance
            .set_page_rect([442.0, 492.0, 592.0, 642.0])
            .set_rendering_mode(RenderingMode::Graphic)
            .set_signature_graphic(stamp());

        let image = appearance.image_xobject().unwrap();
        assert_eq!(image.get("Filter"), Some(&Object::name("DCTDecode")));
        assert_eq!(image.get("Width"), Some(&Object::Integer(150)));

        let form = appearance.build_form(Some(ObjectRef::new(20, 0)));
        let Object::Stream { dict, data } = form else {
            panic!("form must be a stream");
        };
        assert_eq!(&data[..], b"q\n150 0 0 150 0 0 cm\n/Im1 Do\nQ\n");
        let xobjects = dict.get("Resources").and_then(|r| r.get("XObject")).unwrap();
        assert_eq!(xobjects.get("Im1"), Some(&Object::Reference(ObjectRef::new(20, 0))));
    }

    // ========================================================================
    // Description mode
    // ========================================================================

    #[test]
    fn test_description_form_writes_lines() {
        let mut appearance = SignatureAppearance::new();
        appearance
            .set_page_rect([0.0, 0.0, 150.0, 150.0])
            .set_layer2_text("Digitally signed by Jan\nD:20240101120000+01'00'");

        let Object::Stream { dict, data } = appearance.build_form(None) else {
            panic!("form must be a stream");
        };
        let text = String::from_utf8_lossy(&data).into_owned();
        assert!(text.starts_with("BT\n/F1 "));
        assert!(text.contains("(Digitally signed by Jan) Tj\n"));
        assert!(text.contains("T* (D:20240101120000+01'00') Tj\n"));
        assert!(text.ends_with("ET\n"));

        let font = dict
            .get("Resources")
            .and_then(|r| r.get("Font"))
            .and_then(|f| f.get("F1"))
            .unwrap();
        assert_eq!(font.get("BaseFont"), Some(&Object::name("Helvetica")));
    }

    #[test]
    fn test_font_shrinks_to_fit() {
        let mut appearance = SignatureAppearance::new();
        appearance.set_layer2_text("x".repeat(100));
        let size = appearance.fitted_font_size(150.0, 150.0);
        assert!(size < 12.0);
        assert!(size >= MIN_FONT_SIZE);

        appearance.set_layer2_text("short");
        assert_eq!(appearance.fitted_font_size(150.0, 150.0), 12.0);
    }

    #[test]
    fn test_encode_win_ansi() {
        assert_eq!(encode_win_ansi("a(b)\\"), b"a\\(b\\)\\\\".to_vec());
        assert_eq!(encode_win_ansi("é€"), vec![0xE9, 0x80]);
        assert_eq!(encode_win_ansi("ł"), b"?".to_vec());
    }
}
