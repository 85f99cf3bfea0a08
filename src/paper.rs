//! Paper geometry. Turns a capture width into a page height in pixels and gives
//! the PDF exporter its page box in points.

use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PaperSize {
    #[default]
    A4,
    Letter,
}

impl PaperSize {
    pub const NAMES: [&'static str; 2] = ["a4", "letter"];

    /// Width and height in PDF points (1/72 inch).
    pub fn dimensions_pt(self) -> (f32, f32) {
        match self {
            PaperSize::A4 => (595.28, 841.89),
            PaperSize::Letter => (612.0, 792.0),
        }
    }

    /// Height in pixels of one page when the capture fills the paper width.
    pub fn page_height_px(self, capture_width: u32) -> u32 {
        let (w, h) = self.dimensions_pt();
        (f64::from(capture_width) * f64::from(h) / f64::from(w)) as u32
    }
}

impl fmt::Display for PaperSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaperSize::A4 => write!(f, "a4"),
            PaperSize::Letter => write!(f, "letter"),
        }
    }
}

impl FromStr for PaperSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "a4" => Ok(PaperSize::A4),
            "letter" => Ok(PaperSize::Letter),
            other => Err(format!("unknown paper size '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_page_height_follows_aspect() {
        assert_eq!(PaperSize::A4.page_height_px(1000), 1414);
        assert_eq!(PaperSize::Letter.page_height_px(612), 792);
    }

    #[test]
    fn parses_names() {
        assert_eq!("A4".parse::<PaperSize>(), Ok(PaperSize::A4));
        assert_eq!("letter".parse::<PaperSize>(), Ok(PaperSize::Letter));
        assert!("legal".parse::<PaperSize>().is_err());
        assert_eq!(PaperSize::default().to_string(), "a4");
    }
}
