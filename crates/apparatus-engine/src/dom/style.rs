use serde::{Deserialize, Serialize};

/// Character-level style carried by lemma, reading and separator content.
///
/// All fields default to "inherit from the surrounding run": `false` for the
/// toggles, `None` for the value-carrying fields.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TextStyle {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    /// CSS-style color string, e.g. `"#ffef99"`.
    pub highlight_color: Option<String>,
    pub text_color: Option<String>,
    /// Point size.
    pub font_size: Option<u16>,
    pub font_family: Option<String>,
}

/// A content run paired with its style.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StyledText {
    pub content: String,
    #[serde(default)]
    pub style: TextStyle,
}

impl StyledText {
    pub fn plain(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            style: TextStyle::default(),
        }
    }
}

/// Vertical position of a siglum run relative to the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Script {
    #[default]
    Baseline,
    Superscript,
    Subscript,
}

/// One styled run inside a siglum. Sigla mix scripts and faces within a
/// single symbol (e.g. a superscript correction hand after the base letter),
/// so each run carries its own full set of toggles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiglumRun {
    pub content: String,
    #[serde(default)]
    pub font_family: Option<String>,
    #[serde(default)]
    pub font_size: Option<u16>,
    #[serde(default)]
    pub script: Script,
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub underline: bool,
}

impl SiglumRun {
    pub fn plain(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            font_family: None,
            font_size: None,
            script: Script::Baseline,
            bold: false,
            italic: false,
            underline: false,
        }
    }
}
