//! Template extraction from trailing comment blocks
//!
//! Given a file's text and the line of a rendering call, pulls out the
//! contiguous block of line comments directly below that line:
//!
//! ```text
//! render_inline!(cache, "handlebars", self)   <- call site line
//!     // <ul>                                 <- template line 1
//!     //   <li>{{item}}</li>                  <- template line 2
//!     // </ul>                                <- template line 3
//! Ok(())                                      <- stops here
//! ```
//!
//! The marker and one following space are stripped from each line, then the
//! smallest remaining indentation is removed from every line.

/// Default line-comment marker
pub const DEFAULT_COMMENT_MARKER: &str = "//";

/// Extracts template bodies from comment blocks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateExtractor {
    marker: String,
}

impl TemplateExtractor {
    /// Create an extractor for the given line-comment marker
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    /// Extract the template body below the 1-based `start_line`
    ///
    /// Returns an empty string when no comment line follows, including when
    /// `start_line` is the last line of the file.
    pub fn extract(&self, file_text: &str, start_line: u32) -> String {
        let block: Vec<&str> = file_text
            .lines()
            .skip(start_line as usize)
            .map_while(|line| self.strip_marker(line))
            .collect();

        let indent = block
            .iter()
            .filter(|line| !line.trim().is_empty())
            .map(|line| leading_whitespace(line))
            .min()
            .unwrap_or(0);

        block
            .iter()
            .map(|line| dedent(line, indent))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Body of a comment line, or `None` if the line ends the block
    fn strip_marker<'a>(&self, line: &'a str) -> Option<&'a str> {
        let body = line.trim_start().strip_prefix(self.marker.as_str())?;
        Some(body.strip_prefix(' ').unwrap_or(body))
    }
}

impl Default for TemplateExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_COMMENT_MARKER)
    }
}

fn leading_whitespace(line: &str) -> usize {
    line.chars().take_while(|c| c.is_whitespace()).count()
}

/// Drop up to `width` leading whitespace characters
fn dedent(line: &str, width: usize) -> &str {
    let cut = line
        .char_indices()
        .take(width)
        .take_while(|(_, c)| c.is_whitespace())
        .last()
        .map(|(idx, c)| idx + c.len_utf8())
        .unwrap_or(0);
    &line[cut..]
}
