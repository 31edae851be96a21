//! Plain-text extraction from Wikipedia article HTML.
//!
//! Removes scripts, styles, edit-section links, and footnote markers, drops
//! the remaining markup, decodes common entities, and collapses whitespace.

use regex::Regex;
use tessera_core::TesseraError;

/// Compiled patterns for cleaning article HTML.
///
/// # Examples
///
/// ```
/// use tessera_sources::html::HtmlCleaner;
///
/// let cleaner = HtmlCleaner::new().unwrap();
/// let html = r#"<p>Paris<sup class="reference">[1]</sup> is the <b>capital</b> &amp; largest city.</p>"#;
/// assert_eq!(cleaner.clean(html), "Paris is the capital & largest city.");
/// ```
#[derive(Debug, Clone)]
pub struct HtmlCleaner {
    dropped_blocks: Regex,
    edit_sections: Regex,
    comments: Regex,
    block_tags: Regex,
    tags: Regex,
    numeric_entities: Regex,
    whitespace: Regex,
}

fn compile(pattern: &str) -> Result<Regex, TesseraError> {
    Regex::new(pattern).map_err(|e| TesseraError::Config(format!("invalid HTML pattern: {e}")))
}

impl HtmlCleaner {
    /// Compile the cleaning patterns.
    ///
    /// # Errors
    ///
    /// Returns [`TesseraError::Config`] if a pattern fails to compile.
    pub fn new() -> Result<Self, TesseraError> {
        Ok(Self {
            dropped_blocks: compile(
                r"(?is)<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>|<sup\b[^>]*>.*?</sup\s*>",
            )?,
            edit_sections: compile(
                r#"(?is)<span\b[^>]*class="[^"]*\bmw-editsection\b[^>]*>(?:<span\b[^>]*>[^<]*</span>|<a\b[^>]*>[^<]*</a>|[^<])*</span>"#,
            )?,
            comments: compile(r"(?s)<!--.*?-->")?,
            block_tags: compile(
                r"(?i)</?(?:p|div|br|li|ul|ol|dl|dt|dd|tr|td|th|table|h[1-6]|blockquote|section)\b[^>]*>",
            )?,
            tags: compile(r"<[^>]*>")?,
            numeric_entities: compile(r"&#(?:x([0-9a-fA-F]+)|([0-9]+));")?,
            whitespace: compile(r"\s+")?,
        })
    }

    /// Extract readable text from `html`.
    pub fn clean(&self, html: &str) -> String {
        let text = self.comments.replace_all(html, "");
        let text = self.dropped_blocks.replace_all(&text, "");
        let text = self.edit_sections.replace_all(&text, "");
        let text = self.block_tags.replace_all(&text, " ");
        let text = self.tags.replace_all(&text, "");
        let text = self.decode_entities(&text);
        self.whitespace.replace_all(&text, " ").trim().to_string()
    }

    fn decode_entities(&self, text: &str) -> String {
        let numeric = self.numeric_entities.replace_all(text, |caps: &regex::Captures<'_>| {
            let code = match (caps.get(1), caps.get(2)) {
                (Some(hex), _) => u32::from_str_radix(hex.as_str(), 16).ok(),
                (None, Some(dec)) => dec.as_str().parse::<u32>().ok(),
                _ => None,
            };
            code.and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        });

        numeric
            .replace("&nbsp;", " ")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&#39;", "'")
            .replace("&apos;", "'")
            .replace("&amp;", "&")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean(html: &str) -> String {
        HtmlCleaner::new().unwrap().clean(html)
    }

    #[test]
    fn scripts_and_styles_are_removed() {
        let html = "<style>.a{color:red}</style><p>Text</p><script>alert('x')</script>";
        assert_eq!(clean(html), "Text");
    }

    #[test]
    fn edit_sections_are_removed() {
        let html = r#"<h2>Historia<span class="mw-editsection"><span class="mw-editsection-bracket">[</span><a href="/w/index.php?action=edit&amp;section=1" title="Editar sección">editar</a><span class="mw-editsection-bracket">]</span></span></h2><p>Fundada en...</p>"#;
        assert_eq!(clean(html), "Historia Fundada en...");
    }

    #[test]
    fn references_are_removed() {
        let html = r##"<p>Lutecia<sup id="cite_ref-1" class="reference"><a href="#cite_note-1">[1]</a></sup> fue romana.</p>"##;
        assert_eq!(clean(html), "Lutecia fue romana.");
    }

    #[test]
    fn paragraphs_are_separated_and_whitespace_collapsed() {
        let html = "<p>Uno</p><p>Dos\n\n   tres</p><ul><li>a</li><li>b</li></ul>";
        assert_eq!(clean(html), "Uno Dos tres a b");
    }

    #[test]
    fn entities_are_decoded() {
        assert_eq!(clean("a&nbsp;&lt;b&gt; &quot;c&quot; &#233; &#xE9; &amp;amp;"), "a <b> \"c\" é é &amp;");
    }

    #[test]
    fn comments_are_dropped() {
        assert_eq!(clean("<!-- NewPP limit report\nCPU -->Texto"), "Texto");
    }

    #[test]
    fn empty_html_is_empty_text() {
        assert_eq!(clean(""), "");
        assert_eq!(clean("<div>  </div>"), "");
    }
}
