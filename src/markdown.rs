//! The markdown transform shared by entry rendering and the shared feed's
//! documentation section.

use crate::htmlrenderer::HtmlRenderer;
use pulldown_cmark::{Options, Parser};
use std::io;

/// Converts `markdown` to HTML, appending the result to `out`.
///
/// * `footnote_prefix` scopes footnote anchors; entries pass their date stem
///   so footnotes from different entries on one page stay distinct.
///
/// Raw HTML in the source is copied through unescaped.
pub fn to_html(
    out: &mut String,
    markdown: &str,
    footnote_prefix: &str,
) -> io::Result<()> {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);

    let mut renderer = HtmlRenderer::with_footnote_prefix(footnote_prefix);
    for ev in Parser::new_ext(markdown, options) {
        renderer.on_event(out, ev)?;
    }
    Ok(())
}

/// Like [`to_html`] but returns a fresh string.
pub fn render(markdown: &str, footnote_prefix: &str) -> io::Result<String> {
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    to_html(&mut out, markdown, footnote_prefix)?;
    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_paragraphs_and_emphasis() -> io::Result<()> {
        assert_eq!(
            "<p>hello <em>there</em></p>\n<p>second</p>\n",
            render("hello *there*\n\nsecond\n", "20240101")?
        );
        Ok(())
    }

    #[test]
    fn test_raw_html_passes_through() -> io::Result<()> {
        let html = render("<div class=\"note\">kept</div>\n\ninline <b>bold</b>\n", "x")?;
        assert!(html.contains("<div class=\"note\">kept</div>"), "{}", html);
        assert!(html.contains("inline <b>bold</b>"), "{}", html);
        Ok(())
    }

    #[test]
    fn test_text_is_escaped() -> io::Result<()> {
        assert_eq!("<p>a &amp; b</p>\n", render("a & b", "x")?);
        Ok(())
    }

    #[test]
    fn test_footnotes_are_scoped() -> io::Result<()> {
        let html = render("claim[^1]\n\n[^1]: source\n", "20240301")?;
        assert!(html.contains(r##"href="#20240301-fn-1""##), "{}", html);
        assert!(html.contains(r#"id="20240301-fn-1""#), "{}", html);
        Ok(())
    }

    #[test]
    fn test_image_alt_text() -> io::Result<()> {
        assert_eq!(
            "<p><img src=\"cat.png\" alt=\"a small cat\" title=\"Tom\" /></p>\n",
            render("![a *small* cat](cat.png \"Tom\")", "x")?
        );
        Ok(())
    }

    #[test]
    fn test_links() -> io::Result<()> {
        assert_eq!(
            "<p><a href=\"https://tilde.town/\">town</a></p>\n",
            render("[town](https://tilde.town/)", "x")?
        );
        Ok(())
    }
}
