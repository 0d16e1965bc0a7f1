//! An HTML writer for markdown [`Event`]s that scopes footnote anchors to a
//! single entry. [`pulldown_cmark::html::push_html`] names footnote anchors
//! after the footnote label alone, so two entries on the same feed page that
//! both use `[^1]` would link to each other's notes. Here every footnote id
//! is prefixed with the entry's anchor name.
//!
//! Raw HTML events are written through untouched; entries are allowed to
//! embed markup.

use pulldown_cmark::escape::{escape_href, escape_html, StrWrite};
use pulldown_cmark::{Alignment, CodeBlockKind, CowStr, Event, LinkType, Tag};
use std::fmt::{self, Display};
use std::io;

/// Lets the escaping helpers, which write to a [`StrWrite`], write into a
/// [`fmt::Formatter`] instead.
struct Adaptor<'a, T> {
    formatter: &'a mut T,
    result: fmt::Result,
}

impl<T> Adaptor<'_, T> {
    fn handle_result(&mut self, result: fmt::Result) -> io::Result<()> {
        result.map_err(|e| {
            self.result = Err(e);
            io::Error::new(io::ErrorKind::Other, e)
        })
    }
}

impl<T: fmt::Write> StrWrite for Adaptor<'_, T> {
    fn write_str(&mut self, s: &str) -> io::Result<()> {
        let result = self.formatter.write_str(s);
        self.handle_result(result)
    }

    fn write_fmt(&mut self, args: fmt::Arguments) -> io::Result<()> {
        let result = self.formatter.write_fmt(args);
        self.handle_result(result)
    }
}

/// Which escaping a [`Escaped`] value gets when displayed.
#[derive(Clone, Copy)]
enum Escape {
    Href,
    Html,
}

struct Escaped<'a>(Escape, &'a str);

impl Display for Escaped<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut adaptor = Adaptor {
            formatter: f,
            result: Ok(()),
        };
        let _ = match self.0 {
            Escape::Href => escape_href(&mut adaptor, self.1),
            Escape::Html => escape_html(&mut adaptor, self.1),
        };
        adaptor.result
    }
}

fn href(s: &str) -> Escaped<'_> {
    Escaped(Escape::Href, s)
}

fn html(s: &str) -> Escaped<'_> {
    Escaped(Escape::Html, s)
}

enum TableState {
    Head,
    Body,
}

/// Writes HTML for one entry's markdown events.
pub struct HtmlRenderer {
    table_alignments: Vec<Alignment>,
    table_state: TableState,
    table_cell_index: usize,

    /// Nesting depth of image tags; while positive, events are alt text.
    image_depth: usize,
    image_title: String,

    /// Prepended (with a `-`) to every footnote id and footnote link.
    footnote_prefix: String,
}

impl HtmlRenderer {
    pub fn with_footnote_prefix(footnote_prefix: &str) -> Self {
        HtmlRenderer {
            table_alignments: Vec::new(),
            table_state: TableState::Head,
            table_cell_index: 0,
            image_depth: 0,
            image_title: String::new(),
            footnote_prefix: footnote_prefix.to_owned(),
        }
    }

    fn footnote_id(&self, name: &str) -> String {
        format!("{}-fn-{}", self.footnote_prefix, name)
    }

    pub fn on_event<'a, W: StrWrite>(
        &mut self,
        w: &mut W,
        event: Event<'a>,
    ) -> io::Result<()> {
        if self.image_depth > 0 {
            return self.on_alt_text(w, event);
        }
        match event {
            Event::Start(tag) => self.on_start(w, tag),
            Event::End(tag) => self.on_end(w, tag),
            Event::Text(text) => escape_html(w, &text),
            Event::Code(code) => write!(w, "<code>{}</code>", html(&code)),
            Event::Html(raw) => w.write_str(&raw),
            Event::FootnoteReference(name) => write!(
                w,
                r##"<sup class="footnote-reference"><a href="#{}">{}</a></sup>"##,
                html(&self.footnote_id(&name)),
                html(&name),
            ),
            Event::SoftBreak => w.write_str("\n"),
            Event::HardBreak => w.write_str("<br />\n"),
            Event::Rule => w.write_str("<hr />\n"),
            Event::TaskListMarker(checked) => write!(
                w,
                r#"<input disabled="" type="checkbox" {}/>"#,
                if checked { r#"checked="" "# } else { "" }
            ),
        }
    }

    fn on_start<'a, W: StrWrite>(
        &mut self,
        w: &mut W,
        tag: Tag<'a>,
    ) -> io::Result<()> {
        match tag {
            Tag::Paragraph => w.write_str("<p>"),
            Tag::Heading(level) => write!(w, "<h{}>", level),
            Tag::BlockQuote => w.write_str("<blockquote>\n"),
            Tag::CodeBlock(CodeBlockKind::Fenced(info)) => {
                match info.split(' ').next().unwrap_or("") {
                    "" => w.write_str("<pre><code>"),
                    lang => write!(
                        w,
                        r#"<pre><code class="language-{}">"#,
                        html(lang)
                    ),
                }
            }
            Tag::CodeBlock(CodeBlockKind::Indented) => {
                w.write_str("<pre><code>")
            }
            Tag::List(None) => w.write_str("<ul>\n"),
            Tag::List(Some(1)) => w.write_str("<ol>\n"),
            Tag::List(Some(start)) => write!(w, "<ol start=\"{}\">\n", start),
            Tag::Item => w.write_str("<li>"),
            Tag::FootnoteDefinition(name) => write!(
                w,
                r#"<div class="footnote-definition" id="{}"><sup class="footnote-definition-label">{}</sup>"#,
                html(&self.footnote_id(&name)),
                html(&name),
            ),
            Tag::Table(alignments) => {
                self.table_alignments = alignments;
                w.write_str("<table>")
            }
            Tag::TableHead => {
                self.table_state = TableState::Head;
                self.table_cell_index = 0;
                w.write_str("<thead><tr>")
            }
            Tag::TableRow => {
                self.table_cell_index = 0;
                w.write_str("<tr>")
            }
            Tag::TableCell => write!(
                w,
                "<{}{}>",
                match self.table_state {
                    TableState::Head => "th",
                    TableState::Body => "td",
                },
                match self.table_alignments.get(self.table_cell_index) {
                    Some(Alignment::Left) => r#" align="left""#,
                    Some(Alignment::Right) => r#" align="right""#,
                    Some(Alignment::Center) => r#" align="center""#,
                    _ => "",
                }
            ),
            Tag::Emphasis => w.write_str("<em>"),
            Tag::Strong => w.write_str("<strong>"),
            Tag::Strikethrough => w.write_str("<del>"),
            Tag::Link(LinkType::Email, dest, title) => write!(
                w,
                r#"<a href="mailto:{}"{}>"#,
                href(&dest),
                Title(&title),
            ),
            Tag::Link(_, dest, title) => {
                write!(w, r#"<a href="{}"{}>"#, href(&dest), Title(&title))
            }
            Tag::Image(_, dest, title) => {
                self.image_depth = 1;
                self.image_title = title.to_string();
                write!(w, r#"<img src="{}" alt=""#, href(&dest))
            }
        }
    }

    /// Writes the events nested in an image as plain, escaped alt text and
    /// closes the tag once the outermost image ends.
    fn on_alt_text<'a, W: StrWrite>(
        &mut self,
        w: &mut W,
        event: Event<'a>,
    ) -> io::Result<()> {
        match event {
            Event::Start(Tag::Image(..)) => {
                self.image_depth += 1;
                Ok(())
            }
            Event::End(Tag::Image(..)) => {
                self.image_depth -= 1;
                if self.image_depth > 0 {
                    return Ok(());
                }
                let title = CowStr::from(std::mem::take(&mut self.image_title));
                write!(w, r#""{} />"#, Title(&title))
            }
            Event::Text(text) | Event::Code(text) => escape_html(w, &text),
            Event::SoftBreak | Event::HardBreak => w.write_str(" "),
            _ => Ok(()),
        }
    }

    fn on_end<W: StrWrite>(&mut self, w: &mut W, tag: Tag) -> io::Result<()> {
        match tag {
            Tag::Paragraph => w.write_str("</p>\n"),
            Tag::Heading(level) => write!(w, "</h{}>\n", level),
            Tag::BlockQuote => w.write_str("</blockquote>\n"),
            Tag::CodeBlock(_) => w.write_str("</code></pre>\n"),
            Tag::List(Some(_)) => w.write_str("</ol>\n"),
            Tag::List(None) => w.write_str("</ul>\n"),
            Tag::Item => w.write_str("</li>\n"),
            Tag::FootnoteDefinition(_) => w.write_str("</div>\n"),
            Tag::Table(_) => w.write_str("</tbody></table>\n"),
            Tag::TableHead => {
                self.table_state = TableState::Body;
                w.write_str("</tr></thead><tbody>\n")
            }
            Tag::TableRow => w.write_str("</tr>\n"),
            Tag::TableCell => {
                self.table_cell_index += 1;
                w.write_str(match self.table_state {
                    TableState::Head => "</th>",
                    TableState::Body => "</td>",
                })
            }
            Tag::Emphasis => w.write_str("</em>"),
            Tag::Strong => w.write_str("</strong>"),
            Tag::Strikethrough => w.write_str("</del>"),
            Tag::Link(_, _, _) => w.write_str("</a>"),
            // closed by on_alt_text
            Tag::Image(_, _, _) => Ok(()),
        }
    }
}

/// Displays an optional ` title="..."` attribute; empty titles are omitted.
struct Title<'a>(&'a CowStr<'a>);

impl Display for Title<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            Ok(())
        } else {
            write!(f, r#" title="{}""#, html(self.0))
        }
    }
}
