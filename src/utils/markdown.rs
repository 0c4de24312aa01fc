use ammonia::Builder;
use comrak::{markdown_to_html, Options};
use std::collections::HashSet;

/// Post body → sanitized HTML for `content_html`.
pub fn render_markdown(raw: &str) -> String {
    let mut options = Options::default();
    options.extension.strikethrough = true;
    options.extension.table = true;
    options.extension.autolink = true;
    options.render.unsafe_ = true; // ammonia sanitizes below

    let html = markdown_to_html(raw, &options);
    sanitize_html(&html)
}

/// Strips every tag from a plain-text field (titles, names, bios, comments).
pub fn strip_tags(raw: &str) -> String {
    Builder::empty().clean(raw).to_string().trim().to_string()
}

fn sanitize_html(html: &str) -> String {
    let extra_tags: HashSet<&str> = [
        "h1", "h2", "h3", "h4", "pre", "code", "blockquote", "hr", "table", "thead", "tbody",
        "tr", "th", "td", "img", "del",
    ]
    .into_iter()
    .collect();

    let mut builder = Builder::default();
    builder.add_tags(&extra_tags);
    builder.add_tag_attributes("a", &["href", "title"]);
    builder.add_tag_attributes("img", &["src", "alt", "title"]);
    builder.add_tag_attributes("code", &["class"]);
    builder.url_schemes(["http", "https", "mailto"].into_iter().collect());
    builder.link_rel(Some("noopener noreferrer"));

    builder.clean(html).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_basic_markdown() {
        let html = render_markdown("# Xin chào\n\n**đậm** và *nghiêng*");
        assert!(html.contains("<h1>Xin chào</h1>"));
        assert!(html.contains("<strong>đậm</strong>"));
        assert!(html.contains("<em>nghiêng</em>"));
    }

    #[test]
    fn tables_and_strikethrough() {
        let html = render_markdown("| A |\n|---|\n| 1 |\n\n~~cũ~~");
        assert!(html.contains("<td>1</td>"));
        assert!(html.contains("<del>cũ</del>"));
    }

    #[test]
    fn scripts_and_handlers_removed() {
        let html = render_markdown("<script>alert(1)</script><img src=x onerror=alert(2)>");
        assert!(!html.contains("<script>"));
        assert!(!html.contains("onerror"));
    }

    #[test]
    fn javascript_links_removed() {
        assert!(!render_markdown("[x](javascript:alert(1))").contains("javascript:"));
    }

    #[test]
    fn plain_text_loses_markup_only() {
        assert_eq!(strip_tags("  <b>Điện thoại</b> mới "), "Điện thoại mới");
        assert_eq!(strip_tags("<script>x()</script>Tên"), "Tên");
    }
}
