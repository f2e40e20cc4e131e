use pulldown_cmark::{Event, Parser, Tag, TagEnd};

use crate::{include_res, res::escape, sync::Message};

const LINK_SCHEMES: &[&str] = &["http://", "https://", "mailto:"];

fn safe_url(url: &str) -> bool {
    let url = url.trim_start().to_ascii_lowercase();
    LINK_SCHEMES.iter().any(|scheme| url.starts_with(scheme))
}

pub fn messages_to_html(messages: &[Message]) -> String {
    messages.iter().map(msg_to_html).collect()
}

/// Renders one chat line. The body is Markdown with any raw HTML shown as text.
/// Links and images pointing anywhere but http(s) or mailto keep only their text.
pub fn msg_to_html(message: &Message) -> String {
    // one entry per open link or image: whether its tags are kept
    let mut open = Vec::new();
    let parser = Parser::new(&message.text).filter_map(|event| match event {
        Event::Html(html) | Event::InlineHtml(html) => Some(Event::Text(html)),
        Event::Start(Tag::Link { ref dest_url, .. } | Tag::Image { ref dest_url, .. }) => {
            let keep = safe_url(dest_url);
            open.push(keep);
            keep.then_some(event)
        }
        Event::End(TagEnd::Link | TagEnd::Image) => open.pop().unwrap_or(true).then_some(event),
        _ => Some(event),
    });
    let mut content_html = String::new();
    pulldown_cmark::html::push_html(&mut content_html, parser);

    let avatar = message
        .avatar
        .as_deref()
        .map(|avatar| format!(r#"<img class="avatar" src="{}" width="32" height="32" alt="avatar">"#, escape(avatar)))
        .unwrap_or_default();

    let reply = message
        .reply_to
        .as_ref()
        .map(|reply| {
            include_res!(str, "/pages/rooms/reply.html")
                .replace("{reply_to_id}", &reply.id.to_string())
                .replace("{reply_sender}", &escape(&reply.sender))
                .replace("{reply_text}", &escape(&reply.text))
        })
        .unwrap_or_default();

    include_res!(str, "/pages/rooms/message.html")
        .replace("{id}", &message.id.to_string())
        .replace("{avatar}", &avatar)
        .replace("{sender}", &escape(&message.sender))
        .replace("{reply}", &reply)
        .replace("{content}", &content_html)
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::sync::ReplySnapshot;

    fn message(text: &str) -> Message {
        Message {
            id: Uuid::now_v7(),
            sender_id: "google.com:1".to_owned(),
            sender: "Ada".to_owned(),
            avatar: None,
            text: text.to_owned(),
            reply_to: None,
            created_at: 0,
        }
    }

    #[test]
    fn markdown_is_rendered() {
        let html = msg_to_html(&message("hello **world**"));
        assert!(html.contains("<strong>world</strong>"));
        assert!(html.contains("Ada"));
    }

    #[test]
    fn raw_html_is_escaped() {
        let html = msg_to_html(&message("<script>alert(1)</script>"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn script_urls_lose_their_link() {
        for text in [
            "[click](javascript:alert(document.cookie))",
            "[click](JavaScript:alert(1))",
            "![cat](javascript:alert(1))",
            "<javascript:alert(1)>",
            "[x](data:text/html,hi)",
        ] {
            let html = msg_to_html(&message(text));
            assert!(!html.to_ascii_lowercase().contains("href=\"javascript:"), "{html}");
            assert!(!html.contains("src=\"javascript:"), "{html}");
            assert!(!html.contains("data:text/html"), "{html}");
        }

        let html = msg_to_html(&message("[click](javascript:alert(1)) me"));
        assert!(html.contains("click"));
        assert!(!html.contains("<a "));
    }

    #[test]
    fn web_links_survive() {
        let html = msg_to_html(&message("[lofi](https://youtu.be/xyz123) or <mailto:ada@example.com>"));
        assert!(html.contains(r#"<a href="https://youtu.be/xyz123">lofi</a>"#));
        assert!(html.contains(r#"href="mailto:ada@example.com""#));
    }

    #[test]
    fn reply_snapshot_is_shown() {
        let mut reply = message("sure");
        reply.reply_to = Some(ReplySnapshot {
            id: Uuid::nil(),
            sender: "Grace".to_owned(),
            text: "movie night?".to_owned(),
        });
        let html = msg_to_html(&reply);
        assert!(html.contains("Grace"));
        assert!(html.contains("movie night?"));
    }

    #[test]
    fn log_keeps_order() {
        let html = messages_to_html(&[message("first"), message("second")]);
        assert!(html.find("first").unwrap() < html.find("second").unwrap());
    }
}
