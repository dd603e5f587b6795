//! Markdown rendering with heading anchors.

use std::collections::HashMap;

use pulldown_cmark::{html, CowStr, Event, Options, Parser, Tag, TagEnd};

/// Render markdown to HTML.
///
/// Raw HTML passes through untouched. Headings without an explicit
/// `{#id}` get an `id` derived from their text, made unique within the
/// document by appending `-1`, `-2`, ...
pub fn render_markdown(source: &str) -> String {
    let options = Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_HEADING_ATTRIBUTES;

    let mut events: Vec<Event<'_>> = Parser::new_ext(source, options).collect();
    add_heading_anchors(&mut events);

    let mut html_output = String::new();
    html::push_html(&mut html_output, events.into_iter());
    html_output
}

fn add_heading_anchors(events: &mut [Event<'_>]) {
    let mut used: HashMap<String, usize> = HashMap::new();

    for event in events.iter() {
        if let Event::Start(Tag::Heading { id: Some(id), .. }) = event {
            used.insert(id.to_string(), 1);
        }
    }

    for i in 0..events.len() {
        if !matches!(&events[i], Event::Start(Tag::Heading { id: None, .. })) {
            continue;
        }

        let text = heading_text(&events[i + 1..]);
        let anchor = unique_anchor(slugify(&text), &mut used);

        if let Event::Start(Tag::Heading { id, .. }) = &mut events[i] {
            *id = Some(CowStr::from(anchor));
        }
    }
}

/// Plain text of a heading, up to its closing tag.
fn heading_text(events: &[Event<'_>]) -> String {
    let mut text = String::new();
    for event in events {
        match event {
            Event::End(TagEnd::Heading(_)) => break,
            Event::Text(t) | Event::Code(t) => text.push_str(t),
            _ => {}
        }
    }
    text
}

fn unique_anchor(slug: String, used: &mut HashMap<String, usize>) -> String {
    let slug = if slug.is_empty() {
        "section".to_string()
    } else {
        slug
    };

    let mut count = used.get(&slug).copied().unwrap_or(0);
    let mut candidate = if count == 0 {
        slug.clone()
    } else {
        format!("{slug}-{count}")
    };
    while count > 0 && used.contains_key(&candidate) {
        count += 1;
        candidate = format!("{slug}-{count}");
    }

    used.insert(slug, count + 1);
    used.entry(candidate.clone()).or_insert(1);
    candidate
}

/// Convert a heading to a URL-safe slug.
pub fn slugify(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c
            } else if c.is_whitespace() || c == '-' || c == '_' {
                '-'
            } else {
                '\0'
            }
        })
        .filter(|c| *c != '\0')
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}
