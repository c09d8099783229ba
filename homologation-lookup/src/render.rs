//! HTML fragments for the lookup page.

use itertools::Itertools;
use repeater_scraping_utils::regex;
use serde_json::Value;

use crate::lookup::{Page, Row, SummaryTable};

/// Text behind `${key}` placeholders.
const PLACEHOLDERS: &[(&str, &str)] = &[(
    "imp",
    "Certificação de Produto: Declaração de Conformidade - Importado uso próprio",
)];

pub fn is_link(v: &str) -> bool {
    regex!(r"^\s?(http|ftp)s?://").is_match(v)
}

pub(crate) fn text_of(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The position of the URL in a `[label, url]` or `[url, label]` pair.
fn link_position(pair: &[Value]) -> Option<usize> {
    let is_link_at = |i: usize| pair.get(i).and_then(Value::as_str).is_some_and(is_link);
    [0, 1].into_iter().find(|&i| is_link_at(i))
}

/// A pair becomes an anchor and a list of pairs a `<ul>`; anything else is shown as is.
pub fn link_html(value: &Value) -> String {
    let Value::Array(list) = value else {
        return text_of(value);
    };
    match list.first() {
        None => String::new(),
        Some(Value::String(_)) => match link_position(list) {
            Some(pos) => {
                let url = text_of(&list[pos]);
                let label = list.get(1 - pos).map(text_of).unwrap_or_default();
                format!(r#"<a href="{}" target="_blank">{label}</a>"#, url.trim())
            }
            None => text_of(&list[0]),
        },
        Some(Value::Array(_)) => format!(
            "<ul>{}</ul>",
            list.iter()
                .map(|item| format!("<li>{}</li>", link_html(item)))
                .join("")
        ),
        Some(_) => String::new(),
    }
}

/// The URL a value points to: a bare URL, a pair's URL, or the first URL of a list of pairs.
pub fn link_target(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if is_link(s) => Some(s.trim().to_owned()),
        Value::Array(list) => match list.first()? {
            Value::String(_) => link_position(list).map(|pos| text_of(&list[pos]).trim().to_owned()),
            Value::Array(_) => list.iter().find_map(link_target),
            _ => None,
        },
        _ => None,
    }
}

/// `[code, crc]` or free text.
pub fn homologation_text(value: &Value) -> String {
    match value {
        Value::String(s) if !s.trim().is_empty() => s.clone(),
        Value::Array(pair) if pair.len() == 2 => {
            format!("Código: {}<br />CRC: {}", text_of(&pair[0]), text_of(&pair[1]))
        }
        _ => String::new(),
    }
}

/// Replaces `${key}` with its text, or `???` for unknown keys.
pub fn substitute(s: &str) -> String {
    regex!(r"\$\{(\w+)\}")
        .replace_all(s, |c: &regex::Captures| {
            let key = c[1].trim().to_lowercase();
            PLACEHOLDERS
                .iter()
                .find(|(k, _)| *k == key)
                .map_or("???", |(_, v)| *v)
                .to_owned()
        })
        .into_owned()
}

pub fn enclose_tag(v: &str, tag: &str) -> String {
    if regex!(r"^\s*<\w+").is_match(v) {
        v.to_owned()
    } else {
        format!("<{tag}>{v}</{tag}>")
    }
}

/// The display form of a record value.
pub fn pre_format(value: &Value, key: Option<&str>) -> String {
    let html = match key {
        Some("v") => homologation_text(value),
        _ => link_html(value),
    };
    substitute(&html)
}

pub fn strip_tags(s: &str) -> String {
    regex!(r"<[^>]+>").replace_all(s, "").into_owned()
}

fn row_html(row: &Row) -> String {
    let (dt, dd) = match row {
        Row::Field { label, value } => (
            enclose_tag(label, "span"),
            if value.trim().is_empty() {
                "---".to_owned()
            } else {
                enclose_tag(value, "span")
            },
        ),
        Row::Malformed => ("--".to_owned(), "Item mal formatado".to_owned()),
    };
    format!(r#"<div class="dl-row"><div class="dt">{dt}</div><div class="dd">{dd}</div></div>"#)
}

fn summary_html(table: &SummaryTable) -> String {
    let mut html =
        r#"<div class="tbl x"><table cellspacing="0" border="0" cellpadding="0">"#.to_owned();
    let rows = std::iter::once((&table.header, None))
        .chain(table.rows.iter().map(|row| (&row.cells, Some(&row.link))));
    for (cells, link) in rows {
        match link {
            Some(link) => html.push_str(&format!(r#"<tr data-href="{link}">"#)),
            None => html.push_str("<tr>"),
        }
        for (i, cell) in cells.iter().enumerate() {
            let mut content = if i == 1 {
                cell.split(';').map(|part| format!("<i>{part}</i> ")).join("")
            } else {
                cell.clone()
            };
            if let (0, Some(link)) = (i, link) {
                content.push_str(&format!(r#"<a href="{link}">{}</a>"#, enclose_tag("🔗", "span")));
            }
            html.push_str(&format!("<td>{}</td>", enclose_tag(&content, "p")));
        }
        html.push_str("</tr>");
    }
    html.push_str("</table></div>");

    if let Some(nav) = &table.nav {
        let previous = nav
            .previous
            .map(|n| format!(r#"<a href="?sumario{n}">« Anterior</a>"#));
        let next = nav
            .next
            .map(|n| format!(r#"<a href="?sumario{n}">Próximo »</a>"#));
        html.push_str(&format!(
            r#"<p class="center">{}</p>"#,
            previous.into_iter().chain(next).join(" ")
        ));
    }
    html
}

pub fn render_html(page: &Page) -> String {
    let title = page.title.as_deref().unwrap_or_default();
    let mut body = page.rows.iter().map(row_html).join("");
    if let Some(table) = &page.summary {
        body.push_str(&summary_html(table));
    }
    format!(
        concat!(
            "<!DOCTYPE html>\n<html lang=\"pt-BR\"><head><meta charset=\"utf-8\" />",
            "<title>{}</title></head>\n<body><div class=\"container\">",
            "<h1 id=\"ttl\">{}</h1><div class=\"desc\">{}</div>",
            "<div class=\"dl loaded\">{}</div></div></body></html>\n"
        ),
        strip_tags(title),
        title,
        page.description.as_deref().unwrap_or_default(),
        body,
    )
}
