// Case-insensitive tag slicing over raw HTML. Good enough for the handful of
// fixed elements we read from race pages; not a general parser.

/// End of the block whose tag name ends at `from`: just past `close`.
/// `lc` is the already lowercased document.
fn block_end(lc: &str, from: usize, close: &str) -> Option<usize> {
    let open_end = lc[from..].find('>')? + from + 1;
    Some(open_end + lc[open_end..].find(close)? + close.len())
}

/// Every `<tag ...>...</tag>` block in `s`, matching names in any case.
pub fn tag_blocks<'a>(s: &'a str, tag: &str) -> Vec<&'a str> {
    // ASCII lowercasing keeps byte offsets valid for `s`
    let lc = s.to_ascii_lowercase();
    let open = format!("<{}", tag.to_ascii_lowercase());
    let close = format!("</{}>", tag.to_ascii_lowercase());
    let mut out = Vec::new();
    let mut pos = 0usize;
    while let Some(start) = lc[pos..].find(&open).map(|i| i + pos) {
        let name_end = start + open.len();
        // "<a" also matches "<abbr"; require a delimiter after the name
        let delimited = matches!(
            lc[name_end..].chars().next(),
            Some(c) if c.is_whitespace() || c == '>' || c == '/'
        );
        if !delimited {
            pos = name_end;
            continue;
        }
        let Some(end) = block_end(&lc, name_end, &close) else {
            break;
        };
        out.push(&s[start..end]);
        pos = end;
    }
    out
}

pub fn open_tag(block: &str) -> &str {
    match block.find('>') {
        Some(i) => &block[..=i],
        None => block,
    }
}

pub fn inner_after_open_tag(block: &str) -> &str {
    if let (Some(oe), Some(cs)) = (block.find('>'), block.rfind('<')) {
        if cs > oe {
            return &block[oe + 1..cs];
        }
    }
    ""
}

/// Value of attribute `name` in an opening tag, quoted or bare.
pub fn attr_value<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let lc = tag.to_ascii_lowercase();
    let needle = format!("{}=", name.to_ascii_lowercase());
    let mut from = 0;
    loop {
        let at = lc[from..].find(&needle)? + from;
        let boundary = lc[..at].chars().last().is_some_and(|c| c.is_whitespace());
        from = at + needle.len();
        if !boundary {
            continue;
        }
        let rest = &tag[from..];
        return match rest.chars().next() {
            Some(q @ ('"' | '\'')) => rest[1..].find(q).map(|end| &rest[1..=end]),
            Some(_) => {
                let end = rest
                    .find(|c: char| c.is_whitespace() || c == '>')
                    .unwrap_or(rest.len());
                Some(&rest[..end])
            }
            None => None,
        };
    }
}

pub fn has_class(tag: &str, class: &str) -> bool {
    attr_value(tag, "class")
        .map(|v| v.split_whitespace().any(|c| c == class))
        .unwrap_or(false)
}

/// First `<tag class="... class ...">` block.
pub fn find_block_with_class<'a>(s: &'a str, tag: &str, class: &str) -> Option<&'a str> {
    tag_blocks(s, tag)
        .into_iter()
        .find(|b| has_class(open_tag(b), class))
}

/// Every anchor in `s` as `(href, text)`.
pub fn links(s: &str) -> Vec<(&str, String)> {
    tag_blocks(s, "a")
        .into_iter()
        .filter_map(|b| {
            let href = attr_value(open_tag(b), "href")?;
            Some((href, text_of(inner_after_open_tag(b))))
        })
        .collect()
}

pub fn strip_tags(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;
    for ch in s.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out
}

pub fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#039;", "'")
        .replace("&amp;", "&")
}

/// Visible text of an HTML fragment, trimmed.
pub fn text_of(fragment: &str) -> String {
    decode_entities(&strip_tags(fragment)).trim().to_string()
}
