//! Minimal multipart/form-data parsing for upload requests.
//!
//! Parts are split on the `--boundary` delimiter; each part's headers end at
//! the first blank line and its body runs up to the CRLF before the next
//! delimiter. Bodies are kept as raw bytes, so binary uploads survive.

/// One decoded part of a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub name: String,
    /// `Some` for file inputs, even when the browser sent `filename=""`.
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// Returns the index of the first occurrence of `needle` in `haystack`.
pub fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Splits `haystack` on every occurrence of `needle`, returning the pieces
/// between occurrences (excluding the needle itself).
fn split_on<'a>(haystack: &'a [u8], needle: &[u8]) -> Vec<&'a [u8]> {
    let mut result = Vec::new();
    let mut start = 0;
    while start <= haystack.len() {
        if let Some(pos) = find_subsequence(&haystack[start..], needle) {
            result.push(&haystack[start..start + pos]);
            start += pos + needle.len();
        } else {
            result.push(&haystack[start..]);
            break;
        }
    }
    result
}

/// Extracts the boundary token from a Content-Type header value like
/// `multipart/form-data; boundary=----WebKitFormBoundaryXXX`.
pub fn extract_boundary(content_type: &str) -> Option<String> {
    let mut params = split_params(content_type).into_iter();
    let mime = params.next()?;
    if !mime.eq_ignore_ascii_case("multipart/form-data") {
        return None;
    }
    params
        .find_map(|s| {
            let (k, v) = s.split_once('=')?;
            k.trim()
                .eq_ignore_ascii_case("boundary")
                .then(|| v.trim().trim_matches('"').to_owned())
        })
        .filter(|b| !b.is_empty())
}

/// Parses every part that carries a `Content-Disposition: form-data` name.
pub fn parse_parts(body: &[u8], boundary: &str) -> Vec<Part> {
    let delimiter = format!("\r\n--{}", boundary);
    // Prefixing CRLF lets the first delimiter match like the others.
    let mut framed = Vec::with_capacity(body.len() + 2);
    framed.extend_from_slice(b"\r\n");
    framed.extend_from_slice(body);

    let sep = b"\r\n\r\n";
    split_on(&framed, delimiter.as_bytes())
        .into_iter()
        .skip(1)
        .filter(|part| !part.starts_with(b"--"))
        .filter_map(|part| {
            // Each part starts with the CRLF that ended the delimiter line.
            let part = part.strip_prefix(b"\r\n").unwrap_or(part);
            let sep_pos = find_subsequence(part, sep)?;
            let headers = String::from_utf8_lossy(&part[..sep_pos]);
            let name = header_param(&headers, "name")?;
            Some(Part {
                name,
                filename: header_param(&headers, "filename"),
                content_type: header_value(&headers, "content-type"),
                data: part[sep_pos + sep.len()..].to_vec(),
            })
        })
        .collect()
}

/// Returns the named part if it is a file input.
pub fn find_file(body: &[u8], boundary: &str, field_name: &str) -> Option<Part> {
    parse_parts(body, boundary)
        .into_iter()
        .find(|p| p.name == field_name && p.filename.is_some())
}

/// Value of a `Content-Disposition` parameter such as `name="image"`.
fn header_param(headers: &str, key: &str) -> Option<String> {
    let disposition = headers
        .lines()
        .find(|l| l.to_ascii_lowercase().starts_with("content-disposition:"))?;

    split_params(disposition).into_iter().skip(1).find_map(|param| {
        let (k, v) = param.split_once('=')?;
        if !k.trim().eq_ignore_ascii_case(key) {
            return None;
        }
        let v = v.trim();
        let v = v.strip_prefix('"').and_then(|s| s.strip_suffix('"')).unwrap_or(v);
        Some(v.to_owned())
    })
}

/// Splits a header value on `;`, ignoring separators inside quotes.
fn split_params(value: &str) -> Vec<&str> {
    let mut params = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in value.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                params.push(value[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    params.push(value[start..].trim());
    params
}

fn header_value(headers: &str, name: &str) -> Option<String> {
    headers.lines().find_map(|line| {
        let (k, v) = line.split_once(':')?;
        k.trim().eq_ignore_ascii_case(name).then(|| v.trim().to_owned())
    })
}
