//! Static, injectable lookup tables for status reasons and MIME types.

/// Status code -> reason phrase.
///
/// A small default catalog is built in; callers who need more codes (or who
/// want to override a reason phrase) construct their own with `from_entries`.
#[derive(Debug, Clone)]
pub struct StatusCatalog {
    entries: Vec<(u16, &'static str)>,
}

impl StatusCatalog {
    pub fn default_catalog() -> StatusCatalog {
        StatusCatalog { entries: DEFAULT_STATUS.to_vec() }
    }

    pub fn from_entries(entries: Vec<(u16, &'static str)>) -> StatusCatalog {
        StatusCatalog { entries }
    }

    pub fn reason(&self, code: u16) -> Option<&'static str> {
        self.entries.iter().find(|(c, _)| *c == code).map(|(_, r)| *r)
    }

    pub fn contains(&self, code: u16) -> bool {
        self.entries.iter().any(|(c, _)| *c == code)
    }
}

impl Default for StatusCatalog {
    fn default() -> StatusCatalog {
        StatusCatalog::default_catalog()
    }
}

static DEFAULT_STATUS: &[(u16, &str)] = &[
    (100, "Continue"),
    (101, "Switching Protocols"),
    (200, "OK"),
    (201, "Created"),
    (204, "No Content"),
    (206, "Partial Content"),
    (301, "Moved Permanently"),
    (302, "Found"),
    (304, "Not Modified"),
    (307, "Temporary Redirect"),
    (308, "Permanent Redirect"),
    (400, "Bad Request"),
    (401, "Unauthorized"),
    (403, "Forbidden"),
    (404, "Not Found"),
    (405, "Method Not Allowed"),
    (408, "Request Timeout"),
    (409, "Conflict"),
    (410, "Gone"),
    (411, "Length Required"),
    (412, "Precondition Failed"),
    (413, "Payload Too Large"),
    (414, "URI Too Long"),
    (415, "Unsupported Media Type"),
    (416, "Range Not Satisfiable"),
    (417, "Expectation Failed"),
    (426, "Upgrade Required"),
    (428, "Precondition Required"),
    (429, "Too Many Requests"),
    (431, "Request Header Fields Too Large"),
    (500, "Internal Server Error"),
    (501, "Not Implemented"),
    (502, "Bad Gateway"),
    (503, "Service Unavailable"),
    (504, "Gateway Timeout"),
    (505, "HTTP Version Not Supported"),
];

/// File extension (without leading dot, lowercase) -> MIME type.
///
/// Multi-valued: an extension may map to more than one type; `mime_type`
/// returns the first entry, `mime_types` returns all of them.
#[derive(Debug, Clone)]
pub struct MimeCatalog {
    entries: Vec<(&'static str, &'static str)>,
}

impl MimeCatalog {
    pub fn default_catalog() -> MimeCatalog {
        MimeCatalog { entries: DEFAULT_MIME.to_vec() }
    }

    pub fn from_entries(entries: Vec<(&'static str, &'static str)>) -> MimeCatalog {
        MimeCatalog { entries }
    }

    pub fn mime_type(&self, extension: &str) -> Option<&'static str> {
        self.entries.iter()
            .find(|(ext, _)| ext.eq_ignore_ascii_case(extension))
            .map(|(_, mime)| *mime)
    }

    pub fn mime_types<'a>(&'a self, extension: &'a str) -> impl Iterator<Item = &'static str> + 'a {
        self.entries.iter()
            .filter(move |(ext, _)| ext.eq_ignore_ascii_case(extension))
            .map(|(_, mime)| *mime)
    }
}

impl Default for MimeCatalog {
    fn default() -> MimeCatalog {
        MimeCatalog::default_catalog()
    }
}

static DEFAULT_MIME: &[(&str, &str)] = &[
    ("html", "text/html; charset=utf-8"),
    ("htm", "text/html; charset=utf-8"),
    ("css", "text/css; charset=utf-8"),
    ("js", "application/javascript; charset=utf-8"),
    ("mjs", "application/javascript; charset=utf-8"),
    ("json", "application/json"),
    ("xml", "application/xml"),
    ("txt", "text/plain; charset=utf-8"),
    ("csv", "text/csv; charset=utf-8"),
    ("md", "text/markdown; charset=utf-8"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
    ("webp", "image/webp"),
    ("ico", "image/x-icon"),
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
    ("ttf", "font/ttf"),
    ("otf", "font/otf"),
    ("mp4", "video/mp4"),
    ("webm", "video/webm"),
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("pdf", "application/pdf"),
    ("zip", "application/zip"),
    ("gz", "application/gzip"),
    ("wasm", "application/wasm"),
    ("bin", "application/octet-stream"),
];

#[cfg(test)]
mod test {
    use super::{StatusCatalog, MimeCatalog};

    #[test]
    fn default_status_has_common_codes() {
        let cat = StatusCatalog::default_catalog();
        assert_eq!(cat.reason(200), Some("OK"));
        assert_eq!(cat.reason(404), Some("Not Found"));
        assert!(cat.contains(500));
        assert_eq!(cat.reason(999), None);
    }

    #[test]
    fn default_mime_is_case_insensitive() {
        let cat = MimeCatalog::default_catalog();
        assert_eq!(cat.mime_type("HTML"), Some("text/html; charset=utf-8"));
        assert_eq!(cat.mime_type("nope"), None);
    }

    #[test]
    fn custom_catalog_overrides_default() {
        let cat = StatusCatalog::from_entries(vec![(200, "Yep")]);
        assert_eq!(cat.reason(200), Some("Yep"));
        assert_eq!(cat.reason(404), None);
    }
}
