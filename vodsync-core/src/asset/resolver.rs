use regex::Regex;

const UUID_PATTERN: &str =
    "[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}";

/// Extracts the canonical CDN asset id from the URL shapes operators paste
/// into the catalog. Patterns are tried from most specific to least
/// specific: a library-qualified embed URL also contains a bare UUID, and
/// the qualified capture must win.
#[derive(Debug, Clone)]
pub struct AssetIdResolver {
    embed_path: Regex,
    play_path: Regex,
    uuid_segment: Regex,
    uuid_anywhere: Regex,
}

impl Default for AssetIdResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetIdResolver {
    pub fn new() -> Self {
        let embed_path = Regex::new(r"/embed/[^/]+/([A-Za-z0-9-]+)").expect("valid regex");
        let play_path = Regex::new(r"/play/[^/]+/([A-Za-z0-9-]+)").expect("valid regex");
        let uuid_segment =
            Regex::new(&format!("/({UUID_PATTERN})(?:[/?#]|$)")).expect("valid regex");
        let uuid_anywhere = Regex::new(&format!("({UUID_PATTERN})")).expect("valid regex");
        Self {
            embed_path,
            play_path,
            uuid_segment,
            uuid_anywhere,
        }
    }

    /// An explicit id short-circuits URL parsing. Absent result means
    /// "cannot resolve yet", never an error.
    pub fn resolve(&self, embed_url: Option<&str>, explicit_id: Option<&str>) -> Option<String> {
        if let Some(id) = explicit_id {
            let id = id.trim();
            if !id.is_empty() {
                return Some(id.to_string());
            }
        }
        let url = embed_url?.trim();
        if url.is_empty() {
            return None;
        }
        for pattern in [
            &self.embed_path,
            &self.play_path,
            &self.uuid_segment,
            &self.uuid_anywhere,
        ] {
            if let Some(capture) = pattern.captures(url).and_then(|c| c.get(1)) {
                return Some(capture.as_str().to_string());
            }
        }
        None
    }
}
