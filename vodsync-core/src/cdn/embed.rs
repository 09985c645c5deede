use regex::Regex;

/// Pulls the first tokenized HLS playlist URL out of an embed page. The
/// page layout is not a stable contract; callers must validate whatever
/// this returns before serving it.
pub fn extract_playlist_url(html: &str) -> Option<String> {
    let pattern =
        Regex::new(r#"https://[^\s"'<>\\]*bcdn_token=[^\s"'<>\\]*playlist\.m3u8[^\s"'<>\\]*"#)
            .expect("valid regex");
    let candidate = pattern.find(html)?.as_str();
    let trimmed = candidate.trim_end_matches(['"', '\'', '\\', ',', ')']);
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_first_tokenized_playlist() {
        let html = r#"<script>var src = "https://vz-1.b-cdn.net/abc/playlist.m3u8";
            var signed = "https://vz-1.b-cdn.net/bcdn_token=SIG&expires=999/abc/playlist.m3u8";
        </script>"#;
        let url = extract_playlist_url(html).unwrap();
        assert_eq!(
            url,
            "https://vz-1.b-cdn.net/bcdn_token=SIG&expires=999/abc/playlist.m3u8"
        );
    }

    #[test]
    fn trims_trailing_quote_artifacts() {
        let html =
            r"source: 'https://vz-1.b-cdn.net/bcdn_token=SIG/abc/playlist.m3u8?v=1',";
        let url = extract_playlist_url(html).unwrap();
        assert_eq!(
            url,
            "https://vz-1.b-cdn.net/bcdn_token=SIG/abc/playlist.m3u8?v=1"
        );
    }

    #[test]
    fn untokenized_page_yields_nothing() {
        let html = r#"<video src="https://vz-1.b-cdn.net/abc/playlist.m3u8"></video>"#;
        assert_eq!(extract_playlist_url(html), None);
    }
}
