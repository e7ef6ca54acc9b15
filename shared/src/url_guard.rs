/// Source URL validation.
///
/// Only public http(s) URLs are handed to the fetcher; anything that would let
/// a caller read local files or reach internal hosts is rejected up front.
use once_cell::sync::Lazy;
use regex::Regex;
use std::net::IpAddr;
use url::{Host, Url};

use crate::errors::UrlError;

/// Longest URL accepted.
pub const MAX_URL_LEN: usize = 2048;

/// Where a validated URL points, used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    YoutubeVideo,
    YoutubeMusic,
    YoutubeShort,
    YoutubePlaylist,
    Other,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SourceKind::YoutubeVideo => "youtube_video",
            SourceKind::YoutubeMusic => "youtube_music",
            SourceKind::YoutubeShort => "youtube_short",
            SourceKind::YoutubePlaylist => "youtube_playlist",
            SourceKind::Other => "other",
        };
        write!(f, "{}", s)
    }
}

/// A URL that passed the guard. `url` is the caller's input, unmodified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUrl {
    pub url: String,
    pub kind: SourceKind,
}

// ====== REGEX PATTERNS ======

static YOUTUBE_PLAYLIST_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://(?:www\.|m\.)?youtube\.com/playlist\?list=[A-Za-z0-9_-]+").unwrap()
});

static YOUTUBE_SHORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://(?:www\.|m\.)?youtube\.com/shorts/[A-Za-z0-9_-]{11}").unwrap()
});

static YOUTUBE_MUSIC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://music\.youtube\.com/watch\?(?:.*&)?v=[A-Za-z0-9_-]{11}").unwrap()
});

static YOUTUBE_VIDEO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^https?://(?:(?:www\.|m\.)?youtube\.com/watch\?(?:.*&)?v=|youtu\.be/)[A-Za-z0-9_-]{11}"
    ).unwrap()
});

/// Validate a caller-supplied source URL.
pub fn validate_source_url(input: &str) -> Result<SourceUrl, UrlError> {
    if input.is_empty() {
        return Err(UrlError::Missing);
    }
    if input.len() > MAX_URL_LEN {
        return Err(UrlError::TooLong(MAX_URL_LEN));
    }
    if input.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(UrlError::IllegalCharacters);
    }

    // Backslashes are read as '/' here but not by every URL parser downstream
    if input.contains('\\') {
        return Err(UrlError::IllegalCharacters);
    }

    let parsed = Url::parse(input).map_err(|_| UrlError::Malformed)?;

    let scheme = parsed.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(UrlError::SchemeNotAllowed(scheme.to_string()));
    }

    if !parsed.username().is_empty() || parsed.password().is_some() {
        return Err(UrlError::CredentialsNotAllowed);
    }

    // Hex, octal and integer IPv4 forms arrive here already normalized
    match parsed.host() {
        Some(Host::Ipv4(ip)) if !is_public_ip(IpAddr::V4(ip)) => {
            return Err(UrlError::HostNotAllowed(ip.to_string()));
        }
        Some(Host::Ipv6(ip)) if !is_public_ip(IpAddr::V6(ip)) => {
            return Err(UrlError::HostNotAllowed(ip.to_string()));
        }
        Some(Host::Domain(name)) if !is_public_name(name) => {
            return Err(UrlError::HostNotAllowed(name.to_string()));
        }
        Some(_) => {}
        None => return Err(UrlError::Malformed),
    }

    Ok(SourceUrl {
        url: input.to_string(),
        kind: classify(input),
    })
}

/// Classify a URL by the service it belongs to.
pub fn classify(url: &str) -> SourceKind {
    // Playlist and shorts first (more specific)
    if YOUTUBE_PLAYLIST_RE.is_match(url) {
        SourceKind::YoutubePlaylist
    } else if YOUTUBE_SHORT_RE.is_match(url) {
        SourceKind::YoutubeShort
    } else if YOUTUBE_MUSIC_RE.is_match(url) {
        SourceKind::YoutubeMusic
    } else if YOUTUBE_VIDEO_RE.is_match(url) {
        SourceKind::YoutubeVideo
    } else {
        SourceKind::Other
    }
}

fn is_public_name(name: &str) -> bool {
    let bare = name.trim_end_matches('.');

    !(bare.is_empty()
        || bare == "localhost"
        || bare.ends_with(".localhost")
        || bare.ends_with(".local")
        || bare.ends_with(".internal"))
}

fn is_public_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            !(v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                || v4.is_multicast()
                // Carrier-grade NAT 100.64.0.0/10
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64))
        }
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_public_ip(IpAddr::V4(mapped));
            }
            let first = v6.segments()[0];
            !(v6.is_loopback()
                || v6.is_unspecified()
                || v6.is_multicast()
                // fc00::/7 unique local
                || (first & 0xfe00) == 0xfc00
                // fe80::/10 link local
                || (first & 0xffc0) == 0xfe80)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_youtube_music_unchanged() {
        let url = "https://music.youtube.com/watch?v=ANk2rYwEngk&si=mhv1UuJf_b9-eqdm";
        let source = validate_source_url(url).unwrap();
        assert_eq!(source.url, url);
        assert_eq!(source.kind, SourceKind::YoutubeMusic);
    }

    #[test]
    fn test_classifies_youtube_links() {
        assert_eq!(classify("https://www.youtube.com/watch?v=dQw4w9WgXcQ"), SourceKind::YoutubeVideo);
        assert_eq!(classify("https://youtu.be/dQw4w9WgXcQ"), SourceKind::YoutubeVideo);
        assert_eq!(classify("https://www.youtube.com/shorts/abc123def45"), SourceKind::YoutubeShort);
        assert_eq!(
            classify("https://www.youtube.com/playlist?list=PLrAXtmErZgOeiKm4sgNOknGvNjby9efdf"),
            SourceKind::YoutubePlaylist
        );
        assert_eq!(classify("https://soundcloud.com/artist/track"), SourceKind::Other);
    }

    #[test]
    fn test_accepts_generic_public_url() {
        let source = validate_source_url("https://example.com/not-a-video").unwrap();
        assert_eq!(source.kind, SourceKind::Other);
        assert!(validate_source_url("http://93.184.216.34:8080/a.mp3").is_ok());
    }

    #[test]
    fn test_rejects_empty() {
        assert_eq!(validate_source_url(""), Err(UrlError::Missing));
    }

    #[test]
    fn test_rejects_non_http_schemes() {
        assert_eq!(
            validate_source_url("file:///etc/passwd"),
            Err(UrlError::SchemeNotAllowed("file".into()))
        );
        assert_eq!(
            validate_source_url("ftp://example.com/song.mp3"),
            Err(UrlError::SchemeNotAllowed("ftp".into()))
        );
        assert!(validate_source_url("javascript:alert(1)").is_err());
    }

    #[test]
    fn test_rejects_internal_hosts() {
        for url in [
            "http://localhost:8080/",
            "http://127.0.0.1/",
            "http://10.1.2.3/x",
            "http://192.168.0.10/",
            "http://169.254.169.254/latest/meta-data/",
            "http://[::1]/",
            "http://[fd00::1]/",
            "http://[::ffff:127.0.0.1]/",
            "http://printer.local/",
            "http://metadata.google.internal/",
            "http://2130706433/",
            "http://0x7f000001/",
            "http://0x7f.0.0.1/",
            "http://0x7f.1/",
            "http://0177.0.0.1/",
            "http://0xa9fea9fe/latest/meta-data/",
            "http://0xA9.0xFE.0xA9.0xFE/",
            "http://127.0.0.1./",
            "http://LOCALHOST/",
            "http://localhost./",
        ] {
            assert!(
                matches!(validate_source_url(url), Err(UrlError::HostNotAllowed(_))),
                "expected {url} to be rejected"
            );
        }
    }

    #[test]
    fn test_hex_host_reports_normalized_address() {
        assert_eq!(
            validate_source_url("http://0xa9fea9fe/latest/meta-data/"),
            Err(UrlError::HostNotAllowed("169.254.169.254".into()))
        );
    }

    #[test]
    fn test_rejects_credentials_and_backslashes() {
        assert_eq!(
            validate_source_url("http://user:pw@example.com/"),
            Err(UrlError::CredentialsNotAllowed)
        );
        assert_eq!(
            validate_source_url("http://example.com@127.0.0.1/"),
            Err(UrlError::CredentialsNotAllowed)
        );
        assert_eq!(
            validate_source_url("http://example.com\\@127.0.0.1/"),
            Err(UrlError::IllegalCharacters)
        );
    }

    #[test]
    fn test_rejects_whitespace_and_garbage() {
        assert_eq!(validate_source_url("   "), Err(UrlError::IllegalCharacters));
        assert_eq!(
            validate_source_url("https://example.com/a b"),
            Err(UrlError::IllegalCharacters)
        );
        assert_eq!(validate_source_url("not a url"), Err(UrlError::IllegalCharacters));
        assert_eq!(validate_source_url("example.com/video"), Err(UrlError::Malformed));
        assert_eq!(validate_source_url("https://example.com:99999/"), Err(UrlError::Malformed));
    }

    #[test]
    fn test_rejects_overlong() {
        let url = format!("https://example.com/{}", "a".repeat(MAX_URL_LEN));
        assert_eq!(validate_source_url(&url), Err(UrlError::TooLong(MAX_URL_LEN)));
    }
}
