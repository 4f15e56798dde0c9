use std::fmt;

use url::Url;

pub const LONG_FORM_HOST: &str = "youtube.com";
pub const SHORT_LINK_HOST: &str = "youtu.be";
pub const ALTERNATE_HOST: &str = "vimeo.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaService {
    YouTube,
    Vimeo,
}

/// The resource currently being watched, reduced to the identifier that
/// discussion links are compared against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaTarget {
    pub service: MediaService,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TargetError {
    #[error("no video identifier in {0:?}")]
    MissingIdentifier(String),
    #[error("unsupported host {0:?}")]
    UnsupportedHost(String),
}

impl MediaTarget {
    pub fn youtube(id: impl Into<String>) -> Self {
        Self {
            service: MediaService::YouTube,
            id: id.into(),
        }
    }

    pub fn vimeo(id: impl Into<String>) -> Self {
        Self {
            service: MediaService::Vimeo,
            id: id.into(),
        }
    }

    /// Accepts a watch URL, a short link, an alternate-host URL, or a bare id.
    /// Bare numeric ids belong to the alternate host.
    pub fn parse(input: &str) -> Result<Self, TargetError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(TargetError::MissingIdentifier(input.to_string()));
        }
        if !input.contains('/') && !input.contains('.') {
            if input.chars().all(|c| c.is_ascii_digit()) {
                return Ok(Self::vimeo(input));
            }
            return Ok(Self::youtube(input));
        }

        let with_scheme = if input.contains("://") {
            input.to_string()
        } else {
            format!("https://{input}")
        };
        let url = Url::parse(&with_scheme)
            .map_err(|_| TargetError::MissingIdentifier(input.to_string()))?;
        let host = url
            .host_str()
            .unwrap_or_default()
            .trim_start_matches("www.")
            .trim_start_matches("m.")
            .to_ascii_lowercase();

        let last_segment = || {
            url.path_segments()
                .and_then(|mut segments| segments.next_back())
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
        };

        let target = match host.as_str() {
            LONG_FORM_HOST => url
                .query_pairs()
                .find(|(key, _)| key == "v")
                .map(|(_, value)| Self::youtube(value.into_owned())),
            SHORT_LINK_HOST => last_segment().map(Self::youtube),
            ALTERNATE_HOST => last_segment()
                .filter(|segment| segment.chars().all(|c| c.is_ascii_digit()))
                .map(Self::vimeo),
            other => return Err(TargetError::UnsupportedHost(other.to_string())),
        };
        target.ok_or_else(|| TargetError::MissingIdentifier(input.to_string()))
    }

    /// Full-text query for the discussion search endpoint. The endpoint is
    /// fuzzy, so every hit still goes through the validator.
    pub fn search_query(&self) -> String {
        match self.service {
            MediaService::YouTube => format!(
                "(url:3D{id} OR url:{id}) (site:{LONG_FORM_HOST} OR site:{SHORT_LINK_HOST})",
                id = self.id
            ),
            MediaService::Vimeo => format!(
                "url:https://{ALTERNATE_HOST}/{id} OR url:http://{ALTERNATE_HOST}/{id}",
                id = self.id
            ),
        }
    }
}

impl fmt::Display for MediaTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.service {
            MediaService::YouTube => write!(f, "youtube:{}", self.id),
            MediaService::Vimeo => write!(f, "vimeo:{}", self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_watch_urls() {
        let target = MediaTarget::parse("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42").unwrap();
        assert_eq!(target, MediaTarget::youtube("dQw4w9WgXcQ"));
    }

    #[test]
    fn parses_short_and_alternate_links() {
        assert_eq!(
            MediaTarget::parse("youtu.be/dQw4w9WgXcQ").unwrap(),
            MediaTarget::youtube("dQw4w9WgXcQ")
        );
        assert_eq!(
            MediaTarget::parse("https://vimeo.com/76979871").unwrap(),
            MediaTarget::vimeo("76979871")
        );
    }

    #[test]
    fn parses_bare_identifiers() {
        assert_eq!(MediaTarget::parse("abc_DEF-12").unwrap().service, MediaService::YouTube);
        assert_eq!(MediaTarget::parse("123456").unwrap().service, MediaService::Vimeo);
    }

    #[test]
    fn rejects_unknown_hosts_and_missing_ids() {
        assert_eq!(
            MediaTarget::parse("https://example.com/watch?v=1"),
            Err(TargetError::UnsupportedHost("example.com".into()))
        );
        assert!(matches!(
            MediaTarget::parse("https://www.youtube.com/feed"),
            Err(TargetError::MissingIdentifier(_))
        ));
    }

    #[test]
    fn builds_search_queries() {
        assert_eq!(
            MediaTarget::youtube("abc").search_query(),
            "(url:3Dabc OR url:abc) (site:youtube.com OR site:youtu.be)"
        );
        assert_eq!(
            MediaTarget::vimeo("42").search_query(),
            "url:https://vimeo.com/42 OR url:http://vimeo.com/42"
        );
    }
}
