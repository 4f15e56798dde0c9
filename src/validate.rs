//! Confirms that a search hit really points at the video being watched.
//!
//! The search endpoint matches on free text, so it happily returns threads for
//! other videos with similar titles. Every hit is compared byte for byte
//! against the target identifier before it is allowed into ranking.

use percent_encoding::percent_decode_str;

use crate::reddit::CandidateItem;
use crate::target::{ALTERNATE_HOST, LONG_FORM_HOST, SHORT_LINK_HOST};

/// Age after which a post no longer accepts replies (180 days).
pub const PRESERVED_AFTER_SECS: f64 = 15_552_000.0;

pub fn is_preserved(created_utc: f64, now: f64) -> bool {
    now - created_utc >= PRESERVED_AFTER_SECS
}

pub fn accepts(item: &CandidateItem, target_id: &str, now: f64) -> bool {
    if is_preserved(item.created_utc, now) && item.num_comments < 1 {
        return false;
    }
    match item.domain.as_str() {
        LONG_FORM_HOST => long_form_matches(&item.url, target_id),
        SHORT_LINK_HOST | ALTERNATE_HOST => trailing_segment_matches(&item.url, target_id),
        _ => false,
    }
}

pub fn filter(items: Vec<CandidateItem>, target_id: &str, now: f64) -> Vec<CandidateItem> {
    let before = items.len();
    let kept: Vec<_> = items
        .into_iter()
        .filter(|item| accepts(item, target_id, now))
        .collect();
    tracing::debug!(before, kept = kept.len(), "validated search hits");
    kept
}

fn long_form_matches(url: &str, target_id: &str) -> bool {
    let query = match url.find('?') {
        Some(index) => &url[index + 1..],
        None => url,
    };
    query.split('&').any(|pair| {
        let mut parts = pair.split('=');
        let key = parts.next().unwrap_or_default();
        let value = parts.next();
        match (key, value) {
            ("v", Some(value)) => value == target_id,
            // Share links arrive double escaped as `&amp;u=%2Fwatch%3Fv%3D...`.
            ("amp;u", Some(value)) => {
                let decoded = percent_decode_str(value).decode_utf8_lossy();
                let inner = decoded.strip_prefix("/watch?").unwrap_or(&*decoded);
                inner.split('&').any(|inner_pair| {
                    let mut inner_parts = inner_pair.split('=');
                    inner_parts.next() == Some("v") && inner_parts.next() == Some(target_id)
                })
            }
            _ => false,
        }
    })
}

fn trailing_segment_matches(url: &str, target_id: &str) -> bool {
    let segment = match url.rfind('/') {
        Some(index) => &url[index + 1..],
        None => url,
    };
    segment.split('?').next() == Some(target_id)
}
