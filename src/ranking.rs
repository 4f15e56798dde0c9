use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::reddit::CandidateItem;

/// Fixed epoch offset that anchors the decay curve.
pub const EPOCH_OFFSET_SECS: f64 = 1_134_028_003.0;
pub const DECAY_SECS: f64 = 45_000.0;

static COMMUNITY_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:http|https)://(.[^/]+)/r/([A-Za-z0-9][A-Za-z0-9_]{2,20})(?:/comments/)?([A-Za-z0-9]*)")
        .expect("community link pattern is valid")
});

/// A thread the video's own author pointed at, e.g. from a description link.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PreferredThread {
    pub subreddit: Option<String>,
    pub post_id: Option<String>,
}

impl PreferredThread {
    /// First link that names a community wins.
    pub fn from_links<'a, I>(links: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        links.into_iter().find_map(|link| {
            let captures = COMMUNITY_LINK.captures(link)?;
            let subreddit = captures.get(2).map(|m| m.as_str().to_string());
            let post_id = captures
                .get(3)
                .map(|m| m.as_str())
                .filter(|id| !id.is_empty())
                .map(str::to_string);
            Some(Self { subreddit, post_id })
        })
    }

    fn matches_post(&self, id: &str) -> bool {
        self.post_id.as_deref() == Some(id)
    }

    fn matches_subreddit(&self, subreddit: &str) -> bool {
        self.subreddit
            .as_deref()
            .is_some_and(|preferred| preferred.eq_ignore_ascii_case(subreddit))
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RankingOptions {
    /// Lowercased community names that never appear.
    pub excluded: HashSet<String>,
    pub min_score: i64,
}

impl RankingOptions {
    pub fn new<I, S>(excluded: I, min_score: i64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            excluded: excluded
                .into_iter()
                .map(|name| name.as_ref().trim().to_ascii_lowercase())
                .filter(|name| !name.is_empty())
                .collect(),
            min_score,
        }
    }

    fn admits(&self, item: &CandidateItem) -> bool {
        !self.excluded.contains(&item.subreddit.to_ascii_lowercase()) && item.score >= self.min_score
    }
}

/// The representative discussion for one community.
#[derive(Debug, Clone, PartialEq)]
pub struct Thread {
    pub subreddit: String,
    pub id: String,
    pub name: String,
    pub title: String,
    pub score: i64,
    pub num_comments: i64,
    pub created_utc: f64,
    pub is_official: bool,
}

impl From<CandidateItem> for Thread {
    fn from(item: CandidateItem) -> Self {
        let name = if item.name.is_empty() {
            format!("t3_{}", item.id)
        } else {
            item.name
        };
        Thread {
            subreddit: item.subreddit,
            id: item.id,
            name,
            title: item.title,
            score: item.score,
            num_comments: item.num_comments,
            created_utc: item.created_utc,
            is_official: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Ranked {
    Threads(Vec<Thread>),
    NoResults,
}

/// Hot-style ranking value, rounded to seven decimals.
///
/// `delta_secs` is already offset by [`EPOCH_OFFSET_SECS`]. The sign of the
/// score applies to both the magnitude and the age term, so a negative score
/// sinks further the larger the offset grows.
pub fn confidence(score: i64, delta_secs: f64) -> f64 {
    let order = (score.unsigned_abs().max(1) as f64).ln();
    let sign = score.signum() as f64;
    let raw = sign * order + sign * delta_secs / DECAY_SECS;
    (raw * 10_000_000.0).round() / 10_000_000.0
}

pub fn item_confidence(item: &CandidateItem, now: f64) -> f64 {
    let delta = (now - item.created_utc).floor() - EPOCH_OFFSET_SECS;
    confidence(item.score, delta)
}

/// Picks one thread per community and orders the communities.
///
/// Inside a community the highest confidence wins unless the preferred post is
/// present. Communities are ordered by raw score, descending and stable, and
/// the preferred community is then moved to the front.
pub fn rank(
    items: Vec<CandidateItem>,
    preferred: Option<&PreferredThread>,
    options: &RankingOptions,
    now: f64,
) -> Ranked {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<CandidateItem>> = HashMap::new();
    for item in items.into_iter().filter(|item| options.admits(item)) {
        let group = groups.entry(item.subreddit.clone()).or_insert_with(|| {
            order.push(item.subreddit.clone());
            Vec::new()
        });
        group.push(item);
    }

    let mut threads: Vec<Thread> = order
        .iter()
        .filter_map(|subreddit| groups.remove(subreddit))
        .filter_map(|group| representative(group, preferred, now))
        .map(Thread::from)
        .collect();

    if threads.is_empty() {
        tracing::info!("no discussion threads survived ranking");
        return Ranked::NoResults;
    }

    threads.sort_by(|a, b| b.score.cmp(&a.score));

    if let Some(preferred) = preferred {
        if let Some(index) = threads
            .iter()
            .position(|thread| preferred.matches_subreddit(&thread.subreddit))
        {
            let thread = threads.remove(index);
            threads.insert(0, thread);
        }
        let first = &mut threads[0];
        if preferred.matches_post(&first.id) || preferred.matches_subreddit(&first.subreddit) {
            first.is_official = true;
        }
    }

    tracing::debug!(communities = threads.len(), "ranked discussion threads");
    Ranked::Threads(threads)
}

fn representative(
    group: Vec<CandidateItem>,
    preferred: Option<&PreferredThread>,
    now: f64,
) -> Option<CandidateItem> {
    if let Some(preferred) = preferred {
        if let Some(item) = group.iter().find(|item| preferred.matches_post(&item.id)) {
            return Some(item.clone());
        }
    }
    let mut best: Option<(f64, CandidateItem)> = None;
    for item in group {
        let value = item_confidence(&item, now);
        let better = best
            .as_ref()
            .map_or(true, |(current, _)| value > *current);
        if better {
            best = Some((value, item));
        }
    }
    best.map(|(_, item)| item)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: f64 = 1_700_000_000.0;

    fn candidate(id: &str, subreddit: &str, score: i64, created_utc: f64) -> CandidateItem {
        CandidateItem {
            id: id.into(),
            name: format!("t3_{id}"),
            subreddit: subreddit.into(),
            title: String::new(),
            url: String::new(),
            domain: "youtube.com".into(),
            score,
            num_comments: 4,
            created_utc,
            author: String::new(),
            permalink: String::new(),
        }
    }

    fn ids(ranked: &Ranked) -> Vec<(&str, &str)> {
        match ranked {
            Ranked::Threads(threads) => threads
                .iter()
                .map(|t| (t.subreddit.as_str(), t.id.as_str()))
                .collect(),
            Ranked::NoResults => Vec::new(),
        }
    }

    #[test]
    fn confidence_reference_values() {
        assert!((confidence(10, 0.0) - 10f64.ln()).abs() < 1e-6);
        assert!((confidence(10, 0.0) - 2.302585).abs() < 1e-6);
        assert!((confidence(-5, 45_000.0) - (-(5f64.ln()) - 1.0)).abs() < 1e-6);
        assert!((confidence(-5, 45_000.0) + 2.609438).abs() < 1e-6);
        assert_eq!(confidence(0, 90_000.0), 0.0);
    }

    #[test]
    fn picks_highest_confidence_per_community() {
        let items = vec![
            candidate("low", "videos", 2, NOW - 100.0),
            candidate("high", "videos", 500, NOW - 100.0),
            candidate("solo", "music", 50, NOW - 100.0),
        ];
        let ranked = rank(items, None, &RankingOptions::default(), NOW);
        assert_eq!(ids(&ranked), [("videos", "high"), ("music", "solo")]);
    }

    #[test]
    fn orders_communities_by_raw_score() {
        let items = vec![
            candidate("a", "small", 5, NOW),
            candidate("b", "big", 900, NOW),
            candidate("c", "mid", 40, NOW),
            candidate("d", "tied", 40, NOW),
        ];
        let ranked = rank(items, None, &RankingOptions::default(), NOW);
        assert_eq!(
            ids(&ranked),
            [("big", "b"), ("mid", "c"), ("tied", "d"), ("small", "a")]
        );
    }

    #[test]
    fn filters_excluded_and_low_scores() {
        let items = vec![
            candidate("a", "Spam", 100, NOW),
            candidate("b", "videos", -10, NOW),
            candidate("c", "videos", -4, NOW),
        ];
        let options = RankingOptions::new(["spam"], -4);
        let ranked = rank(items, None, &options, NOW);
        assert_eq!(ids(&ranked), [("videos", "c")]);
    }

    #[test]
    fn empty_result_signals_no_results() {
        let options = RankingOptions::new(["videos"], -4);
        let ranked = rank(vec![candidate("a", "videos", 10, NOW)], None, &options, NOW);
        assert_eq!(ranked, Ranked::NoResults);
        assert_eq!(rank(Vec::new(), None, &options, NOW), Ranked::NoResults);
    }

    #[test]
    fn preferred_post_overrides_confidence_and_leads() {
        let items = vec![
            candidate("top", "music", 1000, NOW),
            candidate("best", "videos", 800, NOW),
            candidate("linked", "videos", 1, NOW),
        ];
        let preferred = PreferredThread {
            subreddit: Some("Videos".into()),
            post_id: Some("linked".into()),
        };
        let ranked = rank(items, Some(&preferred), &RankingOptions::default(), NOW);
        assert_eq!(ids(&ranked), [("videos", "linked"), ("music", "top")]);
        match ranked {
            Ranked::Threads(threads) => {
                assert!(threads[0].is_official);
                assert!(!threads[1].is_official);
            }
            Ranked::NoResults => panic!("expected threads"),
        }
    }

    #[test]
    fn preferred_post_outside_preferred_community_is_official_when_first() {
        let items = vec![
            candidate("linked", "music", 1000, NOW),
            candidate("other", "videos", 10, NOW),
        ];
        let preferred = PreferredThread {
            subreddit: Some("gaming".into()),
            post_id: Some("linked".into()),
        };
        match rank(items, Some(&preferred), &RankingOptions::default(), NOW) {
            Ranked::Threads(threads) => {
                assert_eq!(threads[0].id, "linked");
                assert!(threads[0].is_official);
            }
            Ranked::NoResults => panic!("expected threads"),
        }
    }

    #[test]
    fn scrapes_preferred_thread_from_links() {
        let links = [
            "https://example.com/about",
            "https://www.reddit.com/r/Videos/comments/abc123/some_title/",
            "https://www.reddit.com/r/music",
        ];
        let preferred = PreferredThread::from_links(links).unwrap();
        assert_eq!(preferred.subreddit.as_deref(), Some("Videos"));
        assert_eq!(preferred.post_id.as_deref(), Some("abc123"));

        let preferred = PreferredThread::from_links(["http://reddit.com/r/music"]).unwrap();
        assert_eq!(preferred.subreddit.as_deref(), Some("music"));
        assert_eq!(preferred.post_id, None);

        assert!(PreferredThread::from_links(["https://example.com"]).is_none());
    }
}
