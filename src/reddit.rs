use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{self, Value};

use crate::request::{
    ApiError, ApiRequest, Orchestrator, RequestObserver, RequestPolicy, Transport,
};

pub const DEFAULT_BASE_URL: &str = "https://api.reddit.com/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum CommentSort {
    #[default]
    Confidence,
    Top,
    New,
    Controversial,
    Old,
    Qa,
}

impl CommentSort {
    pub const ALL: [CommentSort; 6] = [
        CommentSort::Confidence,
        CommentSort::Top,
        CommentSort::New,
        CommentSort::Controversial,
        CommentSort::Old,
        CommentSort::Qa,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommentSort::Confidence => "confidence",
            CommentSort::Top => "top",
            CommentSort::New => "new",
            CommentSort::Controversial => "controversial",
            CommentSort::Old => "old",
            CommentSort::Qa => "qa",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|sort| sort.as_str().eq_ignore_ascii_case(key.trim()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub policy: RequestPolicy,
}

/// Endpoint client for the discussion API. Every call goes through the
/// request orchestrator; write calls carry the user hash learned from the
/// last thread listing.
pub struct Client {
    orchestrator: Orchestrator,
    user_hash: Arc<RwLock<Option<String>>>,
}

impl Client {
    pub fn new(
        transport: Arc<dyn Transport>,
        config: ClientConfig,
        observer: Arc<dyn RequestObserver>,
    ) -> Self {
        Client {
            orchestrator: Orchestrator::new(transport, config.policy, observer),
            user_hash: Arc::new(RwLock::new(None)),
        }
    }

    /// A handle sharing this client's user hash whose calls report progress
    /// to `observer`.
    pub fn with_observer(&self, observer: Arc<dyn RequestObserver>) -> Client {
        Client {
            orchestrator: self.orchestrator.with_observer(observer),
            user_hash: Arc::clone(&self.user_hash),
        }
    }

    pub fn user_hash(&self) -> Option<String> {
        self.user_hash.read().clone()
    }

    pub fn is_signed_in(&self) -> bool {
        self.user_hash
            .read()
            .as_deref()
            .is_some_and(|hash| !hash.is_empty())
    }

    pub fn search(&self, query: &str) -> Result<Vec<CandidateItem>, ApiError> {
        let request = ApiRequest::get("/search.json").with_query("q", query);
        let envelope: ListingEnvelope<Thing<CandidateItem>> = self.orchestrator.execute_json(&request)?;
        if envelope.kind != "Listing" {
            return Err(ApiError::MalformedResponse(format!(
                "search returned kind {:?}",
                envelope.kind
            )));
        }
        Ok(envelope
            .data
            .children
            .into_iter()
            .map(|thing| thing.data)
            .collect())
    }

    pub fn thread(
        &self,
        subreddit: &str,
        article: &str,
        sort: CommentSort,
    ) -> Result<ThreadListing, ApiError> {
        let path = format!(
            "/r/{}/comments/{}.json",
            subreddit.trim_start_matches("r/"),
            article
        );
        let request = ApiRequest::get(path).with_query("sort", sort.as_str());
        let payload: Vec<Value> = self.orchestrator.execute_json(&request)?;
        let listing = decode_thread_payload(payload)?;
        if let Some(hash) = listing.user_hash.clone() {
            *self.user_hash.write() = Some(hash);
        }
        Ok(listing)
    }

    /// Fetches the subtree rooted at `anchor`, echoing the anchor itself.
    pub fn subtree(
        &self,
        subreddit: &str,
        article: &str,
        anchor: &str,
        sort: CommentSort,
    ) -> Result<Vec<CommentThing>, ApiError> {
        let path = format!(
            "/r/{}/comments/{}/z/{}.json",
            subreddit.trim_start_matches("r/"),
            article,
            anchor
        );
        let request = ApiRequest::get(path).with_query("sort", sort.as_str());
        let payload: Vec<Value> = self.orchestrator.execute_json(&request)?;
        let listing = decode_thread_payload(payload)?;
        Ok(listing.comments.children)
    }

    /// Loads hidden comments by id. The answer is flat: replies among the
    /// requested ids point at their parent through `parent_id`.
    pub fn more_children(
        &self,
        link: &str,
        ids: &[String],
        sort: CommentSort,
    ) -> Result<Vec<CommentThing>, ApiError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let request = ApiRequest::get("/api/morechildren.json")
            .with_query("api_type", "json")
            .with_query("link_id", link)
            .with_query("children", ids.join(","))
            .with_query("limit_children", "false")
            .with_query("sort", sort.as_str());
        let payload: ThingsResponse<CommentThing> = self.orchestrator.execute_json(&request)?;
        payload.into_things()
    }

    pub fn vote(&self, fullname: &str, dir: i32) -> Result<(), ApiError> {
        let form = self.write_form(vec![
            ("id".to_string(), fullname.to_string()),
            ("dir".to_string(), dir.clamp(-1, 1).to_string()),
        ]);
        self.orchestrator
            .execute(&ApiRequest::post("/api/vote", form))?;
        Ok(())
    }

    pub fn save(&self, fullname: &str) -> Result<(), ApiError> {
        let form = self.write_form(vec![("id".to_string(), fullname.to_string())]);
        self.orchestrator
            .execute(&ApiRequest::post("/api/save", form))?;
        Ok(())
    }

    pub fn unsave(&self, fullname: &str) -> Result<(), ApiError> {
        let form = self.write_form(vec![("id".to_string(), fullname.to_string())]);
        self.orchestrator
            .execute(&ApiRequest::post("/api/unsave", form))?;
        Ok(())
    }

    pub fn reply(&self, parent: &str, text: &str) -> Result<Comment, ApiError> {
        self.post_user_text("/api/comment", parent, text)
    }

    pub fn edit(&self, fullname: &str, text: &str) -> Result<Comment, ApiError> {
        self.post_user_text("/api/editusertext", fullname, text)
    }

    pub fn delete(&self, fullname: &str) -> Result<(), ApiError> {
        let form = self.write_form(vec![("id".to_string(), fullname.to_string())]);
        self.orchestrator
            .execute(&ApiRequest::post("/api/del", form))?;
        Ok(())
    }

    pub fn identity(&self) -> Result<String, ApiError> {
        let identity: Identity = self
            .orchestrator
            .execute_json(&ApiRequest::get("/api/me.json"))?;
        match identity.data.name {
            Some(name) if !name.is_empty() => Ok(name),
            _ => Err(ApiError::MalformedResponse("identity without a name".into())),
        }
    }

    fn post_user_text(&self, path: &str, thing: &str, text: &str) -> Result<Comment, ApiError> {
        let form = self.write_form(vec![
            ("thing_id".to_string(), thing.to_string()),
            ("text".to_string(), text.to_string()),
            ("api_type".to_string(), "json".to_string()),
        ]);
        let payload: ThingsResponse<Thing<Comment>> = self
            .orchestrator
            .execute_json(&ApiRequest::post(path, form))?;
        payload
            .into_things()?
            .into_iter()
            .next()
            .map(|thing| thing.data)
            .ok_or_else(|| ApiError::MalformedResponse("comment response empty".into()))
    }

    fn write_form(&self, mut form: Vec<(String, String)>) -> Vec<(String, String)> {
        if let Some(hash) = self.user_hash.read().as_ref() {
            form.push(("uh".to_string(), hash.clone()));
        }
        form
    }
}

fn decode_thread_payload(payload: Vec<Value>) -> Result<ThreadListing, ApiError> {
    let mut parts = payload.into_iter();
    let (Some(post_part), Some(comment_part)) = (parts.next(), parts.next()) else {
        return Err(ApiError::MalformedResponse(
            "thread payload missing elements".into(),
        ));
    };
    let post_listing: ListingEnvelope<Thing<Post>> = serde_json::from_value(post_part)
        .map_err(|err| ApiError::MalformedResponse(format!("decode post listing: {err}")))?;
    let comments: ListingEnvelope<CommentThing> = serde_json::from_value(comment_part)
        .map_err(|err| ApiError::MalformedResponse(format!("decode comment listing: {err}")))?;
    let user_hash = post_listing.data.modhash.clone();
    let post = post_listing
        .data
        .children
        .into_iter()
        .next()
        .map(|thing| thing.data)
        .ok_or_else(|| ApiError::MalformedResponse("post listing empty".into()))?;
    Ok(ThreadListing {
        post,
        comments: comments.data,
        user_hash,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing<T> {
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub before: Option<String>,
    #[serde(default)]
    pub modhash: Option<String>,
    pub children: Vec<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thing<T> {
    pub kind: String,
    pub data: T,
}

/// One search hit. Read-only; only used to pick representative threads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateItem {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub subreddit: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub num_comments: i64,
    #[serde(default)]
    pub created_utc: f64,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub permalink: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub title: String,
    pub subreddit: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub likes: Option<bool>,
    #[serde(default)]
    pub saved: bool,
    #[serde(default)]
    pub num_comments: i64,
    #[serde(default)]
    pub created_utc: f64,
}

/// Entry of a comment listing: a materialised comment or a placeholder for
/// siblings that have not been fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum CommentThing {
    #[serde(rename = "t1", alias = "comment")]
    Comment(Comment),
    #[serde(rename = "more")]
    More(More),
}

#[derive(Debug, Clone, Serialize)]
pub struct Comment {
    pub id: String,
    pub name: String,
    pub parent_id: String,
    pub body: String,
    pub author: String,
    pub score: i64,
    pub likes: Option<bool>,
    pub saved: bool,
    pub edited: bool,
    pub distinguished: Option<String>,
    pub created_utc: f64,
    pub replies: Option<Box<Listing<CommentThing>>>,
}

impl<'de> Deserialize<'de> for Comment {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct CommentHelper {
            id: String,
            #[serde(default)]
            name: String,
            #[serde(default)]
            parent_id: String,
            #[serde(default)]
            body: String,
            #[serde(default)]
            author: String,
            #[serde(default)]
            score: i64,
            #[serde(default)]
            likes: Option<bool>,
            #[serde(default)]
            saved: bool,
            // `false` or the edit timestamp.
            #[serde(default)]
            edited: serde_json::Value,
            #[serde(default)]
            distinguished: Option<String>,
            #[serde(default)]
            created_utc: f64,
            #[serde(default)]
            replies: serde_json::Value,
        }

        let helper = CommentHelper::deserialize(deserializer)?;
        let replies = if helper.replies.is_null() || helper.replies == "" {
            None
        } else {
            let listing = serde_json::from_value::<ListingEnvelope<CommentThing>>(helper.replies)
                .map_err(serde::de::Error::custom)?;
            Some(Box::new(listing.data))
        };
        let edited = match &helper.edited {
            Value::Bool(flag) => *flag,
            Value::Number(_) => true,
            _ => false,
        };
        let name = if helper.name.is_empty() {
            format!("t1_{}", helper.id)
        } else {
            helper.name
        };
        Ok(Comment {
            id: helper.id,
            name,
            parent_id: helper.parent_id,
            body: helper.body,
            author: helper.author,
            score: helper.score,
            likes: helper.likes,
            saved: helper.saved,
            edited,
            distinguished: helper.distinguished,
            created_utc: helper.created_utc,
            replies,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct More {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub parent_id: String,
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub children: Vec<String>,
}

/// Thread listing: the post wrapper followed by its comment listing.
#[derive(Debug, Clone)]
pub struct ThreadListing {
    pub post: Post,
    pub comments: Listing<CommentThing>,
    pub user_hash: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ListingEnvelope<T> {
    kind: String,
    data: Listing<T>,
}

#[derive(Debug, Clone, Deserialize)]
struct Identity {
    data: IdentityData,
}

#[derive(Debug, Clone, Deserialize)]
struct IdentityData {
    #[serde(default)]
    name: Option<String>,
}

/// `api_type=json` answer carrying a list of things.
#[derive(Debug, Clone, Deserialize)]
struct ThingsResponse<T> {
    json: ThingsBody<T>,
}

#[derive(Debug, Clone, Deserialize)]
struct ThingsBody<T> {
    #[serde(default)]
    errors: Vec<Vec<serde_json::Value>>,
    #[serde(default = "Option::default")]
    data: Option<ThingsData<T>>,
}

#[derive(Debug, Clone, Deserialize)]
struct ThingsData<T> {
    things: Vec<T>,
}

impl<T> ThingsResponse<T> {
    fn into_things(self) -> Result<Vec<T>, ApiError> {
        if let Some(err) = self.json.errors.first() {
            let joined = err
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(ApiError::Remote {
                status: 200,
                body: joined,
            });
        }
        Ok(self.json.data.map(|data| data.things).unwrap_or_default())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use serde_json::{json, Value};

    pub fn search_hit(
        id: &str,
        subreddit: &str,
        url: &str,
        domain: &str,
        score: i64,
        created_utc: f64,
    ) -> Value {
        json!({
            "kind": "t3",
            "data": {
                "id": id,
                "name": format!("t3_{id}"),
                "subreddit": subreddit,
                "title": format!("{subreddit} discussion"),
                "url": url,
                "domain": domain,
                "score": score,
                "num_comments": 5,
                "created_utc": created_utc,
                "author": "poster",
            }
        })
    }

    pub fn search_listing(hits: Vec<Value>) -> String {
        json!({"kind": "Listing", "data": {"children": hits}}).to_string()
    }

    pub fn comment(id: &str, parent: &str, body: &str, replies: Vec<Value>) -> Value {
        let replies = if replies.is_empty() {
            json!("")
        } else {
            json!({"kind": "Listing", "data": {"children": replies}})
        };
        json!({
            "kind": "t1",
            "data": {
                "id": id,
                "name": format!("t1_{id}"),
                "parent_id": parent,
                "body": body,
                "author": format!("author_{id}"),
                "score": 3,
                "likes": null,
                "edited": false,
                "created_utc": 1_700_000_000.0,
                "replies": replies,
            }
        })
    }

    pub fn more(id: &str, parent: &str, children: &[&str]) -> Value {
        json!({
            "kind": "more",
            "data": {
                "id": id,
                "parent_id": parent,
                "count": children.len(),
                "children": children,
            }
        })
    }

    pub fn thread_payload(post_id: &str, subreddit: &str, comments: Vec<Value>) -> String {
        json!([
            {
                "kind": "Listing",
                "data": {
                    "modhash": "hash123",
                    "children": [{
                        "kind": "t3",
                        "data": {
                            "id": post_id,
                            "name": format!("t3_{post_id}"),
                            "title": "A video",
                            "subreddit": subreddit,
                            "author": "poster",
                            "score": 10,
                            "num_comments": 4,
                            "created_utc": 1_700_000_000.0,
                        }
                    }]
                }
            },
            {"kind": "Listing", "data": {"children": comments}}
        ])
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::request::testing::ScriptedTransport;
    use crate::request::{ErrorKind, NoopObserver};

    fn client(transport: Arc<ScriptedTransport>) -> Client {
        Client::new(transport, ClientConfig::default(), Arc::new(NoopObserver))
    }

    #[test]
    fn decodes_search_results() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(
            "/search.json",
            200,
            search_listing(vec![search_hit(
                "a1",
                "videos",
                "https://www.youtube.com/watch?v=abc",
                "youtube.com",
                12,
                1.0,
            )]),
        );
        let items = client(transport.clone()).search("url:abc").unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].subreddit, "videos");
        assert_eq!(transport.calls()[0].query, vec![("q".into(), "url:abc".into())]);
    }

    #[test]
    fn search_rejects_unexpected_kind() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond("/search.json", 200, r#"{"kind":"t3","data":{"children":[]}}"#);
        let err = client(transport).search("x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);
    }

    #[test]
    fn thread_listing_captures_user_hash_and_nesting() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(
            "/r/videos/comments/p1.json",
            200,
            thread_payload(
                "p1",
                "videos",
                vec![
                    comment("c1", "t3_p1", "hello", vec![comment("c2", "t1_c1", "hi", vec![])]),
                    more("m1", "t3_p1", &["c3", "c4"]),
                ],
            ),
        );
        let client = client(transport.clone());
        let listing = client.thread("videos", "p1", CommentSort::Top).unwrap();
        assert_eq!(listing.post.id, "p1");
        assert_eq!(listing.comments.children.len(), 2);
        match &listing.comments.children[0] {
            CommentThing::Comment(c) => {
                let replies = c.replies.as_ref().unwrap();
                assert_eq!(replies.children.len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(client.is_signed_in());
        assert_eq!(transport.calls()[0].query, vec![("sort".into(), "top".into())]);
    }

    #[test]
    fn writes_carry_user_hash() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond("/r/videos/comments/p1.json", 200, thread_payload("p1", "videos", vec![]));
        transport.respond("/api/vote", 200, "{}");
        let client = client(transport.clone());
        client.thread("videos", "p1", CommentSort::Confidence).unwrap();
        client.vote("t3_p1", 1).unwrap();
        let vote = transport.calls().into_iter().find(|c| c.path == "/api/vote").unwrap();
        let form = vote.form.unwrap();
        assert!(form.contains(&("dir".into(), "1".into())));
        assert!(form.contains(&("uh".into(), "hash123".into())));
    }

    #[test]
    fn reply_surfaces_remote_errors() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(
            "/api/comment",
            200,
            r#"{"json":{"errors":[["RATELIMIT","slow down","ratelimit"]]}}"#,
        );
        let err = client(transport).reply("t1_c1", "text").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::GenericRemoteError);
    }

    #[test]
    fn more_children_loads_hidden_ids_in_one_batch() {
        let transport = Arc::new(ScriptedTransport::new());
        let batch = serde_json::json!({
            "json": {
                "errors": [],
                "data": {"things": [
                    comment("c2", "t3_p1", "two", vec![]),
                    comment("c3", "t3_p1", "three", vec![]),
                    more("m9", "t1_c3", &["c5"]),
                ]}
            }
        });
        transport.respond("/api/morechildren.json", 200, batch.to_string());
        let client = client(transport.clone());
        let ids = ["c2".to_string(), "c3".to_string(), "c5".to_string()];
        let things = client
            .more_children("t3_p1", &ids, CommentSort::Confidence)
            .unwrap();
        assert_eq!(things.len(), 3);
        assert!(matches!(&things[2], CommentThing::More(more) if more.parent_id == "t1_c3"));

        let query = &transport.calls()[0].query;
        assert!(query.contains(&("link_id".to_string(), "t3_p1".to_string())));
        assert!(query.contains(&("children".to_string(), "c2,c3,c5".to_string())));

        assert!(client
            .more_children("t3_p1", &[], CommentSort::Top)
            .unwrap()
            .is_empty());
        assert_eq!(transport.calls().len(), 1);
    }

    #[test]
    fn observer_handles_share_the_user_hash() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(
            "/r/videos/comments/p1.json",
            200,
            thread_payload("p1", "videos", vec![]),
        );
        let base = client(transport);
        let tagged = base.with_observer(Arc::new(NoopObserver));
        assert!(!base.is_signed_in());
        tagged.thread("videos", "p1", CommentSort::Top).unwrap();
        assert!(base.is_signed_in());
        assert_eq!(base.user_hash().as_deref(), Some("hash123"));
    }

    #[test]
    fn identity_reads_display_name() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond("/api/me.json", 200, r#"{"kind":"t2","data":{"name":"viewer"}}"#);
        assert_eq!(client(transport).identity().unwrap(), "viewer");
    }

    #[test]
    fn sort_keys_round_trip() {
        for sort in CommentSort::ALL {
            assert_eq!(CommentSort::from_key(sort.as_str()), Some(sort));
        }
        assert_eq!(CommentSort::from_key("bogus"), None);
    }
}
