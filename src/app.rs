use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use chrono::DateTime;

use crate::comments::{CommentNode, CommentTree, MoreStub, Visit};
use crate::config::{self, FileStore, LoadOptions};
use crate::layout::TabLayout;
use crate::ranking::PreferredThread;
use crate::reddit::CommentSort;
use crate::request::HttpTransport;
use crate::session::{Progress, Session, SessionOptions};
use crate::target::MediaTarget;

const POLL_INTERVAL: Duration = Duration::from_millis(200);
const TEXT_WIDTH: usize = 100;

#[derive(Debug, Default, PartialEq)]
struct CliArgs {
    target: Option<String>,
    width: Option<u32>,
    sort: Option<CommentSort>,
    config_file: Option<PathBuf>,
    links: Vec<String>,
}

fn parse_args<I>(args: I) -> Result<CliArgs>
where
    I: IntoIterator<Item = String>,
{
    let mut parsed = CliArgs::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--width" => {
                let value = args.next().context("--width needs a value")?;
                let width = value
                    .parse::<u32>()
                    .with_context(|| format!("invalid width {value:?}"))?;
                parsed.width = Some(width);
            }
            "--sort" => {
                let value = args.next().context("--sort needs a value")?;
                let Some(sort) = CommentSort::from_key(&value) else {
                    bail!("unknown sort {value:?}");
                };
                parsed.sort = Some(sort);
            }
            "--config" => {
                let value = args.next().context("--config needs a path")?;
                parsed.config_file = Some(PathBuf::from(value));
            }
            "--link" => {
                parsed
                    .links
                    .push(args.next().context("--link needs a URL")?);
            }
            flag if flag.starts_with("--") => bail!("unknown flag {flag}"),
            _ => {
                if parsed.target.is_some() {
                    bail!("only one video can be looked up at a time");
                }
                parsed.target = Some(arg);
            }
        }
    }
    Ok(parsed)
}

pub fn run() -> Result<()> {
    let args = parse_args(std::env::args().skip(1))?;
    let Some(raw_target) = args.target.as_deref() else {
        bail!("no video given; pass a video URL or id (see --help)");
    };
    let target = MediaTarget::parse(raw_target).context("parse video")?;
    let preferred = PreferredThread::from_links(args.links.iter().map(String::as_str));

    let load_options = LoadOptions {
        config_file: args.config_file.clone(),
        env_prefix: None,
    };
    let cfg = config::load(load_options.clone()).context("load config")?;
    let transport = HttpTransport::new(&cfg.api.base_url, &cfg.api.user_agent)
        .context("create http transport")?;
    let policy = cfg.request_policy();
    let options = SessionOptions {
        container_width: args.width.unwrap_or(cfg.layout.container_width),
        metrics: cfg.tab_metrics(),
        ..SessionOptions::default()
    };
    let store = Arc::new(FileStore {
        options: load_options,
    });
    let mut session =
        Session::new(Arc::new(transport), policy, store, options).context("start session")?;
    if let Some(sort) = args.sort {
        session.set_sort(sort);
    }

    session.open_video(target, preferred);
    let deadline = policy.timeout * 3;
    wait_with_progress(&mut session, deadline);

    match session.progress().clone() {
        Progress::Ready => {
            if let Some(layout) = session.layout() {
                println!("{}", render_tabs(layout));
            }
            if let Some(tree) = session.tree() {
                print!("{}", render_tree(tree));
            }
            Ok(())
        }
        Progress::NoResults => {
            println!("No discussions found for {}.", raw_target);
            Ok(())
        }
        Progress::Error(state) => bail!("{}", state.message),
        other => bail!("lookup did not finish ({other:?})"),
    }
}

fn wait_with_progress(session: &mut Session, limit: Duration) {
    let started = Instant::now();
    let mut last = session.progress().clone();
    while !session.progress().is_settled() && started.elapsed() < limit {
        session.poll_blocking(POLL_INTERVAL);
        let current = session.progress().clone();
        if current != last {
            match &current {
                Progress::Slow => eprintln!("Still looking, this is taking a while..."),
                Progress::Retrying(attempt) => eprintln!("Retrying (attempt {attempt})..."),
                _ => {}
            }
            last = current;
        }
    }
}

fn render_tabs(layout: &TabLayout) -> String {
    let mut line = String::new();
    for (index, name) in layout.visible_tabs.iter().enumerate() {
        if index == layout.active_index {
            let _ = write!(line, "[*r/{name}] ");
        } else {
            let _ = write!(line, "[r/{name}] ");
        }
    }
    if layout.show_overflow() {
        let _ = write!(
            line,
            "(+{} more: {})",
            layout.overflow.len(),
            layout.overflow.join(", ")
        );
    }
    line.trim_end().to_string()
}

fn render_tree(tree: &CommentTree) -> String {
    let post = tree.post();
    let mut out = String::new();
    let mut header = format!(
        "\nr/{} · {} · {} points · {} comments",
        post.subreddit,
        post.title,
        post.vote.score(),
        post.num_comments
    );
    if post.official {
        header.push_str(" · linked by the video");
    }
    if post.preserved {
        header.push_str(" · archived");
    }
    let _ = writeln!(out, "{header}");
    if !post.body.trim().is_empty() {
        let _ = writeln!(out, "{}", wrap(&post.body, 0));
    }
    let _ = writeln!(out);

    for visit in tree.visible() {
        match visit {
            Visit::Comment(node) => render_comment(&mut out, node),
            Visit::More(stub) => render_stub(&mut out, stub),
        }
    }
    out
}

fn render_comment(out: &mut String, node: &CommentNode) {
    let indent = "  ".repeat(node.depth);
    let mut header = format!("{indent}u/{}", node.author);
    if node.is_op {
        header.push_str(" [OP]");
    }
    if let Some(kind) = node.distinguished.as_deref() {
        let _ = write!(header, " [{kind}]");
    }
    let _ = write!(header, " · {} points", node.vote.score());
    if let Some(posted) = DateTime::from_timestamp(node.created_utc as i64, 0) {
        let _ = write!(header, " · {}", posted.format("%Y-%m-%d %H:%M"));
    }
    if node.edited {
        header.push_str(" · edited");
    }
    let _ = writeln!(out, "{header}");
    if node.collapsed {
        let _ = writeln!(out, "{indent}  (hidden, score below threshold)");
        return;
    }
    let _ = writeln!(out, "{}", wrap(&node.body, node.depth + 1));
}

fn render_stub(out: &mut String, stub: &MoreStub) {
    let indent = "  ".repeat(stub.depth);
    let noun = if stub.count == 1 { "reply" } else { "replies" };
    let _ = writeln!(out, "{indent}[{} more {noun}]", stub.count);
}

fn wrap(text: &str, depth: usize) -> String {
    let indent = "  ".repeat(depth);
    let width = TEXT_WIDTH.saturating_sub(indent.len()).max(20) + indent.len();
    let options = textwrap::Options::new(width)
        .initial_indent(&indent)
        .subsequent_indent(&indent);
    textwrap::fill(text, &options)
}
