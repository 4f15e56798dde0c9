use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() {
    if handle_cli_flags() {
        return;
    }

    setup_logging();

    if let Err(err) = threadscope::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn handle_cli_flags() -> bool {
    let mut saw_flag = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("threadscope {}", threadscope::VERSION);
                saw_flag = true;
            }
            "--help" | "-h" => {
                println!(
                    "threadscope - Find the discussion threads behind a video.\n\nUsage: threadscope [OPTIONS] <VIDEO URL OR ID>\n\n  --width <PX>         Tab strip width in pixels\n  --sort <KEY>         Comment order: confidence, top, new, controversial, old, qa\n  --link <URL>         Description link that may name the preferred thread (repeatable)\n  --config <PATH>      Read configuration from PATH\n  --version, -V        Show version and exit\n  --help,    -h        Show this help message"
                );
                saw_flag = true;
            }
            _ => {}
        }
    }
    saw_flag
}
