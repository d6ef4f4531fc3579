use score_cursor::{FollowConfig, PlaybackOverlay, SimulatedTransport, Transport, WrapPolicy};
use std::env;
use std::fs;
use std::process;

const USAGE: &str =
    "Usage: score-cursor <fixture.yaml> [--config <config.yaml>] [--step <ticks>] [--loop <start> <end>] [--manual-wrap]";

struct Options {
    fixture: String,
    config: Option<String>,
    step: i64,
    range: Option<(i64, i64)>,
    manual_wrap: bool,
}

fn parse_tick(value: Option<&String>, flag: &str) -> i64 {
    match value.map(|v| v.parse::<i64>()) {
        Some(Ok(tick)) => tick,
        Some(Err(e)) => {
            eprintln!("Invalid value for {}: {}", flag, e);
            process::exit(1);
        }
        None => {
            eprintln!("Missing value for {}", flag);
            eprintln!("{}", USAGE);
            process::exit(1);
        }
    }
}

fn parse_args(args: &[String]) -> Options {
    if args.len() < 2 {
        eprintln!("{}", USAGE);
        process::exit(1);
    }

    let mut options = Options {
        fixture: args[1].clone(),
        config: None,
        step: 120,
        range: None,
        manual_wrap: false,
    };

    // Parse flags
    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                match args.get(i + 1) {
                    Some(path) => options.config = Some(path.clone()),
                    None => {
                        eprintln!("{}", USAGE);
                        process::exit(1);
                    }
                }
                i += 2;
            }
            "--step" => {
                options.step = parse_tick(args.get(i + 1), "--step");
                i += 2;
            }
            "--loop" => {
                let start = parse_tick(args.get(i + 1), "--loop");
                let end = parse_tick(args.get(i + 2), "--loop");
                options.range = Some((start, end));
                i += 3;
            }
            "--manual-wrap" => {
                options.manual_wrap = true;
                i += 1;
            }
            other => {
                eprintln!("Unknown argument '{}'", other);
                eprintln!("{}", USAGE);
                process::exit(1);
            }
        }
    }

    if options.step <= 0 {
        eprintln!("--step must be positive");
        process::exit(1);
    }
    options
}

fn read(path: &str) -> String {
    match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("Error reading file '{}': {}", path, e);
            process::exit(1);
        }
    }
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let options = parse_args(&args);

    // Load
    let mut config = match &options.config {
        Some(path) => match FollowConfig::from_yaml(&read(path)) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Configuration error: {}", e);
                process::exit(1);
            }
        },
        None => FollowConfig::default(),
    };
    if options.manual_wrap {
        config.wrap_policy = WrapPolicy::Manual;
    }

    let (layout, table) = match score_cursor::load_fixture(&read(&options.fixture)) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Fixture error: {}", e);
            process::exit(1);
        }
    };
    let timeline_end = table.end();

    let mut overlay = PlaybackOverlay::new(config, SimulatedTransport::playing());
    if let Err(e) = overlay.on_layout_finished(&layout) {
        eprintln!("Layout error: {}", e);
        process::exit(1);
    }

    // Bound the run: the whole timeline, or two passes of the loop
    let mut budget = timeline_end;
    if let Some((start, end)) = options.range {
        match overlay.select_range(start, end) {
            Ok(selection) => {
                overlay.set_loop_enabled(true);
                overlay.transport_mut().seek(selection.start);
                budget = 2 * selection.len();
                eprintln!("Looping [{}, {})", selection.start, selection.end);
            }
            Err(e) => {
                eprintln!("Loop error: {}", e);
                process::exit(1);
            }
        }
    }

    // Simulate
    let mut tick = overlay.transport().position;
    let mut elapsed = 0;
    loop {
        if let Some(frame) = overlay.on_position_changed(tick) {
            println!("{} {:.2} {:.2} {:.2}", overlay.position(), frame.x, frame.y, frame.height);
        }
        if elapsed >= budget {
            break;
        }
        // A manual wrap seeks the transport; continue from where it landed
        let advance = overlay.transport_mut().advance(options.step);
        if advance.wrapped {
            overlay.on_loop_wrapped();
        }
        tick = advance.tick;
        elapsed += options.step;
        if options.range.is_none() && tick >= timeline_end {
            break;
        }
    }
}
