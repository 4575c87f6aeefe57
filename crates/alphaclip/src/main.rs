use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};

use alphaclip::{AlphaPlayer, BackendKind, PlaybackState, PlayerConfig, PlayerError, PlayerEvent};

const LOAD_TIMEOUT: Duration = Duration::from_secs(30);

struct Args {
    source: String,
    out: Option<PathBuf>,
    looping: bool,
    software: bool,
    max_frames: Option<u64>,
    fps: f64,
}

fn usage() -> &'static str {
    "usage: alphaclip <source> [--out DIR] [--loop] [--software] [--max-frames N] [--fps F]"
}

fn parse_args() -> Result<Args> {
    let mut args = std::env::args().skip(1);
    let mut source = None;
    let mut parsed = Args {
        source: String::new(),
        out: None,
        looping: false,
        software: false,
        max_frames: None,
        fps: 30.0,
    };
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--out" => parsed.out = Some(args.next().context("--out needs a directory")?.into()),
            "--loop" => parsed.looping = true,
            "--software" => parsed.software = true,
            "--max-frames" => {
                let n = args.next().context("--max-frames needs a count")?;
                parsed.max_frames = Some(n.parse().context("--max-frames")?);
            }
            "--fps" => {
                let f = args.next().context("--fps needs a rate")?;
                parsed.fps = f.parse().context("--fps")?;
            }
            "-h" | "--help" => {
                println!("{}", usage());
                std::process::exit(0);
            }
            other if other.starts_with("--") => bail!("unknown flag {other}\n{}", usage()),
            other => source = Some(other.to_string()),
        }
    }
    parsed.source = source.with_context(|| usage().to_string())?;
    if parsed.fps.is_nan() || parsed.fps <= 0.0 {
        bail!("--fps must be positive");
    }
    Ok(parsed)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = parse_args()?;
    let mut config = PlayerConfig::load();
    if args.software {
        config.backend = BackendKind::Software;
    }
    if args.looping {
        config.default_loop = true;
    }

    let mut player = AlphaPlayer::new(&config)?;
    let events = player.events();

    if let Some(dir) = &args.out {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    } else {
        log::error!("{}; frames will not be written", PlayerError::MissingTransform);
    }

    player.play(&args.source);
    let dt = 1.0 / args.fps;
    let started = Instant::now();
    let mut written = 0u64;
    let mut last_composited = 0u64;

    loop {
        player.tick(dt);

        let mut finished = false;
        for event in events.try_iter() {
            match event {
                PlayerEvent::PlayBegin { source } => log::info!("Playing {source}"),
                PlayerEvent::PlayEnd { source } => {
                    log::info!("Finished {source}");
                    finished |= !player.looping();
                }
                PlayerEvent::Error { source, error } => {
                    bail!("{source}: {error}");
                }
            }
        }
        if finished {
            break;
        }

        match player.state() {
            PlaybackState::Loading => {
                if started.elapsed() > LOAD_TIMEOUT {
                    bail!("{} did not start within {:?}", args.source, LOAD_TIMEOUT);
                }
                std::thread::sleep(Duration::from_millis(5));
                continue;
            }
            PlaybackState::ReadyWaiting => continue,
            PlaybackState::Playing => {
                if player.resource_ids().is_none() {
                    bail!("GPU resources unavailable; see the shader log above");
                }
            }
            state => {
                log::debug!("Stopping in {state:?}");
                break;
            }
        }

        let composited = player.frames_composited();
        if composited == last_composited {
            continue;
        }
        last_composited = composited;

        if let Some(dir) = &args.out {
            if let Some(img) = player.read_output() {
                let path = dir.join(format!("frame_{written:05}.png"));
                img.save(&path)
                    .with_context(|| format!("writing {}", path.display()))?;
            }
        }
        written += 1;
        if args.max_frames.is_some_and(|max| written >= max) {
            break;
        }
    }

    log::info!("Rendered {written} frames");
    player.destroy();
    Ok(())
}
